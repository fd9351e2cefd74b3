//! The remote read/write/exec engine.
//!
//! A driver turns chunk-sized requests into console commands and parses
//! the resulting dump lines; the engine wraps a driver with range
//! checking, request widening, retries, cancellation, image detection,
//! and guaranteed cleanup.

mod bfc;
mod bootloader;
mod code;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use enumflags2::{bitflags, BitFlags};

use cmkit_profile::{AddrSpace, Partition, Profile};

use crate::interface::{InterfaceRef, Kind};
use crate::ps::{PsHeader, PS_HEADER_SIZE};
use crate::{Error, Result};

const MAX_RETRIES: u32 = 5;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Request cancellation of the running operation. Installed by the
/// front-ends as their `^C` handler; the engine polls the flag between
/// chunks.
pub fn interrupt() {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Whether cancellation was requested.
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Reset the cancellation flag for the next operation.
pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::Relaxed);
}

fn throw_if_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

/// What a driver can do.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    /// Read byte ranges.
    Read,
    /// Write byte ranges.
    Write,
    /// Call code on the device.
    Exec,
    /// Produce one special, non-addressable blob.
    Special,
}

/// Chunk geometry of a driver: request alignment, and the smallest and
/// largest chunk it can move per round trip.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Offset alignment.
    pub alignment: u32,
    /// Minimum chunk size.
    pub min: u32,
    /// Maximum chunk size; 0 for drivers that cannot do the operation.
    pub max: u32,
}

impl Limits {
    pub(crate) const fn new(alignment: u32, min: u32, max: u32) -> Self {
        Self { alignment, min, max }
    }
}

pub(crate) trait Driver {
    fn intf(&self) -> &InterfaceRef;
    fn space(&self) -> &AddrSpace;
    fn set_partition(&mut self, partition: Partition);

    fn partition(&self) -> Option<&Partition> {
        None
    }

    fn limits_read(&self) -> Limits;
    fn limits_write(&self) -> Limits;
    fn capabilities(&self) -> BitFlags<Cap>;

    fn init(&mut self, offset: u32, length: u32, write: bool) -> Result<()> {
        let _ = (offset, length, write);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Issue the command that makes the device print the requested chunk.
    fn do_read_chunk(&mut self, offset: u32, length: u32) -> Result<()>;

    /// Whether the line is console noise rather than a possible chunk line.
    fn is_ignorable_line(&mut self, line: &str) -> bool;

    /// Parse one dump line into bytes. `offset` is where the line must
    /// start; a mismatch is a protocol error.
    fn parse_chunk_line(&mut self, line: &str, offset: u32) -> Result<Vec<u8>>;

    fn on_chunk_retry(&mut self, offset: u32, length: u32) -> Result<()> {
        let _ = (offset, length);
        Ok(())
    }

    /// Extra time budget for the chunk, e.g. while the device erases.
    fn chunk_timeout(&self, offset: u32, length: u32) -> u32 {
        let _ = (offset, length);
        0
    }

    fn write_chunk(&mut self, offset: u32, chunk: &[u8]) -> Result<bool> {
        let _ = (offset, chunk);
        Ok(false)
    }

    fn exec_go(&mut self, offset: u32) -> Result<bool> {
        let _ = offset;
        Ok(false)
    }

    /// For special drivers: post-process the blob.
    fn finish_special(&mut self, buf: &mut Vec<u8>) {
        let _ = buf;
    }
}

pub(crate) fn hex_word(s: &str) -> Result<u32> {
    u32::from_str_radix(s, 16).map_err(|_| Error::Protocol(format!("bad hex value '{s}'")))
}

fn wait_for_interface(intf: &InterfaceRef) -> Result<bool> {
    for i in 0..10 {
        if intf.borrow_mut().is_ready(false)? {
            return Ok(true);
        }
        if i != 9 {
            std::thread::sleep(Duration::from_secs(1));
        }
    }

    Ok(false)
}

fn align_left(num: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        num
    } else {
        num - (num % alignment)
    }
}

fn align_right(num: u32, alignment: u32) -> u32 {
    if alignment == 0 || num % alignment == 0 {
        num
    } else {
        num + (alignment - num % alignment)
    }
}

/// Callback invoked when a valid ProgramStore header shows up in a dump.
pub type ImageListener = Box<dyn FnMut(u32, &PsHeader)>;

/// Callback invoked as chunks complete: `(offset, chunk_length)`.
pub type ProgressListener = Box<dyn FnMut(u32, u32)>;

/// A read/write/exec channel to one address space of the device.
pub struct Rwx {
    driver: Box<dyn Driver>,
    inited: bool,
    image_listener: Option<ImageListener>,
    progress_listener: Option<ProgressListener>,
    silent: bool,
}

impl Rwx {
    fn with_driver(driver: Box<dyn Driver>) -> Self {
        Self { driver, inited: false, image_listener: None, progress_listener: None, silent: false }
    }

    /// The driver's read geometry.
    pub fn limits_read(&self) -> Limits {
        self.driver.limits_read()
    }

    /// The driver's write geometry.
    pub fn limits_write(&self) -> Limits {
        self.driver.limits_write()
    }

    /// The driver's capability set.
    pub fn capabilities(&self) -> BitFlags<Cap> {
        self.driver.capabilities()
    }

    /// The address space this channel operates on.
    pub fn space(&self) -> &AddrSpace {
        self.driver.space()
    }

    /// Bind a partition (needed by the flash drivers).
    pub fn set_partition(&mut self, partition: Partition) {
        self.driver.set_partition(partition);
    }

    /// Register an image listener.
    pub fn set_image_listener(&mut self, listener: ImageListener) {
        self.image_listener = Some(listener);
    }

    /// Register a progress listener.
    pub fn set_progress_listener(&mut self, listener: ProgressListener) {
        self.progress_listener = Some(listener);
    }

    /// Suppress listeners (used for internal probe reads).
    pub fn silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    fn require_capability(&self, cap: Cap) -> Result<()> {
        if self.capabilities().contains(cap) {
            Ok(())
        } else {
            Err(Error::Unsupported(format!(
                "rwx does not support the {} capability",
                format!("{cap:?}").to_lowercase()
            )))
        }
    }

    fn update_progress(&mut self, offset: u32, length: u32) {
        if self.silent {
            return;
        }
        if let Some(listener) = &mut self.progress_listener {
            listener(offset, length);
        }
    }

    // a widened request must stay inside the bound partition
    fn check_partition_bounds(&self, offset: u32, length: u32) -> Result<()> {
        let Some(partition) = self.driver.partition() else {
            return Ok(());
        };

        if partition.size() == 0 {
            return Ok(());
        }

        let end = partition.offset() + partition.size();
        if offset < partition.offset() || offset.saturating_add(length) > end {
            return Err(Error::BadArgument(format!(
                "widened range 0x{offset:x},{length} crosses the bounds of partition '{}'",
                partition.name()
            )));
        }

        Ok(())
    }

    fn do_init(&mut self, offset: u32, length: u32, write: bool) -> Result<()> {
        if !self.inited {
            self.driver.init(offset, length, write)?;
            self.inited = true;
        }
        Ok(())
    }

    fn do_cleanup(&mut self) {
        if self.inited {
            if let Err(e) = self.driver.cleanup() {
                log::debug!("cleanup: {e}");
            }
            self.inited = false;
        }
    }

    fn read_chunk(&mut self, offset: u32, length: u32, retries: u32) -> Result<Vec<u8>> {
        self.driver.do_read_chunk(offset, length)?;

        let mut chunk: Vec<u8> = Vec::new();
        let mut pos = offset;
        let mut timeout = self.driver.chunk_timeout(offset, length);
        let start = Instant::now();
        let mut last_error = String::new();

        loop {
            while (length == 0 || (chunk.len() as u32) < length)
                && self.driver.intf().borrow_mut().pending(0)?
            {
                throw_if_interrupted()?;

                let line = match self.driver.intf().borrow_mut().readln()? {
                    Some(line) => line,
                    None => break,
                };
                let line = line.trim().to_owned();

                if line.is_empty() || self.driver.is_ignorable_line(&line) {
                    continue;
                }

                // the chunk line arrived; no need for the long timeout now
                timeout = 0;

                match self.driver.parse_chunk_line(&line, pos) {
                    Ok(bytes) => {
                        pos += bytes.len() as u32;
                        chunk.extend_from_slice(&bytes);
                        self.update_progress(pos, chunk.len() as u32);
                    }
                    Err(e) => {
                        let msg =
                            format!("failed to parse chunk line @0x{pos:08x}: '{line}' ({e})");
                        if retries >= MAX_RETRIES {
                            return Err(Error::ChunkFailed {
                                offset,
                                retries,
                                message: msg,
                            });
                        }

                        log::debug!("{msg}");
                        last_error = msg;
                        break;
                    }
                }
            }

            if timeout == 0 || start.elapsed() >= Duration::from_millis(u64::from(timeout)) {
                break;
            }
        }

        if length != 0 && chunk.len() as u32 != length {
            let msg = format!(
                "read incomplete chunk 0x{offset:08x}: {}/{length}{}",
                chunk.len(),
                if last_error.is_empty() { String::new() } else { format!(" ({last_error})") },
            );

            if retries < MAX_RETRIES {
                // the device may still be printing; let the dump drain and
                // the prompt come back before the next attempt
                if wait_for_interface(self.driver.intf())? {
                    log::debug!("{msg}; retrying");
                    self.driver.on_chunk_retry(offset, length)?;
                    return self.read_chunk(offset, length, retries + 1);
                }
            }

            return Err(Error::ChunkFailed { offset, retries, message: msg });
        }

        Ok(chunk)
    }

    /// Dump `length` bytes starting at `offset` into `sink`.
    ///
    /// `completed` gives the number of bytes already present in the sink
    /// when resuming a previous dump; pass 0 otherwise.
    pub fn dump(
        &mut self,
        offset: u32,
        length: u32,
        sink: &mut dyn std::io::Write,
        completed: u32,
    ) -> Result<()> {
        self.require_capability(Cap::Read)?;

        let result = self.dump_inner(offset, length, sink, completed);
        self.do_cleanup();
        result
    }

    fn dump_inner(
        &mut self,
        mut offset: u32,
        mut length: u32,
        sink: &mut dyn std::io::Write,
        completed: u32,
    ) -> Result<()> {
        if self.capabilities().contains(Cap::Special) {
            if completed != 0 {
                return Err(Error::BadArgument(
                    "resume is not supported with a special reader".to_owned(),
                ));
            }

            self.do_init(0, 0, false)?;
            let buf = self.read_special(offset, length)?;
            sink.write_all(&buf).map_err(cmkit_io::Error::from)?;
            return Ok(());
        }

        self.space().check_range(offset, length, "dump")?;

        if completed != 0 {
            if completed >= length {
                log::info!("nothing to resume");
                return Ok(());
            }

            // back off by two chunks so a torn tail gets overwritten
            let overlap = self.limits_read().max * 2;
            let mut completed = align_left(completed, overlap);
            if completed >= overlap {
                completed -= overlap;
                offset += completed;
                length -= completed;
                log::debug!("resuming at offset 0x{offset:08x}");
            }
        }

        let lim = self.limits_read();
        let mut offset_r = align_left(offset, lim.alignment);
        let mut length_r = align_right(length + (offset - offset_r), lim.min);
        let mut length_w = length;

        if offset_r != offset || length_r != length {
            log::debug!(
                "adjusting dump params: 0x{offset:x},{length} -> 0x{offset_r:x},{length_r}"
            );
            self.check_partition_bounds(offset_r, length_r)?;
        }

        self.do_init(offset_r, length_r, false)?;

        let mut hdrbuf: Vec<u8> = Vec::new();
        let mut check_image = true;

        while length_r > 0 {
            throw_if_interrupted()?;

            let n = length_r.min(lim.max);
            let chunk = self.read_chunk(offset_r, n, 0)?;

            if chunk.len() as u32 != n {
                return Err(Error::Protocol(format!(
                    "unexpected chunk length: {}",
                    chunk.len()
                )));
            }

            throw_if_interrupted()?;

            // carve the requested sub-window out of the widened chunk
            let chunk_w: &[u8] = if offset_r < offset && offset_r + n >= offset {
                let pos = (offset - offset_r) as usize;
                let take = ((n - pos as u32).min(length_w)) as usize;
                &chunk[pos..pos + take]
            } else if offset_r >= offset && length_w > 0 {
                &chunk[..(n.min(length_w)) as usize]
            } else {
                &[]
            };

            sink.write_all(chunk_w).map_err(cmkit_io::Error::from)?;

            if check_image {
                if hdrbuf.len() < PS_HEADER_SIZE {
                    hdrbuf.extend_from_slice(chunk_w);
                }

                if hdrbuf.len() >= PS_HEADER_SIZE {
                    if let Some(hdr) = PsHeader::parse(&hdrbuf) {
                        if hdr.hcs_valid() && !self.silent {
                            if let Some(listener) = &mut self.image_listener {
                                listener(offset, &hdr);
                            }
                        }
                    }
                    check_image = false;
                }
            }

            length_w -= chunk_w.len() as u32;
            length_r -= n;
            offset_r += n;
        }

        Ok(())
    }

    /// Read a byte range into memory.
    pub fn read(&mut self, offset: u32, length: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(length as usize);
        self.dump(offset, length, &mut out, 0)?;
        Ok(out)
    }

    /// Write `buf` at `offset`.
    ///
    /// Unaligned writes are widened and realized as read-modify-write when
    /// the driver can read; otherwise they are rejected.
    pub fn write(&mut self, offset: u32, buf: &[u8]) -> Result<()> {
        self.require_capability(Cap::Write)?;

        let result = self.write_inner(offset, buf);
        self.do_cleanup();
        result
    }

    fn write_inner(&mut self, offset: u32, buf: &[u8]) -> Result<()> {
        let length = buf.len() as u32;
        self.space().check_range(offset, length, "write")?;

        let lim = self.limits_write();
        let offset_w = align_left(offset, lim.min.max(1));
        let length_w = align_right(length + (offset - offset_w), lim.min.max(1));

        let mut buf_w: Vec<u8>;

        if offset_w != offset || length_w != length {
            log::debug!(
                "adjusting write params: 0x{offset:x},{length} -> 0x{offset_w:x},{length_w}"
            );
            self.check_partition_bounds(offset_w, length_w)?;

            if !self.capabilities().contains(Cap::Read) {
                return Err(Error::Unsupported(format!(
                    "non-aligned writes require read support; alignment is {}",
                    lim.min
                )));
            }

            let head = offset - offset_w;
            let tail = length_w - head - length;

            buf_w = Vec::with_capacity(length_w as usize);
            if head > 0 {
                buf_w.extend_from_slice(&self.read(offset_w, head)?);
            }
            buf_w.extend_from_slice(buf);
            if tail > 0 {
                buf_w.extend_from_slice(&self.read(offset + length, tail)?);
            }
        } else {
            buf_w = buf.to_vec();
        }

        throw_if_interrupted()?;

        self.do_init(offset_w, length_w, true)?;

        let mut pos = offset_w;
        let mut remaining = length_w;
        let mut retries = 0u32;

        while remaining > 0 {
            let n = if lim.max == lim.alignment {
                if remaining < lim.max {
                    lim.min
                } else {
                    lim.max
                }
            } else {
                remaining.min(lim.max)
            };

            let begin = (buf_w.len() as u32 - remaining) as usize;
            let chunk = &buf_w[begin..begin + n as usize];

            loop {
                let outcome = self.driver.write_chunk(pos, chunk);
                throw_if_interrupted()?;

                let what = match outcome {
                    Ok(true) => {
                        retries = 0;
                        break;
                    }
                    Ok(false) => String::new(),
                    Err(e) => format!(" ({e})"),
                };

                let msg = format!("failed to write chunk 0x{pos:08x}{what}");

                retries += 1;
                if retries < MAX_RETRIES && wait_for_interface(self.driver.intf())? {
                    log::debug!("{msg}; retrying");
                    continue;
                }

                return Err(Error::ChunkFailed { offset: pos, retries, message: msg });
            }

            self.update_progress(pos, n);
            pos += n;
            remaining -= n;
        }

        Ok(())
    }

    /// Call code at `offset` on the device.
    pub fn exec(&mut self, offset: u32) -> Result<()> {
        self.require_capability(Cap::Exec)?;

        if !self.driver.exec_go(offset)? {
            return Err(Error::Protocol(format!(
                "failed to execute function at offset 0x{offset:08x}"
            )));
        }

        Ok(())
    }

    /// Read a window of the special blob (drivers with [`Cap::Special`]).
    pub fn read_special(&mut self, offset: u32, length: u32) -> Result<Vec<u8>> {
        self.require_capability(Cap::Special)?;

        let mut buf = self.read_chunk(0, 0, 0)?;
        self.driver.finish_special(&mut buf);

        let offset = offset as usize;
        if offset >= buf.len() {
            return Ok(Vec::new());
        }

        let end = if length == 0 {
            buf.len()
        } else {
            (offset + length as usize).min(buf.len())
        };

        Ok(buf[offset..end].to_vec())
    }
}

impl Drop for Rwx {
    fn drop(&mut self) {
        self.do_cleanup();
    }
}

/// Create an RWX channel for a named address space.
///
/// `safe` selects the conservative line-by-line drivers over the uploaded
/// payload path.
pub fn create(intf: &InterfaceRef, space_name: &str, safe: bool) -> Result<Rwx> {
    let (kind, profile) = {
        let borrowed = intf.borrow();
        (borrowed_kind(&borrowed), borrowed.profile().cloned())
    };

    let (space, safe) = match &profile {
        Some(profile) => (profile.space(space_name)?.clone(), safe),
        None if space_name == "ram" => (Profile::get("generic")?.ram().clone(), true),
        None => {
            return Err(Error::BadArgument(
                "cannot create a non-ram rwx without a profile".to_owned(),
            ))
        }
    };

    match kind {
        Kind::Bootloader => {
            if space.is_mem() {
                if safe {
                    Ok(Rwx::with_driver(Box::new(bootloader::BootloaderRam::new(
                        intf.clone(),
                        space,
                    ))))
                } else {
                    create_code(intf, space)
                }
            } else if !safe {
                create_code(intf, space)
            } else {
                Err(Error::BadArgument(format!(
                    "no safe rwx for bootloader,{}",
                    space.name()
                )))
            }
        }
        Kind::Bfc | Kind::BfcTelnet => {
            if space.is_mem() {
                Ok(Rwx::with_driver(Box::new(bfc::BfcRam::new(intf.clone(), space))))
            } else if !safe && bfc::BfcFlash2::is_supported(intf, &space) {
                Ok(Rwx::with_driver(Box::new(bfc::BfcFlash2::new(intf.clone(), space))))
            } else {
                Ok(Rwx::with_driver(Box::new(bfc::BfcFlash::new(intf.clone(), space))))
            }
        }
    }
}

fn create_code(intf: &InterfaceRef, space: AddrSpace) -> Result<Rwx> {
    match code::CodeRwx::new(intf, space.clone()) {
        Ok(driver) => Ok(Rwx::with_driver(Box::new(driver))),
        Err(e) => {
            log::debug!("{e}");
            log::info!("falling back to safe method");
            create(intf, space.name(), true)
        }
    }
}

/// Create a special reader (`cmcfg`: the DOCSIS config dumper).
pub fn create_special(intf: &InterfaceRef, kind: &str) -> Result<Rwx> {
    let console = borrowed_kind(&intf.borrow());

    if matches!(console, Kind::Bfc | Kind::BfcTelnet) && kind == "cmcfg" {
        let space = Profile::get("generic")?.ram().clone();
        return Ok(Rwx::with_driver(Box::new(bfc::BfcCmcfg::new(intf.clone(), space))));
    }

    Err(Error::BadArgument(format!("no such special rwx: {kind}")))
}

fn borrowed_kind(intf: &crate::Interface) -> Kind {
    match intf.name() {
        "bootloader" => Kind::Bootloader,
        "bfc-telnet" => Kind::BfcTelnet,
        _ => Kind::Bfc,
    }
}

/// Parse a number: hex with `0x`, otherwise decimal with an optional
/// `k`/`M` binary suffix.
pub fn parse_num(text: &str) -> Result<u32> {
    let bad = || Error::BadArgument(format!("invalid number: '{text}'"));

    if let Some(hex) = text.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).map_err(|_| bad());
    }

    let (digits, mult) = match text.strip_suffix(['k', 'K']) {
        Some(d) => (d, 1024),
        None => match text.strip_suffix(['m', 'M']) {
            Some(d) => (d, 1024 * 1024),
            None => (text, 1),
        },
    };

    digits.parse::<u32>().ok().and_then(|n| n.checked_mul(mult)).ok_or_else(bad)
}

fn read_image_length(rwx: &mut Rwx, offset: u32) -> Result<u32> {
    rwx.silent(true);
    let header = rwx.read(offset, PS_HEADER_SIZE as u32);
    rwx.silent(false);

    Ok(match PsHeader::parse(&header?) {
        Some(hdr) if hdr.hcs_valid() => PS_HEADER_SIZE as u32 + hdr.length,
        _ => 0,
    })
}

/// Parse a dump/write range spec:
/// `{<partition>[+<offset>],<offset>}[,<length>|,auto]`.
///
/// `auto` (and a missing length on reads) sizes the range by reading a
/// ProgramStore header at the offset.
pub fn parse_range(rwx: &mut Rwx, spec: &str, write: bool) -> Result<(u32, u32)> {
    let tokens: Vec<&str> = spec.split(',').collect();
    if tokens.is_empty() || tokens.len() > 2 {
        return Err(Error::BadArgument(format!("invalid argument '{spec}'")));
    }

    let mut length = 0u32;
    let mut read_hdr = false;

    if tokens.len() == 2 {
        if tokens[1] != "auto" {
            length = parse_num(tokens[1])?;
        } else if !write {
            read_hdr = true;
        }
    }

    if let Ok(offset) = parse_num(tokens[0]) {
        if length == 0 && !write {
            length = read_image_length(rwx, offset)?;
        }
        return Ok((offset, length));
    }

    // not a number: a partition name, optionally with a +offset
    let (name, extra) = match tokens[0].split_once('+') {
        Some((name, extra)) => (name, Some(parse_num(extra)?)),
        None => (tokens[0], None),
    };

    let partition = rwx.space().partition(name)?.clone();
    let part_offset = partition.offset();
    let part_size = partition.size();
    rwx.set_partition(partition.clone());

    let mut offset = part_offset;

    if length == 0 && !read_hdr {
        length = part_size;
    }

    if length == 0 && !write {
        length = read_image_length(rwx, offset)?;
    }

    if !write && length == 0 && part_size == 0 {
        return Err(Error::BadArgument(format!(
            "size of partition '{}' is unknown, and size argument is missing",
            partition.name()
        )));
    }

    if write && part_size == 0 {
        // without a known size there is no safe upper bound for the write
        return Err(Error::BadArgument(format!(
            "size of partition '{}' is unknown; refusing to write",
            partition.name()
        )));
    }

    if let Some(extra) = extra {
        offset += extra;
        if !write && length == 0 {
            length = part_size - extra;
        }
    }

    Ok((offset, length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_num() {
        assert_eq!(parse_num("0x19c0000").unwrap(), 0x19c0000);
        assert_eq!(parse_num("64k").unwrap(), 0x10000);
        assert_eq!(parse_num("2M").unwrap(), 0x200000);
        assert_eq!(parse_num("12345").unwrap(), 12345);
        assert!(parse_num("zzz").is_err());
    }

    #[test]
    fn test_align_helpers() {
        assert_eq!(align_left(0x1003, 4), 0x1000);
        assert_eq!(align_right(0x1001, 16), 0x1010);
        assert_eq!(align_right(0x1000, 16), 0x1000);
    }

    #[test]
    fn test_interrupt_flag() {
        clear_interrupt();
        assert!(!was_interrupted());
        interrupt();
        assert!(was_interrupted());
        clear_interrupt();
    }
}
