//! The BFC console drivers: RAM, flash, the accelerated flash reader, and
//! the DOCSIS config dumper.

use enumflags2::BitFlags;

use cmkit_profile::{AddrSpace, ArgsMode, CodeCfg, Partition, SpaceFuncs};

use super::{hex_word, Cap, Driver, Limits};
use crate::interface::InterfaceRef;
use crate::{Error, Result};

/// `/read_memory`-based access to memory-mapped spaces.
pub(crate) struct BfcRam {
    intf: InterfaceRef,
    space: AddrSpace,
    hint_decimal: bool,
}

impl BfcRam {
    pub(crate) fn new(intf: InterfaceRef, space: AddrSpace) -> Self {
        Self { intf, space, hint_decimal: false }
    }
}

fn parse_dec(s: &str) -> Result<u32> {
    s.parse().map_err(|_| Error::Protocol(format!("bad decimal value '{s}'")))
}

impl Driver for BfcRam {
    fn intf(&self) -> &InterfaceRef {
        &self.intf
    }

    fn space(&self) -> &AddrSpace {
        &self.space
    }

    fn set_partition(&mut self, _partition: Partition) {}

    fn limits_read(&self) -> Limits {
        Limits::new(4, 16, 8192)
    }

    fn limits_write(&self) -> Limits {
        if self.intf.borrow().is_privileged() {
            Limits::new(4, 1, 4)
        } else {
            Limits::new(1, 1, 1)
        }
    }

    fn capabilities(&self) -> BitFlags<Cap> {
        if self.space.is_ram() {
            Cap::Read | Cap::Write | Cap::Exec
        } else if self.space.is_writable() {
            Cap::Read | Cap::Write
        } else {
            Cap::Read.into()
        }
    }

    fn do_read_chunk(&mut self, offset: u32, length: u32) -> Result<()> {
        let mut intf = self.intf.borrow_mut();

        if intf.is_privileged() {
            intf.runcmd(&format!("/read_memory -s 4 -n {length} 0x{offset:x}"))?;
        } else {
            intf.runcmd(&format!("/system/diag readmem -s 4 -n {length} 0x{offset:x}"))?;
        }

        self.hint_decimal = false;
        Ok(())
    }

    fn is_ignorable_line(&mut self, line: &str) -> bool {
        if line.len() >= 50 {
            if &line[8..10] == ": " && &line[48..50] == " |" {
                self.hint_decimal = false;
                return false;
            } else if line.contains(": ") && (line.contains(" | ") || line.ends_with(" |")) {
                // when another message interleaves with the dump, some
                // firmwares switch the grid to an all-decimal format
                self.hint_decimal = true;
                return false;
            }
        }

        true
    }

    fn parse_chunk_line(&mut self, line: &str, offset: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(16);

        if !self.hint_decimal {
            // AAAAAAAA: WWWWWWWW WWWWWWWW WWWWWWWW WWWWWWWW |....|
            if offset != hex_word(&line[0..8])? {
                return Err(Error::Protocol("offset mismatch".to_owned()));
            }

            for i in 0..4 {
                let start = (i + 1) * 10;
                out.extend_from_slice(&hex_word(&line[start..start + 8])?.to_be_bytes());
            }
        } else {
            let colon = line
                .find(": ")
                .ok_or_else(|| Error::Protocol("missing offset separator".to_owned()))?;

            if offset != parse_dec(&line[..colon])? {
                return Err(Error::Protocol("offset mismatch".to_owned()));
            }

            let mut rest = &line[colon..];
            for _ in 0..4 {
                let beg = rest
                    .find(|c: char| c.is_ascii_digit())
                    .ok_or_else(|| Error::Protocol("missing decimal word".to_owned()))?;
                let end = rest[beg..]
                    .find(|c: char| !c.is_ascii_digit())
                    .map_or(rest.len(), |p| beg + p);

                out.extend_from_slice(&parse_dec(&rest[beg..end])?.to_be_bytes());
                rest = &rest[end..];
            }
        }

        Ok(out)
    }

    fn write_chunk(&mut self, offset: u32, chunk: &[u8]) -> Result<bool> {
        let mut intf = self.intf.borrow_mut();

        if intf.is_privileged() {
            let val = if chunk.len() == 4 {
                u32::from_be_bytes(chunk.try_into().expect("4-byte chunk"))
            } else {
                u32::from(chunk[0])
            };

            intf.runcmd_expect(
                &format!("/write_memory -s {} 0x{offset:x} 0x{val:x}", chunk.len()),
                "Writing",
                false,
            )
        } else {
            // diag writemem only supports writing bytes
            intf.runcmd_expect(
                &format!("/system/diag writemem 0x{offset:x} 0x{:x}", chunk[0]),
                "Writing",
                false,
            )
        }
    }

    fn exec_go(&mut self, offset: u32) -> Result<bool> {
        self.intf
            .borrow_mut()
            .runcmd_expect(&format!("/call func -a 0x{offset:x}"), "Calling function 0x", false)
    }
}

/// `/flash/*`-based access to driver-backed spaces.
pub(crate) struct BfcFlash {
    intf: InterfaceRef,
    space: AddrSpace,
    partition: Option<Partition>,
}

impl BfcFlash {
    pub(crate) fn new(intf: InterfaceRef, space: AddrSpace) -> Self {
        Self { intf, space, partition: None }
    }

    fn use_direct_read(&self) -> bool {
        let version = self.intf.borrow().version();

        if version.has_opt("bfc:flash_read_direct") {
            version.opt_num("bfc:flash_read_direct", 0) != 0
        } else {
            true
        }
    }

    fn to_partition_offset(&self, offset: u32) -> Result<u32> {
        let base = self.partition.as_ref().map_or(0, |p| p.offset());

        if offset < base {
            return Err(Error::Protocol(format!(
                "offset 0x{offset:x} is less than partition offset"
            )));
        }

        Ok(offset - base)
    }

    fn open(&mut self) -> Result<()> {
        let name = self
            .partition
            .as_ref()
            .ok_or_else(|| Error::BadArgument("partition name required".to_owned()))?
            .altname()
            .to_owned();

        for pass in 0..2 {
            self.intf.borrow_mut().runcmd(&format!("/flash/open {name}"))?;

            let mut opened = false;
            let mut retry = false;

            self.intf.borrow_mut().foreach_line(
                |line| {
                    if line.contains("opened twice") {
                        retry = true;
                        opened = false;
                    } else if line.contains("driver opened") {
                        opened = true;
                    }
                    false
                },
                10000,
                10000,
            )?;

            if opened {
                return Ok(());
            } else if retry && pass == 0 {
                log::debug!("reinitializing flash driver before reopening");
                self.close()?;
                let mut intf = self.intf.borrow_mut();
                intf.runcmd_expect("/flash/deinit", "Deinitializing", false)?;
                intf.runcmd_expect("/flash/init", "Initializing", false)?;
                drop(intf);
                std::thread::sleep(std::time::Duration::from_secs(1));
            } else {
                break;
            }
        }

        Err(Error::Protocol(format!("failed to open partition {name}")))
    }

    fn close(&mut self) -> Result<()> {
        self.intf.borrow_mut().runcmd_expect("/flash/close", "driver closed", false)?;
        Ok(())
    }
}

impl Driver for BfcFlash {
    fn intf(&self) -> &InterfaceRef {
        &self.intf
    }

    fn space(&self) -> &AddrSpace {
        &self.space
    }

    fn set_partition(&mut self, partition: Partition) {
        self.partition = Some(partition);
    }

    fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    fn limits_read(&self) -> Limits {
        if self.use_direct_read() {
            Limits::new(1, 16, 4096)
        } else {
            Limits::new(1, 16, 512)
        }
    }

    fn limits_write(&self) -> Limits {
        Limits::new(1, 1, 4)
    }

    fn capabilities(&self) -> BitFlags<Cap> {
        Cap::Read | Cap::Write
    }

    fn init(&mut self, _offset: u32, _length: u32, _write: bool) -> Result<()> {
        self.open()
    }

    fn cleanup(&mut self) -> Result<()> {
        self.close()
    }

    fn do_read_chunk(&mut self, offset: u32, length: u32) -> Result<()> {
        let offset = self.to_partition_offset(offset)?;
        let mut intf = self.intf.borrow_mut();

        if self.use_direct_read() {
            intf.runcmd(&format!("/flash/readDirect {length} {offset}"))
        } else {
            intf.runcmd(&format!("/flash/read 4 {length} {offset}"))
        }
    }

    fn is_ignorable_line(&mut self, line: &str) -> bool {
        if self.use_direct_read() {
            if line.len() >= 53 {
                // 16 space-separated hex bytes, grouped by four
                if &line[11..14] == "   " && &line[25..28] == "   " {
                    return false;
                }
            }
        } else if line.len() >= 36 {
            let b = line.as_bytes();
            if b[8] == b' ' && b[17] == b' ' && b[26] == b' ' {
                return false;
            }
        }

        true
    }

    fn parse_chunk_line(&mut self, line: &str, _offset: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(16);

        if self.use_direct_read() {
            for i in 0..16 {
                let start = i * 3 + (i / 4) * 2;
                let hex = line
                    .get(start..start + 2)
                    .ok_or_else(|| Error::Protocol("short dump line".to_owned()))?;
                let val = hex_word(hex)?;
                if val > 0xff {
                    return Err(Error::Protocol(format!("value out of range: 0x{val:x}")));
                }
                out.push(val as u8);
            }
        } else {
            let mut i = 0;
            while i < line.len() {
                let hex = line
                    .get(i..i + 8)
                    .ok_or_else(|| Error::Protocol("short dump line".to_owned()))?;
                out.extend_from_slice(&hex_word(hex)?.to_be_bytes());
                i += 9;
            }
        }

        Ok(out)
    }

    fn on_chunk_retry(&mut self, _offset: u32, _length: u32) -> Result<()> {
        let reinit = self
            .intf
            .borrow()
            .version()
            .opt_num("bfc:flash_reinit_on_retry", 0)
            != 0;

        if reinit {
            self.close()?;
            self.open()?;
        }

        Ok(())
    }

    fn write_chunk(&mut self, offset: u32, chunk: &[u8]) -> Result<bool> {
        let offset = self.to_partition_offset(offset)?;
        let val = if chunk.len() == 4 {
            u32::from_be_bytes(chunk.try_into().expect("4-byte chunk"))
        } else {
            u32::from(chunk[0])
        };

        self.intf.borrow_mut().runcmd_expect(
            &format!("/flash/write {} 0x{offset:x} 0x{val:x}", chunk.len()),
            "successfully written",
            false,
        )
    }
}

/// Accelerated flash reads: the device's own flash read function dumps
/// into the profile's RAM buffer, which is then read back like memory.
pub(crate) struct BfcFlash2 {
    ram: BfcRam,
    space: AddrSpace,
    cfg: CodeCfg,
    funcs: SpaceFuncs,
    dump_offset: u32,
    dump_length: u32,
    needs_read_call: bool,
}

impl BfcFlash2 {
    pub(crate) fn new(intf: InterfaceRef, space: AddrSpace) -> Self {
        let ram_space = intf
            .borrow()
            .profile()
            .map(|p| p.ram().clone())
            .unwrap_or_default();

        Self {
            ram: BfcRam::new(intf, ram_space),
            space,
            cfg: CodeCfg::default(),
            funcs: SpaceFuncs::default(),
            dump_offset: 0,
            dump_length: 0,
            needs_read_call: true,
        }
    }

    pub(crate) fn is_supported(intf: &InterfaceRef, space: &AddrSpace) -> bool {
        let intf = intf.borrow();
        let version = intf.version();

        if version.version_name().is_empty() {
            return false;
        }

        if version.code_cfg().buffer == 0 {
            return false;
        }

        version.functions(space.name()).read.addr() != 0
    }

    fn kseg1(&self) -> u32 {
        self.ram
            .intf
            .borrow()
            .profile()
            .map(|p| p.kseg1())
            .unwrap_or(0)
    }

    fn patch(&mut self, which: &str) -> Result<()> {
        let (addr, patches) = {
            let funcs = match which {
                "open" => &self.funcs.open,
                "read" => &self.funcs.read,
                "close" => &self.funcs.close,
                _ => return Ok(()),
            };
            (funcs.addr(), funcs.patches().to_vec())
        };

        if addr == 0 {
            return Ok(());
        }

        let kseg1 = self.kseg1();
        for patch in patches {
            if patch.addr != 0
                && !self.ram.write_chunk(patch.addr | kseg1, &patch.word.to_be_bytes())?
            {
                return Err(Error::Protocol(format!(
                    "failed to patch word at 0x{:08x}",
                    patch.addr
                )));
            }
        }

        Ok(())
    }

    fn mkcmd(&self, addr: u32, args: &[u32]) -> String {
        let mut cmd = format!("/call func -a 0x{:x}", addr | self.kseg1());
        for arg in args {
            cmd.push_str(&format!(" 0x{arg:x}"));
        }
        cmd
    }

    fn call_read(&mut self, offset: u32, length: u32) -> Result<()> {
        let read = self.funcs.read.clone();
        if read.addr() == 0 {
            return Ok(());
        }

        let buffer = self.cfg.buffer;
        let cmd = match read.mode() {
            ArgsMode::BufOffLen => self.mkcmd(read.addr(), &[buffer, offset, length]),
            ArgsMode::OffBufLen => self.mkcmd(read.addr(), &[offset, buffer, length]),
            other => {
                return Err(Error::Unsupported(format!("unsupported 'read' args: {other:?}")))
            }
        };

        self.patch("read")?;
        self.ram.intf.borrow_mut().runcmd(&cmd)
    }

    fn call_open_close(&mut self, which: &str, offset: u32, length: u32) -> Result<()> {
        let func = match which {
            "open" => self.funcs.open.clone(),
            _ => self.funcs.close.clone(),
        };

        if func.addr() == 0 {
            return Ok(());
        }

        let cmd = match func.mode() {
            ArgsMode::OffLen => self.mkcmd(func.addr(), &[offset, length]),
            ArgsMode::OffEnd => self.mkcmd(func.addr(), &[offset, offset + length]),
            other => {
                return Err(Error::Unsupported(format!(
                    "unsupported '{which}' args: {other:?}"
                )))
            }
        };

        self.patch(which)?;
        self.ram.intf.borrow_mut().runcmd(&cmd)
    }

    fn buffer_offset(&self, offset: u32) -> u32 {
        self.cfg.buffer + (offset - self.dump_offset)
    }
}

impl Driver for BfcFlash2 {
    fn intf(&self) -> &InterfaceRef {
        &self.ram.intf
    }

    fn space(&self) -> &AddrSpace {
        &self.space
    }

    fn set_partition(&mut self, _partition: Partition) {}

    fn limits_read(&self) -> Limits {
        self.ram.limits_read()
    }

    fn limits_write(&self) -> Limits {
        Limits::new(0, 0, 0)
    }

    fn capabilities(&self) -> BitFlags<Cap> {
        Cap::Read.into()
    }

    fn init(&mut self, offset: u32, length: u32, _write: bool) -> Result<()> {
        let (cfg, funcs) = {
            let intf = self.ram.intf.borrow();
            let version = intf.version();
            (*version.code_cfg(), version.functions(self.space.name()))
        };

        self.cfg = cfg;
        self.funcs = funcs;

        if self.cfg.buflen != 0 && length > self.cfg.buflen {
            return Err(Error::BadArgument(format!(
                "requested length exceeds buffer size ({} b)",
                self.cfg.buflen
            )));
        }

        self.dump_offset = offset;
        self.dump_length = length;
        self.needs_read_call = true;

        self.call_open_close("open", offset, length)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.call_open_close("close", self.dump_offset, self.dump_length)
    }

    fn chunk_timeout(&self, offset: u32, _length: u32) -> u32 {
        // the first chunk waits for the device-side read of the whole range
        if offset == self.dump_offset {
            60 * 1000
        } else {
            0
        }
    }

    fn do_read_chunk(&mut self, offset: u32, length: u32) -> Result<()> {
        if self.needs_read_call {
            self.call_read(self.dump_offset, self.dump_length)?;
            self.needs_read_call = false;
        }

        let buffer = self.buffer_offset(offset);
        self.ram.do_read_chunk(buffer, length)
    }

    fn is_ignorable_line(&mut self, line: &str) -> bool {
        self.ram.is_ignorable_line(line)
    }

    fn parse_chunk_line(&mut self, line: &str, offset: u32) -> Result<Vec<u8>> {
        let buffer = self.buffer_offset(offset);
        self.ram.parse_chunk_line(line, buffer)
    }
}

/// The `/docsis_ctl/cfg_hex_show` special reader.
pub(crate) struct BfcCmcfg {
    intf: InterfaceRef,
    space: AddrSpace,
}

impl BfcCmcfg {
    pub(crate) fn new(intf: InterfaceRef, space: AddrSpace) -> Self {
        Self { intf, space }
    }
}

impl Driver for BfcCmcfg {
    fn intf(&self) -> &InterfaceRef {
        &self.intf
    }

    fn space(&self) -> &AddrSpace {
        &self.space
    }

    fn set_partition(&mut self, _partition: Partition) {}

    fn limits_read(&self) -> Limits {
        Limits::new(1, 0, 0)
    }

    fn limits_write(&self) -> Limits {
        Limits::new(0, 0, 0)
    }

    fn capabilities(&self) -> BitFlags<Cap> {
        Cap::Read | Cap::Special
    }

    fn do_read_chunk(&mut self, _offset: u32, _length: u32) -> Result<()> {
        self.intf.borrow_mut().runcmd("/docsis_ctl/cfg_hex_show")
    }

    fn is_ignorable_line(&mut self, line: &str) -> bool {
        line.len() < 58 || line.len() > 73 || line.get(53..57) != Some("  | ")
    }

    fn parse_chunk_line(&mut self, line: &str, _offset: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(16);

        for i in 0..16 {
            let offset = 2 * (i / 4) + 3 * i;
            let Some(hex) = line.get(offset..offset + 2) else {
                break;
            };

            match hex_word(hex) {
                Ok(val) => out.push(val as u8),
                // a short trailing line has the ASCII gutter earlier
                Err(e) if line.len() != 73 => {
                    let _ = e;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(out)
    }

    fn finish_special(&mut self, buf: &mut Vec<u8>) {
        // the config dump drops the terminating end-of-data TLV
        buf.push(0xff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::detect_for_tests;
    use cmkit_io::{ByteStream, Char};

    struct DummyStream;

    impl ByteStream for DummyStream {
        fn write(&mut self, _data: &[u8]) -> cmkit_io::Result<()> {
            Ok(())
        }

        fn getc(&mut self) -> cmkit_io::Result<Char> {
            Ok(Char::Eof)
        }

        fn pending(&mut self, _timeout: u32) -> cmkit_io::Result<bool> {
            Ok(false)
        }
    }

    fn ram() -> BfcRam {
        BfcRam::new(detect_for_tests(Box::new(DummyStream)), AddrSpace::ram(0, 0))
    }

    #[test]
    fn test_hex_grid_line() {
        let mut d = ram();
        let line = "80004000: 00010203  04050607  08090a0b  0c0d0e0f |................|";

        assert!(!d.is_ignorable_line(line));
        assert!(!d.hint_decimal);
        let bytes = d.parse_chunk_line(line, 0x80004000).unwrap();
        assert_eq!(bytes, (0u8..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_decimal_grid_line() {
        let mut d = ram();
        // some firmwares flip to decimal mid-dump
        let line = "2147500032: 66051 67438087 134810123 202182159 | ................ |";

        assert!(!d.is_ignorable_line(line));
        assert!(d.hint_decimal);

        let bytes = d.parse_chunk_line(line, 2147500032).unwrap();
        assert_eq!(bytes, (0u8..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_hex_grid_offset_mismatch() {
        let mut d = ram();
        let line = "80004000: 00010203  04050607  08090a0b  0c0d0e0f |................|";

        assert!(!d.is_ignorable_line(line));
        assert!(d.parse_chunk_line(line, 0x80004010).is_err());
    }

    #[test]
    fn test_flash_direct_line() {
        let mut d =
            BfcFlash::new(detect_for_tests(Box::new(DummyStream)), AddrSpace::new("flash", 0));
        let line = "de ad be ef   00 11 22 33   44 55 66 77   88 99 aa bb";

        assert!(!d.is_ignorable_line(line));
        let bytes = d.parse_chunk_line(line, 0).unwrap();
        assert_eq!(&bytes[..4], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn test_cmcfg_line_shape() {
        let mut d = BfcCmcfg::new(detect_for_tests(Box::new(DummyStream)), AddrSpace::ram(0, 0));

        let line = "03 01 01 04   05 01 01 01   01 01 06 01   07 18 19 1a  | ........ |";
        assert!(!d.is_ignorable_line(line));

        let bytes = d.parse_chunk_line(line, 0).unwrap();
        assert_eq!(bytes[0], 0x03);
        assert_eq!(bytes.len(), 16);
    }
}
