//! The uploaded-payload driver: assembles a MIPS payload, uploads it to
//! the profile's code area, and drives it to stream memory or flash three
//! orders of magnitude faster than the line-by-line readers.

use enumflags2::BitFlags;

use cmkit_crypto::crc16_ccitt;
use cmkit_mips::{dumpcode, resolve_labels, to_image, writecode};
use cmkit_profile::{AddrSpace, CodeCfg, Func, Partition};

use super::{hex_word, Cap, Driver, Limits, Rwx};
use crate::interface::InterfaceRef;
use crate::{Error, Result};

pub(crate) struct CodeRwx {
    intf: InterfaceRef,
    space: AddrSpace,
    ram: Rwx,
    image: Vec<u8>,
    loadaddr: u32,
    entry: u32,
    write_mode: bool,
    rw_offset: u32,
    rw_length: u32,
    read_func: Func,
}

impl CodeRwx {
    pub(crate) fn new(intf: &InterfaceRef, space: AddrSpace) -> Result<Self> {
        let cfg = {
            let borrowed = intf.borrow();
            if borrowed.profile().is_none() {
                return Err(Error::Unsupported("code dumper requires a profile".to_owned()));
            }
            *borrowed.version().code_cfg()
        };

        if cfg.rwcode == 0 || cfg.buffer == 0 || cfg.printf == 0 {
            return Err(Error::Unsupported(
                "insufficient profile information for code dumper".to_owned(),
            ));
        }
        if cfg.rwcode & 0xffff != 0 {
            return Err(Error::Unsupported(
                "rwcode address must be aligned to 64k".to_owned(),
            ));
        }

        let ram = super::create(intf, "ram", true)?;

        Ok(Self {
            intf: intf.clone(),
            space,
            ram,
            image: Vec::new(),
            loadaddr: 0,
            entry: 0,
            write_mode: false,
            rw_offset: 0,
            rw_length: 0,
            read_func: Func::default(),
        })
    }

    fn profile_kseg1(&self) -> u32 {
        self.intf.borrow().profile().map(|p| p.kseg1()).unwrap_or(0)
    }

    fn code_cfg(&self) -> CodeCfg {
        *self.intf.borrow().version().code_cfg()
    }

    fn build_dump_payload(&mut self, offset: u32, length: u32, cfg: &CodeCfg) -> Result<Vec<u32>> {
        let kseg1 = self.profile_kseg1();
        let funcs = self.intf.borrow().version().functions(self.space.name());
        self.read_func = funcs.read.clone();

        if cfg.printf == 0
            || (!self.space.is_mem() && (cfg.buffer == 0 || self.read_func.addr() == 0))
        {
            let profile = self.intf.borrow().profile().map(|p| p.name()).unwrap_or("(none)");
            return Err(Error::Unsupported(format!(
                "profile {profile} does not support fast dump mode; use the safe path"
            )));
        }

        let mut code = dumpcode::code();
        self.entry = dumpcode::ENTRY as u32;

        code[dumpcode::OFF_DUMP_OFFSET / 4] = 0;
        code[dumpcode::OFF_BUFFER / 4] = kseg1 | cfg.buffer;
        code[dumpcode::OFF_OFFSET / 4] = offset;
        code[dumpcode::OFF_LENGTH / 4] = length;
        code[dumpcode::OFF_CHUNK_SIZE / 4] = self.limits_read().max;
        code[dumpcode::OFF_PRINTF / 4] = kseg1 | cfg.printf;

        if self.read_func.addr() != 0 {
            code[dumpcode::OFF_FLAGS / 4] = self.read_func.mode() as u32;
            code[dumpcode::OFF_READ_FUNC / 4] = kseg1 | self.read_func.addr();

            for (i, patch) in self.read_func.patches().iter().take(4).enumerate() {
                let slot = dumpcode::OFF_PATCHES / 4 + 2 * i;
                if patch.addr != 0 {
                    code[slot] = kseg1 | patch.addr;
                    code[slot + 1] = patch.word;
                }
            }
        }

        Ok(code)
    }

    fn build_write_payload(&mut self, offset: u32, length: u32, cfg: &CodeCfg) -> Result<Vec<u32>> {
        let kseg1 = self.profile_kseg1();
        let funcs = self.intf.borrow().version().functions(self.space.name());

        let mut code = writecode::code();
        self.entry = writecode::ENTRY as u32;

        code[writecode::OFF_FLAGS / 4] =
            funcs.write.mode() as u32 | funcs.erase.mode() as u32;
        code[writecode::OFF_BUFFER / 4] = offset;
        code[writecode::OFF_LENGTH / 4] = length;
        code[writecode::OFF_CHUNK_SIZE / 4] = self.limits_write().max;
        code[writecode::OFF_PRINTF / 4] = kseg1 | cfg.printf;

        if cfg.sscanf != 0 && cfg.getline != 0 {
            code[writecode::OFF_SCANF / 4] = kseg1 | cfg.sscanf;
            code[writecode::OFF_GETLINE / 4] = kseg1 | cfg.getline;
        } else if cfg.scanf != 0 {
            code[writecode::OFF_SCANF / 4] = kseg1 | cfg.scanf;
            code[writecode::OFF_GETLINE / 4] = 0;
        } else {
            let profile = self.intf.borrow().profile().map(|p| p.name()).unwrap_or("(none)");
            return Err(Error::Unsupported(format!(
                "profile {profile} does not support fast write mode; use the safe path"
            )));
        }

        Ok(code)
    }

    fn upload(&mut self) -> Result<()> {
        let size = self.image.len() as u32;
        let entry = self.entry as usize;

        // the payload's trailing word holds a checksum over its code; if
        // the word in RAM already matches, the payload is resident and only
        // the rewritten header words need uploading
        let expected =
            0xc0de_0000 | u32::from(crc16_ccitt(&self.image[entry..size as usize - 4]));

        let tail = self.ram.read(self.loadaddr + size - 4, 4)?;
        let actual = u32::from_be_bytes(tail[..4].try_into().expect("read 4 bytes"));
        let quick = expected == actual;

        let at = self.image.len() - 4;
        self.image[at..].copy_from_slice(&expected.to_be_bytes());

        if !quick {
            log::info!("updating code at 0x{:08x} ({size} b)", self.loadaddr);
        }

        for pass in 0..2 {
            let ramcode = self.ram.read(self.loadaddr, size)?;

            for i in (0..size as usize).step_by(4) {
                if ramcode[i..i + 4] != self.image[i..i + 4] {
                    if pass == 1 {
                        return Err(Error::Protocol(format!(
                            "dump code verification failed at 0x{:08x}",
                            self.loadaddr + i as u32
                        )));
                    }
                    self.ram.write(self.loadaddr + i as u32, &self.image[i..i + 4])?;
                }
            }
        }

        Ok(())
    }
}

impl Driver for CodeRwx {
    fn intf(&self) -> &InterfaceRef {
        &self.intf
    }

    fn space(&self) -> &AddrSpace {
        &self.space
    }

    fn set_partition(&mut self, _partition: Partition) {}

    fn limits_read(&self) -> Limits {
        Limits::new(4, 16, 0x4000)
    }

    fn limits_write(&self) -> Limits {
        Limits::new(16, 16, 0x4000)
    }

    fn capabilities(&self) -> BitFlags<Cap> {
        Cap::Read | Cap::Write | Cap::Exec
    }

    fn init(&mut self, offset: u32, length: u32, write: bool) -> Result<()> {
        let cfg = self.code_cfg();

        if cfg.buflen != 0 && length > cfg.buflen {
            return Err(Error::BadArgument(format!(
                "requested length exceeds buffer size ({} b)",
                cfg.buflen
            )));
        }

        if write && !self.space.is_ram() {
            return Err(Error::Unsupported(
                "writing to a non-ram address space is not supported".to_owned(),
            ));
        }

        self.write_mode = write;
        self.rw_offset = offset;
        self.rw_length = length;
        self.loadaddr = self.profile_kseg1() | cfg.rwcode;

        let mut code = if write {
            self.build_write_payload(offset, length, &cfg)?
        } else {
            self.build_dump_payload(offset, length, &cfg)?
        };

        resolve_labels(&mut code, self.entry as usize)?;
        self.image = to_image(&code);

        self.upload()
    }

    fn chunk_timeout(&self, offset: u32, _length: u32) -> u32 {
        // the first chunk may sit behind a full device-side flash read
        if offset == self.rw_offset && self.read_func.addr() != 0 {
            60 * 1000
        } else {
            0
        }
    }

    fn do_read_chunk(&mut self, _offset: u32, _length: u32) -> Result<()> {
        self.ram.exec(self.loadaddr + self.entry)
    }

    fn is_ignorable_line(&mut self, line: &str) -> bool {
        !(line.len() >= 8 && line.len() <= 36 && line.starts_with(':'))
    }

    fn parse_chunk_line(&mut self, line: &str, _offset: u32) -> Result<Vec<u8>> {
        let values: Vec<&str> = line[1..].split(':').collect();
        let mut out = Vec::with_capacity(16);

        if values.len() == 4 {
            for value in values {
                out.extend_from_slice(&hex_word(value)?.to_be_bytes());
            }
        }

        Ok(out)
    }

    fn on_chunk_retry(&mut self, offset: u32, _length: u32) -> Result<()> {
        if self.write_mode {
            return Ok(());
        }

        // rewind the resident payload: patch its running offset and the
        // remaining length in place, then the next exec resumes there
        let remaining = self.rw_length - (offset - self.rw_offset);

        let at = dumpcode::OFF_DUMP_OFFSET;
        self.image[at..at + 4].copy_from_slice(&offset.to_be_bytes());
        self.ram
            .write(self.loadaddr + at as u32, &offset.to_be_bytes())?;

        let at = dumpcode::OFF_LENGTH;
        self.image[at..at + 4].copy_from_slice(&remaining.to_be_bytes());
        self.ram
            .write(self.loadaddr + at as u32, &remaining.to_be_bytes())?;

        Ok(())
    }

    fn write_chunk(&mut self, offset: u32, chunk: &[u8]) -> Result<bool> {
        self.ram.exec(self.loadaddr + self.entry)?;

        for (i, block) in chunk.chunks(16).enumerate() {
            let mut line = String::with_capacity(36);
            for word in block.chunks(4) {
                let mut padded = [0u8; 4];
                padded[..word.len()].copy_from_slice(word);
                line.push(':');
                line.push_str(&format!("{:08x}", u32::from_be_bytes(padded)));
            }

            let mut intf = self.intf.borrow_mut();
            intf.writeln(&line)?;

            let echo = intf
                .readln()?
                .map(|l| l.trim().to_owned())
                .unwrap_or_default();

            let expected = offset + (i as u32) * 16;
            if !echo.starts_with(':') || hex_word(&echo[1..])? != expected {
                return Err(Error::Protocol(format!(
                    "expected offset 0x{expected:x}, got '{echo}'"
                )));
            }
        }

        Ok(true)
    }

    fn exec_go(&mut self, offset: u32) -> Result<bool> {
        self.ram.exec(offset)?;
        Ok(true)
    }
}
