//! The bootloader-menu RAM driver: one 32-bit word per round trip.

use enumflags2::BitFlags;

use cmkit_profile::{AddrSpace, Partition};

use super::{hex_word, Cap, Driver, Limits};
use crate::interface::InterfaceRef;
use crate::{Error, Result};

pub(crate) struct BootloaderRam {
    intf: InterfaceRef,
    space: AddrSpace,
}

impl BootloaderRam {
    pub(crate) fn new(intf: InterfaceRef, space: AddrSpace) -> Self {
        Self { intf, space }
    }
}

impl Driver for BootloaderRam {
    fn intf(&self) -> &InterfaceRef {
        &self.intf
    }

    fn space(&self) -> &AddrSpace {
        &self.space
    }

    fn set_partition(&mut self, _partition: Partition) {}

    fn limits_read(&self) -> Limits {
        Limits::new(4, 4, 4)
    }

    fn limits_write(&self) -> Limits {
        Limits::new(4, 4, 4)
    }

    fn capabilities(&self) -> BitFlags<Cap> {
        Cap::Read | Cap::Write | Cap::Exec
    }

    fn init(&mut self, _offset: u32, _length: u32, write: bool) -> Result<()> {
        let mut intf = self.intf.borrow_mut();
        if !write {
            // enter "read memory" mode once; offsets follow per chunk
            intf.runcmd("r")?;
        } else {
            intf.writeln_empty()?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        // back out to the main menu
        let mut intf = self.intf.borrow_mut();
        intf.writeln_empty()?;
        intf.writeln_empty()?;
        Ok(())
    }

    fn do_read_chunk(&mut self, offset: u32, _length: u32) -> Result<()> {
        self.intf.borrow_mut().writeln(&format!("0x{offset:x}"))
    }

    fn is_ignorable_line(&mut self, line: &str) -> bool {
        !(line.contains("Value at") || line.contains("(hex)"))
    }

    fn parse_chunk_line(&mut self, line: &str, offset: u32) -> Result<Vec<u8>> {
        // Value at 0xAAAAAAAA: 0xVVVVVVVV (hex)
        if !line.starts_with("Value at") || line.len() < 27 {
            return Err(Error::Protocol(format!("unexpected line '{line}'")));
        }

        if offset != hex_word(&line[11..19])? {
            return Err(Error::Protocol("offset mismatch".to_owned()));
        }

        Ok(hex_word(&line[23..31])?.to_be_bytes().to_vec())
    }

    fn write_chunk(&mut self, offset: u32, chunk: &[u8]) -> Result<bool> {
        let mut intf = self.intf.borrow_mut();

        let attempt = (|| -> Result<bool> {
            if !intf.runcmd_expect("w", "Write memory.", true)? {
                return Ok(false);
            }

            intf.writeln(&format!("{offset:x}"))?;

            let val = u32::from_be_bytes(chunk.try_into().map_err(|_| {
                Error::Protocol(format!("bad chunk size {}", chunk.len()))
            })?);

            intf.runcmd_expect(&format!("{val:08x}\r\n"), "Main Menu", false)
        })();

        match attempt {
            Ok(ok) => Ok(ok),
            Err(e) => {
                // get back to a sane state before the engine retries
                intf.runcmd_expect("\r\n", "Main Menu", false)?;
                Err(e)
            }
        }
    }

    fn exec_go(&mut self, offset: u32) -> Result<bool> {
        let mut intf = self.intf.borrow_mut();
        intf.runcmd("")?;
        intf.runcmd_expect("j", "", false)?;
        intf.writeln(&format!("{offset:08x}"))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> BootloaderRam {
        // parsing does not touch the interface, so a dummy stream works
        let stream = Box::new(DummyStream);
        let intf = crate::interface::detect_for_tests(stream);
        BootloaderRam::new(intf, AddrSpace::ram(0, 0))
    }

    struct DummyStream;

    impl cmkit_io::ByteStream for DummyStream {
        fn write(&mut self, _data: &[u8]) -> cmkit_io::Result<()> {
            Ok(())
        }

        fn getc(&mut self) -> cmkit_io::Result<cmkit_io::Char> {
            Ok(cmkit_io::Char::Eof)
        }

        fn pending(&mut self, _timeout: u32) -> cmkit_io::Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_parse_value_line() {
        let mut d = driver();

        let bytes = d
            .parse_chunk_line("Value at 0x80000000: 0xdeadbeef (hex)", 0x80000000)
            .unwrap();
        assert_eq!(bytes, [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_parse_detects_offset_mismatch() {
        let mut d = driver();

        assert!(d
            .parse_chunk_line("Value at 0x80000004: 0xdeadbeef (hex)", 0x80000000)
            .is_err());
    }

    #[test]
    fn test_ignorable_lines() {
        let mut d = driver();

        assert!(d.is_ignorable_line("Main Menu"));
        assert!(!d.is_ignorable_line("Value at 0x80000000: 0x00000000 (hex)"));
    }
}
