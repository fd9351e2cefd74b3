//! `cmkit-io` provides the line-oriented byte stream connecting the host to
//! a device console, over serial, raw TCP, or telnet.
//!
//! All three transports expose the same [`ByteStream`] trait. The line
//! discipline ([`ByteStream::readln`]) accepts CR, LF, CRLF and NUL line
//! terminators, and treats a bare CR followed by anything but LF as a line
//! reset, because BFC shells like to redraw their current line in place.
//!
//! Every byte written and every line read is mirrored into a small process
//! wide ring buffer ([`iolog`]), whose tail is attached to interface errors
//! for post-mortem analysis.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

pub mod iolog;
mod serial;
mod tcp;
mod telnet;

use miette::Diagnostic;
use thiserror::Error;

pub use serial::Serial;
pub use tcp::Tcp;
pub use telnet::Telnet;

/// Default per-line timeout, in milliseconds.
pub const DEFAULT_LINE_TIMEOUT: u32 = 50;

/// Errors reported by the transports.
#[derive(Debug, Diagnostic, Error)]
pub enum Error {
    /// An operating system I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the serial port layer.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The baud rate is not one of the standard rates.
    #[error("invalid baud rate: {0}")]
    #[diagnostic(help("Supported rates: 300-230400, in the usual steps."))]
    InvalidBaudRate(u32),

    /// Connecting to the remote host timed out.
    #[error("connection to {0} timed out")]
    ConnectTimeout(String),
}

/// Convenience result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// One unit returned by [`ByteStream::getc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Char {
    /// A data byte.
    Byte(u8),
    /// No data within the timeout.
    Eof,
    /// A byte was consumed by the transport (e.g. a telnet command
    /// sequence); call again.
    Ign,
}

/// A full-duplex, line-oriented channel to the device.
pub trait ByteStream {
    /// Write raw bytes.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read one byte, if any is available within the transport's own
    /// short timeout.
    fn getc(&mut self) -> Result<Char>;

    /// Wait up to `timeout` milliseconds for data to become readable.
    fn pending(&mut self, timeout: u32) -> Result<bool>;

    /// Write a command line.
    ///
    /// The serial and telnet transports append a bare CR and then consume
    /// the echoed line; raw TCP appends CRLF and expects no echo.
    fn writeln(&mut self, line: &str) -> Result<()> {
        let mut data = line.as_bytes().to_vec();
        data.push(b'\r');
        self.write(&data)?;
        self.readln(DEFAULT_LINE_TIMEOUT)?;
        Ok(())
    }

    /// Read one line.
    ///
    /// Returns `None` if no data arrived within `timeout` milliseconds,
    /// and `Some(line)` otherwise; a blank line is `Some("")`.
    fn readln(&mut self, timeout: u32) -> Result<Option<String>> {
        let mut line = String::new();
        let mut lf = false;
        let mut cr = false;

        while self.pending(timeout)? {
            match self.getc()? {
                Char::Byte(b'\n') => {
                    lf = true;
                    break;
                }
                Char::Byte(b'\r') => cr = true,
                Char::Byte(c) => {
                    // the console rewrote its line in place
                    if cr {
                        line.clear();
                    }
                    line.push(char::from(c));
                    cr = false;
                }
                Char::Ign => {}
                Char::Eof => break,
            }
        }

        if !line.is_empty() {
            iolog::log_read(&line);
            Ok(Some(line))
        } else if lf {
            iolog::log_read("");
            Ok(Some(line))
        } else {
            Ok(None)
        }
    }
}

/// Open a serial console.
pub fn open_serial(tty: &str, baudrate: u32) -> Result<Box<dyn ByteStream>> {
    Ok(Box::new(Serial::open(tty, baudrate)?))
}

/// Open a raw TCP connection.
pub fn open_tcp(host: &str, port: u16) -> Result<Box<dyn ByteStream>> {
    Ok(Box::new(Tcp::connect(host, port)?))
}

/// Open a telnet connection.
pub fn open_telnet(host: &str, port: u16) -> Result<Box<dyn ByteStream>> {
    Ok(Box::new(Telnet::connect(host, port)?))
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory stream feeding scripted input to `readln` tests.
    pub struct Scripted {
        pub input: VecDeque<u8>,
        pub output: Vec<u8>,
    }

    impl Scripted {
        pub fn new(input: &[u8]) -> Self {
            Self { input: input.iter().copied().collect(), output: Vec::new() }
        }
    }

    impl ByteStream for Scripted {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.output.extend_from_slice(data);
            Ok(())
        }

        fn getc(&mut self) -> Result<Char> {
            Ok(self.input.pop_front().map_or(Char::Eof, Char::Byte))
        }

        fn pending(&mut self, _timeout: u32) -> Result<bool> {
            Ok(!self.input.is_empty())
        }
    }

    #[test]
    fn test_readln_terminators() {
        let mut s = Scripted::new(b"one\r\ntwo\nthree");

        assert_eq!(s.readln(50).unwrap().as_deref(), Some("one"));
        assert_eq!(s.readln(50).unwrap().as_deref(), Some("two"));
        // no terminator, but data is returned once the input dries up
        assert_eq!(s.readln(50).unwrap().as_deref(), Some("three"));
        assert_eq!(s.readln(50).unwrap(), None);
    }

    #[test]
    fn test_readln_bare_cr_resets_line() {
        // a console redrawing `0%` as `100%` in place
        let mut s = Scripted::new(b"0%\r100%\r\n");

        assert_eq!(s.readln(50).unwrap().as_deref(), Some("100%"));
    }

    #[test]
    fn test_readln_blank_line() {
        let mut s = Scripted::new(b"\n");

        assert_eq!(s.readln(50).unwrap().as_deref(), Some(""));
        assert_eq!(s.readln(50).unwrap(), None);
    }
}
