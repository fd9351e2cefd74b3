//! Telnet transport.
//!
//! The BFC telnet server negotiates remote-flow-control, suppress-go-ahead
//! and echo on connect. Negotiation requests are consumed and ignored; the
//! defaults it assumes are the ones we want anyway.

use crate::{Char, ByteStream, Result, Tcp, DEFAULT_LINE_TIMEOUT};

const IAC: u8 = 0xff;
const OP_WILL: u8 = 251;
const OP_DONT: u8 = 254;

/// A telnet connection to the BFC telnet daemon.
pub struct Telnet {
    tcp: Tcp,
}

impl Telnet {
    /// Connect to a telnet server.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Ok(Self { tcp: Tcp::connect(host, port)? })
    }
}

impl ByteStream for Telnet {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        // escape literal 0xff by doubling, and expand a bare CR to CR NUL
        let mut escaped = Vec::with_capacity(data.len());

        for (i, &b) in data.iter().enumerate() {
            match b {
                IAC => escaped.extend_from_slice(&[IAC, IAC]),
                b'\r' if data.get(i + 1) != Some(&b'\n') => {
                    escaped.extend_from_slice(b"\r\0");
                }
                _ => escaped.push(b),
            }
        }

        self.tcp.write_raw(&escaped)
    }

    fn writeln(&mut self, line: &str) -> Result<()> {
        let mut data = line.as_bytes().to_vec();
        data.push(b'\r');
        self.write(&data)?;
        // consume the echoed line
        self.readln(DEFAULT_LINE_TIMEOUT)?;
        Ok(())
    }

    fn getc(&mut self) -> Result<Char> {
        match self.tcp.read_byte(1)? {
            None => Ok(Char::Eof),
            Some(IAC) => {
                match self.tcp.read_byte(1)? {
                    // 0xff 0xff is an escaped data byte
                    Some(IAC) => Ok(Char::Byte(IAC)),
                    Some(cmd) => {
                        let opt = self.tcp.read_byte(1)?;
                        log::debug!("telnet: received command {cmd},{opt:?}");
                        if !(OP_WILL..=OP_DONT).contains(&cmd) {
                            log::debug!("telnet: unknown command {cmd}");
                        }
                        Ok(Char::Ign)
                    }
                    None => Ok(Char::Eof),
                }
            }
            Some(b) => Ok(Char::Byte(b)),
        }
    }

    fn pending(&mut self, timeout: u32) -> Result<bool> {
        self.tcp.poll(timeout)
    }
}
