//! Raw TCP transport.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::{iolog, ByteStream, Char, Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// A raw TCP connection, as used for networked serial servers.
pub struct Tcp {
    stream: TcpStream,
}

impl Tcp {
    /// Connect to `host:port`, trying each resolved address in turn.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addrs: Vec<_> = (host, port).to_socket_addrs()?.collect();
        let mut last = None;

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Self { stream });
                }
                Err(e) => {
                    log::debug!("{addr}: connect: {e}");
                    last = Some(e);
                }
            }
        }

        match last {
            Some(e) if e.kind() == ErrorKind::TimedOut => {
                Err(Error::ConnectTimeout(format!("{host}:{port}")))
            }
            Some(e) => Err(e.into()),
            None => Err(Error::ConnectTimeout(format!("{host}:{port}"))),
        }
    }

    pub(crate) fn read_byte(&mut self, timeout: u32) -> Result<Option<u8>> {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(u64::from(timeout.max(1)))))?;

        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        iolog::log_write(data);
        Ok(())
    }

    pub(crate) fn poll(&mut self, timeout: u32) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout));

        loop {
            self.stream.set_read_timeout(Some(Duration::from_millis(1)))?;
            let mut buf = [0u8; 1];
            match self.stream.peek(&mut buf) {
                Ok(n) if n > 0 => return Ok(true),
                Ok(_) => return Ok(false), // orderly shutdown
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl ByteStream for Tcp {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.write_raw(data)
    }

    fn writeln(&mut self, line: &str) -> Result<()> {
        // no echo on a raw socket
        let mut data = line.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.write(&data)
    }

    fn getc(&mut self) -> Result<Char> {
        Ok(self.read_byte(1)?.map_or(Char::Eof, Char::Byte))
    }

    fn pending(&mut self, timeout: u32) -> Result<bool> {
        self.poll(timeout)
    }
}
