//! Serial console transport.

use std::io::Read;
use std::time::{Duration, Instant};

use serialport::SerialPort;

use crate::{iolog, ByteStream, Char, Error, Result, DEFAULT_LINE_TIMEOUT};

const BAUD_RATES: &[u32] =
    &[300, 1200, 2400, 4800, 9600, 38400, 57600, 115200, 230400];

/// A serial console, 8N1, no flow control.
pub struct Serial {
    port: Box<dyn SerialPort>,
}

impl Serial {
    /// Open `tty` at the given baud rate.
    pub fn open(tty: &str, baudrate: u32) -> Result<Self> {
        if !BAUD_RATES.contains(&baudrate) {
            return Err(Error::InvalidBaudRate(baudrate));
        }

        let port = serialport::new(tty, baudrate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(u64::from(DEFAULT_LINE_TIMEOUT)))
            .open()?;

        Ok(Self { port })
    }
}

impl ByteStream for Serial {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        std::io::Write::write_all(&mut self.port, data)?;
        self.port.flush()?;
        iolog::log_write(data);
        Ok(())
    }

    fn getc(&mut self) -> Result<Char> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(Char::Eof);
        }

        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Char::Byte(buf[0])),
            Ok(_) => Ok(Char::Eof),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Char::Eof),
            Err(e) => Err(e.into()),
        }
    }

    fn pending(&mut self, timeout: u32) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout));

        loop {
            if self.port.bytes_to_read()? > 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
