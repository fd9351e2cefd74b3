//! The ProgramStore firmware image header.

use bstr::ByteSlice;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32};
use nom::sequence::tuple;

use cmkit_crypto::crc16_ccitt;

/// Size of the header on the wire.
pub const PS_HEADER_SIZE: usize = 92;

// the HCS covers everything up to (and excluding) the hcs field itself
const PS_HCS_BYTES: usize = PS_HEADER_SIZE - 8;

/// Compression schemes selected by the low control bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Stored uncompressed.
    None,
    /// LZ compression.
    Lz,
    /// miniLZO compression.
    MiniLzo,
    /// Reserved value.
    Reserved,
    /// NRV2D99 compression.
    Nrv2d99,
    /// LZA compression.
    Lza,
    /// An unassigned value.
    Unknown(u16),
}

impl From<u16> for Compression {
    fn from(bits: u16) -> Self {
        match bits {
            0 => Compression::None,
            1 => Compression::Lz,
            2 => Compression::MiniLzo,
            3 => Compression::Reserved,
            4 => Compression::Nrv2d99,
            5 => Compression::Lza,
            other => Compression::Unknown(other),
        }
    }
}

/// A parsed 92-byte ProgramStore header.
#[derive(Debug, Clone)]
pub struct PsHeader {
    /// Per-platform image signature.
    pub signature: u16,
    /// Control bits: compression and the dual-image flag.
    pub control: u16,
    /// Major version.
    pub ver_major: u16,
    /// Minor version.
    pub ver_minor: u16,
    /// Build timestamp.
    pub timestamp: u32,
    /// Payload length, excluding the header.
    pub length: u32,
    /// Load address.
    pub loadaddr: u32,
    /// Image file name.
    pub filename: String,
    /// Combined length of the first sub-image (dual images only).
    pub length1: u32,
    /// Combined length of the second sub-image (dual images only).
    pub length2: u32,
    /// Stored header checksum.
    pub hcs: u16,
    /// Stored payload CRC.
    pub crc: u32,
    hcs_valid: bool,
}

impl PsHeader {
    /// Parse a header from the first [`PS_HEADER_SIZE`] bytes of `buf`.
    ///
    /// Returns `None` when `buf` is too short; an invalid HCS still yields
    /// a header, flagged via [`Self::hcs_valid`].
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < PS_HEADER_SIZE {
            return None;
        }

        let input = &buf[..PS_HEADER_SIZE];
        let result: nom::IResult<&[u8], _, nom::error::Error<&[u8]>> = tuple((
            be_u16,
            be_u16,
            be_u16,
            be_u16,
            be_u32,
            be_u32,
            be_u32,
            take(48usize),
            take(8usize),
            be_u32,
            be_u32,
            be_u16,
            be_u16,
            be_u32,
        ))(input);

        let (
            _,
            (
                signature,
                control,
                ver_major,
                ver_minor,
                timestamp,
                length,
                loadaddr,
                filename,
                _pad,
                length1,
                length2,
                hcs,
                _reserved,
                crc,
            ),
        ) = result.ok()?;

        let computed = crc16_ccitt(&input[..PS_HCS_BYTES]) ^ 0xffff;
        let name_end = filename.find_byte(0).unwrap_or(filename.len());

        Some(Self {
            signature,
            control,
            ver_major,
            ver_minor,
            timestamp,
            length,
            loadaddr,
            filename: filename[..name_end].to_str_lossy().into_owned(),
            length1,
            length2,
            hcs,
            crc,
            hcs_valid: computed == hcs,
        })
    }

    /// Whether the header checksum matched.
    pub fn hcs_valid(&self) -> bool {
        self.hcs_valid
    }

    /// The compression scheme.
    pub fn compression(&self) -> Compression {
        Compression::from(self.control & 0x7)
    }

    /// Whether the image carries two concatenated files.
    pub fn is_dual(&self) -> bool {
        self.control & 0x100 != 0
    }
}

/// Build a valid header for tests and image assembly.
#[cfg(test)]
pub(crate) fn build_header(signature: u16, filename: &str, length: u32) -> Vec<u8> {
    let mut raw = vec![0u8; PS_HEADER_SIZE];
    raw[0..2].copy_from_slice(&signature.to_be_bytes());
    raw[16..20].copy_from_slice(&length.to_be_bytes());

    let name = filename.as_bytes();
    raw[24..24 + name.len().min(48)].copy_from_slice(&name[..name.len().min(48)]);

    let hcs = crc16_ccitt(&raw[..PS_HCS_BYTES]) ^ 0xffff;
    raw[84..86].copy_from_slice(&hcs.to_be_bytes());
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_hcs() {
        let raw = build_header(0xa825, "TC7200.out", 0x6c0000);
        let hdr = PsHeader::parse(&raw).unwrap();

        assert!(hdr.hcs_valid());
        assert_eq!(hdr.signature, 0xa825);
        assert_eq!(hdr.length, 0x6c0000);
        assert_eq!(hdr.filename, "TC7200.out");
        assert_eq!(hdr.compression(), Compression::None);
        assert!(!hdr.is_dual());
    }

    #[test]
    fn test_corrupt_header_fails_hcs() {
        let mut raw = build_header(0xa825, "image", 0x1000);
        raw[20] ^= 0xff;

        let hdr = PsHeader::parse(&raw).unwrap();
        assert!(!hdr.hcs_valid());
    }

    #[test]
    fn test_short_buffer() {
        assert!(PsHeader::parse(&[0u8; 20]).is_none());
    }

    #[test]
    fn test_control_bits() {
        let mut raw = build_header(0x3390, "dual", 0x100);
        raw[2..4].copy_from_slice(&0x0105u16.to_be_bytes());
        let hcs = crc16_ccitt(&raw[..PS_HCS_BYTES]) ^ 0xffff;
        raw[84..86].copy_from_slice(&hcs.to_be_bytes());

        let hdr = PsHeader::parse(&raw).unwrap();
        assert_eq!(hdr.compression(), Compression::Lza);
        assert!(hdr.is_dual());
    }
}
