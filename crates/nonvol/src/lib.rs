//! `cmkit-nonvol` parses and edits the non-volatile settings of Broadcom
//! cable modems: `GatewaySettings.bin` backup files, raw `permnv`/`dynnv`
//! flash partitions, and BOLT environment blocks.
//!
//! The heart of the crate is a recursive, self-describing value model
//! ([`NvVal`]): every value knows how to read and write itself, render
//! itself as text, and re-parse edited text. Values are addressed with
//! dotted paths (`rg.port_forwards.0.dest`); setting a value may resize the
//! enclosing structures, and the size change ripples up to the group
//! header.
//!
//! Settings *groups* (magic-tagged, versioned sections) are looked up in a
//! process-wide registry by their 4-byte magic; unknown magics degrade to
//! an opaque blob that can still be round-tripped bit-exactly.
//!
//! Fixed wire framing (group headers, container headers and footers) is
//! parsed with `nom`; the self-describing values inside read themselves
//! through a byte [`Cursor`] that the framing parsers advance.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod compound;
mod group;
mod groups;
mod settings;
mod val;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use compound::{IsEnd, NvArray, NvCompound, NvPList, PrefixWidth};
pub use group::{registry, Format, GroupDef, NvGroup};
pub use settings::{permdyn_checksum, sniff_format, BoltEnv, GatewaySettings, PermDyn, Settings};
pub use val::{
    NvBitmask, NvBool, NvData, NvEnum, NvIp4, NvIp6, NvMac, NvMagic, NvNum, NvString,
    NvTimestamp, NvVersion, Scalar, StringFlag, NvI16, NvI32, NvI8, NvU16, NvU32, NvU32Le, NvU8,
};

/// Errors of the value model and the settings containers.
#[derive(Debug, Diagnostic, ThisError)]
pub enum Error {
    /// Ran out of input while reading a value.
    #[error("unexpected end of data while reading {0}")]
    Eof(String),

    /// A value failed its format check while reading.
    #[error("error while reading {what}: {message}")]
    BadData {
        /// The value type being read.
        what: String,
        /// What was wrong.
        message: String,
    },

    /// Text could not be parsed as a value of this type.
    #[error("conversion to {0} failed: '{1}'")]
    BadValue(String, String),

    /// A dotted path referred to a member that does not exist.
    #[error("requested non-existing member '{0}'")]
    NoSuchMember(String),

    /// A dotted path descended into a non-compound value.
    #[error("requested member '{0}' of non-compound type {1}")]
    NotACompound(String, String),

    /// Setting this member now would leave a hole in the serialized data.
    #[error("cannot set '{0}' without setting '{1}' first")]
    SetOrder(String, String),

    /// The settings container could not be recognized.
    #[error("unrecognized settings data")]
    #[diagnostic(
        code(E006),
        help("If the file is encrypted, pass a profile (-P), key (-k) or password (-p).")
    )]
    BadContainer,

    /// A container header field failed validation.
    #[error("{0}")]
    BadHeader(String),

    /// A size limit of the output format was exceeded.
    #[error("{0}")]
    TooBig(String),

    /// An error from the crypto layer.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Crypto(#[from] cmkit_crypto::Error),
}

/// Convenience result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A read cursor over in-memory settings data.
///
/// Settings files are small and the outer container has to be decrypted
/// before any structure is visible, so all parsing happens over a byte
/// slice held in memory.
#[derive(Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// A cursor over `data`, positioned at the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor is exhausted.
    pub fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Read exactly `n` bytes, or fail with [`Error::Eof`].
    pub fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Eof(what.to_owned()));
        }

        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read up to `n` bytes.
    pub fn take_up_to(&mut self, n: usize) -> &'a [u8] {
        let n = n.min(self.remaining());
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    /// Read bytes up to (and consuming) the next NUL, or to the end of the
    /// input. The NUL is not part of the returned slice.
    pub fn take_until_nul(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(i) => {
                self.pos += i + 1;
                &rest[..i]
            }
            None => {
                self.pos = self.data.len();
                rest
            }
        }
    }

    /// Read a `u8`.
    pub fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    /// Read a big-endian `u16`.
    pub fn u16(&mut self, what: &str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Run a `nom` parser over the remaining input, advancing the cursor
    /// past whatever it consumed.
    ///
    /// The fixed framing structures (group headers, container headers and
    /// footers) are parsed this way; the values inside them read themselves
    /// through the cursor directly.
    pub fn parse<O>(
        &mut self,
        what: &str,
        mut parser: impl FnMut(&'a [u8]) -> nom::IResult<&'a [u8], O>,
    ) -> Result<O> {
        let input = &self.data[self.pos..];

        match parser(input) {
            Ok((rest, out)) => {
                self.pos = self.data.len() - rest.len();
                Ok(out)
            }
            Err(_) => Err(Error::Eof(what.to_owned())),
        }
    }
}

/// A named child of a compound value.
pub struct Named {
    /// Member name; empty for unnamed filler members.
    pub name: String,
    /// The value.
    pub val: Box<dyn NvVal>,
}

impl Named {
    /// A new named member.
    pub fn new(name: &str, val: Box<dyn NvVal>) -> Self {
        Self { name: name.to_owned(), val }
    }
}

impl std::fmt::Debug for Named {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.val.type_name())
    }
}

/// The uniform interface of every settings value.
pub trait NvVal {
    /// A short type description, e.g. `u16` or `fzstring[33]`.
    fn type_name(&self) -> String;

    /// Serialized size in bytes. Before a value has been set this is the
    /// minimum size of the type; afterwards, the size of the stored value.
    fn bytes(&self) -> usize;

    /// Whether the value was read or explicitly set.
    fn is_set(&self) -> bool;

    /// A disabled value is skipped entirely (used for version-gated
    /// members).
    fn is_disabled(&self) -> bool {
        false
    }

    /// Enable or disable the value.
    fn set_disabled(&mut self, disabled: bool);

    /// Populate the value from serialized data.
    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()>;

    /// Append the serialized value to `out`.
    fn write(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Parse a textual representation, replacing the current value.
    fn parse(&mut self, text: &str) -> Result<()>;

    /// Render the value. `level` is the indentation depth; `pretty` selects
    /// the human-readable form over the canonical one.
    fn render(&self, level: usize, pretty: bool) -> String;

    /// Member access for compound values.
    fn get(&self, name: &str) -> Result<&dyn NvVal> {
        Err(Error::NotACompound(name.to_owned(), self.type_name()))
    }

    /// Member mutation for compound values. Returns the size delta in
    /// bytes caused by the assignment.
    fn set(&mut self, name: &str, value: &str) -> Result<isize> {
        let _ = value;
        Err(Error::NotACompound(name.to_owned(), self.type_name()))
    }

    /// The children of a compound value.
    fn parts(&self) -> &[Named] {
        &[]
    }

    /// Render with no indentation, canonical form.
    fn to_str(&self) -> String {
        self.render(0, false)
    }

    /// Render with no indentation, pretty form.
    fn to_pretty(&self) -> String {
        self.render(0, true)
    }
}

pub(crate) fn pad(level: usize) -> String {
    " ".repeat(2 * (level + 1))
}

/// Hex rendering for opaque data, multi-line above a threshold.
pub(crate) fn data_to_string(data: &[u8], level: usize, _pretty: bool) -> String {
    const THRESHOLD: usize = 24;
    let mut out = String::new();
    let multiline = data.len() > THRESHOLD;

    if multiline {
        out.push('{');
    }

    for (i, b) in data.iter().enumerate() {
        if i % THRESHOLD == 0 {
            if multiline {
                out.push('\n');
                out.push_str(&pad(level));
                out.push_str(&format!("0x{i:03x} = "));
            }
        } else {
            out.push(':');
        }

        out.push_str(&format!("{b:02X}"));
    }

    if multiline {
        out.push('\n');
        out.push_str(&pad(level.saturating_sub(1)));
        out.push('}');
    }

    out
}

pub(crate) fn parse_u32(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor() {
        let mut c = Cursor::new(b"\x01\x02\x03\x04rest\0tail");

        assert_eq!(c.u16("x").unwrap(), 0x0102);
        assert_eq!(c.u16("x").unwrap(), 0x0304);
        assert_eq!(c.take_until_nul(), b"rest");
        assert_eq!(c.take(4, "tail").unwrap(), b"tail");
        assert!(c.at_end());
        assert!(matches!(c.u8("past end"), Err(Error::Eof(_))));
    }

    #[test]
    fn test_cursor_nom_parse() {
        use nom::number::complete::{be_u16, le_u32};
        use nom::sequence::tuple;

        let mut c = Cursor::new(b"\x00\x10\xed\xfe\xbe\xbarest");

        let (size, magic) = c.parse("header", tuple((be_u16, le_u32))).unwrap();
        assert_eq!(size, 0x10);
        assert_eq!(magic, 0xbabefeed);
        assert_eq!(c.pos(), 6);

        // a failed parse consumes nothing
        assert!(matches!(c.parse("more", le_u32), Err(Error::Eof(_))));
        assert_eq!(c.pos(), 6);
    }

    #[test]
    fn test_data_to_string_short() {
        assert_eq!(data_to_string(&[0xde, 0xad], 0, false), "DE:AD");
    }

    #[test]
    fn test_data_to_string_multiline() {
        let rendered = data_to_string(&[0u8; 25], 1, true);
        assert!(rendered.starts_with('{'));
        assert!(rendered.contains("0x000 = "));
        assert!(rendered.contains("0x018 = "));
    }
}
