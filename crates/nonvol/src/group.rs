//! Settings groups: magic-tagged, versioned sections of a settings file.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::sequence::tuple;

use crate::val::{NvData, NvMagic, NvVersion};
use crate::{Cursor, Error, Named, NvCompound, NvVal, Result};

/// The settings file format a group was found in. Group layouts may differ
/// between the permanent and dynamic stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Not known; bodies are kept opaque.
    #[default]
    Unknown,
    /// `permnv` flash partition.
    Perm,
    /// `dynnv` flash partition.
    Dyn,
    /// A GatewaySettings backup file.
    Gws,
    /// The dynamic-settings flavour of a GatewaySettings file.
    GwsDyn,
    /// A BOLT environment block.
    BoltEnv,
}

/// A concrete group layout provider, registered by magic.
pub trait GroupDef: Send + Sync {
    /// The group's 4-byte magic.
    fn magic(&self) -> [u8; 4];

    /// The name the group is addressed by, e.g. `userif`.
    fn name(&self) -> &'static str;

    /// The member layout for a `(format, version)` pair. `body_size` is the
    /// byte count of the body, for layouts with trailing opaque data.
    fn definition(&self, format: Format, version: &NvVersion, body_size: usize) -> Vec<Named>;
}

struct GenericDef {
    magic: [u8; 4],
}

impl GroupDef for GenericDef {
    fn magic(&self) -> [u8; 4] {
        self.magic
    }

    fn name(&self) -> &'static str {
        // named on the fly by NvGroup
        "generic"
    }

    fn definition(&self, _format: Format, _version: &NvVersion, body_size: usize) -> Vec<Named> {
        if body_size != 0 {
            vec![Named::new("_data", Box::new(NvData::new(body_size)))]
        } else {
            Vec::new()
        }
    }
}

/// The process-wide registry of known group layouts, keyed by magic.
pub fn registry() -> &'static HashMap<[u8; 4], Arc<dyn GroupDef>> {
    static REGISTRY: OnceLock<HashMap<[u8; 4], Arc<dyn GroupDef>>> = OnceLock::new();

    REGISTRY.get_or_init(|| {
        let mut map: HashMap<[u8; 4], Arc<dyn GroupDef>> = HashMap::new();
        for def in crate::groups::all() {
            map.insert(def.magic(), def);
        }
        map
    })
}

/// One settings group: `u16 size · magic · u16 version · body`.
///
/// The declared size covers the header. Bodies shorter than their
/// definition leave trailing members unset; residue beyond the definition
/// is captured as an `_extra` member so files round-trip bit-exactly.
pub struct NvGroup {
    magic: NvMagic,
    name: String,
    version: NvVersion,
    format: Format,
    body: NvCompound,
}

impl NvGroup {
    const HEADER_BYTES: usize = 8;

    /// The group magic.
    pub fn magic(&self) -> &NvMagic {
        &self.magic
    }

    /// The name the group is addressed by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group version.
    pub fn version(&self) -> &NvVersion {
        &self.version
    }

    /// Rename the group (used to disambiguate duplicate magics).
    pub fn rename(&mut self, name: String) {
        self.name = name;
    }

    /// Read the next group from `cursor`.
    ///
    /// Returns `Ok(None)` when the remaining input does not start with a
    /// plausible group header.
    pub fn read_next(
        cursor: &mut Cursor<'_>,
        format: Format,
        remaining: usize,
    ) -> Result<Option<NvGroup>> {
        let Ok((size, magic_bytes)) = cursor.parse("group header", tuple((be_u16, take(4usize))))
        else {
            log::debug!("failed to read group header");
            return Ok(None);
        };
        let mut size = usize::from(size);

        if size < 6 {
            log::debug!("group size {size} too small to be valid");
            return Ok(None);
        }

        let magic = NvMagic::from_bytes(magic_bytes.try_into().expect("take(4) yields 4 bytes"));

        if size > remaining {
            log::debug!("group size {size} exceeds remaining {remaining}");
            size = remaining;
        }

        let (def, name) = match registry().get(&magic.raw()) {
            Some(def) => (def.clone(), def.name().to_owned()),
            None => {
                let def: Arc<dyn GroupDef> = Arc::new(GenericDef { magic: magic.raw() });
                (def, format!("grp_{}", magic.pretty_name().to_lowercase()))
            }
        };

        let mut group = NvGroup {
            magic,
            name,
            version: NvVersion::new(),
            format,
            body: NvCompound::partial("group", 0, Vec::new()),
        };

        group.read_body(cursor, &*def, size)?;
        Ok(Some(group))
    }

    fn read_body(&mut self, cursor: &mut Cursor<'_>, def: &dyn GroupDef, size: usize) -> Result<()> {
        self.version.set_num(cursor.parse("group version", be_u16)?);

        log::trace!(
            "** {} {size} b, version 0x{:04x}",
            self.magic.pretty_name(),
            self.version.num()
        );

        let body_size = size.saturating_sub(Self::HEADER_BYTES);
        let pos = cursor.pos();

        let parts = def.definition(self.format, &self.version, body_size);
        self.body = NvCompound::partial("group", body_size, parts);

        if let Err(e) = self.body.read(cursor) {
            if self.format == Format::Unknown {
                return Err(e);
            }

            // a known layout failed to parse: degrade to an opaque body and
            // retry from just after the header
            log::warn!("failed to parse group {}: {e}", self.name);
            self.format = Format::Unknown;
            cursor.seek(pos);

            let generic = GenericDef { magic: self.magic.raw() };
            let parts = generic.definition(Format::Unknown, &self.version, body_size);
            self.body = NvCompound::partial("group", body_size, parts);
            self.body.read(cursor)?;
        }

        let consumed = self.body.consumed();

        if consumed < body_size {
            if cursor.remaining() >= body_size - consumed {
                // capture the residue so the group round-trips
                let mut extra = NvData::new(body_size - consumed);
                extra.read(cursor)?;
                log::trace!("  extra data size is {} b", extra.bytes());
                self.body.push_part(Named::new("_extra", Box::new(extra)));
            } else {
                // input ended early: the declared size shrinks to what was
                // actually read
                log::trace!("  truncating group size to {}", Self::HEADER_BYTES + consumed);
            }
        }

        Ok(())
    }
}

impl NvVal for NvGroup {
    fn type_name(&self) -> String {
        format!("group[{}]", self.magic.pretty_name())
    }

    fn bytes(&self) -> usize {
        Self::HEADER_BYTES + self.body.consumed()
    }

    fn is_set(&self) -> bool {
        true
    }

    fn set_disabled(&mut self, _disabled: bool) {}

    fn read(&mut self, _cursor: &mut Cursor<'_>) -> Result<()> {
        Err(Error::BadData {
            what: self.type_name(),
            message: "groups are read via read_next".to_owned(),
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let bytes = self.bytes();
        if bytes > 0xffff {
            return Err(Error::TooBig(format!(
                "{}: size {bytes} exceeds the group maximum",
                self.type_name()
            )));
        }

        out.extend_from_slice(&(bytes as u16).to_be_bytes());
        self.magic.write(out)?;
        self.version.write(out)?;

        if bytes > Self::HEADER_BYTES {
            self.body.write(out)?;
        }

        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        Err(Error::BadValue(self.type_name(), text.to_owned()))
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        self.body.render(level, pretty)
    }

    fn get(&self, name: &str) -> Result<&dyn NvVal> {
        self.body.get(name)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<isize> {
        self.body.set(name, value)
    }

    fn parts(&self) -> &[Named] {
        self.body.parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_bytes(magic: &[u8; 4], version: u16, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((8 + body.len()) as u16).to_be_bytes());
        out.extend_from_slice(magic);
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_unknown_magic_falls_back_to_generic() {
        let data = group_bytes(b"Xyz.", 0x0001, &[1, 2, 3, 4]);
        let mut cursor = Cursor::new(&data);

        let group = NvGroup::read_next(&mut cursor, Format::Dyn, data.len())
            .unwrap()
            .expect("valid group header");

        assert_eq!(group.name(), "grp_xyz");
        assert_eq!(group.bytes(), 12);
        assert_eq!(group.get("_data").unwrap().bytes(), 4);

        let mut out = Vec::new();
        group.write(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_header_size_covers_header() {
        let data = group_bytes(b"Xyz.", 0x0001, &[0xaa; 10]);
        let mut cursor = Cursor::new(&data);

        let group =
            NvGroup::read_next(&mut cursor, Format::Dyn, data.len()).unwrap().unwrap();

        // declared length = body + 8-byte header
        assert_eq!(group.bytes(), 18);
        assert_eq!(cursor.pos(), 18);
    }

    #[test]
    fn test_truncated_header_is_not_a_group() {
        // too short to even hold a magic
        let data = [0xffu8; 4];
        let mut cursor = Cursor::new(&data);

        assert!(NvGroup::read_next(&mut cursor, Format::Dyn, 4).unwrap().is_none());

        // a tiny declared size cannot cover a header either
        let data = [0x00, 0x04, b'S', b'e', b'l', b'f', 0x00, 0x01];
        let mut cursor = Cursor::new(&data);

        assert!(NvGroup::read_next(&mut cursor, Format::Dyn, 8).unwrap().is_none());
    }

    #[test]
    fn test_known_group_parses_members() {
        // the bfc group ("CMAp") has four known members
        let body = [1u8, 0, 1, 2];
        let data = group_bytes(b"CMAp", 0x0001, &body);
        let mut cursor = Cursor::new(&data);

        let group =
            NvGroup::read_next(&mut cursor, Format::Dyn, data.len()).unwrap().unwrap();

        assert_eq!(group.name(), "bfc");
        assert_eq!(group.get("stop_at_console").unwrap().to_str(), "1");
        assert_eq!(group.get("serial_console_mode").unwrap().to_str(), "rw");

        let mut out = Vec::new();
        group.write(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_set_resizes_group() {
        // userif ("MLog") starts with p16 strings
        let mut body = Vec::new();
        body.extend_from_slice(&[0, 5]);
        body.extend_from_slice(b"admin");
        let data = group_bytes(b"MLog", 0x0005, &body);
        let mut cursor = Cursor::new(&data);

        let mut group =
            NvGroup::read_next(&mut cursor, Format::Dyn, data.len()).unwrap().unwrap();
        assert_eq!(group.bytes(), 8 + 7);

        group.set("http_user", "operator").unwrap();
        assert_eq!(group.bytes(), 8 + 10);

        let mut out = Vec::new();
        group.write(&mut out).unwrap();
        assert_eq!(out.len(), 18);
        assert_eq!(u16::from_be_bytes([out[0], out[1]]), 18);
        assert_eq!(&out[8..10], &[0, 8]);
    }
}
