//! Structured values: compounds, arrays, and length-prefixed lists.

use crate::{pad, Cursor, Error, Named, NvVal, Result};

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn render_parts(
    parts: &[Named],
    level: usize,
    pretty: bool,
    end: Option<usize>,
) -> String {
    let mut out = String::from("{");
    let total = parts.len();
    let shown = end.unwrap_or(total);

    for named in parts.iter().take(shown) {
        if named.val.is_disabled() {
            continue;
        }
        if pretty && (!named.val.is_set() || named.name.starts_with('_')) {
            continue;
        }

        out.push('\n');
        out.push_str(&pad(level));
        out.push_str(&named.name);
        out.push_str(" = ");
        if named.val.is_set() {
            out.push_str(&named.val.render(level + 1, pretty));
        } else {
            out.push_str("<n/a>");
        }
    }

    if shown < total {
        out.push('\n');
        out.push_str(&pad(level));
        out.push_str(&format!("{}..{} = <n/a>", shown, total - 1));
    }

    out.push('\n');
    out.push_str(&pad(level.saturating_sub(1)));
    out.push('}');

    out
}

// Refuse to set an unset member unless all earlier enabled members are set,
// so that the serialized buffer stays contiguous.
fn check_set_order(parts: &[Named], target: usize, name: &str) -> Result<()> {
    if parts[target].val.is_set() {
        return Ok(());
    }

    for named in parts.iter().take(target) {
        if !named.val.is_disabled() && !named.val.is_set() {
            return Err(Error::SetOrder(name.to_owned(), named.name.clone()));
        }
    }

    Ok(())
}

fn find_part<'a>(parts: &'a [Named], name: &str) -> Result<(usize, &'a Named)> {
    parts
        .iter()
        .enumerate()
        .find(|(_, n)| !n.val.is_disabled() && n.name == name)
        .ok_or_else(|| Error::NoSuchMember(name.to_owned()))
}

pub(crate) fn parts_get<'a>(parts: &'a [Named], name: &str) -> Result<&'a dyn NvVal> {
    match name.split_once('.') {
        Some((head, tail)) => find_part(parts, head)?.1.val.get(tail),
        None => Ok(&*find_part(parts, name)?.1.val),
    }
}

pub(crate) fn parts_set(parts: &mut [Named], name: &str, value: &str) -> Result<isize> {
    let (head, tail) = match name.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (name, None),
    };

    let (idx, _) = find_part(parts, head)?;
    check_set_order(parts, idx, name)?;

    match tail {
        Some(tail) => parts[idx].val.set(tail, value),
        None => {
            let old = if parts[idx].val.is_set() { parts[idx].val.bytes() } else { 0 };
            parts[idx].val.parse(value)?;
            Ok(parts[idx].val.bytes() as isize - old as isize)
        }
    }
}

/// An ordered, named sequence of values, fixed-layout or partial.
///
/// A partial compound tolerates input that ends before its last member;
/// unread trailing members stay unset and are omitted on write.
pub struct NvCompound {
    type_name: String,
    partial: bool,
    width: usize,
    bytes: usize,
    set: bool,
    disabled: bool,
    parts: Vec<Named>,
}

impl NvCompound {
    /// A fixed-layout compound with the given members.
    pub fn new(type_name: &str, parts: Vec<Named>) -> Self {
        Self::build(type_name, false, 0, parts)
    }

    /// A partial compound limited to `width` bytes.
    pub fn partial(type_name: &str, width: usize, parts: Vec<Named>) -> Self {
        Self::build(type_name, true, width, parts)
    }

    fn build(type_name: &str, partial: bool, width: usize, mut parts: Vec<Named>) -> Self {
        let mut unk = 0;
        for named in &mut parts {
            if named.name.is_empty() {
                unk += 1;
                named.name = format!("_unk_{unk}");
            }
            debug_assert!(is_valid_identifier(&named.name), "bad member name {}", named.name);
        }

        Self { type_name: type_name.to_owned(), partial, width, bytes: 0, set: false, disabled: false, parts }
    }

    /// Boxed, for definition lists.
    pub fn boxed(type_name: &str, parts: Vec<Named>) -> Box<Self> {
        Box::new(Self::new(type_name, parts))
    }

    /// Limit (or unlimit) the serialized width.
    pub fn set_width(&mut self, width: usize) {
        self.width = width;
    }

    /// Bytes consumed by the last read (or adjusted by `set`).
    pub fn consumed(&self) -> usize {
        self.bytes
    }

    /// Append a member after construction. Used for residual `_extra` data.
    pub fn push_part(&mut self, named: Named) {
        self.bytes += if named.val.is_set() { named.val.bytes() } else { 0 };
        self.parts.push(named);
    }
}

impl NvVal for NvCompound {
    fn type_name(&self) -> String {
        self.type_name.clone()
    }

    fn bytes(&self) -> usize {
        if self.bytes != 0 {
            self.bytes
        } else {
            self.width
        }
    }

    fn is_set(&self) -> bool {
        self.set
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.bytes = 0;
        self.set = false;

        for named in &mut self.parts {
            if named.val.is_disabled() {
                log::trace!("skipping disabled {named:?}");
                continue;
            }

            if self.width != 0 && self.bytes + named.val.bytes() > self.width {
                return Err(Error::BadData {
                    what: self.type_name.clone(),
                    message: format!("{}: variable size exceeds compound size", named.name),
                });
            }

            log::trace!("pos {}: {named:?}", cursor.pos());
            let pos = cursor.pos();

            match named.val.read(cursor) {
                Ok(()) => {}
                Err(Error::Eof(_)) if self.partial => {
                    log::trace!("  encountered eof while reading");
                    cursor.seek(pos);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            // a successful read may have grown the byte count (a prefixed
            // string, for instance)
            if self.width != 0 && self.bytes + named.val.bytes() > self.width {
                return Err(Error::BadData {
                    what: self.type_name.clone(),
                    message: format!("{}: new variable size exceeds compound size", named.name),
                });
            }

            self.bytes += named.val.bytes();
            self.set = true;

            if self.width != 0 && self.width == self.bytes {
                break;
            }
        }

        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.parts.is_empty() {
            return Err(Error::BadData {
                what: self.type_name.clone(),
                message: "attempted to serialize uninitialized compound".to_owned(),
            });
        }

        for named in &self.parts {
            if named.val.is_disabled() {
                continue;
            }
            if !named.val.is_set() {
                if self.partial {
                    continue;
                }
                log::trace!("writing unset {named:?}");
            }

            named.val.write(out)?;
        }

        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        Err(Error::BadValue(self.type_name.clone(), text.to_owned()))
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        render_parts(&self.parts, level, pretty, None)
    }

    fn get(&self, name: &str) -> Result<&dyn NvVal> {
        parts_get(&self.parts, name)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<isize> {
        let delta = parts_set(&mut self.parts, name, value)?;
        self.bytes = (self.bytes as isize + delta) as usize;
        self.set = true;
        Ok(delta)
    }

    fn parts(&self) -> &[Named] {
        &self.parts
    }
}

/// A predicate deciding whether a just-read array element is the sentinel.
pub type IsEnd = Box<dyn Fn(&dyn NvVal) -> bool>;

/// A fixed-capacity array; an optional sentinel predicate ends reads early.
pub struct NvArray {
    type_name: String,
    elems: Vec<Named>,
    is_end: Option<IsEnd>,
    bytes: usize,
    set: bool,
    disabled: bool,
}

impl NvArray {
    /// An array of `count` elements produced by `make`.
    pub fn new(
        type_name: &str,
        count: usize,
        make: impl Fn() -> Box<dyn NvVal>,
        is_end: Option<IsEnd>,
    ) -> Self {
        let elems = (0..count).map(|i| Named::new(&i.to_string(), make())).collect();

        Self {
            type_name: type_name.to_owned(),
            elems,
            is_end,
            bytes: 0,
            set: false,
            disabled: false,
        }
    }

    /// Boxed, for definition lists.
    pub fn boxed(
        type_name: &str,
        count: usize,
        make: impl Fn() -> Box<dyn NvVal>,
        is_end: Option<IsEnd>,
    ) -> Box<Self> {
        Box::new(Self::new(type_name, count, make, is_end))
    }
}

impl NvVal for NvArray {
    fn type_name(&self) -> String {
        format!("{}[{}]", self.type_name, self.elems.len())
    }

    fn bytes(&self) -> usize {
        if self.set {
            self.bytes
        } else {
            self.elems.iter().map(|e| e.val.bytes()).sum()
        }
    }

    fn is_set(&self) -> bool {
        self.set
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.bytes = 0;

        for named in &mut self.elems {
            named.val.read(cursor)?;
            self.bytes += named.val.bytes();
            self.set = true;

            if let Some(is_end) = &self.is_end {
                // the sentinel is kept; anything after it is omitted
                if is_end(&*named.val) {
                    break;
                }
            }
        }

        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        for named in &self.elems {
            if !named.val.is_set() {
                break;
            }
            named.val.write(out)?;
        }

        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        Err(Error::BadValue(self.type_name(), text.to_owned()))
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        let end = self.elems.iter().position(|e| !e.val.is_set());
        render_parts(&self.elems, level, pretty, end)
    }

    fn get(&self, name: &str) -> Result<&dyn NvVal> {
        parts_get(&self.elems, name)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<isize> {
        let delta = parts_set(&mut self.elems, name, value)?;
        self.bytes = (self.bytes as isize + delta) as usize;
        self.set = true;
        Ok(delta)
    }

    fn parts(&self) -> &[Named] {
        &self.elems
    }
}

/// Width of a list's count prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    /// One byte.
    U8,
    /// Two bytes, big-endian.
    U16,
}

impl PrefixWidth {
    fn bytes(self) -> usize {
        match self {
            PrefixWidth::U8 => 1,
            PrefixWidth::U16 => 2,
        }
    }
}

/// A list prefixed with its element count.
pub struct NvPList {
    type_name: String,
    prefix: PrefixWidth,
    make: Box<dyn Fn() -> Box<dyn NvVal>>,
    elems: Vec<Named>,
    set: bool,
    disabled: bool,
}

impl NvPList {
    /// An empty list of values produced by `make`.
    pub fn new(
        type_name: &str,
        prefix: PrefixWidth,
        make: impl Fn() -> Box<dyn NvVal> + 'static,
    ) -> Self {
        Self {
            type_name: type_name.to_owned(),
            prefix,
            make: Box::new(make),
            elems: Vec::new(),
            set: false,
            disabled: false,
        }
    }

    /// Boxed, for definition lists.
    pub fn boxed(
        type_name: &str,
        prefix: PrefixWidth,
        make: impl Fn() -> Box<dyn NvVal> + 'static,
    ) -> Box<Self> {
        Box::new(Self::new(type_name, prefix, make))
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}

impl NvVal for NvPList {
    fn type_name(&self) -> String {
        format!("{}[]", self.type_name)
    }

    fn bytes(&self) -> usize {
        self.prefix.bytes() + self.elems.iter().map(|e| e.val.bytes()).sum::<usize>()
    }

    fn is_set(&self) -> bool {
        self.set
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        let count = match self.prefix {
            PrefixWidth::U8 => usize::from(cursor.u8(&self.type_name())?),
            PrefixWidth::U16 => usize::from(cursor.u16(&self.type_name())?),
        };

        self.elems.clear();
        for i in 0..count {
            let mut val = (self.make)();
            val.read(cursor)?;
            self.elems.push(Named { name: i.to_string(), val });
        }

        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self.prefix {
            PrefixWidth::U8 => out.push(self.elems.len() as u8),
            PrefixWidth::U16 => out.extend_from_slice(&(self.elems.len() as u16).to_be_bytes()),
        }

        for named in &self.elems {
            named.val.write(out)?;
        }

        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        Err(Error::BadValue(self.type_name(), text.to_owned()))
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        render_parts(&self.elems, level, pretty, None)
    }

    fn get(&self, name: &str) -> Result<&dyn NvVal> {
        parts_get(&self.elems, name)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<isize> {
        // index -1 appends a fresh element
        if name == "-1" || name.split_once('.').map(|(h, _)| h) == Some("-1") {
            let mut val = (self.make)();
            let delta = match name.split_once('.') {
                Some((_, tail)) => val.set(tail, value)?,
                None => {
                    val.parse(value)?;
                    val.bytes() as isize
                }
            };

            self.elems.push(Named { name: self.elems.len().to_string(), val });
            self.set = true;
            return Ok(delta);
        }

        let delta = parts_set(&mut self.elems, name, value)?;
        self.set = true;
        Ok(delta)
    }

    fn parts(&self) -> &[Named] {
        &self.elems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::val::{NvIp4, NvMac, NvString, NvU16, NvU8};

    fn port_range() -> Box<NvCompound> {
        NvCompound::boxed(
            "port-range",
            vec![
                Named::new("start", NvU16::boxed()),
                Named::new("end", NvU16::boxed()),
            ],
        )
    }

    #[test]
    fn test_compound_read_and_get() {
        let mut c = port_range();
        let mut cursor = Cursor::new(&[0x00, 0x50, 0x1f, 0x90]);
        c.read(&mut cursor).unwrap();

        assert_eq!(c.bytes(), 4);
        assert_eq!(c.get("start").unwrap().to_str(), "80");
        assert_eq!(c.get("end").unwrap().to_str(), "8080");
        assert!(c.get("middle").is_err());
    }

    #[test]
    fn test_nested_set_propagates_delta() {
        let mut outer = NvCompound::new(
            "outer",
            vec![
                Named::new("ports", port_range()),
                Named::new("dest", Box::new(NvIp4::new())),
            ],
        );

        let mut cursor = Cursor::new(&[0, 80, 0, 81, 192, 168, 0, 1]);
        outer.read(&mut cursor).unwrap();

        let delta = outer.set("ports.end", "443").unwrap();
        assert_eq!(delta, 0);
        assert_eq!(outer.get("ports.end").unwrap().to_str(), "443");

        let mut out = Vec::new();
        outer.write(&mut out).unwrap();
        assert_eq!(out, [0, 80, 1, 187, 192, 168, 0, 1]);
    }

    #[test]
    fn test_growing_member_changes_size() {
        let mut c = NvCompound::new(
            "c",
            vec![
                Named::new("name", Box::new(NvString::p8string(0))),
                Named::new("id", NvU8::boxed()),
            ],
        );

        let mut cursor = Cursor::new(b"\x02hi\x07");
        c.read(&mut cursor).unwrap();
        assert_eq!(c.bytes(), 4);

        let delta = c.set("name", "hello").unwrap();
        assert_eq!(delta, 3);
        assert_eq!(c.bytes(), 7);
    }

    #[test]
    fn test_set_order_enforced() {
        let mut c = port_range();
        // nothing read: "end" cannot be set before "start"
        let err = c.set("end", "1").unwrap_err();
        assert!(matches!(err, Error::SetOrder(_, _)));

        c.set("start", "1").unwrap();
        c.set("end", "2").unwrap();
    }

    #[test]
    fn test_array_sentinel() {
        let mut arr = NvArray::new(
            "mac_table",
            4,
            || Box::new(NvMac::new()),
            Some(Box::new(|v: &dyn NvVal| v.to_str() == "00:00:00:00:00:00")),
        );

        let mut data = Vec::new();
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        data.extend_from_slice(&[0; 6]); // sentinel
        data.extend_from_slice(&[9; 6]); // never read
        let mut cursor = Cursor::new(&data);
        arr.read(&mut cursor).unwrap();

        // the sentinel is kept, the rest is omitted
        assert_eq!(arr.bytes(), 12);
        assert_eq!(cursor.pos(), 12);

        let mut out = Vec::new();
        arr.write(&mut out).unwrap();
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn test_plist_read_write_and_append() {
        let mut list = NvPList::new("timeservers", PrefixWidth::U8, || {
            Box::new(NvString::p8string(0))
        });

        let mut cursor = Cursor::new(b"\x02\x01a\x02bc");
        list.read(&mut cursor).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get("1").unwrap().to_str(), "bc");

        // index -1 appends
        let delta = list.set("-1", "pool.ntp.org").unwrap();
        assert_eq!(delta, 13);
        assert_eq!(list.len(), 3);

        let mut out = Vec::new();
        list.write(&mut out).unwrap();
        assert_eq!(out[0], 3);
        assert_eq!(&out[1..], b"\x01a\x02bc\x0cpool.ntp.org");
    }
}
