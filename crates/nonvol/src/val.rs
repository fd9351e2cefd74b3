//! The leaf value types of the settings model.

use bstr::{BString, ByteSlice};

use crate::{data_to_string, parse_u32, Cursor, Error, NvVal, Result};

/// An integer type storable in a settings file.
pub trait Scalar: Copy + Default + PartialEq + std::fmt::Display + 'static {
    /// Serialized width.
    const BYTES: usize;
    /// Type description.
    const NAME: &'static str;

    /// Decode from `Self::BYTES` bytes.
    fn decode(b: &[u8], le: bool) -> Self;
    /// Encode into `Self::BYTES` bytes.
    fn encode(self, out: &mut Vec<u8>, le: bool);
    /// Parse decimal, or hex with a `0x` prefix.
    fn parse_text(text: &str) -> Option<Self>;
    /// Widen for mask arithmetic.
    fn to_u32(self) -> u32;
    /// Narrow from mask arithmetic.
    fn from_u32(v: u32) -> Self;
}

macro_rules! scalar {
    ($t:ty, $name:literal, via $wide:ty) => {
        impl Scalar for $t {
            const BYTES: usize = std::mem::size_of::<$t>();
            const NAME: &'static str = $name;

            fn decode(b: &[u8], le: bool) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(b);
                if le {
                    <$t>::from_le_bytes(raw)
                } else {
                    <$t>::from_be_bytes(raw)
                }
            }

            fn encode(self, out: &mut Vec<u8>, le: bool) {
                if le {
                    out.extend_from_slice(&self.to_le_bytes());
                } else {
                    out.extend_from_slice(&self.to_be_bytes());
                }
            }

            fn parse_text(text: &str) -> Option<Self> {
                // 8-bit types parse through their 16-bit counterpart and get
                // masked, so that "0xff" and "255" behave identically
                let wide: $wide = if let Some(hex) = text.strip_prefix("0x") {
                    <$wide>::from_str_radix(hex, 16).ok()?
                } else {
                    text.parse().ok()?
                };

                Some(wide as $t)
            }

            fn to_u32(self) -> u32 {
                self as u32
            }

            fn from_u32(v: u32) -> Self {
                v as $t
            }
        }
    };
}

scalar!(u8, "u8", via u16);
scalar!(u16, "u16", via u16);
scalar!(u32, "u32", via u32);
scalar!(i8, "i8", via i16);
scalar!(i16, "i16", via i16);
scalar!(i32, "i32", via i32);

/// A scalar value, big-endian on the wire unless constructed with
/// [`NvNum::le`].
#[derive(Debug, Clone, Default)]
pub struct NvNum<T: Scalar> {
    val: T,
    set: bool,
    disabled: bool,
    hex: bool,
    le: bool,
    range: Option<(i64, i64)>,
}

/// 8-bit unsigned scalar.
pub type NvU8 = NvNum<u8>;
/// 16-bit unsigned scalar.
pub type NvU16 = NvNum<u16>;
/// 32-bit unsigned scalar.
pub type NvU32 = NvNum<u32>;
/// 8-bit signed scalar.
pub type NvI8 = NvNum<i8>;
/// 16-bit signed scalar.
pub type NvI16 = NvNum<i16>;
/// 32-bit signed scalar.
pub type NvI32 = NvNum<i32>;

/// 32-bit little-endian scalar, as used by the BOLT environment.
pub type NvU32Le = NvNum<u32>;

impl<T: Scalar> NvNum<T> {
    /// A big-endian scalar.
    pub fn new() -> Self {
        Self::default()
    }

    /// A big-endian scalar rendered in hex.
    pub fn hex() -> Self {
        Self { hex: true, ..Self::default() }
    }

    /// A little-endian scalar.
    pub fn le() -> Self {
        Self { le: true, ..Self::default() }
    }

    /// A scalar whose parsed values must lie in `[min, max]`.
    pub fn ranged(min: i64, max: i64) -> Self {
        Self { range: Some((min, max)), ..Self::default() }
    }

    /// The current value.
    pub fn num(&self) -> T {
        self.val
    }

    /// Replace the value.
    pub fn set_num(&mut self, val: T) {
        self.val = val;
        self.set = true;
    }

    /// Boxed, for definition lists.
    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl<T: Scalar> NvVal for NvNum<T> {
    fn type_name(&self) -> String {
        T::NAME.to_owned()
    }

    fn bytes(&self) -> usize {
        T::BYTES
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
        self.val = T::decode(cursor.take(T::BYTES, T::NAME)?, self.le);
        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.val.encode(out, self.le);
        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        let val = T::parse_text(text)
            .ok_or_else(|| Error::BadValue(self.type_name(), text.to_owned()))?;

        if let Some((min, max)) = self.range {
            let v = i64::from(val.to_u32() as i32);
            let vu = i64::from(val.to_u32());
            // signed range bounds apply to signed types only
            if (min >= 0 && (vu < min || vu > max)) || (min < 0 && (v < min || v > max)) {
                return Err(Error::BadValue(self.type_name(), text.to_owned()));
            }
        }

        self.val = val;
        self.set = true;
        Ok(())
    }

    fn render(&self, _level: usize, _pretty: bool) -> String {
        if self.hex {
            format!("0x{:x}", self.val.to_u32())
        } else {
            self.val.to_string()
        }
    }
}

/// A boolean stored as one byte.
#[derive(Debug, Clone, Default)]
pub struct NvBool {
    num: NvU8,
}

impl NvBool {
    /// A new, unset boolean.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored truth value.
    pub fn truth(&self) -> bool {
        self.num.num() != 0
    }
}

impl NvVal for NvBool {
    fn type_name(&self) -> String {
        "bool".to_owned()
    }

    fn bytes(&self) -> usize {
        1
    }

    fn is_set(&self) -> bool {
        self.num.is_set()
    }

    fn is_disabled(&self) -> bool {
        self.num.is_disabled()
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.num.set_disabled(disabled);
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.num.read(cursor)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.num.write(out)
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        match text {
            "1" | "true" | "yes" => self.num.set_num(1),
            "0" | "false" | "no" => self.num.set_num(0),
            _ => return Err(Error::BadValue("bool".to_owned(), text.to_owned())),
        }

        Ok(())
    }

    fn render(&self, _level: usize, pretty: bool) -> String {
        match (pretty, self.truth()) {
            (true, true) => "yes".to_owned(),
            (true, false) => "no".to_owned(),
            (false, truth) => u8::from(truth).to_string(),
        }
    }
}

/// An opaque, fixed-width byte buffer.
#[derive(Debug, Clone)]
pub struct NvData {
    buf: Vec<u8>,
    set: bool,
    disabled: bool,
}

impl NvData {
    /// A zeroed buffer of `width` bytes.
    pub fn new(width: usize) -> Self {
        Self { buf: vec![0; width], set: false, disabled: false }
    }

    /// The raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }
}

impl NvVal for NvData {
    fn type_name(&self) -> String {
        format!("data[{}]", self.buf.len())
    }

    fn bytes(&self) -> usize {
        self.buf.len()
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
        let len = self.buf.len();
        self.buf = cursor.take(len, "data")?.to_vec();
        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.buf);
        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        // colon-separated hex, same shape as the canonical rendering
        let bytes: Option<Vec<u8>> = text
            .split(':')
            .map(|part| u8::from_str_radix(part, 16).ok())
            .collect();

        match bytes {
            Some(bytes) if bytes.len() == self.buf.len() => {
                self.buf = bytes;
                self.set = true;
                Ok(())
            }
            _ => Err(Error::BadValue(self.type_name(), text.to_owned())),
        }
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        data_to_string(&self.buf, level, pretty)
    }
}

/// An IPv4 address.
#[derive(Debug, Clone, Default)]
pub struct NvIp4 {
    addr: [u8; 4],
    set: bool,
    disabled: bool,
}

impl NvIp4 {
    /// A new, unset address.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NvVal for NvIp4 {
    fn type_name(&self) -> String {
        "ip4".to_owned()
    }

    fn bytes(&self) -> usize {
        4
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
        self.addr.copy_from_slice(cursor.take(4, "ip4")?);
        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.addr);
        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        let addr: std::net::Ipv4Addr =
            text.parse().map_err(|_| Error::BadValue("ip4".to_owned(), text.to_owned()))?;
        self.addr = addr.octets();
        self.set = true;
        Ok(())
    }

    fn render(&self, _level: usize, _pretty: bool) -> String {
        std::net::Ipv4Addr::from(self.addr).to_string()
    }
}

/// An IPv6 address.
#[derive(Debug, Clone, Default)]
pub struct NvIp6 {
    addr: [u8; 16],
    set: bool,
    disabled: bool,
}

impl NvIp6 {
    /// A new, unset address.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NvVal for NvIp6 {
    fn type_name(&self) -> String {
        "ip6".to_owned()
    }

    fn bytes(&self) -> usize {
        16
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
        self.addr.copy_from_slice(cursor.take(16, "ip6")?);
        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.addr);
        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        let addr: std::net::Ipv6Addr =
            text.parse().map_err(|_| Error::BadValue("ip6".to_owned(), text.to_owned()))?;
        self.addr = addr.octets();
        self.set = true;
        Ok(())
    }

    fn render(&self, _level: usize, _pretty: bool) -> String {
        std::net::Ipv6Addr::from(self.addr).to_string()
    }
}

/// A MAC address.
#[derive(Debug, Clone, Default)]
pub struct NvMac {
    addr: [u8; 6],
    set: bool,
    disabled: bool,
}

impl NvMac {
    /// A new, unset address.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NvVal for NvMac {
    fn type_name(&self) -> String {
        "mac".to_owned()
    }

    fn bytes(&self) -> usize {
        6
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
        self.addr.copy_from_slice(cursor.take(6, "mac")?);
        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.addr);
        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
            return Err(Error::BadValue("mac".to_owned(), text.to_owned()));
        }

        for (i, part) in parts.iter().enumerate() {
            self.addr[i] = u8::from_str_radix(part, 16)
                .map_err(|_| Error::BadValue("mac".to_owned(), text.to_owned()))?;
        }

        self.set = true;
        Ok(())
    }

    fn render(&self, _level: usize, _pretty: bool) -> String {
        self.addr.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
    }
}

/// The 4-byte magic tagging a settings group.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct NvMagic {
    buf: [u8; 4],
    set: bool,
}

impl NvMagic {
    /// A new, unset magic.
    pub fn new() -> Self {
        Self::default()
    }

    /// A magic from its raw bytes.
    pub fn from_bytes(buf: [u8; 4]) -> Self {
        Self { buf, set: true }
    }

    /// The raw bytes.
    pub fn raw(&self) -> [u8; 4] {
        self.buf
    }

    /// The printable rendition: alphanumeric bytes kept, the rest replaced
    /// by dots; falls back to hex when nothing is printable.
    pub fn pretty_name(&self) -> String {
        let name: String = self
            .buf
            .iter()
            .filter_map(|&b| {
                if b.is_ascii_alphanumeric() {
                    Some(char::from(b))
                } else {
                    None
                }
            })
            .collect();

        if name.len() >= 2 {
            name
        } else {
            hex_str(&self.buf)
        }
    }
}

fn hex_str(buf: &[u8]) -> String {
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

impl NvVal for NvMagic {
    fn type_name(&self) -> String {
        "magic".to_owned()
    }

    fn bytes(&self) -> usize {
        4
    }

    fn is_set(&self) -> bool {
        self.set
    }

    fn set_disabled(&mut self, _disabled: bool) {}

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.buf.copy_from_slice(cursor.take(4, "magic")?);
        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.buf);
        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        if text.len() == 4 {
            self.buf.copy_from_slice(text.as_bytes());
            self.set = true;
            Ok(())
        } else {
            Err(Error::BadValue("magic".to_owned(), text.to_owned()))
        }
    }

    fn render(&self, _level: usize, pretty: bool) -> String {
        if pretty {
            self.pretty_name()
        } else {
            hex_str(&self.buf)
        }
    }
}

/// A `major.minor` version stored as a `u16`.
#[derive(Debug, Clone, Default)]
pub struct NvVersion {
    num: NvU16,
}

impl NvVersion {
    /// A new, unset version.
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw value.
    pub fn num(&self) -> u16 {
        self.num.num()
    }

    /// Replace the raw value.
    pub fn set_num(&mut self, val: u16) {
        self.num.set_num(val);
    }

    /// Major part.
    pub fn major(&self) -> u8 {
        (self.num() >> 8) as u8
    }

    /// Minor part.
    pub fn minor(&self) -> u8 {
        (self.num() & 0xff) as u8
    }
}

impl NvVal for NvVersion {
    fn type_name(&self) -> String {
        "version".to_owned()
    }

    fn bytes(&self) -> usize {
        2
    }

    fn is_set(&self) -> bool {
        self.num.is_set()
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.num.set_disabled(disabled);
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.num.read(cursor)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.num.write(out)
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        let (major, minor) = text
            .split_once('.')
            .ok_or_else(|| Error::BadValue("version".to_owned(), text.to_owned()))?;

        let major: u8 = major
            .parse()
            .map_err(|_| Error::BadValue("version".to_owned(), text.to_owned()))?;
        let minor: u8 = minor
            .parse()
            .map_err(|_| Error::BadValue("version".to_owned(), text.to_owned()))?;

        self.num.set_num(u16::from(major) << 8 | u16::from(minor));
        Ok(())
    }

    fn render(&self, _level: usize, _pretty: bool) -> String {
        format!("{}.{}", self.major(), self.minor())
    }
}

/// A `u32` timestamp rendered as a date.
#[derive(Debug, Clone, Default)]
pub struct NvTimestamp {
    num: NvU32,
}

impl NvTimestamp {
    /// A new, unset timestamp.
    pub fn new() -> Self {
        Self::default()
    }
}

// civil-from-days, Howard Hinnant's algorithm
fn render_epoch(secs: u32) -> String {
    let days = i64::from(secs / 86400) - 719_468;
    let time = secs % 86400;

    let era = days.div_euclid(146_097);
    let doe = days.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };

    format!("{year:04}-{month:02}-{day:02} {:02}:{:02}", time / 3600, (time % 3600) / 60)
}

impl NvVal for NvTimestamp {
    fn type_name(&self) -> String {
        "time".to_owned()
    }

    fn bytes(&self) -> usize {
        4
    }

    fn is_set(&self) -> bool {
        self.num.is_set()
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.num.set_disabled(disabled);
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.num.read(cursor)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.num.write(out)
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        self.num.parse(text)
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        if pretty {
            render_epoch(self.num.num())
        } else {
            self.num.render(level, pretty)
        }
    }
}

/// An enumeration over a scalar: named values plus a numeric fallback.
#[derive(Debug, Clone)]
pub struct NvEnum<T: Scalar> {
    num: NvNum<T>,
    name: String,
    values: Vec<(u32, String)>,
}

impl<T: Scalar> NvEnum<T> {
    /// An enum called `name` whose values are `0..names.len()`.
    pub fn new(name: &str, names: &[&str]) -> Self {
        Self {
            num: NvNum::new(),
            name: name.to_owned(),
            values: names
                .iter()
                .enumerate()
                .filter(|(_, n)| !n.is_empty())
                .map(|(i, n)| (i as u32, (*n).to_owned()))
                .collect(),
        }
    }

    /// An enum with explicit `(value, name)` pairs.
    pub fn with_values(name: &str, values: &[(u32, &str)]) -> Self {
        Self {
            num: NvNum::new(),
            name: name.to_owned(),
            values: values.iter().map(|(v, n)| (*v, (*n).to_owned())).collect(),
        }
    }

    /// The numeric value.
    pub fn num(&self) -> T {
        self.num.num()
    }
}

impl<T: Scalar> NvVal for NvEnum<T> {
    fn type_name(&self) -> String {
        self.name.clone()
    }

    fn bytes(&self) -> usize {
        T::BYTES
    }

    fn is_set(&self) -> bool {
        self.num.is_set()
    }

    fn is_disabled(&self) -> bool {
        self.num.is_disabled()
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.num.set_disabled(disabled);
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.num.read(cursor)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.num.write(out)
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        if let Some((val, _)) = self.values.iter().find(|(_, n)| n == text) {
            self.num.set_num(T::from_u32(*val));
            Ok(())
        } else {
            self.num.parse(text).map_err(|_| Error::BadValue(self.name.clone(), text.to_owned()))
        }
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        let raw = self.num.num().to_u32();
        match self.values.iter().find(|(v, _)| *v == raw) {
            Some((_, name)) => name.clone(),
            None => self.num.render(level, pretty),
        }
    }
}

/// A bitmask over a scalar, with `+name`/`-name`/`+0xNN` edit syntax.
#[derive(Debug, Clone)]
pub struct NvBitmask<T: Scalar> {
    num: NvNum<T>,
    name: String,
    bits: Vec<(u32, String)>,
}

impl<T: Scalar> NvBitmask<T> {
    /// An anonymous bitmask with no named bits.
    pub fn new() -> Self {
        Self::with_names("bitmask", &[])
    }

    /// A bitmask whose entries name bits `1 << 0`, `1 << 1`, ...
    pub fn with_names(name: &str, names: &[&str]) -> Self {
        Self {
            num: NvNum::hex(),
            name: name.to_owned(),
            bits: names
                .iter()
                .enumerate()
                .filter(|(_, n)| !n.is_empty())
                .map(|(i, n)| (1u32 << i, (*n).to_owned()))
                .collect(),
        }
    }

    /// A bitmask with explicit `(mask, name)` pairs.
    pub fn with_bits(name: &str, bits: &[(u32, &str)]) -> Self {
        Self {
            num: NvNum::hex(),
            name: name.to_owned(),
            bits: bits.iter().map(|(m, n)| (*m, (*n).to_owned())).collect(),
        }
    }

    /// The numeric value.
    pub fn num(&self) -> T {
        self.num.num()
    }

    fn bit_by_name(&self, name: &str) -> Option<u32> {
        self.bits.iter().find(|(_, n)| n == name).map(|(m, _)| *m)
    }
}

impl<T: Scalar> Default for NvBitmask<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> NvVal for NvBitmask<T> {
    fn type_name(&self) -> String {
        self.name.clone()
    }

    fn bytes(&self) -> usize {
        T::BYTES
    }

    fn is_set(&self) -> bool {
        self.num.is_set()
    }

    fn is_disabled(&self) -> bool {
        self.num.is_disabled()
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.num.set_disabled(disabled);
    }

    fn read(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        self.num.read(cursor)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.num.write(out)
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        if let Some(rest) = text.strip_prefix('+').or_else(|| text.strip_prefix('-')) {
            let bit = self
                .bit_by_name(rest)
                .or_else(|| parse_u32(rest))
                .ok_or_else(|| Error::BadValue(self.name.clone(), text.to_owned()))?;

            let old = self.num.num().to_u32();
            let new = if text.starts_with('+') { old | bit } else { old & !bit };
            self.num.set_num(T::from_u32(new));
            Ok(())
        } else {
            // a bare number replaces the whole mask
            self.num.parse(text).map_err(|_| Error::BadValue(self.name.clone(), text.to_owned()))
        }
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        if !pretty {
            return self.num.render(level, pretty);
        }

        let raw = self.num.num().to_u32();
        let mut names: Vec<String> = Vec::new();
        let mut rest = raw;

        for (mask, name) in &self.bits {
            if raw & mask == *mask && *mask != 0 {
                names.push(name.clone());
                rest &= !mask;
            }
        }

        if rest != 0 || names.is_empty() {
            names.push(format!("0x{rest:x}"));
        }

        names.join(" | ")
    }
}

/// Flags describing one of the string flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFlag {
    /// A `u8` length prefix.
    PrefixU8 = 1 << 0,
    /// A `u16` length prefix.
    PrefixU16 = 1 << 1,
    /// Occupies exactly `width` bytes on the wire.
    FixedWidth = 1 << 2,
    /// Must carry a terminating NUL.
    RequireNul = 1 << 3,
    /// May carry a terminating NUL; rendering stops there.
    OptionalNul = 1 << 4,
    /// Not text: rendered as hex.
    IsData = 1 << 5,
    /// The length prefix counts itself.
    SizeIncludesPrefix = 1 << 6,
}

/// A string (or length-prefixed data blob) in one of six wire flavours.
#[derive(Debug, Clone)]
pub struct NvString {
    flags: u32,
    width: usize,
    val: BString,
    set: bool,
    disabled: bool,
}

impl NvString {
    /// A string with an explicit flag combination.
    pub fn with_flags(flags: &[StringFlag], width: usize) -> Self {
        let mut raw = flags.iter().fold(0u32, |acc, f| acc | *f as u32);
        if width != 0 && raw & (StringFlag::PrefixU8 as u32 | StringFlag::PrefixU16 as u32) == 0 {
            raw |= StringFlag::FixedWidth as u32;
        }

        Self { flags: raw, width, val: BString::from(""), set: false, disabled: false }
    }

    /// NUL-terminated; `width` of 0 means unbounded.
    pub fn zstring(width: usize) -> Self {
        Self::with_flags(&[StringFlag::RequireNul], width)
    }

    /// Fixed width, no terminator required.
    pub fn fstring(width: usize) -> Self {
        Self::with_flags(&[StringFlag::OptionalNul], width)
    }

    /// Fixed width with a mandatory NUL.
    pub fn fzstring(width: usize) -> Self {
        Self::with_flags(&[StringFlag::RequireNul], width)
    }

    /// `u8` length prefix; a non-zero `max` caps the text length.
    pub fn p8string(max: usize) -> Self {
        Self::with_flags(&[StringFlag::PrefixU8], max)
    }

    /// `u8` length prefix, NUL included in the data.
    pub fn p8zstring() -> Self {
        Self::with_flags(&[StringFlag::PrefixU8, StringFlag::RequireNul], 0)
    }

    /// `u16` length prefix; a non-zero `max` caps the text length.
    pub fn p16string(max: usize) -> Self {
        Self::with_flags(&[StringFlag::PrefixU16], max)
    }

    /// `u16` length prefix that counts itself.
    pub fn p16istring() -> Self {
        Self::with_flags(&[StringFlag::PrefixU16, StringFlag::SizeIncludesPrefix], 0)
    }

    /// `u8`-prefixed binary data.
    pub fn p8data() -> Self {
        Self::with_flags(&[StringFlag::PrefixU8, StringFlag::IsData], 0)
    }

    /// `u16`-prefixed binary data.
    pub fn p16data() -> Self {
        Self::with_flags(&[StringFlag::PrefixU16, StringFlag::IsData], 0)
    }

    /// The stored bytes.
    pub fn str_value(&self) -> &BString {
        &self.val
    }

    /// Replace the stored bytes without going through `parse`.
    pub fn set_bytes(&mut self, bytes: &[u8]) {
        self.val = BString::from(bytes);
        self.set = true;
    }

    fn has(&self, flag: StringFlag) -> bool {
        self.flags & flag as u32 != 0
    }

    fn prefix_bytes(&self) -> usize {
        if self.has(StringFlag::PrefixU8) {
            1
        } else if self.has(StringFlag::PrefixU16) {
            2
        } else {
            0
        }
    }

    fn extra_bytes(&self) -> usize {
        usize::from(self.has(StringFlag::RequireNul))
    }

    fn max_length(&self) -> usize {
        if self.width != 0 {
            return self.width - self.extra_bytes();
        }

        let max = match self.prefix_bytes() {
            1 => 0xff,
            2 => 0xffff,
            _ => usize::MAX - 1,
        };

        let max = if self.has(StringFlag::SizeIncludesPrefix) {
            max - self.prefix_bytes()
        } else {
            max
        };

        max - self.extra_bytes()
    }
}

impl NvVal for NvString {
    fn type_name(&self) -> String {
        let mut name = String::new();

        if self.has(StringFlag::PrefixU8) {
            name.push_str("p8");
        } else if self.has(StringFlag::PrefixU16) {
            name.push_str("p16");
        } else if self.has(StringFlag::FixedWidth) {
            name.push('f');
        }

        if self.has(StringFlag::SizeIncludesPrefix) {
            name.push('i');
        }

        if self.has(StringFlag::RequireNul) {
            name.push('z');
        }

        name.push_str(if self.has(StringFlag::IsData) { "data" } else { "string" });

        if self.width != 0 {
            name.push_str(&format!("[{}]", self.width));
        }

        name
    }

    fn bytes(&self) -> usize {
        if self.has(StringFlag::FixedWidth) {
            self.width
        } else {
            self.val.len() + self.prefix_bytes() + self.extra_bytes()
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
        let what = self.type_name();
        let mut size = if self.has(StringFlag::FixedWidth) { self.width } else { 0 };
        let mut val: Vec<u8>;
        let mut zstring = false;

        if size == 0 {
            if self.has(StringFlag::PrefixU8) {
                size = usize::from(cursor.u8(&what)?);
            } else if self.has(StringFlag::PrefixU16) {
                size = usize::from(cursor.u16(&what)?);
            } else {
                zstring = true;
            }

            if size != 0 && self.has(StringFlag::SizeIncludesPrefix) {
                let min = self.prefix_bytes();
                if size < min {
                    return Err(Error::BadData {
                        what,
                        message: format!("size {size} is less than {min}"),
                    });
                }
                size -= min;
            }
        }

        if zstring {
            val = cursor.take_until_nul().to_vec();
        } else {
            val = cursor.take(size, &what)?.to_vec();
        }

        if !zstring && self.has(StringFlag::RequireNul) {
            let has_nul = val.last() == Some(&0)
                || (self.has(StringFlag::FixedWidth) && val.contains(&0));

            if !has_nul {
                return Err(Error::BadData {
                    what,
                    message: format!(
                        "expected terminating nul byte in {}",
                        data_to_string(&val, 0, false)
                    ),
                });
            }

            // keep only up to the first nul
            let nul = val.iter().position(|&b| b == 0).unwrap_or(val.len());
            val.truncate(nul);
        }

        self.val = BString::from(val);
        self.set = true;
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut val = self.val.to_vec();

        if self.has(StringFlag::FixedWidth) && val.len() < self.width {
            // one nul terminator, then 0xff filler
            val.push(0);
            val.resize(self.width, 0xff);
        } else if self.has(StringFlag::RequireNul) {
            val.push(0);
        }

        let size = val.len()
            + if self.has(StringFlag::SizeIncludesPrefix) { self.prefix_bytes() } else { 0 };

        if self.has(StringFlag::PrefixU8) {
            out.push(size as u8);
        } else if self.has(StringFlag::PrefixU16) {
            out.extend_from_slice(&(size as u16).to_be_bytes());
        }

        out.extend_from_slice(&val);
        Ok(())
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        if text.len() > self.max_length() {
            return Err(Error::BadValue(self.type_name(), text.to_owned()));
        }

        self.val = BString::from(text);
        self.set = true;
        Ok(())
    }

    fn render(&self, level: usize, pretty: bool) -> String {
        if self.has(StringFlag::IsData) {
            return data_to_string(&self.val, level, pretty);
        }

        let val = if self.has(StringFlag::OptionalNul) {
            match self.val.iter().position(|&b| b == 0) {
                Some(nul) => &self.val[..nul],
                None => &self.val[..],
            }
        } else {
            &self.val[..]
        };

        let text = val.to_str_lossy();
        if pretty {
            format!("\"{text}\"")
        } else {
            text.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_ok<V: NvVal>(val: &mut V, data: &[u8]) -> usize {
        let mut cursor = Cursor::new(data);
        val.read(&mut cursor).unwrap();
        cursor.pos()
    }

    fn written<V: NvVal>(val: &V) -> Vec<u8> {
        let mut out = Vec::new();
        val.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_num_round_trip() {
        let mut v = NvU16::new();
        read_ok(&mut v, &[0x12, 0x34]);

        assert_eq!(v.num(), 0x1234);
        assert_eq!(v.to_str(), "4660");
        assert_eq!(written(&v), [0x12, 0x34]);
    }

    #[test]
    fn test_num_hex_parse() {
        let mut v = NvU32::new();
        v.parse("0x80001234").unwrap();
        assert_eq!(v.num(), 0x8000_1234);

        v.parse("1024").unwrap();
        assert_eq!(v.num(), 1024);

        assert!(v.parse("party").is_err());
    }

    #[test]
    fn test_u8_parses_as_number_not_char() {
        let mut v = NvU8::new();
        v.parse("65").unwrap();
        assert_eq!(v.num(), 65);
        v.parse("0xff").unwrap();
        assert_eq!(v.num(), 0xff);
    }

    #[test]
    fn test_le_scalar() {
        let mut v = NvU32::le();
        read_ok(&mut v, &[0xed, 0xfe, 0xbe, 0xba]);
        assert_eq!(v.num(), 0xbabe_feed);
        assert_eq!(written(&v), [0xed, 0xfe, 0xbe, 0xba]);
    }

    #[test]
    fn test_ranged() {
        let mut v = NvU16::ranged(20, 1024);
        assert!(v.parse("20").is_ok());
        assert!(v.parse("1025").is_err());
    }

    #[test]
    fn test_bool() {
        let mut v = NvBool::new();
        v.parse("yes").unwrap();
        assert!(v.truth());
        assert_eq!(v.to_str(), "1");
        assert_eq!(v.to_pretty(), "yes");
        assert!(v.parse("maybe").is_err());
    }

    #[test]
    fn test_mac() {
        let mut v = NvMac::new();
        v.parse("00:26:24:ff:00:01").unwrap();
        assert_eq!(written(&v), [0x00, 0x26, 0x24, 0xff, 0x00, 0x01]);
        assert_eq!(v.to_str(), "00:26:24:ff:00:01");
        assert!(v.parse("00:26:24").is_err());
    }

    #[test]
    fn test_version() {
        let mut v = NvVersion::new();
        read_ok(&mut v, &[0x00, 0x16]);
        assert_eq!(v.to_str(), "0.22");

        v.parse("2.4").unwrap();
        assert_eq!(v.num(), 0x0204);
    }

    #[test]
    fn test_magic_pretty() {
        let mut v = NvMagic::new();
        read_ok(&mut v, b"RG..");
        assert_eq!(v.to_pretty(), "RG");
        assert_eq!(v.to_str(), "52472e2e");
    }

    #[test]
    fn test_enum() {
        let mut v = NvEnum::<u8>::new("mac_policy", &["disabled", "allow", "deny"]);
        v.parse("deny").unwrap();
        assert_eq!(written(&v), [2]);
        assert_eq!(v.to_str(), "deny");

        // numeric fallback, rendered numerically when unnamed
        v.parse("7").unwrap();
        assert_eq!(v.to_str(), "7");
    }

    #[test]
    fn test_bitmask() {
        let mut v = NvBitmask::<u8>::with_names("ipstacks", &["ip1", "ip2", "ip3"]);
        v.parse("0x05").unwrap();
        assert_eq!(v.to_pretty(), "ip1 | ip3");

        v.parse("-ip3").unwrap();
        assert_eq!(v.num(), 0x01);

        v.parse("+0x80").unwrap();
        assert_eq!(v.num(), 0x81);

        v.parse("+bogus").unwrap_err();
    }

    #[test]
    fn test_p8string() {
        let mut v = NvString::p8string(0);
        read_ok(&mut v, b"\x05hello tail");
        assert_eq!(v.str_value().as_slice(), b"hello");
        assert_eq!(v.bytes(), 6);
        assert_eq!(written(&v), b"\x05hello");
    }

    #[test]
    fn test_p16istring_counts_itself() {
        let mut v = NvString::p16istring();
        read_ok(&mut v, b"\x00\x07hello");
        assert_eq!(v.str_value().as_slice(), b"hello");
        assert_eq!(written(&v), b"\x00\x07hello");
    }

    #[test]
    fn test_fzstring_pads_with_ff() {
        let mut v = NvString::fzstring(8);
        v.parse("abc").unwrap();

        assert_eq!(v.bytes(), 8);
        assert_eq!(written(&v), b"abc\0\xff\xff\xff\xff");
    }

    #[test]
    fn test_fzstring_requires_nul() {
        let mut v = NvString::fzstring(4);
        let mut cursor = Cursor::new(b"abcd");
        assert!(v.read(&mut cursor).is_err());

        let mut cursor = Cursor::new(b"ab\0d");
        v.read(&mut cursor).unwrap();
        assert_eq!(v.str_value().as_slice(), b"ab");
    }

    #[test]
    fn test_zstring_unbounded() {
        let mut v = NvString::zstring(0);
        read_ok(&mut v, b"BOOT_FLAGS=0\0rest");
        assert_eq!(v.str_value().as_slice(), b"BOOT_FLAGS=0");
        assert_eq!(v.bytes(), 13);
    }

    #[test]
    fn test_parse_respects_max_length() {
        let mut v = NvString::fzstring(4);
        assert!(v.parse("abc").is_ok());
        assert!(v.parse("abcd").is_err());
    }

    #[test]
    fn test_timestamp_renders_date() {
        let mut v = NvTimestamp::new();
        let bytes = 1_000_000_000u32.to_be_bytes();
        let mut cursor = Cursor::new(&bytes);
        v.read(&mut cursor).unwrap();

        assert_eq!(v.to_pretty(), "2001-09-09 01:46");
        assert_eq!(v.to_str(), "1000000000");
    }
}
