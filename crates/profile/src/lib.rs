//! `cmkit-profile` models the per-device knowledge that every other layer is
//! keyed off: memory maps, partition tables, console function addresses and
//! their calling conventions, firmware fingerprints, and settings file
//! encryption parameters.
//!
//! Profiles are immutable and live in a process-wide registry populated from
//! the built-in table ([`Profile::list`]). Nothing in the toolkit probes an
//! unknown device; if there is no profile, there is no capability.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod data;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use enumflags2::{bitflags, BitFlags};
use miette::Diagnostic;
use thiserror::Error;

pub use cmkit_crypto::Padding;

/// Errors reported when looking up or checking against a profile.
#[derive(Debug, Diagnostic, Error)]
pub enum Error {
    /// The requested profile does not exist.
    #[error("no such profile: {0}")]
    #[diagnostic(code(E003), help("Profile names are case-insensitive; see the help output for the full list."))]
    NoSuchProfile(String),

    /// The requested address space does not exist in this profile.
    #[error("{profile}: no such address space: {space}")]
    NoSuchSpace {
        /// Profile name.
        profile: String,
        /// The requested space.
        space: String,
    },

    /// The requested partition does not exist in this space.
    #[error("{profile}: {space}: no such partition: {partition}")]
    NoSuchPartition {
        /// Profile name.
        profile: String,
        /// Address space name.
        space: String,
        /// The requested partition.
        partition: String,
    },

    /// An offset or range failed the space's bounds or alignment check.
    #[error("{profile}: {message}")]
    BadRange {
        /// Profile name.
        profile: String,
        /// Description of the offending range.
        message: String,
    },

    /// The profile cannot derive a key from a password.
    #[error("{0}: password-based encryption is not supported")]
    NoKeyDerivation(String),
}

/// The on-device console a version record applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceId {
    /// The bootloader's `Main Menu` console.
    Bootloader,
    /// The BFC shell (serial or telnet).
    Bfc,
}

/// Settings file format quirks, independent of the cipher.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgFlag {
    /// The checksum lies inside the encrypted region.
    GwsFullEnc,
    /// A big-endian `u32` length covering the whole record prefixes the file.
    GwsLenPrefix,
    /// A `Content-Length: NNN\r\n\r\n` header prefixes the file.
    GwsClenPrefix,
    /// Padding before encryption is optional on this device.
    GwsPadOptional,
    /// The `userif` group uses the alternate layout.
    UserifAlt,
    /// The `userif` group uses the short alternate layout.
    UserifAltShort,
}

/// Cipher used for the device's settings files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    /// Not encrypted.
    #[default]
    None,
    /// AES-256 in ECB mode.
    Aes256Ecb,
    /// AES-128 in CBC mode; the configured key carries the IV in its second
    /// half.
    Aes128Cbc,
    /// Single DES in ECB mode.
    DesEcb,
    /// Triple DES (EDE3) in ECB mode.
    TdesEcb,
    /// The Motorola PRNG keystream; the key byte rides at the end of the
    /// file.
    Motorola,
    /// Single-byte XOR.
    Xor,
    /// The keyless 16×16 substitution.
    Sub16x16,
}

impl Encryption {
    /// Cipher block size; 1 for the stream modes.
    pub fn block_size(self) -> usize {
        match self {
            Encryption::Aes256Ecb | Encryption::Aes128Cbc | Encryption::Sub16x16 => 16,
            Encryption::DesEcb | Encryption::TdesEcb => 8,
            _ => 1,
        }
    }
}

/// Argument convention of an on-device function.
///
/// The numeric values are baked into the uploaded payloads, which test the
/// `BufOffLen`/`OffBufLen` bits to decide how to marshal their registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ArgsMode {
    /// `(ptr_to_buffer, offset, length)`
    #[default]
    PtrBufOffLen = 0,
    /// `(buffer, offset, length)`
    BufOffLen = 1 << 0,
    /// `(offset, buffer, length)`
    OffBufLen = 1 << 1,
    /// `(offset, length)`
    OffLen = 1 << 2,
    /// `(offset, end)`
    OffEnd = 1 << 3,
    /// `(offset, partition_size)`
    OffSize = 1 << 4,
}

/// Return-value convention of an on-device function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetMode {
    /// No meaningful return value.
    #[default]
    Void,
    /// Returns zero on success.
    ZeroOk,
    /// Returns zero on error.
    ZeroErr,
    /// Returns the transferred length.
    Length,
}

/// A `(address, word)` pair applied to on-device code while a function runs.
///
/// Applying a patch swaps the word at `addr` with `word`; applying it again
/// restores the original code. The uploaded payloads use the identical
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    /// Absolute address of the patched word.
    pub addr: u32,
    /// Replacement word.
    pub word: u32,
}

/// An on-device function: open/read/write/erase/close of a driver-backed
/// space.
#[derive(Debug, Clone, Default)]
pub struct Func {
    addr: u32,
    mode: ArgsMode,
    ret: RetMode,
    patches: Vec<Patch>,
}

impl Func {
    /// A function at `addr` with the given argument convention.
    pub fn new(addr: u32, mode: ArgsMode) -> Self {
        Self { addr, mode, ret: RetMode::Void, patches: Vec::new() }
    }

    /// Add a code patch to apply around calls.
    pub fn patch(mut self, addr: u32, word: u32) -> Self {
        self.patches.push(Patch { addr, word });
        self
    }

    /// Set the return-value convention.
    pub fn ret(mut self, ret: RetMode) -> Self {
        self.ret = ret;
        self
    }

    /// Absolute address, or 0 if the function is not known.
    pub fn addr(&self) -> u32 {
        self.addr
    }

    /// Argument convention.
    pub fn mode(&self) -> ArgsMode {
        self.mode
    }

    /// Return-value convention.
    pub fn ret_mode(&self) -> RetMode {
        self.ret
    }

    /// Code patches, possibly empty.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }
}

/// A named byte range within an address space.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    name: String,
    altname: String,
    offset: u32,
    size: u32,
}

impl Partition {
    /// Partition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name the on-device flash driver knows this partition by, falling
    /// back to [`Self::name`].
    pub fn altname(&self) -> &str {
        if self.altname.is_empty() {
            &self.name
        } else {
            &self.altname
        }
    }

    /// Byte offset within the enclosing space.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Size in bytes; 0 if unknown until a header is read.
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// How the CPU can reach an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemAccess {
    /// Only reachable through on-device driver functions.
    #[default]
    None,
    /// Memory-mapped, read-only.
    Ro,
    /// Memory-mapped, read-write.
    Rw,
}

/// A named address space: `ram`, `flash`, `nvram`, ...
#[derive(Debug, Clone, Default)]
pub struct AddrSpace {
    name: String,
    profile_name: String,
    ram: bool,
    mem: MemAccess,
    min: u32,
    size: u32,
    kseg1: u32,
    parts: Vec<Partition>,
}

impl AddrSpace {
    /// A new driver-backed space of `size` bytes starting at offset 0.
    pub fn new(name: &str, size: u32) -> Self {
        Self { name: name.to_owned(), size, ..Default::default() }
    }

    /// The CPU-visible `ram` space.
    pub fn ram(min: u32, size: u32) -> Self {
        Self { name: "ram".to_owned(), ram: true, mem: MemAccess::Rw, min, size, ..Default::default() }
    }

    /// Set the minimum address.
    pub fn min(mut self, min: u32) -> Self {
        self.min = min;
        self
    }

    /// Mark the space memory-mapped.
    pub fn mem(mut self, mem: MemAccess) -> Self {
        self.mem = mem;
        self
    }

    /// Add a partition.
    pub fn part(mut self, name: &str, offset: u32, size: u32) -> Self {
        self.parts.push(Partition {
            name: name.to_owned(),
            altname: String::new(),
            offset,
            size,
        });
        self
    }

    /// Add a partition with an alternate (driver) name.
    pub fn part_alt(mut self, name: &str, offset: u32, size: u32, altname: &str) -> Self {
        self.parts.push(Partition {
            name: name.to_owned(),
            altname: altname.to_owned(),
            offset,
            size,
        });
        self
    }

    /// Space name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the CPU's RAM.
    pub fn is_ram(&self) -> bool {
        self.ram
    }

    /// Whether the space is directly readable by the CPU.
    pub fn is_mem(&self) -> bool {
        self.ram || self.mem != MemAccess::None
    }

    /// Whether the space is directly writable by the CPU.
    pub fn is_writable(&self) -> bool {
        self.ram || self.mem == MemAccess::Rw
    }

    /// Minimum valid address.
    pub fn min_addr(&self) -> u32 {
        self.min
    }

    /// Size in bytes; 0 means open-ended.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Required offset alignment.
    pub fn alignment(&self) -> u32 {
        if self.ram {
            4
        } else {
            1
        }
    }

    /// All partitions.
    pub fn partitions(&self) -> &[Partition] {
        &self.parts
    }

    /// Look up a partition by name or driver name.
    pub fn partition(&self, name: &str) -> Result<&Partition, Error> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .or_else(|| self.parts.iter().find(|p| p.altname() == name))
            .ok_or_else(|| Error::NoSuchPartition {
                profile: self.profile_name.clone(),
                space: self.name.clone(),
                partition: name.to_owned(),
            })
    }

    /// Look up the partition starting at `offset`.
    pub fn partition_at(&self, offset: u32) -> Result<&Partition, Error> {
        self.parts.iter().find(|p| p.offset == offset).ok_or_else(|| Error::NoSuchPartition {
            profile: self.profile_name.clone(),
            space: self.name.clone(),
            partition: format!("@0x{offset:x}"),
        })
    }

    /// Check a single offset against the space bounds; returns the offset
    /// unchanged so address fields can be validated in place.
    pub fn check_offset(&self, offset: u32, what: &str) -> Result<u32, Error> {
        self.check_range(offset, 0, what)?;
        Ok(offset)
    }

    /// Check `[offset, offset + length)` against bounds and alignment.
    pub fn check_range(&self, offset: u32, length: u32, what: &str) -> Result<(), Error> {
        // a null address is used for "not configured"
        if offset == 0 && self.ram {
            return Ok(());
        } else if self.min == 0 && self.size == 0 {
            return Ok(());
        }

        let message;

        if offset % self.alignment() == 0 {
            let offset_c = offset & !self.kseg1;
            let last = offset_c.wrapping_add(length).wrapping_sub(1);
            let max = self.min.wrapping_add(self.size).wrapping_sub(1);

            if offset_c >= self.min && self.size != 0 && offset_c <= max {
                if length == 0 || last <= max {
                    return Ok(());
                }
            }

            if length != 0 {
                message = format!(
                    "invalid range {}:0x{offset:x}-0x{:x} ({what})",
                    self.name,
                    offset.wrapping_add(length).wrapping_sub(1)
                );
            } else {
                message = format!("invalid offset {}:0x{offset:x} ({what})", self.name);
            }
        } else {
            message = format!("unaligned offset {}:0x{offset:x} ({what})", self.name);
        }

        Err(Error::BadRange { profile: self.profile_name.clone(), message })
    }
}

/// A firmware fingerprint: a byte signature expected at a fixed RAM address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Magic {
    /// Absolute RAM address of the signature.
    pub addr: u32,
    /// The expected bytes.
    pub data: Vec<u8>,
}

impl Magic {
    /// A new fingerprint.
    pub fn new(addr: u32, data: &[u8]) -> Self {
        Self { addr, data: data.to_vec() }
    }

    /// Signature length.
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

/// Addresses needed by the uploaded dump/write payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeCfg {
    /// Where the payload is uploaded.
    pub loadaddr: u32,
    /// Scratch buffer for flash reads.
    pub buffer: u32,
    /// Scratch buffer length; 0 if unknown.
    pub buflen: u32,
    /// `printf` in the firmware.
    pub printf: u32,
    /// `scanf`, if the firmware has one.
    pub scanf: u32,
    /// `sscanf`, if the firmware has one.
    pub sscanf: u32,
    /// A `getline`-like console reader.
    pub getline: u32,
    /// Base address for uploaded code; must be 64k-aligned.
    pub rwcode: u32,
}

impl CodeCfg {
    fn or(self, def: &CodeCfg) -> CodeCfg {
        fn pick(a: u32, b: u32) -> u32 {
            if a != 0 {
                a
            } else {
                b
            }
        }

        CodeCfg {
            loadaddr: pick(self.loadaddr, def.loadaddr),
            buffer: pick(self.buffer, def.buffer),
            buflen: pick(self.buflen, def.buflen),
            printf: pick(self.printf, def.printf),
            scanf: pick(self.scanf, def.scanf),
            sscanf: pick(self.sscanf, def.sscanf),
            getline: pick(self.getline, def.getline),
            rwcode: pick(self.rwcode, def.rwcode),
        }
    }
}

/// A typed option value in a version's option bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptVal {
    /// A number (also used for booleans).
    Num(u32),
    /// A string.
    Str(&'static str),
}

/// The function set a version defines for one address space.
#[derive(Debug, Clone, Default)]
pub struct SpaceFuncs {
    /// Opens the space (or a range of it).
    pub open: Func,
    /// Reads from the space.
    pub read: Func,
    /// Writes to the space.
    pub write: Func,
    /// Erases a range.
    pub erase: Func,
    /// Closes the space.
    pub close: Func,
}

/// A firmware version record of a profile.
///
/// A version with an empty name is the *default* for its interface; named
/// versions inherit any zero-valued field from the default.
#[derive(Debug, Clone)]
pub struct Version {
    intf: InterfaceId,
    name: String,
    magic: Option<Magic>,
    codecfg: CodeCfg,
    functions: HashMap<String, SpaceFuncs>,
    options: HashMap<&'static str, OptVal>,
}

impl Version {
    /// A new (default) version record for `intf`.
    pub fn new(intf: InterfaceId) -> Self {
        Self {
            intf,
            name: String::new(),
            magic: None,
            codecfg: CodeCfg::default(),
            functions: HashMap::new(),
            options: HashMap::new(),
        }
    }

    /// Name this version.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    /// Set the fingerprint for this version.
    pub fn magic(mut self, addr: u32, data: &[u8]) -> Self {
        self.magic = Some(Magic::new(addr, data));
        self
    }

    /// Set the code configuration.
    pub fn codecfg(mut self, codecfg: CodeCfg) -> Self {
        self.codecfg = codecfg;
        self
    }

    /// Define a function for a space.
    pub fn func(mut self, space: &str, which: &str, func: Func) -> Self {
        let funcs = self.functions.entry(space.to_owned()).or_default();
        match which {
            "open" => funcs.open = func,
            "read" => funcs.read = func,
            "write" => funcs.write = func,
            "erase" => funcs.erase = func,
            "close" => funcs.close = func,
            other => panic!("unknown function slot {other}"),
        }
        self
    }

    /// Add an option.
    pub fn opt(mut self, name: &'static str, val: OptVal) -> Self {
        self.options.insert(name, val);
        self
    }

    /// The interface this version applies to.
    pub fn intf(&self) -> InterfaceId {
        self.intf
    }

    /// Version name; empty for the per-interface default.
    pub fn version_name(&self) -> &str {
        &self.name
    }

    /// Firmware fingerprint, if any.
    pub fn magic_ref(&self) -> Option<&Magic> {
        self.magic.as_ref()
    }

    /// Code configuration (with default-version inheritance applied).
    pub fn code_cfg(&self) -> &CodeCfg {
        &self.codecfg
    }

    /// Function set for `space`; all-zero if the version defines none.
    pub fn functions(&self, space: &str) -> SpaceFuncs {
        self.functions.get(space).cloned().unwrap_or_default()
    }

    /// A string option, with a fallback.
    pub fn opt_str(&self, name: &str, default: &'static str) -> &'static str {
        match self.options.get(name) {
            Some(OptVal::Str(s)) => s,
            _ => default,
        }
    }

    /// A numeric option, with a fallback.
    pub fn opt_num(&self, name: &str, default: u32) -> u32 {
        match self.options.get(name) {
            Some(OptVal::Num(n)) => *n,
            _ => default,
        }
    }

    /// Whether the option is present at all.
    pub fn has_opt(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    fn inherit(&self, def: &Version) -> Version {
        let mut merged = self.clone();
        merged.codecfg = self.codecfg.or(&def.codecfg);
        for (name, val) in &def.options {
            merged.options.entry(name).or_insert(*val);
        }
        merged
    }
}

/// Password-to-key derivation, for devices that encrypt settings files with
/// a user password.
pub type KeyFun = fn(password: &str) -> [u8; 32];

/// An immutable device profile.
pub struct Profile {
    name: &'static str,
    pretty: &'static str,
    arch: &'static str,
    baudrate: u32,
    pssig: u16,
    blsig: u16,
    kseg1: u32,
    cfg_flags: BitFlags<CfgFlag>,
    encryption: Encryption,
    padding: Padding,
    md5_key: Vec<u8>,
    default_keys: Vec<Vec<u8>>,
    keyfun: Option<KeyFun>,
    magics: Vec<Magic>,
    spaces: Vec<AddrSpace>,
    versions: Vec<Version>,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Profile {
    pub(crate) fn new(name: &'static str, pretty: &'static str) -> ProfileBuilder {
        ProfileBuilder {
            profile: Profile {
                name,
                pretty,
                arch: "",
                baudrate: 115200,
                pssig: 0,
                blsig: 0,
                kseg1: 0,
                cfg_flags: BitFlags::empty(),
                encryption: Encryption::None,
                padding: Padding::None,
                md5_key: Vec::new(),
                default_keys: Vec::new(),
                keyfun: None,
                magics: Vec::new(),
                spaces: Vec::new(),
                versions: Vec::new(),
            },
        }
    }

    /// Short name, used on the command line.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Human-readable device name.
    pub fn pretty(&self) -> &'static str {
        self.pretty
    }

    /// Architecture tag (`bcm3383`, ...).
    pub fn arch(&self) -> &'static str {
        self.arch
    }

    /// Default console baud rate.
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// ProgramStore image signature.
    pub fn pssig(&self) -> u16 {
        self.pssig
    }

    /// Bootloader image signature.
    pub fn blsig(&self) -> u16 {
        self.blsig
    }

    /// The MIPS kseg1 (uncached segment) mask OR'd into addresses to bypass
    /// the cache.
    pub fn kseg1(&self) -> u32 {
        self.kseg1
    }

    /// Settings file format flags.
    pub fn cfg_flags(&self) -> BitFlags<CfgFlag> {
        self.cfg_flags
    }

    /// Settings file cipher.
    pub fn encryption(&self) -> Encryption {
        self.encryption
    }

    /// Settings file padding scheme.
    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Key appended to the data before MD5-summing a GatewaySettings file.
    pub fn md5_key(&self) -> &[u8] {
        &self.md5_key
    }

    /// Built-in settings encryption keys to try, in order.
    pub fn default_keys(&self) -> &[Vec<u8>] {
        &self.default_keys
    }

    /// Derive a settings key from a password.
    pub fn derive_key(&self, password: &str) -> Result<Vec<u8>, Error> {
        match self.keyfun {
            Some(f) => Ok(f(password).to_vec()),
            None => Err(Error::NoKeyDerivation(self.name.to_owned())),
        }
    }

    /// Profile-level firmware fingerprints.
    pub fn magics(&self) -> &[Magic] {
        &self.magics
    }

    /// All address spaces.
    pub fn spaces(&self) -> &[AddrSpace] {
        &self.spaces
    }

    /// The `ram` space.
    pub fn ram(&self) -> &AddrSpace {
        self.spaces.iter().find(|s| s.is_ram()).expect("validated at registration")
    }

    /// Look up a space by name.
    pub fn space(&self, name: &str) -> Result<&AddrSpace, Error> {
        self.spaces.iter().find(|s| s.name == name).ok_or_else(|| Error::NoSuchSpace {
            profile: self.name.to_owned(),
            space: name.to_owned(),
        })
    }

    /// All version records, with default-version inheritance applied to the
    /// named ones.
    pub fn versions(&self) -> Vec<Version> {
        self.versions
            .iter()
            .filter(|v| !v.name.is_empty())
            .map(|v| v.inherit(self.default_version(v.intf)))
            .collect()
    }

    /// The default version record for an interface.
    pub fn default_version(&self, intf: InterfaceId) -> &Version {
        static EMPTY_BLDR: OnceLock<Version> = OnceLock::new();

        self.versions
            .iter()
            .find(|v| v.intf == intf && v.name.is_empty())
            .unwrap_or_else(|| EMPTY_BLDR.get_or_init(|| Version::new(InterfaceId::Bootloader)))
    }

    /// The global profile registry.
    pub fn list() -> &'static [Arc<Profile>] {
        static PROFILES: OnceLock<Vec<Arc<Profile>>> = OnceLock::new();
        PROFILES.get_or_init(data::profiles)
    }

    /// Look up a profile by (case-insensitive) name.
    pub fn get(name: &str) -> Result<Arc<Profile>, Error> {
        Self::list()
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| Error::NoSuchProfile(name.to_owned()))
    }
}

pub(crate) struct ProfileBuilder {
    profile: Profile,
}

impl ProfileBuilder {
    pub fn arch(mut self, arch: &'static str) -> Self {
        self.profile.arch = arch;
        self
    }

    pub fn baudrate(mut self, baudrate: u32) -> Self {
        self.profile.baudrate = baudrate;
        self
    }

    pub fn pssig(mut self, pssig: u16) -> Self {
        self.profile.pssig = pssig;
        self
    }

    pub fn blsig(mut self, blsig: u16) -> Self {
        self.profile.blsig = blsig;
        self
    }

    pub fn kseg1(mut self, kseg1: u32) -> Self {
        self.profile.kseg1 = kseg1;
        self
    }

    pub fn cfg_flags(mut self, flags: BitFlags<CfgFlag>) -> Self {
        self.profile.cfg_flags = flags;
        self
    }

    pub fn encryption(mut self, encryption: Encryption) -> Self {
        self.profile.encryption = encryption;
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.profile.padding = padding;
        self
    }

    pub fn md5_key(mut self, hex_key: &str) -> Self {
        self.profile.md5_key = hex::decode(hex_key).expect("md5 key is not valid hex");
        self
    }

    pub fn def_key(mut self, hex_key: &str) -> Self {
        self.profile.default_keys.push(hex::decode(hex_key).expect("key is not valid hex"));
        self
    }

    pub fn keyfun(mut self, keyfun: KeyFun) -> Self {
        self.profile.keyfun = Some(keyfun);
        self
    }

    pub fn magic(mut self, addr: u32, data: &[u8]) -> Self {
        self.profile.magics.push(Magic::new(addr, data));
        self
    }

    pub fn space(mut self, mut space: AddrSpace) -> Self {
        space.profile_name = self.profile.name.to_owned();
        if space.is_ram() {
            space.kseg1 = self.profile.kseg1;
        }
        if space.size == 0 && space.name == "ram" {
            // the implicit size runs up to the kseg1 boundary (or the end of
            // the 32-bit address space)
            let end = if space.kseg1 != 0 {
                space.min | space.kseg1
            } else {
                0u32
            };
            space.size = end.wrapping_sub(space.min);
        }
        self.profile.spaces.push(space);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.profile.versions.push(version);
        self
    }

    pub fn build(self) -> Arc<Profile> {
        let p = self.profile;

        assert!(
            p.spaces.iter().any(|s| s.is_ram()),
            "profile {}: no 'ram' address space defined",
            p.name
        );

        for space in &p.spaces {
            let mut names = std::collections::HashSet::new();
            for part in &space.parts {
                assert!(
                    names.insert(part.name.clone()),
                    "profile {}: {}: non-unique partition name {}",
                    p.name,
                    space.name,
                    part.name
                );
            }
        }

        Arc::new(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(Profile::get("TC7200").unwrap().name(), "tc7200");
        assert!(matches!(Profile::get("nope"), Err(Error::NoSuchProfile(_))));
    }

    #[test]
    fn test_every_profile_has_ram() {
        for p in Profile::list() {
            assert!(p.ram().is_ram(), "{}", p.name());
        }
    }

    #[test]
    fn test_check_range() {
        let p = Profile::get("tc7200").unwrap();
        let flash = p.space("flash").unwrap();

        assert!(flash.check_range(0x19c0000, 0x6c0000, "image1").is_ok());
        // beyond the end of the 64 MB flash
        assert!(flash.check_range(0x3dc0000, 0x1000000, "x").is_err());

        let ram = p.ram();
        // kseg1 addresses are accepted for ram
        assert!(ram.check_offset(0xa0002000, "rwcode").is_ok());
        assert!(ram.check_offset(0x80000001, "x").is_err(), "unaligned");
    }

    #[test]
    fn test_partition_lookup_by_altname() {
        let p = Profile::get("tc7200").unwrap();
        let nvram = p.space("nvram").unwrap();

        assert_eq!(nvram.partition("permnv").unwrap().offset(), 0x10000);
        assert_eq!(nvram.partition("perm").unwrap().name(), "permnv");
        assert!(nvram.partition("nope").is_err());
    }

    #[test]
    fn test_version_inheritance() {
        let p = Profile::get("tc7200").unwrap();
        let versions = p.versions();
        let v = versions
            .iter()
            .find(|v| v.version_name() == "STD6.02.42")
            .expect("tc7200 has a STD6.02.42 version");

        // inherited from the default BFC version
        assert_eq!(v.code_cfg().rwcode, 0x80002000);
        assert_eq!(v.code_cfg().buffer, 0x85f00000);
        assert_eq!(v.opt_str("bfc:su_password", "brcm"), "brcm");
        // own function table
        assert_eq!(v.functions("flash").read.addr(), 0x803f6d90);
        assert_eq!(v.functions("flash").read.patches().len(), 1);
    }

    #[test]
    fn test_derive_key() {
        let p = Profile::get("tc7200").unwrap();

        // empty password: the counting key
        let key = p.derive_key("").unwrap();
        assert_eq!(key[0], 0);
        assert_eq!(key[31], 31);

        // a password overlays the head of the key
        let key = p.derive_key("AB").unwrap();
        assert_eq!(&key[..2], b"AB");
        assert_eq!(key[2], 2);

        assert!(Profile::get("generic").unwrap().derive_key("x").is_err());
    }
}
