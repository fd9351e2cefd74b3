//! Console detection, privilege handling, and firmware fingerprinting.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cmkit_io::ByteStream;
use cmkit_profile::{InterfaceId, Magic, Profile, Version};

use crate::{rwx, Error, Result};

fn is_bfc_prompt_with(line: &str, prompt: &str) -> bool {
    line.contains(&format!("{prompt}>")) || line.contains(&format!("{prompt}/"))
}

fn is_bfc_prompt_privileged(line: &str) -> bool {
    is_bfc_prompt_with(line, "CM") || is_bfc_prompt_with(line, "RG")
}

fn is_bfc_prompt_unprivileged(line: &str) -> bool {
    is_bfc_prompt_with(line, "RG_Console")
        || is_bfc_prompt_with(line, "CM_Console")
        || is_bfc_prompt_with(line, "Console")
}

fn is_bfc_prompt_rg(line: &str) -> bool {
    is_bfc_prompt_with(line, "RG_Console") || is_bfc_prompt_with(line, "RG")
}

fn is_bfc_prompt(line: &str) -> bool {
    is_bfc_prompt_privileged(line) || is_bfc_prompt_unprivileged(line)
}

fn is_login_prompt(line: &str) -> bool {
    line.contains("Login:") || line.contains("login:")
}

/// The kind of console detected on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The bootloader's single-letter menu.
    Bootloader,
    /// The BFC shell on a serial console.
    Bfc,
    /// The BFC shell behind its telnet daemon.
    BfcTelnet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TelnetStatus {
    Invalid,
    Connected,
    Authenticated,
}

/// A detected device console.
///
/// Holds the byte stream, the bound profile and firmware version, and the
/// privilege state of the BFC shell.
pub struct Interface {
    stream: Box<dyn ByteStream>,
    kind: Kind,
    profile: Option<Arc<Profile>>,
    version: Option<Version>,
    privileged: bool,
    rg_prompt: bool,
    telnet_status: TelnetStatus,
    have_login_prompt: bool,
}

/// The shared handle the RWX drivers hold on an interface.
///
/// The whole stack is single-threaded and cooperative; drivers borrow the
/// interface only for the duration of a console exchange.
pub type InterfaceRef = Rc<RefCell<Interface>>;

impl Interface {
    /// Default per-line timeout, milliseconds.
    const LINE_TIMEOUT: u32 = 50;

    fn new(stream: Box<dyn ByteStream>, kind: Kind) -> Self {
        Self {
            stream,
            kind,
            profile: None,
            version: None,
            privileged: false,
            rg_prompt: false,
            telnet_status: TelnetStatus::Invalid,
            have_login_prompt: false,
        }
    }

    /// The console kind's name.
    pub fn name(&self) -> &'static str {
        match self.kind {
            Kind::Bootloader => "bootloader",
            Kind::Bfc => "bfc",
            Kind::BfcTelnet => "bfc-telnet",
        }
    }

    /// The interface id used to select profile versions.
    pub fn id(&self) -> InterfaceId {
        match self.kind {
            Kind::Bootloader => InterfaceId::Bootloader,
            Kind::Bfc | Kind::BfcTelnet => InterfaceId::Bfc,
        }
    }

    /// The bound profile.
    pub fn profile(&self) -> Option<&Arc<Profile>> {
        self.profile.as_ref()
    }

    /// Bind a profile, selecting the interface's default version.
    pub fn set_profile(&mut self, profile: Arc<Profile>) {
        self.version = Some(profile.default_version(self.id()).clone());
        self.profile = Some(profile);
    }

    /// Bind a profile and a specific firmware version.
    pub fn set_profile_version(&mut self, profile: Arc<Profile>, version: Version) {
        self.profile = Some(profile);
        self.version = Some(version);
    }

    /// The bound firmware version (the default version when detection did
    /// not find a specific one).
    pub fn version(&self) -> Version {
        match &self.version {
            Some(v) => v.clone(),
            None => Version::new(self.id()),
        }
    }

    /// Whether the console currently has super-user rights.
    pub fn is_privileged(&self) -> bool {
        match self.kind {
            Kind::Bootloader => true,
            _ => self.privileged,
        }
    }

    /// Send an empty line.
    pub fn writeln_empty(&mut self) -> Result<()> {
        self.stream.writeln("")?;
        Ok(())
    }

    /// Send a line.
    pub fn writeln(&mut self, line: &str) -> Result<()> {
        self.stream.writeln(line)?;
        Ok(())
    }

    /// Send raw bytes, no line terminator.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write(data)?;
        Ok(())
    }

    /// Read one line with the default timeout.
    pub fn readln(&mut self) -> Result<Option<String>> {
        Ok(self.stream.readln(Self::LINE_TIMEOUT)?)
    }

    /// Wait for pending input.
    pub fn pending(&mut self, timeout: u32) -> Result<bool> {
        let timeout = if timeout == 0 { Self::LINE_TIMEOUT } else { timeout };
        Ok(self.stream.pending(timeout)?)
    }

    /// Issue a command appropriate for the console kind.
    ///
    /// The bootloader menu takes raw characters; BFC takes lines.
    pub fn runcmd(&mut self, cmd: &str) -> Result<()> {
        match self.kind {
            Kind::Bootloader => self.write(cmd.as_bytes()),
            Kind::Bfc => self.writeln(cmd),
            Kind::BfcTelnet => {
                if self.telnet_status < TelnetStatus::Authenticated {
                    return Err(Error::NotAuthenticated);
                }
                self.writeln(cmd)
            }
        }
    }

    /// Issue a command and scan subsequent lines for a substring.
    pub fn runcmd_expect(
        &mut self,
        cmd: &str,
        expect: &str,
        stop_on_match: bool,
    ) -> Result<bool> {
        self.runcmd(cmd)?;

        let mut matched = false;
        self.foreach_line(
            |line| {
                if line.contains(expect) {
                    matched = true;
                    if stop_on_match {
                        return true;
                    }
                }
                false
            },
            0,
            0,
        )?;

        Ok(matched)
    }

    /// Consume lines until `f` returns true, the line flow dries up, or
    /// the total budget expires. Timeouts of 0 select the defaults.
    pub fn foreach_line(
        &mut self,
        mut f: impl FnMut(&str) -> bool,
        timeout: u32,
        line_timeout: u32,
    ) -> Result<bool> {
        let start = Instant::now();
        let budget = Duration::from_millis(u64::from(timeout));

        while self.pending(line_timeout)? {
            if timeout != 0 && start.elapsed() >= budget {
                break;
            }

            let Some(line) = self.readln()? else {
                break;
            };

            if f(line.trim()) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Whether the console answers with its prompt (or menu).
    pub fn is_ready(&mut self, passive: bool) -> Result<bool> {
        match self.kind {
            Kind::Bootloader => {
                if !passive {
                    self.writeln_empty()?;
                }
                self.foreach_line(|line| line.contains("Main Menu"), 2000, 0)
            }
            Kind::Bfc => self.bfc_is_ready(passive),
            Kind::BfcTelnet => {
                if self.telnet_status < TelnetStatus::Authenticated {
                    if !passive {
                        self.writeln_empty()?;
                    }

                    let mut status = self.telnet_status;
                    let mut login_prompt = false;
                    let mut blocked = false;

                    self.foreach_line(
                        |line| {
                            if line.contains("BFC Telnet") {
                                status = TelnetStatus::Connected;
                            } else if status == TelnetStatus::Connected {
                                if line.contains("refused")
                                    || line.contains("logged and reported")
                                {
                                    blocked = true;
                                    return true;
                                } else if is_login_prompt(line) {
                                    login_prompt = true;
                                    return true;
                                }
                            }
                            false
                        },
                        0,
                        1000,
                    )?;

                    if blocked {
                        return Err(Error::Blocked);
                    }

                    self.telnet_status = status;
                    self.have_login_prompt = login_prompt;
                    Ok(self.telnet_status >= TelnetStatus::Connected)
                } else {
                    self.bfc_is_ready(passive)
                }
            }
        }
    }

    fn bfc_is_ready(&mut self, passive: bool) -> Result<bool> {
        if !passive {
            self.writeln_empty()?;
        }

        let mut privileged = self.privileged;
        let ready = self.foreach_line(
            |line| {
                if is_bfc_prompt(line) {
                    privileged = is_bfc_prompt_privileged(line);
                    true
                } else {
                    false
                }
            },
            2000,
            0,
        )?;

        self.privileged = privileged;
        Ok(ready)
    }

    /// Poll [`Self::is_ready`] for up to `timeout` seconds.
    pub fn wait_ready(&mut self, timeout: u32) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_secs(u64::from(timeout));

        while Instant::now() < deadline {
            if self.is_ready(false)? {
                return Ok(true);
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        Ok(false)
    }

    fn check_privileged(&mut self) -> Result<bool> {
        let mut privileged = self.privileged;
        let mut rg_prompt = self.rg_prompt;

        self.foreach_line(
            |line| {
                if is_bfc_prompt_privileged(line) {
                    privileged = true;
                } else if is_bfc_prompt_unprivileged(line) {
                    privileged = false;
                }
                rg_prompt = is_bfc_prompt_rg(line);
                false
            },
            0,
            1000,
        )?;

        self.privileged = privileged;
        self.rg_prompt = rg_prompt;
        Ok(privileged)
    }

    /// Log in to the BFC telnet daemon.
    pub fn login(&mut self, user: &str, password: &str) -> Result<bool> {
        let mut have_prompt = self.have_login_prompt;
        let mut sent_newline = false;

        while !have_prompt {
            have_prompt = self.foreach_line(is_login_prompt, 0, 1000)?;

            if !have_prompt {
                if !sent_newline {
                    self.writeln_empty()?;
                    sent_newline = true;
                } else {
                    log::debug!("telnet: no login prompt");
                    return Ok(false);
                }
            }
        }

        self.writeln(user)?;

        let have_prompt = self.foreach_line(
            |line| line.contains("Password:") || line.contains("password:"),
            0,
            1000,
        )?;

        if !have_prompt {
            log::debug!("telnet: no password prompt");
            return Ok(false);
        }

        self.writeln(password)?;
        self.writeln_empty()?;

        let mut authenticated = false;
        self.foreach_line(
            |line| {
                if line.contains("Invalid login") {
                    return true;
                }
                if is_bfc_prompt(line) {
                    authenticated = true;
                }
                false
            },
            0,
            1000,
        )?;

        if authenticated {
            self.telnet_status = TelnetStatus::Authenticated;
            self.writeln_empty()?;
            self.writeln_empty()?;
            self.check_privileged()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Probe the stream for a console: the telnet daemon first (it announces
/// itself), then the bootloader menu, then a plain BFC prompt.
pub fn detect(stream: Box<dyn ByteStream>) -> Result<InterfaceRef> {
    let mut intf = Interface::new(stream, Kind::BfcTelnet);

    if intf.is_ready(true)? {
        return Ok(Rc::new(RefCell::new(intf)));
    }

    intf.kind = Kind::Bootloader;
    if intf.is_ready(false)? {
        return Ok(Rc::new(RefCell::new(intf)));
    }

    intf.kind = Kind::Bfc;
    if intf.is_ready(false)? {
        return Ok(Rc::new(RefCell::new(intf)));
    }

    Err(Error::NoInterface)
}

struct MagicCandidate {
    magic: Magic,
    profile: Arc<Profile>,
    version: Option<Version>,
    profile_max: u32,
}

fn magic_candidates(id: InterfaceId) -> Vec<MagicCandidate> {
    let mut candidates = Vec::new();

    for profile in Profile::list() {
        let mut profile_max = 0u32;

        for v in profile.versions() {
            if v.intf() == id {
                if let Some(m) = v.magic_ref() {
                    profile_max = profile_max.max(m.addr + m.size() - 1);
                }
            }
        }
        for m in profile.magics() {
            profile_max = profile_max.max(m.addr + m.size() - 1);
        }

        for v in profile.versions() {
            if v.intf() == id {
                if let Some(m) = v.magic_ref() {
                    candidates.push(MagicCandidate {
                        magic: m.clone(),
                        profile: profile.clone(),
                        version: Some(v.clone()),
                        profile_max,
                    });
                }
            }
        }

        for m in profile.magics() {
            candidates.push(MagicCandidate {
                magic: m.clone(),
                profile: profile.clone(),
                version: None,
                profile_max,
            });
        }
    }

    // ascending addresses, so a device with a small memory map is not asked
    // about offsets far outside it; longer magics win at equal addresses
    candidates.sort_by(|a, b| {
        a.profile_max
            .cmp(&b.profile_max)
            .then(a.magic.addr.cmp(&b.magic.addr))
            .then(b.magic.size().cmp(&a.magic.size()))
    });

    candidates
}

/// Fingerprint the firmware by probing magic addresses in RAM; the first
/// exact match binds profile and version.
pub fn detect_profile(intf: &InterfaceRef, forced: Option<Arc<Profile>>) -> Result<()> {
    if let Some(profile) = forced {
        intf.borrow_mut().set_profile(profile);
        return Ok(());
    }

    let id = intf.borrow().id();
    let mut ram = rwx::create(intf, "ram", true)?;

    for candidate in magic_candidates(id) {
        let data = match ram.read(candidate.magic.addr, candidate.magic.size()) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("magic probe at 0x{:08x}: {e}", candidate.magic.addr);
                continue;
            }
        };

        if data == candidate.magic.data {
            let mut intf = intf.borrow_mut();
            match candidate.version {
                Some(version) => {
                    log::info!(
                        "detected profile {} ({}), version {}",
                        candidate.profile.name(),
                        intf.name(),
                        version.version_name()
                    );
                    intf.set_profile_version(candidate.profile, version);
                }
                None => {
                    log::info!("detected profile {} ({})", candidate.profile.name(), intf.name());
                    intf.set_profile(candidate.profile);
                }
            }
            return Ok(());
        }
    }

    log::info!("profile auto-detection failed");
    Ok(())
}

/// Escalate BFC privileges: leave the RG console, try `su`, and as a last
/// resort set the privilege flag in the console thread control block.
pub fn elevate_privileges(intf: &InterfaceRef) -> Result<()> {
    {
        let intf = intf.borrow();
        if intf.kind == Kind::Bootloader {
            return Ok(());
        }
        if intf.kind == Kind::BfcTelnet && intf.telnet_status != TelnetStatus::Authenticated {
            return Ok(());
        }
    }

    {
        let mut intf = intf.borrow_mut();

        if !intf.privileged {
            intf.check_privileged()?;
        }

        if intf.rg_prompt {
            intf.runcmd("switchCpuConsole")?;
            std::thread::sleep(Duration::from_secs(1));
            intf.writeln_empty()?;
            intf.rg_prompt = false;
        }

        if intf.privileged {
            return Ok(());
        }

        intf.runcmd("su")?;
        std::thread::sleep(Duration::from_millis(200));
        let password = intf.version().opt_str("bfc:su_password", "brcm");
        intf.writeln(password)?;
        intf.writeln_empty()?;

        if intf.check_privileged()? {
            return Ok(());
        }
    }

    // last resort: flip the privilege flag inside the console thread's
    // control block, if the profile knows where it lives
    let (ct_instance, ct_priv_off) = {
        let intf = intf.borrow();
        let version = intf.version();
        (
            version.opt_num("bfc:conthread_instance", 0),
            version.opt_num("bfc:conthread_priv_off", 0),
        )
    };

    if ct_instance != 0 && ct_priv_off != 0 {
        let poke = || -> Result<()> {
            intf.borrow_mut().wait_ready(5)?;

            let mut ram = rwx::create(intf, "ram", true)?;
            ram.space().check_offset(ct_instance, "bfc:conthread_instance")?;

            let ptr = ram.read(ct_instance, 4)?;
            let addr = u32::from_be_bytes(ptr[..4].try_into().expect("read 4 bytes"))
                .wrapping_add(ct_priv_off);

            ram.space().check_offset(addr, "console_priv_flag")?;
            ram.write(addr, &[0x01])?;
            Ok(())
        };

        if let Err(e) = poke() {
            log::debug!("while writing to console thread instance: {e}");
        }

        intf.borrow_mut().writeln_empty()?;
    }

    let privileged = intf.borrow_mut().check_privileged()?;
    if !privileged {
        log::warn!("failed to switch to super-user; some functions might not work");
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn detect_for_tests(stream: Box<dyn ByteStream>) -> InterfaceRef {
    Rc::new(RefCell::new(Interface::new(stream, Kind::Bootloader)))
}

fn is_char_device(path: &str) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        std::fs::metadata(path).map(|m| m.file_type().is_char_device()).unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        false
    }
}

/// Open a byte stream from an interface spec, detect the console, log in
/// when applicable, bind a profile, and elevate privileges.
///
/// Accepted specs (the `type:` prefix is optional when unambiguous):
///
/// * `serial:/dev/ttyUSB0[,baudrate]`
/// * `tcp:host,port`
/// * `telnet:host,user,password[,port]`
pub fn create(spec: &str, profile_name: Option<&str>) -> Result<InterfaceRef> {
    let forced = match profile_name {
        Some(name) => Some(Profile::get(name)?),
        None => None,
    };

    let (kind, rest) = match spec.split_once(':') {
        Some((kind, rest)) if ["serial", "tcp", "telnet"].contains(&kind) => {
            (Some(kind), rest)
        }
        _ => (None, spec),
    };

    let tokens: Vec<&str> = rest.split(',').collect();

    let kind = match kind {
        Some(kind) => kind,
        None => match tokens.len() {
            1 => "serial",
            2 if is_char_device(tokens[0]) => "serial",
            2 => "tcp",
            3 | 4 => "telnet",
            _ => {
                return Err(Error::BadArgument(format!(
                    "ambiguous interface: '{spec}'; use a type: prefix (serial/tcp/telnet)"
                )))
            }
        },
    };

    let parse_port = |s: &str| -> Result<u16> {
        s.parse().map_err(|_| Error::BadArgument(format!("invalid port: '{s}'")))
    };

    match kind {
        "serial" => {
            let baudrate = match tokens.get(1) {
                Some(s) => s
                    .parse()
                    .map_err(|_| Error::BadArgument(format!("invalid baud rate: '{s}'")))?,
                None => forced.as_ref().map_or(115200, |p| p.baudrate()),
            };

            let intf = detect(cmkit_io::open_serial(tokens[0], baudrate)?)?;
            detect_profile(&intf, forced)?;
            elevate_privileges(&intf)?;
            Ok(intf)
        }
        "tcp" => {
            if tokens.len() != 2 {
                return Err(Error::BadArgument(format!("invalid tcp interface: '{spec}'")));
            }

            let intf = detect(cmkit_io::open_tcp(tokens[0], parse_port(tokens[1])?)?)?;
            detect_profile(&intf, forced)?;
            elevate_privileges(&intf)?;
            Ok(intf)
        }
        "telnet" => {
            if tokens.len() < 3 {
                return Err(Error::BadArgument(format!("invalid telnet interface: '{spec}'")));
            }

            let port = match tokens.get(3) {
                Some(s) => parse_port(s)?,
                None => 23,
            };

            let intf = detect(cmkit_io::open_telnet(tokens[0], port)?)?;

            let logged_in = {
                let mut borrowed = intf.borrow_mut();
                if borrowed.kind == Kind::BfcTelnet {
                    borrowed.login(tokens[1], tokens[2])?
                } else {
                    log::warn!("detected non-telnet interface");
                    true
                }
            };

            if !logged_in {
                return Err(Error::LoginFailed);
            }

            detect_profile(&intf, forced)?;
            elevate_privileges(&intf)?;
            Ok(intf)
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_matching() {
        assert!(is_bfc_prompt_privileged("CM> "));
        assert!(is_bfc_prompt_privileged("RG/Console> x"));
        assert!(is_bfc_prompt_unprivileged("CM_Console> "));
        assert!(is_bfc_prompt_unprivileged("Console>"));
        assert!(!is_bfc_prompt("something else"));
        assert!(is_bfc_prompt_rg("RG_Console>"));
        assert!(!is_bfc_prompt_privileged("CM_Console> "));
    }

    #[test]
    fn test_magic_candidates_sorted() {
        let candidates = magic_candidates(InterfaceId::Bfc);
        assert!(!candidates.is_empty());

        for pair in candidates.windows(2) {
            assert!(pair[0].profile_max <= pair[1].profile_max);
        }
    }
}
