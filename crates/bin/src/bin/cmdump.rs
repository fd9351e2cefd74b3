//! `cmdump` — dump, write, and execute code on Broadcom cable modems.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};

use argh::FromArgs;
use miette::{IntoDiagnostic, Result, WrapErr};

use cmkit_bin::{
    cmkit_device::{interface, ps::PsHeader, rwx},
    cmkit_profile::Profile,
};

/// Dump, write and execute code on Broadcom cable modems over their
/// bootloader or BFC console.
#[derive(Debug, FromArgs)]
struct CmDump {
    /// explain an error based on its code (of kind `E...`)
    #[argh(option)]
    explain: Option<String>,

    /// force a profile instead of auto-detecting
    #[argh(option, short = 'P')]
    profile: Option<String>,

    /// always use the safe (and slow) access methods
    #[argh(switch, short = 's')]
    safe: bool,

    /// resume a previous dump into the same output file
    #[argh(switch, short = 'R')]
    resume: bool,

    /// force dangerous operations (writes outside ram)
    #[argh(switch, short = 'F')]
    force: bool,

    /// increase verbosity
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// decrease verbosity
    #[argh(switch, short = 'q')]
    quiet: bool,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Dump(DumpCmd),
    Write(WriteCmd),
    Exec(ExecCmd),
    Scan(ScanCmd),
    Run(RunCmd),
    Info(InfoCmd),
}

/// dump data from an address space into a file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "dump")]
struct DumpCmd {
    /// interface spec (serial:/dev/ttyUSB0[,baud], tcp:host,port, telnet:host,user,pass[,port])
    #[argh(positional)]
    interface: String,

    /// address space (ram/flash/nvram/...)
    #[argh(positional)]
    space: String,

    /// range: {<partition>[+<off>],<off>}[,<size>|,auto]
    #[argh(positional)]
    range: String,

    /// output file
    #[argh(positional)]
    output: String,
}

/// write a file into an address space
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "write")]
struct WriteCmd {
    /// interface spec
    #[argh(positional)]
    interface: String,

    /// address space
    #[argh(positional)]
    space: String,

    /// range: {<partition>[+<off>],<off>}[,<size>]
    #[argh(positional)]
    range: String,

    /// input file
    #[argh(positional)]
    input: String,
}

/// upload code to ram and execute it
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "exec")]
struct ExecCmd {
    /// interface spec
    #[argh(positional)]
    interface: String,

    /// offset[,entry]
    #[argh(positional)]
    range: String,

    /// code image
    #[argh(positional)]
    input: String,
}

/// scan an address space for firmware image headers
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "scan")]
struct ScanCmd {
    /// interface spec
    #[argh(positional)]
    interface: String,

    /// address space
    #[argh(positional)]
    space: String,

    /// step size in bytes
    #[argh(positional)]
    step: String,

    /// start offset,size (both required for open-ended spaces)
    #[argh(positional)]
    range: Option<String>,
}

/// run raw commands on the device console
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCmd {
    /// interface spec
    #[argh(positional)]
    interface: String,

    /// commands to run
    #[argh(positional)]
    commands: Vec<String>,
}

/// show profile information
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "info")]
struct InfoCmd {
    /// interface spec; omit to describe the -P profile offline
    #[argh(positional)]
    interface: Option<String>,
}

fn pretty_size(size: u32) -> String {
    if size != 0 && size % (1024 * 1024) == 0 {
        format!("{} MB", size / (1024 * 1024))
    } else if size != 0 && size % 1024 == 0 {
        format!("{} KB", size / 1024)
    } else {
        format!("{size} B")
    }
}

fn print_profile(profile: &Profile) {
    println!("{}: {}", profile.name(), profile.pretty());
    println!("{}", "=".repeat(profile.name().len() + 2 + profile.pretty().len()));
    println!("pssig         0x{:04x}", profile.pssig());
    println!("blsig         0x{:04x}", profile.blsig());

    for space in profile.spaces() {
        print!("\n{:<12}  0x{:08x}", space.name(), space.min_addr());
        if space.size() != 0 {
            print!(
                " - 0x{:08x}  ({:>9})  ",
                space.min_addr() + space.size() - 1,
                pretty_size(space.size())
            );
        } else {
            print!("{}", " ".repeat(28));
        }
        println!("{}", if space.is_writable() { "RW" } else { "RO" });
        println!("{}", "-".repeat(54));

        if space.partitions().is_empty() {
            println!("(no partitions defined)");
        }

        for part in space.partitions() {
            print!("{:<12}  0x{:08x}", part.name(), part.offset());
            if part.size() != 0 {
                print!(
                    " - 0x{:08x}  ({:>9})",
                    part.offset() + part.size() - 1,
                    pretty_size(part.size())
                );
            }
            println!();
        }
    }
}

fn progress_printer() -> rwx::ProgressListener {
    Box::new(|offset, _length| {
        print!("\r 0x{offset:08x} ");
        let _ = std::io::stdout().flush();
    })
}

fn image_printer() -> rwx::ImageListener {
    Box::new(|offset, hdr: &PsHeader| {
        println!(
            "\ndetected image at 0x{offset:08x}: '{}', {} b (sig 0x{:04x})",
            hdr.filename, hdr.length, hdr.signature
        );
    })
}

fn run(options: &CmDump) -> Result<()> {
    let profile = options.profile.as_deref();

    let Some(command) = &options.command else {
        return Err(miette::miette!("no command given; see --help"));
    };

    match command {
        Command::Dump(cmd) => {
            let intf = interface::create(&cmd.interface, profile)?;
            let mut rwx = rwx::create(&intf, &cmd.space, options.safe)?;
            let (offset, length) = rwx::parse_range(&mut rwx, &cmd.range, false)?;

            let (mut file, completed) = if options.resume {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(&cmd.output)
                    .into_diagnostic()
                    .wrap_err_with(|| cmd.output.clone())?;

                let completed = file.metadata().into_diagnostic()?.len() as u32;

                // drop the (possibly torn) tail that the engine is going to
                // re-dump, so file and device stream stay in lock step
                let overlap = rwx.limits_read().max * 2;
                let aligned = completed - completed % overlap.max(1);
                let start = aligned.saturating_sub(overlap);

                file.set_len(u64::from(start)).into_diagnostic()?;
                file.seek(std::io::SeekFrom::End(0)).into_diagnostic()?;
                (file, completed)
            } else {
                (
                    File::create(&cmd.output)
                        .into_diagnostic()
                        .wrap_err_with(|| cmd.output.clone())?,
                    0,
                )
            };

            rwx.set_progress_listener(progress_printer());
            rwx.set_image_listener(image_printer());

            rwx.dump(offset, length, &mut file, completed)?;
            println!("\ndumped {length} b from 0x{offset:08x}");
            Ok(())
        }
        Command::Write(cmd) => {
            let intf = interface::create(&cmd.interface, profile)?;
            let mut rwx = rwx::create(&intf, &cmd.space, options.safe)?;
            let (offset, length) = rwx::parse_range(&mut rwx, &cmd.range, true)?;

            if !rwx.space().is_ram() && !options.force {
                return Err(miette::miette!(
                    "writing to {} is dangerous; repeat with -F to proceed",
                    cmd.space
                ));
            }

            let mut data = Vec::new();
            File::open(&cmd.input)
                .into_diagnostic()
                .wrap_err_with(|| cmd.input.clone())?
                .read_to_end(&mut data)
                .into_diagnostic()?;

            if length != 0 && (length as usize) < data.len() {
                data.truncate(length as usize);
            }

            rwx.set_progress_listener(progress_printer());
            rwx.write(offset, &data)?;
            println!("\nwrote {} b at 0x{offset:08x}", data.len());
            Ok(())
        }
        Command::Exec(cmd) => {
            let intf = interface::create(&cmd.interface, profile)?;
            let mut rwx = rwx::create(&intf, "ram", options.safe)?;

            let (offset, entry) = match cmd.range.split_once(',') {
                Some((offset, entry)) => {
                    (rwx::parse_num(offset)?, rwx::parse_num(entry)?)
                }
                None => {
                    let offset = rwx::parse_num(&cmd.range)?;
                    (offset, offset)
                }
            };

            let mut data = Vec::new();
            File::open(&cmd.input)
                .into_diagnostic()
                .wrap_err_with(|| cmd.input.clone())?
                .read_to_end(&mut data)
                .into_diagnostic()?;

            rwx.set_progress_listener(progress_printer());
            rwx.write(offset, &data)?;
            rwx.exec(entry)?;
            println!("\nexecuted code at 0x{entry:08x}");
            Ok(())
        }
        Command::Scan(cmd) => {
            let intf = interface::create(&cmd.interface, profile)?;
            let mut rwx = rwx::create(&intf, &cmd.space, options.safe)?;

            let step = rwx::parse_num(&cmd.step)?;
            if step == 0 {
                return Err(miette::miette!("step must not be 0"));
            }

            let (start_str, size_str) = match &cmd.range {
                Some(range) => match range.split_once(',') {
                    Some((start, size)) => (Some(start), Some(size)),
                    None => (Some(range.as_str()), None),
                },
                None => (None, None),
            };
            let start = match start_str {
                Some(start) => rwx::parse_num(start)?,
                None => rwx.space().min_addr(),
            };
            let size = match size_str {
                Some(size) => rwx::parse_num(size)?,
                None => rwx.space().size(),
            };

            if size == 0 {
                return Err(miette::miette!(
                    "the size of {} is unknown; pass <start> <size>",
                    cmd.space
                ));
            }

            rwx.silent(true);

            let mut found = 0;
            let mut offset = start;
            while offset < start.saturating_add(size) {
                if rwx::was_interrupted() {
                    return Err(cmkit_bin::cmkit_device::Error::Interrupted.into());
                }

                let header = rwx.read(offset, 92)?;
                if let Some(hdr) = PsHeader::parse(&header) {
                    if hdr.hcs_valid() {
                        println!(
                            "0x{offset:08x}: '{}', {} b, sig 0x{:04x}",
                            hdr.filename, hdr.length, hdr.signature
                        );
                        found += 1;
                    }
                }

                offset = offset.saturating_add(step);
            }

            println!("{found} image(s) found");
            Ok(())
        }
        Command::Run(cmd) => {
            let intf = interface::create(&cmd.interface, profile)?;

            for command in &cmd.commands {
                let mut borrowed = intf.borrow_mut();
                borrowed.runcmd(command)?;
                borrowed.foreach_line(
                    |line| {
                        println!("{line}");
                        false
                    },
                    0,
                    1000,
                )?;
            }

            Ok(())
        }
        Command::Info(cmd) => {
            match &cmd.interface {
                Some(spec) => {
                    let intf = interface::create(spec, profile)?;
                    let borrowed = intf.borrow();
                    match borrowed.profile() {
                        Some(profile) => print_profile(profile),
                        None => println!("no profile detected"),
                    }
                }
                None => {
                    let name = options
                        .profile
                        .as_deref()
                        .ok_or_else(|| miette::miette!("pass an interface or -P <profile>"))?;
                    print_profile(Profile::get(name)?.as_ref());
                }
            }
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let options: CmDump = cmkit_bin::from_env()?;

    cmkit_bin::init_logging(u8::from(options.verbose), u8::from(options.quiet));
    cmkit_bin::maybe_explain(&options.explain)?;
    cmkit_bin::install_interrupt_handler();

    run(&options).map_err(|report| {
        // interface and protocol failures get the recent device I/O
        // attached; plain usage errors do not
        let device_error = matches!(
            report.downcast_ref::<cmkit_bin::cmkit_device::Error>(),
            Some(e) if !matches!(e, cmkit_bin::cmkit_device::Error::BadArgument(_))
        );
        if device_error {
            eprint!("{}", cmkit_bin::io_log_tail());
        }
        report
    })
}
