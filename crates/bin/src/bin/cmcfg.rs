//! `cmcfg` — inspect and edit Broadcom cable modem settings files.

use std::fs;

use argh::FromArgs;
use miette::{IntoDiagnostic, Result, WrapErr};

use cmkit_bin::cmkit_nonvol::{NvVal, Settings};
use cmkit_bin::cmkit_profile::Profile;

/// Inspect and edit GatewaySettings backups, permnv/dynnv images, and
/// BOLT environment blocks.
#[derive(Debug, FromArgs)]
struct CmCfg {
    /// explain an error based on its code (of kind `E...`)
    #[argh(option)]
    explain: Option<String>,

    /// force a profile instead of auto-detecting
    #[argh(option, short = 'P')]
    profile: Option<String>,

    /// encryption password
    #[argh(option, short = 'p')]
    password: Option<String>,

    /// encryption key (hex)
    #[argh(option, short = 'k')]
    key: Option<String>,

    /// file format: auto, gws, gwsdyn, dyn, perm, boltenv
    #[argh(option, short = 'f')]
    format: Option<String>,

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
    Verify(VerifyCmd),
    Fix(FixCmd),
    Encrypt(EncryptCmd),
    Decrypt(DecryptCmd),
    Get(GetCmd),
    Set(SetCmd),
    List(ListCmd),
    Dump(DumpCmd),
    Type(TypeCmd),
    Info(InfoCmd),
}

/// verify the checksums of a settings file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "verify")]
struct VerifyCmd {
    /// input file
    #[argh(positional)]
    input: String,
}

/// rewrite a settings file, recomputing its checksums
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "fix")]
struct FixCmd {
    /// input file
    #[argh(positional)]
    input: String,

    /// output file (defaults to the input)
    #[argh(positional)]
    output: Option<String>,
}

/// encrypt a settings file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "encrypt")]
struct EncryptCmd {
    /// input file
    #[argh(positional)]
    input: String,

    /// output file
    #[argh(positional)]
    output: String,
}

/// decrypt a settings file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "decrypt")]
struct DecryptCmd {
    /// input file
    #[argh(positional)]
    input: String,

    /// output file
    #[argh(positional)]
    output: String,
}

/// print one value (or everything)
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "get")]
struct GetCmd {
    /// input file
    #[argh(positional)]
    input: String,

    /// dotted value path, e.g. userif.http_user
    #[argh(positional)]
    name: Option<String>,
}

/// change a value
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "set")]
struct SetCmd {
    /// input file
    #[argh(positional)]
    input: String,

    /// dotted value path
    #[argh(positional)]
    name: String,

    /// new value
    #[argh(positional)]
    value: String,

    /// output file (defaults to the input)
    #[argh(positional)]
    output: Option<String>,
}

/// list value names and types
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "list")]
struct ListCmd {
    /// input file
    #[argh(positional)]
    input: String,

    /// restrict the listing to one group
    #[argh(positional)]
    name: Option<String>,
}

/// print the full canonical contents
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "dump")]
struct DumpCmd {
    /// input file
    #[argh(positional)]
    input: String,
}

/// show the type of a value
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "type")]
struct TypeCmd {
    /// input file
    #[argh(positional)]
    input: String,

    /// dotted value path
    #[argh(positional)]
    name: String,
}

/// print the container header
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "info")]
struct InfoCmd {
    /// input file
    #[argh(positional)]
    input: String,
}

fn load(options: &CmCfg, path: &str) -> Result<Settings> {
    let data = fs::read(path).into_diagnostic().wrap_err_with(|| path.to_owned())?;

    let profile = match &options.profile {
        Some(name) => Some(Profile::get(name)?),
        None => None,
    };

    let settings = Settings::read(
        &data,
        cmkit_bin::parse_format(&options.format)?,
        profile,
        cmkit_bin::parse_key(&options.key)?,
        options.password.clone().unwrap_or_default(),
    )?;

    Ok(settings)
}

fn save(settings: &Settings, path: &str) -> Result<()> {
    let data = settings.write()?;
    fs::write(path, data).into_diagnostic().wrap_err_with(|| path.to_owned())?;
    Ok(())
}

fn list_parts(val: &dyn NvVal, prefix: &str, out: &mut Vec<String>) {
    for named in val.parts() {
        if named.val.is_disabled() {
            continue;
        }

        let path = if prefix.is_empty() {
            named.name.clone()
        } else {
            format!("{prefix}.{}", named.name)
        };

        out.push(format!("{path} ({})", named.val.type_name()));
        list_parts(&*named.val, &path, out);
    }
}

fn run(options: &CmCfg) -> Result<()> {
    let Some(command) = &options.command else {
        return Err(miette::miette!("no command given; see --help"));
    };

    match command {
        Command::Verify(cmd) => {
            let settings = load(options, &cmd.input)?;
            print!("{}", settings.info());

            if settings.is_valid() && settings.checksum_valid() {
                Ok(())
            } else {
                Err(miette::miette!("verification failed"))
            }
        }
        Command::Fix(cmd) => {
            let settings = load(options, &cmd.input)?;
            save(&settings, cmd.output.as_deref().unwrap_or(&cmd.input))?;
            println!("checksums rewritten");
            Ok(())
        }
        Command::Encrypt(cmd) => {
            let mut settings = load(options, &cmd.input)?;

            let key = match &settings {
                Settings::Gws(gws) => {
                    let profile = gws
                        .profile()
                        .ok_or_else(|| miette::miette!("encryption requires a profile"))?;

                    let explicit = cmkit_bin::parse_key(&options.key)?;
                    if !explicit.is_empty() {
                        explicit
                    } else if let Some(password) = &options.password {
                        profile.derive_key(password)?
                    } else {
                        profile
                            .default_keys()
                            .first()
                            .cloned()
                            .ok_or_else(|| miette::miette!("no key; pass -k or -p"))?
                    }
                }
                _ => {
                    let explicit = cmkit_bin::parse_key(&options.key)?;
                    if explicit.is_empty() {
                        return Err(miette::miette!("this format requires -k"));
                    }
                    explicit
                }
            };

            match &mut settings {
                Settings::Gws(gws) => gws.set_key(key),
                Settings::PermDyn(s) => s.set_key(key),
                Settings::BoltEnv(s) => s.set_key(key),
            }

            save(&settings, &cmd.output)?;
            println!("encrypted to {}", cmd.output);
            Ok(())
        }
        Command::Decrypt(cmd) => {
            let mut settings = load(options, &cmd.input)?;

            match &mut settings {
                Settings::Gws(gws) => gws.set_key(Vec::new()),
                Settings::PermDyn(s) => s.set_key(Vec::new()),
                Settings::BoltEnv(s) => s.set_key(Vec::new()),
            }

            save(&settings, &cmd.output)?;
            println!("decrypted to {}", cmd.output);
            Ok(())
        }
        Command::Get(cmd) => {
            let settings = load(options, &cmd.input)?;

            match &cmd.name {
                Some(name) => println!("{name} = {}", settings.get(name)?.to_pretty()),
                None => print!("{}", settings.render(true)),
            }
            Ok(())
        }
        Command::Set(cmd) => {
            let mut settings = load(options, &cmd.input)?;
            settings.set(&cmd.name, &cmd.value)?;
            println!("{} = {}", cmd.name, settings.get(&cmd.name)?.to_pretty());

            save(&settings, cmd.output.as_deref().unwrap_or(&cmd.input))?;
            Ok(())
        }
        Command::List(cmd) => {
            let settings = load(options, &cmd.input)?;
            let mut names = Vec::new();

            match &cmd.name {
                Some(name) => list_parts(settings.get(name)?, name, &mut names),
                None => {
                    for group in settings.groups() {
                        names.push(format!("{} ({})", group.name, group.val.type_name()));
                        list_parts(&*group.val, &group.name, &mut names);
                    }
                }
            }

            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Command::Dump(cmd) => {
            let settings = load(options, &cmd.input)?;
            print!("{}", settings.render(false));
            Ok(())
        }
        Command::Type(cmd) => {
            let settings = load(options, &cmd.input)?;
            println!("{}", settings.get(&cmd.name)?.type_name());
            Ok(())
        }
        Command::Info(cmd) => {
            let settings = load(options, &cmd.input)?;
            print!("{}", settings.info());
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let options: CmCfg = cmkit_bin::from_env()?;

    cmkit_bin::init_logging(u8::from(options.verbose), u8::from(options.quiet));
    cmkit_bin::maybe_explain(&options.explain)?;

    run(&options)
}
