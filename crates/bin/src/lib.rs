//! Shared plumbing for the `cmdump` and `cmcfg` executables.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

use std::env;
use std::process;

use argh::FromArgs;
use miette::{Diagnostic, Result};
use thiserror::Error;

pub use cmkit_errors::Error as ExplainError;

/// Front-end errors shared by both binaries.
#[derive(Debug, Diagnostic, Error)]
pub enum Error {
    /// The command line could not be parsed.
    #[error("I was not able to read the command line properly:\n{0}")]
    #[diagnostic(code(E001), help("See the command-line usage with `--help`."))]
    CommandLine(String),

    /// An argument contained invalid Unicode.
    #[error("the argument `{0}` contains invalid Unicode data")]
    InvalidArgumentEncoding(String),
}

/// Parse `argv` into an argh-derived options type, handling `--help` the
/// way argh wants it handled.
pub fn from_env<T: FromArgs>() -> Result<T, Error> {
    let arguments = env::args_os()
        .map(|a| a.into_string())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|bad| Error::InvalidArgumentEncoding(bad.to_string_lossy().into_owned()))?;

    let command = arguments
        .first()
        .map(|argv0| {
            std::path::Path::new(argv0)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(argv0)
                .to_owned()
        })
        .unwrap_or_default();

    let rest: Vec<&str> = arguments.iter().skip(1).map(String::as_str).collect();

    match T::from_args(&[command.as_str()], &rest) {
        Ok(options) => Ok(options),
        Err(early_exit) => match early_exit.status {
            // --help and friends: print and leave
            Ok(()) => {
                println!("{}", early_exit.output);
                process::exit(0);
            }
            Err(()) => Err(Error::CommandLine(early_exit.output.trim().to_owned())),
        },
    }
}

/// Configure the log filter from `-v`/`-q` counts.
pub fn init_logging(verbose: u8, quiet: u8) {
    let level = match (quiet, verbose) {
        (q, _) if q >= 2 => log::LevelFilter::Error,
        (1, _) => log::LevelFilter::Warn,
        (_, 0) => log::LevelFilter::Info,
        (_, 1) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Handle `--explain Exxx`, exiting when it was requested.
pub fn maybe_explain(code: &Option<String>) -> Result<()> {
    if let Some(code) = code {
        println!("{}", ExplainError::explain(code)?);
        process::exit(0);
    }

    Ok(())
}

/// Install the `^C` handler that flips the RWX cancellation flag. A second
/// `^C` aborts the process.
pub fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if cmkit_device::rwx::was_interrupted() {
            process::exit(130);
        }
        cmkit_device::rwx::interrupt();
    });

    if let Err(e) = result {
        log::warn!("failed to install interrupt handler: {e}");
    }
}

/// Decode a `-k` hex key.
pub fn parse_key(key: &Option<String>) -> Result<Vec<u8>, miette::Report> {
    match key {
        Some(key) => {
            hex::decode(key).map_err(|_| miette::miette!("key is not a valid hex string"))
        }
        None => Ok(Vec::new()),
    }
}

/// Parse a `-f` format name.
pub fn parse_format(format: &Option<String>) -> Result<cmkit_nonvol::Format, miette::Report> {
    use cmkit_nonvol::Format;

    Ok(match format.as_deref() {
        None | Some("auto") => Format::Unknown,
        Some("gws") | Some("gwsettings") => Format::Gws,
        Some("gwsdyn") => Format::GwsDyn,
        Some("dyn") | Some("dynnv") => Format::Dyn,
        Some("perm") | Some("permnv") => Format::Perm,
        Some("boltenv") => Format::BoltEnv,
        Some(other) => return Err(miette::miette!("unknown format '{other}'")),
    })
}

/// Render the last device I/O lines for post-mortem diagnosis.
pub fn io_log_tail() -> String {
    let tail = cmkit_io::iolog::tail();
    if tail.is_empty() {
        String::new()
    } else {
        format!("\nlast device I/O:\n{}", tail.join("\n"))
    }
}

// the binaries pull these in through us, so the crates stay aligned
pub use cmkit_device;
pub use cmkit_io;
pub use cmkit_nonvol;
pub use cmkit_profile;
