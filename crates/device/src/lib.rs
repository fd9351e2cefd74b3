//! `cmkit-device` drives the consoles of Broadcom cable modems: it detects
//! which CLI is listening on a byte stream, elevates privileges, matches
//! the firmware against the profile registry, and turns byte-range
//! read/write/exec requests into sequences of console commands.
//!
//! The remote access layer is organized as *RWX drivers* (see [`rwx`]):
//! each driver knows how to move bytes over one particular console
//! mechanism, from one-word-per-roundtrip bootloader peeks up to uploaded
//! MIPS payloads streaming sixteen bytes per line.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

pub mod interface;
pub mod ps;
pub mod rwx;

use miette::Diagnostic;
use thiserror::Error as ThisError;

pub use interface::{Interface, InterfaceRef};
pub use ps::PsHeader;

/// Errors of the interface and RWX layers.
#[derive(Debug, Diagnostic, ThisError)]
pub enum Error {
    /// A transport error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Io(#[from] cmkit_io::Error),

    /// A profile lookup or range check failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Profile(#[from] cmkit_profile::Error),

    /// Payload assembly failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Mips(#[from] cmkit_mips::Error),

    /// No known console was detected on the stream.
    #[error("interface auto-detection failed")]
    #[diagnostic(
        code(E002),
        help("Check the connection and baud rate; some consoles need a few newlines first.")
    )]
    NoInterface,

    /// The telnet server did not accept the credentials.
    #[error("telnet login failed")]
    LoginFailed,

    /// The telnet server blocked this client.
    #[error("ip is blocked by server")]
    Blocked,

    /// A command was issued before authentication.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A chunk could not be transferred, even after retrying.
    #[error("chunk at 0x{offset:08x} failed after {retries} retries: {message}")]
    #[diagnostic(
        code(E004),
        help("Console noise often interleaves with dumps; retry, or use the slow path (-s).")
    )]
    ChunkFailed {
        /// Chunk offset.
        offset: u32,
        /// Retries performed.
        retries: u32,
        /// The last failure, usually quoting the offending line.
        message: String,
    },

    /// The operation was cancelled with `^C`.
    #[error("interrupted")]
    Interrupted,

    /// Bad user-supplied range or argument.
    #[error("{0}")]
    BadArgument(String),

    /// The driver cannot perform the requested operation.
    #[error("{0}")]
    Unsupported(String),

    /// The device sent something the driver cannot parse.
    #[error("{0}")]
    Protocol(String),
}

/// Convenience result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
