//! `cmkit-mips` assembles the tiny MIPS payloads that the code-based
//! read/write drivers upload to the device.
//!
//! Instructions are built by const functions ([`asm`]) into `u32` words;
//! [`to_image`] serializes a word array to the big-endian byte image the
//! device expects. Branch targets are expressed through pseudo-instruction
//! *labels* (see [`asm::label`]) which [`resolve_labels`] removes, rewriting
//! every referring branch with the real PC-relative offset.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

pub mod asm;
mod payload;

use miette::Diagnostic;
use thiserror::Error;

pub use payload::{dumpcode, writecode};

/// The marker bit distinguishing a label id from a real branch offset.
pub const LABEL_MARKER: u32 = 0x8000;
const LABEL_MASK: u32 = 0x7fff;
const MAX_LABELS: u32 = 128;

/// Label resolution failures. These are programmer errors in a payload
/// definition and are never retried.
#[derive(Debug, Diagnostic, Error, PartialEq, Eq)]
pub enum Error {
    /// A label id is outside `0..128`.
    #[error("label {0} exceeds the maximum of 128")]
    LabelOutOfRange(u32),

    /// The same label id was defined twice.
    #[error("label {0} is defined more than once")]
    DuplicateLabel(u32),

    /// A branch refers to a label that was never defined.
    #[error("branch at word {0} refers to undefined label {1}")]
    UndefinedLabel(usize, u32),

    /// A resolved branch offset does not fit the 16-bit immediate.
    #[error("branch at word {0}: target out of range ({1})")]
    BranchOutOfRange(usize, i64),
}

fn op(word: u32) -> u32 {
    (word >> 26) & 0x3f
}

fn rs(word: u32) -> u32 {
    (word >> 21) & 0x1f
}

fn rt(word: u32) -> u32 {
    (word >> 16) & 0x1f
}

fn is_label_def(word: u32) -> bool {
    op(word) == asm::LABEL_OPCODE && rs(word) == 0 && rt(word) == 0 && (word & LABEL_MARKER) != 0
}

fn is_branch(word: u32) -> bool {
    matches!(op(word), 0x01 | 0x04..=0x07)
}

/// Resolve all labels in `code`, starting at the byte offset `entry`
/// (everything before it is data and is not touched).
///
/// Label pseudo-instructions are removed, shrinking the vector; branch
/// immediates carrying the [`LABEL_MARKER`] are rewritten to signed
/// PC-relative word offsets.
pub fn resolve_labels(code: &mut Vec<u32>, entry: usize) -> Result<(), Error> {
    let start = entry / 4;
    let mut labels = [usize::MAX; MAX_LABELS as usize];

    let mut i = start;
    while i < code.len() {
        let word = code[i];
        if !is_label_def(word) {
            i += 1;
            continue;
        }

        let label = word & LABEL_MASK;
        if label >= MAX_LABELS {
            return Err(Error::LabelOutOfRange(label));
        }
        if labels[label as usize] != usize::MAX {
            return Err(Error::DuplicateLabel(label));
        }

        labels[label as usize] = i;
        code.remove(i);
        // do not advance: the next word now sits at index i
    }

    for i in start..code.len() {
        let word = code[i];
        if !is_branch(word) {
            continue;
        }

        let imm = word & 0xffff;
        if imm & LABEL_MARKER == 0 {
            continue;
        }

        let label = imm & LABEL_MASK;
        if label >= MAX_LABELS {
            return Err(Error::LabelOutOfRange(label));
        }

        let target = labels[label as usize];
        if target == usize::MAX {
            return Err(Error::UndefinedLabel(i, label));
        }

        let diff = target as i64 - i as i64 - 1;
        if diff < i64::from(i16::MIN) || diff > i64::from(i16::MAX) {
            return Err(Error::BranchOutOfRange(i, diff));
        }

        code[i] = (word & 0xffff_0000) | (diff as u32 & 0xffff);
    }

    Ok(())
}

/// Serialize a word array to the big-endian byte image uploaded to the
/// device.
pub fn to_image(code: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(code.len() * 4);
    for word in code {
        out.extend_from_slice(&word.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::asm::*;
    use super::*;

    #[test]
    fn test_forward_branch() {
        let mut code = vec![
            beqz(V0, label_ref(1)),
            nop(),
            addiu(V0, V0, 1),
            label(1),
            jr(RA),
            nop(),
        ];

        resolve_labels(&mut code, 0).unwrap();

        assert_eq!(code.len(), 5);
        // branch at word 0, label lands at word 3: offset 3 - 0 - 1 = 2
        assert_eq!(code[0] & 0xffff, 2);
        // no label defs survive
        assert!(!code.iter().any(|&w| is_label_def(w)));
    }

    #[test]
    fn test_backward_branch() {
        let mut code = vec![
            label(5),
            addiu(V0, V0, -1i32 as u32),
            bgtz(V0, label_ref(5)),
            nop(),
        ];

        resolve_labels(&mut code, 0).unwrap();

        assert_eq!(code.len(), 3);
        // branch at word 1 back to word 0: offset 0 - 1 - 1 = -2
        assert_eq!(code[1] & 0xffff, 0xfffe);
    }

    #[test]
    fn test_undefined_label() {
        let mut code = vec![b(label_ref(7)), nop()];

        assert_eq!(resolve_labels(&mut code, 0), Err(Error::UndefinedLabel(0, 7)));
    }

    #[test]
    fn test_duplicate_label() {
        let mut code = vec![label(1), nop(), label(1)];

        assert_eq!(resolve_labels(&mut code, 0), Err(Error::DuplicateLabel(1)));
    }

    #[test]
    fn test_data_words_before_entry_are_not_scanned() {
        // this data word happens to look like a label definition
        let data = label(3);
        let mut code = vec![data, label(3), b(label_ref(3)), nop()];

        resolve_labels(&mut code, 4).unwrap();

        assert_eq!(code[0], data);
        assert_eq!(code.len(), 3);
    }
}
