//! The dump and write payload images.
//!
//! Each payload starts with a data header (magic, format strings, and a
//! block of config words that the host patches before execution) followed
//! by position-independent code. The final word holds a checksum over the
//! code, which the host uses to detect a payload already resident in RAM.

/// The magic in the first word of every payload.
pub const CODE_MAGIC: u32 = 0xbeefc0de;

/// The dump payload: prints a window of memory (or of a flash partition
/// read into a scratch buffer) as `:%x:%x:%x:%x` lines via the firmware's
/// `printf`.
pub mod dumpcode {
    use super::CODE_MAGIC;
    use crate::asm::*;

    /// Byte offset of the entry point.
    pub const ENTRY: usize = 0x4c;
    /// Flags word: the read function's argument convention.
    pub const OFF_FLAGS: usize = 0x0c;
    /// Running dump offset; non-zero while a dump is underway.
    pub const OFF_DUMP_OFFSET: usize = 0x10;
    /// Scratch buffer address.
    pub const OFF_BUFFER: usize = 0x14;
    /// Source offset.
    pub const OFF_OFFSET: usize = 0x18;
    /// Remaining length.
    pub const OFF_LENGTH: usize = 0x1c;
    /// Bytes printed per invocation.
    pub const OFF_CHUNK_SIZE: usize = 0x20;
    /// Address of `printf`.
    pub const OFF_PRINTF: usize = 0x24;
    /// Address of the flash read function, or 0 when dumping memory.
    pub const OFF_READ_FUNC: usize = 0x28;
    /// First of four `(address, word)` patch slots.
    pub const OFF_PATCHES: usize = 0x2c;

    const L_LOOP_PATCH: u32 = 0;
    const L_PATCH_DONE: u32 = 1;
    const L_READ_FLASH: u32 = 2;
    const L_LOOP_BZERO: u32 = 3;
    const L_START_DUMP: u32 = 4;
    const L_LOOP_LINE: u32 = 5;
    const L_LOOP_WORDS: u32 = 6;
    const L_OUT: u32 = 7;
    const F_PATCH: u32 = 8;

    /// Build the payload, config words zeroed, labels unresolved.
    pub fn code() -> Vec<u32> {
        vec![
            CODE_MAGIC,
            // ":%x"
            0x3a25_7800,
            // "\r\n"
            0x0d0a_0000,
            0, // flags
            0, // dump offset
            0, // buffer
            0, // offset (used when dumping flash)
            0, // length
            0, // chunk size
            0, // printf
            0, // <flash read function>
            0, // <patch offset 1>
            0, // <patch word 1>
            0, // <patch offset 2>
            0, // <patch word 2>
            0, // <patch offset 3>
            0, // <patch word 3>
            0, // <patch offset 4>
            0, // <patch word 4>
            // main:
            addiu(SP, SP, -0x1ci32 as u32),
            sw(RA, 0x00, SP),
            sw(S7, 0x04, SP),
            sw(S4, 0x08, SP),
            sw(S3, 0x0c, SP),
            sw(S2, 0x10, SP),
            sw(S1, 0x14, SP),
            sw(S0, 0x18, SP),
            // branch to next instruction
            bal(1),
            // delay slot: address mask
            lui(T0, 0xffff),
            // store ra & 0xffff0000
            and(S7, RA, T0),
            // buffer
            lw(S0, 0x14, S7),
            // offset
            lw(S1, 0x18, S7),
            // length
            lw(S2, 0x1c, S7),
            // bail out if length is zero
            beqz(S2, label_ref(L_OUT)),
            // delay slot: dump offset
            lw(S3, 0x10, S7),
            // branch to start_dump if we have a dump offset
            bnez(S3, label_ref(L_START_DUMP)),
            // delay slot: flash read function
            lw(S4, 0x28, S7),
            // patch code (affects only t0-t3)
            bal(label_ref(F_PATCH)),
            nop(),
            // if s4 is null, we're dumping RAM
            bnez(S4, label_ref(L_READ_FLASH)),
            // delay slot: load flags
            lw(V0, 0x0c, S7),
            // use memory offset as buffer
            mov(S0, S1),
            b(label_ref(L_START_DUMP)),
            // delay slot: store new buffer
            sw(S0, 0x14, S7),
            label(L_READ_FLASH),
            // set t0 to buffer
            mov(T0, S0),
            // set t1 to length
            mov(T1, T2),
            label(L_LOOP_BZERO),
            // zero word at t0
            sw(ZERO, 0, T0),
            // loop until t1 == 0
            addiu(T1, T1, -4i32 as u32),
            bgtz(T1, label_ref(L_LOOP_BZERO)),
            // delay slot: increment buffer
            addiu(T0, T0, 4),
            // set t0 if dump function is (buffer, offset, length)
            andi(T0, V0, 1),
            // set t1 if dump function is (offset, buffer, length)
            andi(T1, V0, 2),
            // set a0 = &buffer, a1 = offset, a2 = length
            addiu(A0, S7, 0x14),
            mov(A1, S1),
            mov(A2, S2),
            // if t0: set a0 = buffer
            movn(A0, S0, T0),
            // if t1: set a0 = offset and a1 = buffer
            movn(A0, S1, T1),
            movn(A1, S0, T1),
            // read from flash
            jalr(S4),
            // leave this here!
            nop(),
            label(L_START_DUMP),
            // save s2 (remaining length)
            mov(T2, S2),
            // set s2 to MIN(remaining length, chunk size)
            lw(S2, 0x20, S7),
            slt(T0, T2, S2),
            movn(S2, T2, T0),
            // increment buffer, offset and dump offset
            addu(S0, S0, S3),
            addu(S1, S1, S3),
            addu(S3, S3, S2),
            // store dump offset
            sw(S3, 0x10, S7),
            // load remaining length, decrement by s2, and store
            lw(T0, 0x1c, S7),
            subu(T0, T0, S2),
            sw(T0, 0x1c, S7),
            // set s4 to print function
            lw(S4, 0x24, S7),
            label(L_LOOP_LINE),
            // 4 words per line
            ori(S3, ZERO, 4),
            // load code offset
            mov(A0, S7),
            label(L_LOOP_WORDS),
            // printf(":%x", *s0)
            addiu(A0, A0, 4),
            jalr(S4),
            lw(A1, 0, S0),
            // increment offset and buffer
            addiu(S0, S0, 4),
            addiu(S1, S1, 4),
            // decrement length and loop counter
            addi(S2, S2, -4i32 as u32),
            addi(S3, S3, -1i32 as u32),
            bgtz(S3, label_ref(L_LOOP_WORDS)),
            // printf("\r\n")
            mov(A0, S7),
            jalr(S4),
            addiu(A0, A0, 0x8),
            // branch to loop_line if length > 0
            bgtz(S2, label_ref(L_LOOP_LINE)),
            // delay slot
            nop(),
            label(L_OUT),
            // restore code
            bal(label_ref(F_PATCH)),
            nop(),
            // restore registers
            lw(RA, 0x00, SP),
            lw(S7, 0x04, SP),
            lw(S4, 0x08, SP),
            lw(S3, 0x0c, SP),
            lw(S2, 0x10, SP),
            lw(S1, 0x14, SP),
            lw(S0, 0x18, SP),
            jr(RA),
            addiu(SP, SP, 0x1c),
            label(F_PATCH),
            // maximum of 4 words can be patched
            ori(V0, ZERO, 4),
            // pointer to first patch blob
            addiu(V1, S7, 0x2c),
            label(L_LOOP_PATCH),
            // load patch offset
            lw(A0, 0, V1),
            // break if patch offset is zero
            beqz(A0, label_ref(L_PATCH_DONE)),
            // delay slot: load patch word
            lw(T0, 4, V1),
            // load current word at offset
            lw(T1, 0, A0),
            // patch word at offset
            sw(T0, 0, A0),
            // store original word in patch (this way, calling this
            // function again will restore the original code)
            sw(T1, 4, V1),
            // decrement counter
            addiu(V0, V0, -1i32 as u32),
            // loop until we've reached the end
            bgtz(V0, label_ref(L_LOOP_PATCH)),
            // delay slot: set pointer to next patch blob
            addiu(V1, V1, 8),
            label(L_PATCH_DONE),
            jr(RA),
            nop(),
            // checksum
            0,
        ]
    }
}

/// The write payload: reads `:%x:%x:%x:%x` lines with the firmware's
/// `scanf` (or `getline` + `sscanf`), stores the words, and echoes the
/// accepted offset.
pub mod writecode {
    use super::CODE_MAGIC;
    use crate::asm::*;

    const STRSIZE: u32 = 0x28;
    const STACKSIZE: u32 = 0x20 + STRSIZE;
    const STROFF: u32 = STACKSIZE - STRSIZE;

    /// Byte offset of the config block.
    pub const CFG: usize = 0x18;
    /// Byte offset of the entry point.
    pub const ENTRY: usize = 0x34;
    /// Flags word: write/erase argument conventions.
    pub const OFF_FLAGS: usize = CFG;
    /// Destination address.
    pub const OFF_BUFFER: usize = CFG + 0x04;
    /// Remaining length.
    pub const OFF_LENGTH: usize = CFG + 0x08;
    /// Bytes accepted per invocation.
    pub const OFF_CHUNK_SIZE: usize = CFG + 0x0c;
    /// Address of `printf`.
    pub const OFF_PRINTF: usize = CFG + 0x10;
    /// Address of `scanf` (or `sscanf` when a getline is configured).
    pub const OFF_SCANF: usize = CFG + 0x14;
    /// Address of the console line reader, or 0 for plain `scanf`.
    pub const OFF_GETLINE: usize = CFG + 0x18;

    const L_SCANF: u32 = 0;
    const L_WORD_OK: u32 = 1;
    // these alias the tail labels of the dump payload; do NOT change
    const L_LOOP_WORDS: u32 = 6;
    const L_OUT: u32 = 7;

    /// Build the payload, config words zeroed, labels unresolved.
    pub fn code() -> Vec<u32> {
        vec![
            CODE_MAGIC,
            // ":%x:"
            0x3a25_783a,
            // "%x:%"
            0x2578_3a25,
            // "x:%x"
            0x783a_2578,
            // ":%x"
            0x3a25_7800,
            // "\r\n"
            0x0d0a_0000,
            0, // flags
            0, // buffer
            0, // length
            0, // chunk size
            0, // printf
            0, // scanf / sscanf
            0, // getline
            // main:
            addiu(SP, SP, -(STACKSIZE as i32) as u32),
            sw(RA, 0x00, SP),
            sw(S7, 0x04, SP),
            sw(S0, 0x08, SP),
            sw(S1, 0x0c, SP),
            sw(S2, 0x10, SP),
            sw(S3, 0x14, SP),
            sw(S4, 0x18, SP),
            sw(S5, 0x1c, SP),
            // branch to next instruction
            bal(1),
            // delay slot: address mask
            lui(T0, 0xffff),
            // store ra & 0xffff0000
            and(S7, RA, T0),
            // buffer
            lw(S0, (CFG + 0x04) as u32, S7),
            // length
            lw(S1, (CFG + 0x08) as u32, S7),
            // chunk size
            lw(S2, (CFG + 0x0c) as u32, S7),
            // printf
            lw(S3, (CFG + 0x10) as u32, S7),
            // scanf / sscanf
            lw(S4, (CFG + 0x14) as u32, S7),
            // getline
            lw(S5, (CFG + 0x18) as u32, S7),
            // bail out if length is zero
            beqz(S1, label_ref(L_OUT)),
            // set s2 to MIN(length, chunk_size)
            slt(T0, S1, S2),
            movn(S2, S1, T0),
            // subtract chunk size from length
            subu(S1, S1, S2),
            // make sure that we have a NUL byte
            sb(ZERO, STROFF + STRSIZE - 1, SP),
            label(L_LOOP_WORDS),
            // if getline is zero, we have a true scanf
            beqz(S5, label_ref(L_SCANF)),
            // delay slot: set first byte of string to zero
            sb(ZERO, STROFF, SP),
            // getline(string, size)
            addiu(A0, SP, STROFF),
            jalr(S5),
            ori(A1, ZERO, STRSIZE - 1),
            // bail out if first byte in string is zero
            lbu(V1, STROFF, SP),
            beqz(V1, label_ref(L_OUT)),
            // delay slot: string
            addiu(A0, SP, STROFF),
            // sscanf(string, ":%x:%x:%x:%x", buffer, buffer + 4, ...)
            addiu(A1, S7, 4),
            mov(A2, S0),
            addiu(A3, S0, 4),
            addiu(A4, S0, 8),
            jalr(S4),
            addiu(A5, S0, 12),
            b(label_ref(L_WORD_OK)),
            label(L_SCANF),
            // delay slot: format string
            addiu(A0, S7, 4),
            // scanf(":%x:%x:%x:%x", buffer, ...)
            mov(A1, S0),
            addiu(A2, S0, 4),
            addiu(A3, S0, 8),
            jalr(S4),
            addiu(A4, S0, 12),
            // bail out if scanf returned < 4
            sltiu(V1, V0, 4),
            bnez(V1, label_ref(L_OUT)),
            label(L_WORD_OK),
            // delay slot: format string (":%x")
            addiu(A0, S7, 16),
            // printf(":%x", buffer)
            jalr(S3),
            mov(A1, S0),
            // printf("\r\n")
            jalr(S3),
            addiu(A0, S7, 20),
            // decrement length
            addiu(S2, S2, -16i32 as u32),
            // loop while length > 0
            bgtz(S2, label_ref(L_LOOP_WORDS)),
            // delay slot: increment buffer
            addiu(S0, S0, 16),
            // store length and buffer
            sw(S0, (CFG + 0x04) as u32, S7),
            sw(S1, (CFG + 0x08) as u32, S7),
            label(L_OUT),
            // restore registers
            lw(RA, 0x00, SP),
            lw(S7, 0x04, SP),
            lw(S0, 0x08, SP),
            lw(S1, 0x0c, SP),
            lw(S2, 0x10, SP),
            lw(S3, 0x14, SP),
            lw(S4, 0x18, SP),
            lw(S5, 0x1c, SP),
            jr(RA),
            addiu(SP, SP, STACKSIZE),
            // checksum
            0,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::*;
    use crate::{resolve_labels, to_image};

    #[test]
    fn test_dumpcode_entry_offset() {
        let code = dumpcode::code();

        // the entry point must sit right after the data header
        assert_eq!(dumpcode::ENTRY, 19 * 4);
        assert_eq!(code[dumpcode::ENTRY / 4], addiu(SP, SP, -0x1ci32 as u32));
        assert_eq!(code[dumpcode::OFF_PRINTF / 4], 0);
    }

    #[test]
    fn test_writecode_entry_offset() {
        let code = writecode::code();

        assert_eq!(writecode::ENTRY, 13 * 4);
        assert_eq!(code[writecode::ENTRY / 4], addiu(SP, SP, -0x48i32 as u32));
    }

    #[test]
    fn test_payloads_resolve() {
        for (code, entry) in
            [(dumpcode::code(), dumpcode::ENTRY), (writecode::code(), writecode::ENTRY)]
        {
            let mut code = code;
            resolve_labels(&mut code, entry).unwrap();

            // no label definitions survive resolution
            assert!(!code[entry / 4..].iter().any(|&w| crate::is_label_def(w)));

            // every branch immediate is a real offset now
            for &w in &code[entry / 4..code.len() - 1] {
                if crate::is_branch(w) && w & 0xffff != 1 {
                    let imm = (w & 0xffff) as u16 as i16;
                    assert!(imm.unsigned_abs() < 0x100, "suspicious branch offset {imm}");
                }
            }
        }
    }

    #[test]
    fn test_image_is_big_endian() {
        let image = to_image(&dumpcode::code());

        assert_eq!(&image[..4], &[0xbe, 0xef, 0xc0, 0xde]);
        assert_eq!(&image[4..8], b":%x\0");
    }
}
