//! ARM thunk generator (C6): emits little-endian ARM instruction words,
//! writes them (plus inline parameters/data) to the SoC scratch area,
//! issues `EXEC`, and reads back results. Every thunk returns via `bx lr`
//! to the boot ROM, which resumes the FEL command loop.
//!
//! Instruction words below are hand-encoded ARM (A32), annotated with the
//! mnemonic each word represents; see the `encode` module for the small set
//! of parameterized encoders used where a field (coprocessor number, opcode,
//! register) varies per call.

use crate::error::{Error, Result};
use crate::protocol;
use crate::soc::{SocInfo, SwapBuffer, READL_N_MAX_WORDS};
use crate::usb::BulkTransport;

/// Hand-encoded fixed instructions, reused verbatim across thunks.
mod fixed {
    pub const BX_LR: u32 = 0xE12F_FF1E;
    pub const DSB_SY: u32 = 0xF57F_F04F;
    pub const ISB_SY: u32 = 0xF57F_F06F;
    pub const MRS_R0_CPSR: u32 = 0xE10F_0000;
    pub const MOV_R1_SP: u32 = 0xE1A0_100D;
    pub const MSR_CPSR_C_R0: u32 = 0xE121_F000;
}

/// Small parameterized ARM encoders for instructions whose operands vary
/// with the call site (coprocessor register numbers, PC-relative offsets).
mod encode {
    /// `mrc p{coproc}, opc1, Rd, CRn, CRm, opc2` (coprocessor register read).
    pub fn mrc(coproc: u8, opc1: u8, rd: u8, crn: u8, crm: u8, opc2: u8) -> u32 {
        mrc_mcr(true, coproc, opc1, rd, crn, crm, opc2)
    }

    /// `mcr p{coproc}, opc1, Rd, CRn, CRm, opc2` (coprocessor register write).
    pub fn mcr(coproc: u8, opc1: u8, rd: u8, crn: u8, crm: u8, opc2: u8) -> u32 {
        mrc_mcr(false, coproc, opc1, rd, crn, crm, opc2)
    }

    fn mrc_mcr(is_read: bool, coproc: u8, opc1: u8, rd: u8, crn: u8, crm: u8, opc2: u8) -> u32 {
        let l = if is_read { 1 } else { 0 };
        0xE_u32 << 28
            | 0xE_u32 << 24
            | (u32::from(opc1) & 0x7) << 21
            | l << 20
            | u32::from(crn) << 16
            | u32::from(rd) << 12
            | u32::from(coproc) << 8
            | (u32::from(opc2) & 0x7) << 5
            | 1 << 4
            | u32::from(crm)
    }

    /// `ldr Rt, [pc, #imm]` (pre-indexed, PC-relative load).
    pub fn ldr_pc(rt: u8, imm12: u16) -> u32 {
        0xE59F_0000 | u32::from(rt) << 12 | u32::from(imm12 & 0xFFF)
    }

    /// `str Rt, [pc, #imm]` (pre-indexed, PC-relative store).
    pub fn str_pc(rt: u8, imm12: u16) -> u32 {
        0xE58F_0000 | u32::from(rt) << 12 | u32::from(imm12 & 0xFFF)
    }

    /// `ldr Rt, [Rn], #imm` (post-indexed load, writes back Rn += imm).
    pub fn ldr_post(rt: u8, rn: u8, imm12: u16) -> u32 {
        0xE490_0000 | u32::from(rn) << 16 | u32::from(rt) << 12 | u32::from(imm12 & 0xFFF)
    }

    /// `str Rt, [Rn], #imm` (post-indexed store, writes back Rn += imm).
    pub fn str_post(rt: u8, rn: u8, imm12: u16) -> u32 {
        0xE480_0000 | u32::from(rn) << 16 | u32::from(rt) << 12 | u32::from(imm12 & 0xFFF)
    }

    /// `add Rd, pc, #imm8` (PC-relative address computation).
    pub fn add_pc(rd: u8, imm8: u8) -> u32 {
        0xE28F_0000 | u32::from(rd) << 12 | u32::from(imm8)
    }

    /// `cmp Rn, #imm8`.
    pub fn cmp_imm(rn: u8, imm8: u8) -> u32 {
        0xE350_0000 | u32::from(rn) << 16 | u32::from(imm8)
    }

    /// `sub Rd, Rd, #imm8`.
    pub fn sub_imm(rd: u8, imm8: u8) -> u32 {
        0xE240_0000 | u32::from(rd) << 16 | u32::from(rd) << 12 | u32::from(imm8)
    }

    /// `orr Rd, Rd, #imm8`.
    pub fn orr_imm(rd: u8, imm8: u8) -> u32 {
        0xE380_0000 | u32::from(rd) << 16 | u32::from(rd) << 12 | u32::from(imm8)
    }

    /// `beq` to a target `words_ahead` 32-bit words ahead of this instruction.
    pub fn beq(words_ahead: i32) -> u32 {
        0x0A00_0000 | (words_ahead as u32 & 0x00FF_FFFF)
    }

    /// `b` to a target `words_offset` words away (signed) from this instruction.
    pub fn b(words_offset: i32) -> u32 {
        0xEA00_0000 | (words_offset as u32 & 0x00FF_FFFF)
    }

    /// `bne` to a target `words_offset` words away (signed) from this instruction.
    pub fn bne(words_offset: i32) -> u32 {
        0x1A00_0000 | (words_offset as u32 & 0x00FF_FFFF)
    }

    /// `subs Rd, Rd, #imm8` (flag-setting subtract, for a `bne`-terminated loop).
    pub fn subs_imm(rd: u8, imm8: u8) -> u32 {
        0xE250_0000 | u32::from(rd) << 16 | u32::from(rd) << 12 | u32::from(imm8)
    }

    /// `bx Rm`.
    pub fn bx(rm: u8) -> u32 {
        0xE12F_FF10 | (u32::from(rm) & 0xF)
    }

    /// `msr CPSR_c, #imm8` (mode switch, mask = control field only).
    pub fn msr_cpsr_c_imm(imm8: u8) -> u32 {
        0xE321_F000 | u32::from(imm8)
    }
}

fn execute_thunk<B: BulkTransport>(transport: &mut B, soc: &SocInfo, words: &[u32]) -> Result<()> {
    let byte_len = words.len() * 4;
    if byte_len > soc.thunk_size as usize {
        return Err(Error::LimitExceeded("thunk exceeds SoC thunk_size"));
    }
    let mut bytes = Vec::with_capacity(byte_len);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    protocol::write(transport, soc.scratch_addr, &bytes, None)?;
    protocol::execute(transport, soc.scratch_addr)?;
    Ok(())
}

/// Builds the fixed FEL→SPL handoff thunk: walks the `{buf1, buf2, size}`
/// swap list, copying each buffer's bytes back from `buf2` to `buf1` on the
/// device itself, then branches to `spl_addr`. Used instead of a host-driven
/// copy so the relocated bytes only land on boot-ROM-owned SRAM the instant
/// before control leaves the boot ROM, never while its own command loop is
/// still reading that SRAM.
///
/// Word layout: 13 fixed code words, then `spl_addr`, then the swap list as
/// `{buf1, buf2, size}` triples, terminated by an all-zero sentinel.
pub fn spl_handoff_thunk_words(spl_addr: u32, swap_buffers: &[SwapBuffer]) -> Vec<u32> {
    const CODE_WORDS: u32 = 13;
    let spl_addr_offset = CODE_WORDS * 4; // byte offset of the spl_addr word
    let swap_list_offset = spl_addr_offset + 4; // byte offset of the first swap-list word

    let mut words = Vec::with_capacity(CODE_WORDS as usize + 1 + swap_buffers.len() * 3 + 3);
    words.push(encode::ldr_pc(5, (spl_addr_offset - 8) as u16)); // w0: ldr r5, [pc, #imm]  ; r5 = spl_addr
    words.push(encode::add_pc(4, (swap_list_offset - 12) as u8)); // w1: add r4, pc, #imm   ; r4 = &swap_list[0]
    words.push(encode::ldr_post(0, 4, 4)); // w2 loop_top: ldr r0, [r4], #4  ; buf1
    words.push(encode::ldr_post(1, 4, 4)); // w3: ldr r1, [r4], #4           ; buf2
    words.push(encode::ldr_post(2, 4, 4)); // w4: ldr r2, [r4], #4           ; size
    words.push(encode::cmp_imm(2, 0)); // w5: cmp r2, #0
    words.push(encode::beq(4)); // w6: beq done (w12)
    words.push(encode::ldr_post(3, 1, 4)); // w7 copy_loop: ldr r3, [r1], #4
    words.push(encode::str_post(3, 0, 4)); // w8: str r3, [r0], #4
    words.push(encode::subs_imm(2, 4)); // w9: subs r2, r2, #4
    words.push(encode::bne(-5)); // w10: bne copy_loop (w7)
    words.push(encode::b(-11)); // w11: b loop_top (w2)
    words.push(encode::bx(5)); // w12 done: bx r5

    words.push(spl_addr);
    for swap in swap_buffers {
        words.push(swap.buf1);
        words.push(swap.buf2);
        words.push(swap.size);
    }
    words.push(0);
    words.push(0);
    words.push(0);

    words
}

/// Reads a single coprocessor register via a 3-instruction thunk (MRC, STR
/// R0 [PC], BX LR); the result lands at `scratch_addr + 12`.
pub fn coproc_read<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    coproc: u8,
    opc1: u8,
    crn: u8,
    crm: u8,
    opc2: u8,
) -> Result<u32> {
    let code = [
        encode::mrc(coproc, opc1, 0, crn, crm, opc2),
        encode::str_pc(0, 0),
        fixed::BX_LR,
    ];
    execute_thunk(transport, soc, &code)?;

    let mut result = [0u8; 4];
    protocol::read(transport, soc.scratch_addr + 12, &mut result)?;
    Ok(u32::from_le_bytes(result))
}

/// Writes a single coprocessor register: loads `value` into R0 from an
/// inlined trailing word, then MCR, DSB, ISB, BX LR.
pub fn coproc_write<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    coproc: u8,
    opc1: u8,
    crn: u8,
    crm: u8,
    opc2: u8,
    value: u32,
) -> Result<()> {
    let code = [
        encode::ldr_pc(0, 12),
        encode::mcr(coproc, opc1, 0, crn, crm, opc2),
        fixed::DSB_SY,
        fixed::ISB_SY,
        fixed::BX_LR,
        value,
    ];
    execute_thunk(transport, soc, &code)
}

/// Builds the 10-instruction position-independent copy loop shared by
/// `readl_n`/`writel_n`. When `write_to_target` is false, words are copied
/// `[R0++] -> [R2++]` (device memory into scratch); when true, the reverse.
fn copy_loop_instructions(write_to_target: bool) -> [u32; 10] {
    let (ldr_rn, str_rn) = if write_to_target { (2, 0) } else { (0, 2) };
    [
        encode::ldr_pc(0, 32),     // ldr r0, [pc, #32]   ; r0 = addr
        encode::ldr_pc(1, 32),     // ldr r1, [pc, #32]   ; r1 = count
        encode::add_pc(2, 32),     // add r2, pc, #32     ; r2 = scratch + 48
        encode::cmp_imm(1, 0),     // cmp r1, #0
        encode::beq(3),            // beq done
        encode::ldr_post(3, ldr_rn, 4), // ldr r3, [rN], #4
        encode::str_post(3, str_rn, 4), // str r3, [rN], #4
        encode::sub_imm(1, 1),     // sub r1, r1, #1
        encode::b(-7),             // b loop
        fixed::BX_LR,              // done: bx lr
    ]
}

fn build_copy_loop(write_to_target: bool, addr: u32, count: u32) -> [u32; 12] {
    let instrs = copy_loop_instructions(write_to_target);
    [
        instrs[0], instrs[1], instrs[2], instrs[3], instrs[4], instrs[5], instrs[6], instrs[7],
        instrs[8], instrs[9], addr, count,
    ]
}

/// Reads up to 244 words (the scratch-buffer cap) from target memory. Counts
/// above the cap are a fatal [`Error::LimitExceeded`] — callers needing more
/// must go through [`readl_n_wrapped`].
pub fn readl_n<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    addr: u32,
    count: u32,
    out: &mut [u32],
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    if count > READL_N_MAX_WORDS {
        return Err(Error::LimitExceeded("readl_n count exceeds 244 words"));
    }
    let code = build_copy_loop(false, addr, count);
    execute_thunk(transport, soc, &code)?;

    let mut bytes = vec![0u8; count as usize * 4];
    protocol::read(transport, soc.scratch_addr + 48, &mut bytes)?;
    for (i, word) in out.iter_mut().take(count as usize).enumerate() {
        *word = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    }
    Ok(())
}

/// Writes up to 244 words from `src` to target memory in one round trip.
pub fn writel_n<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    addr: u32,
    src: &[u32],
) -> Result<()> {
    let count = src.len() as u32;
    if count == 0 {
        return Ok(());
    }
    if count > READL_N_MAX_WORDS {
        return Err(Error::LimitExceeded("writel_n count exceeds 244 words"));
    }
    let code = build_copy_loop(true, addr, count);
    let mut bytes = Vec::with_capacity(code.len() * 4 + src.len() * 4);
    for w in code.iter() {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    for w in src {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    if bytes.len() > soc.thunk_size as usize {
        return Err(Error::LimitExceeded("thunk exceeds SoC thunk_size"));
    }
    protocol::write(transport, soc.scratch_addr, &bytes, None)?;
    protocol::execute(transport, soc.scratch_addr)
}

/// Splits an arbitrarily large `readl_n` into ≤244-word rounds, advancing
/// the target address by `4*n` each round.
pub fn readl_n_wrapped<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    mut addr: u32,
    out: &mut [u32],
) -> Result<()> {
    let mut offset = 0;
    while offset < out.len() {
        let n = (out.len() - offset).min(READL_N_MAX_WORDS as usize);
        readl_n(transport, soc, addr, n as u32, &mut out[offset..offset + n])?;
        addr = addr.wrapping_add(4 * n as u32);
        offset += n;
    }
    Ok(())
}

/// Splits an arbitrarily large `writel_n` into ≤244-word rounds.
pub fn writel_n_wrapped<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    mut addr: u32,
    src: &[u32],
) -> Result<()> {
    for chunk in src.chunks(READL_N_MAX_WORDS as usize) {
        writel_n(transport, soc, addr, chunk)?;
        addr = addr.wrapping_add(4 * chunk.len() as u32);
    }
    Ok(())
}

/// Reads a single 32-bit word (the `readl` command).
pub fn readl<B: BulkTransport>(transport: &mut B, soc: &SocInfo, addr: u32) -> Result<u32> {
    let mut out = [0u32; 1];
    readl_n(transport, soc, addr, 1, &mut out)?;
    Ok(out[0])
}

/// Writes a single 32-bit word (the `writel` command).
pub fn writel<B: BulkTransport>(transport: &mut B, soc: &SocInfo, addr: u32, value: u32) -> Result<()> {
    writel_n(transport, soc, addr, &[value])
}

/// Byte-oriented `readl_n_wrapped`: rounds `out.len()` up to whole words
/// internally and truncates the tail, for `hexdump`/`dump` where the
/// requested length need not be a multiple of 4.
pub fn readl_n_wrapped_bytes<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    addr: u32,
    out: &mut [u8],
) -> Result<()> {
    let mut words = vec![0u32; (out.len() + 3) / 4];
    readl_n_wrapped(transport, soc, addr, &mut words)?;
    for (i, chunk) in out.chunks_mut(4).enumerate() {
        let bytes = words[i].to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
    Ok(())
}

/// Auxiliary Control Register coprocessor coordinates (cp15, c1, c0, opc1=0, opc2=1).
const ACTLR: (u8, u8, u8, u8, u8) = (15, 0, 1, 0, 1);

/// Enables the L2 cache by setting bit 1 of the Auxiliary Control Register.
/// Only meaningful (and only called) when `soc.needs_l2en` is set.
pub fn l2_enable<B: BulkTransport>(transport: &mut B, soc: &SocInfo) -> Result<()> {
    let (coproc, opc1, crn, crm, opc2) = ACTLR;
    let code = [
        encode::mrc(coproc, opc1, 0, crn, crm, opc2),
        encode::orr_imm(0, 2),
        encode::mcr(coproc, opc1, 0, crn, crm, opc2),
        fixed::BX_LR,
    ];
    execute_thunk(transport, soc, &code)
}

/// IRQ mode, IRQ+FIQ disabled (IRQ=0x12, I=0x80, F=0x40).
const CPSR_IRQ_DISABLED: u8 = 0xD2;

/// Captures the current-mode SP and SP_irq before the target's stack is
/// disturbed by further thunk execution.
pub fn stack_probe<B: BulkTransport>(transport: &mut B, soc: &SocInfo) -> Result<(u32, u32)> {
    let code = [
        fixed::MRS_R0_CPSR,                     // mrs r0, cpsr
        encode::msr_cpsr_c_imm(CPSR_IRQ_DISABLED), // msr cpsr_c, #0xd2
        fixed::MOV_R1_SP,                       // mov r1, sp     ; r1 = sp_irq
        fixed::MSR_CPSR_C_R0,                   // msr cpsr_c, r0 ; restore mode
        encode::str_pc(13, 4),                  // str sp, [pc, #4]
        encode::str_pc(1, 4),                   // str r1, [pc, #4]
        fixed::BX_LR,
    ];
    execute_thunk(transport, soc, &code)?;

    let mut result = [0u8; 8];
    protocol::read(transport, soc.scratch_addr + 28, &mut result)?;
    let sp = u32::from_le_bytes(result[0..4].try_into().unwrap());
    let sp_irq = u32::from_le_bytes(result[4..8].try_into().unwrap());
    Ok((sp, sp_irq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::resolve;
    use crate::usb::mock::MockTransport;

    fn soc() -> &'static SocInfo {
        resolve(0x1623).unwrap()
    }

    #[test]
    fn known_instruction_encodings_match_reference_values() {
        assert_eq!(encode::mrc(15, 0, 0, 1, 0, 0), 0xEE11_0F10); // mrc p15,0,r0,c1,c0,0 (SCTLR)
        assert_eq!(encode::mcr(15, 0, 0, 1, 0, 0), 0xEE01_0F10);
        assert_eq!(encode::mrc(15, 0, 0, 1, 0, 1), 0xEE11_0F30); // ACTLR
        assert_eq!(encode::str_pc(0, 0), 0xE58F_0000);
        assert_eq!(encode::ldr_pc(0, 12), 0xE59F_000C);
        assert_eq!(encode::ldr_post(3, 0, 4), 0xE490_3004);
        assert_eq!(encode::str_post(3, 2, 4), 0xE482_3004);
        assert_eq!(encode::add_pc(2, 32), 0xE28F_2020);
        assert_eq!(encode::cmp_imm(1, 0), 0xE351_0000);
        assert_eq!(encode::sub_imm(1, 1), 0xE241_1001);
        assert_eq!(encode::orr_imm(0, 2), 0xE380_0002);
        assert_eq!(encode::beq(3), 0x0A00_0003);
        assert_eq!(encode::b(-7), 0xEAFF_FFF9);
        assert_eq!(encode::subs_imm(2, 4), 0xE252_2004);
        assert_eq!(encode::bne(-5), 0x1AFF_FFFB);
        assert_eq!(encode::bx(5), 0xE12F_FF15);
        assert_eq!(fixed::BX_LR, 0xE12F_FF1E);
        assert_eq!(fixed::MRS_R0_CPSR, 0xE10F_0000);
        assert_eq!(fixed::MOV_R1_SP, 0xE1A0_100D);
        assert_eq!(fixed::MSR_CPSR_C_R0, 0xE121_F000);
    }

    const STATUS_OK: &[u8; 13] = b"AWUS_________";
    const FEL_STATUS: &[u8; 8] = &[0u8; 8];

    /// Queues the bytes one `protocol::write` call consumes: an AW-USB status
    /// for the request, one for the payload, then the trailing FEL status
    /// read (8 bytes of data plus its own AW-USB status).
    fn queue_write_op(t: &mut MockTransport) {
        t.queue_recv(STATUS_OK);
        t.queue_recv(STATUS_OK);
        t.queue_recv(FEL_STATUS);
        t.queue_recv(STATUS_OK);
    }

    /// Queues the bytes one `protocol::execute` call consumes: an AW-USB
    /// status for the request, then the trailing FEL status read.
    fn queue_execute_op(t: &mut MockTransport) {
        t.queue_recv(STATUS_OK);
        t.queue_recv(FEL_STATUS);
        t.queue_recv(STATUS_OK);
    }

    /// Queues the bytes one `protocol::read` call consumes: an AW-USB status
    /// for the request, the data itself plus its status, then the trailing
    /// FEL status read.
    fn queue_read_op(t: &mut MockTransport, data: &[u8]) {
        t.queue_recv(STATUS_OK);
        t.queue_recv(data);
        t.queue_recv(STATUS_OK);
        t.queue_recv(FEL_STATUS);
        t.queue_recv(STATUS_OK);
    }

    /// Queues the bytes one `execute_thunk` call consumes (upload + exec).
    fn queue_execute_thunk(t: &mut MockTransport) {
        queue_write_op(t);
        queue_execute_op(t);
    }

    /// Queues the bytes one `execute_thunk` + `protocol::read` round
    /// consumes: the thunk upload and exec, then the result read.
    fn queue_thunk_and_read_round(t: &mut MockTransport, data: &[u8]) {
        queue_execute_thunk(t);
        queue_read_op(t, data);
    }

    #[test]
    fn coproc_read_uploads_three_word_thunk_and_reads_result() {
        let mut t = MockTransport::default();
        queue_thunk_and_read_round(&mut t, &0xDEAD_BEEFu32.to_le_bytes());

        let value = coproc_read(&mut t, soc(), 15, 0, 1, 0, 0).unwrap();
        assert_eq!(value, 0xDEAD_BEEF);
    }

    #[test]
    fn readl_n_zero_is_noop() {
        let mut t = MockTransport::default();
        let mut out = [0u32; 0];
        readl_n(&mut t, soc(), 0x4000_0000, 0, &mut out).unwrap();
        assert!(t.sent.is_empty());
    }

    #[test]
    fn readl_n_rejects_counts_above_cap() {
        let mut t = MockTransport::default();
        let mut out = vec![0u32; 245];
        let err = readl_n(&mut t, soc(), 0x4000_0000, 245, &mut out).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
    }

    #[test]
    fn readl_single_word_roundtrip() {
        let mut t = MockTransport::default();
        queue_thunk_and_read_round(&mut t, &0x1234_5678u32.to_le_bytes());
        let v = readl(&mut t, soc(), 0x4000_0000).unwrap();
        assert_eq!(v, 0x1234_5678);
    }

    #[test]
    fn readl_n_wrapped_splits_into_244_word_rounds() {
        let mut t = MockTransport::default();
        // 245 words requested: one round of 244, one round of 1.
        queue_thunk_and_read_round(&mut t, &vec![0u8; 244 * 4]);
        queue_thunk_and_read_round(&mut t, &[0u8; 4]);
        let mut out = vec![0u32; 245];
        readl_n_wrapped(&mut t, soc(), 0x4000_0000, &mut out).unwrap();
    }

    #[test]
    fn spl_handoff_thunk_places_spl_addr_and_swap_list_after_fixed_code() {
        let swap_buffers = [
            SwapBuffer { buf1: 0x5c00, buf2: 0x5800, size: 0x400 },
            SwapBuffer { buf1: 0x6c00, buf2: 0x6800, size: 0x200 },
        ];
        let words = spl_handoff_thunk_words(0x1000_0000, &swap_buffers);

        // 13 code words, then spl_addr, then 2 triples, then a zero sentinel triple.
        assert_eq!(words.len(), 13 + 1 + 2 * 3 + 3);
        assert_eq!(words[13], 0x1000_0000);
        assert_eq!(&words[14..17], &[0x5c00, 0x5800, 0x400]);
        assert_eq!(&words[17..20], &[0x6c00, 0x6800, 0x200]);
        assert_eq!(&words[20..23], &[0, 0, 0]);
    }

    #[test]
    fn spl_handoff_thunk_with_no_swap_buffers_is_just_spl_addr_and_sentinel() {
        let words = spl_handoff_thunk_words(0x4a00_0000, &[]);
        assert_eq!(words.len(), 13 + 1 + 3);
        assert_eq!(words[13], 0x4a00_0000);
        assert_eq!(&words[14..17], &[0, 0, 0]);
    }
}
