//! MMU manager (C7): backs up the target's first-level translation table and
//! control registers before SPL/U-Boot upload, validates their shape, and
//! restores (or synthesizes) them afterward so the handed-off bootloader
//! doesn't inherit stale or inconsistent cache/MMU state.
//!
//! ARMv7 short-descriptor section entries only; large/small pages never
//! appear in boot-ROM-built tables and are treated as a validation failure.

use crate::error::{Error, Result};
use crate::soc::SocInfo;
use crate::thunk;
use crate::usb::BulkTransport;

/// cp15 coordinates: `(coproc, opc1, CRn, CRm, opc2)`.
const SCTLR: (u8, u8, u8, u8, u8) = (15, 0, 1, 0, 0);
const TTBR0: (u8, u8, u8, u8, u8) = (15, 0, 2, 0, 0);
const TTBCR: (u8, u8, u8, u8, u8) = (15, 0, 2, 0, 2);
const DACR: (u8, u8, u8, u8, u8) = (15, 0, 3, 0, 0);

const SCTLR_M: u32 = 1 << 0;
const SCTLR_Z: u32 = 1 << 11;
const SCTLR_I: u32 = 1 << 12;
const SCTLR_V: u32 = 1 << 13;

/// Bits SCTLR validation ignores: M (MMU enable, toggled by this very
/// manager), Z (branch prediction), I (instruction cache), V (vector base
/// selection) — none of these bear on whether the table/registers are in a
/// trustworthy shape.
const SCTLR_IGNORE_MASK: u32 = SCTLR_M | SCTLR_Z | SCTLR_I | SCTLR_V;
/// Expected SCTLR value once the above bits are masked out.
const SCTLR_EXPECTED: u32 = 0x00C5_0038;
/// Expected DACR value: every domain set to "client" (b01).
const DACR_EXPECTED: u32 = 0x5555_5555;

const TABLE_ENTRIES: usize = 4096;

/// First-level table entry encodings this manager understands.
const ENTRY_KIND_MASK: u32 = 0b11;
const ENTRY_SECTION: u32 = 0b10;
/// Index of the highest section: physical base `0xFFF00000`, the boot ROM's
/// own high alias.
const BROM_INDEX: u32 = 0xFFF;

/// Typical sunxi memory map used to re-tag section attributes on restore.
/// Not SoC-specific: the boot ROM's own table already describes the SoC's
/// real layout, this just forces known-good cacheability on the two ranges
/// that matter post-SPL (spec.md §3/§4.7 "DRAM/BROM TEX/C/B bits").
const DRAM_BASE: u32 = 0x4000_0000;
const DRAM_END: u32 = 0xC000_0000;

/// A captured MMU state: control registers plus the full first-level table.
#[derive(Debug, Clone)]
pub struct MmuState {
    pub sctlr: u32,
    pub dacr: u32,
    pub ttbcr: u32,
    pub ttbr0: u32,
    pub table: Vec<u32>,
    pub was_enabled: bool,
}

/// Validates the captured control registers exactly, per spec.md §4.7:
/// SCTLR (ignoring M/Z/I/V) must equal `0x00C50038`, DACR must equal
/// `0x55555555`, TTBCR must be exactly 0 (no TTBR0/1 split), and TTBR0's low
/// 14 bits must be zero (16KiB table alignment). Any deviation is fatal —
/// there is no "warn and continue" path here, since trusting a table we
/// didn't validate risks silent corruption once the handed-off code runs.
fn validate_registers(sctlr: u32, dacr: u32, ttbcr: u32, ttbr0: u32) -> Result<()> {
    if sctlr & !SCTLR_IGNORE_MASK != SCTLR_EXPECTED {
        return Err(Error::UnexpectedMmuState("SCTLR does not match the expected boot-ROM shape"));
    }
    if dacr != DACR_EXPECTED {
        return Err(Error::UnexpectedMmuState("DACR is not the all-client default"));
    }
    if ttbcr != 0 {
        return Err(Error::UnexpectedMmuState("TTBCR selects a split TTBR0/1 boundary"));
    }
    if ttbr0 & 0x3FFF != 0 {
        return Err(Error::UnexpectedMmuState("TTBR0 is not 16KiB aligned"));
    }
    Ok(())
}

/// Validates that every entry is a direct-mapped 1 MiB section (spec.md
/// §4.7/§8 property 3): `bits[1]=1` (section, not fault/page), `bits[18]=0`
/// (reserved for this format), and `bits[31:20]==i` (entry `i` maps
/// `i<<20 .. (i+1)<<20` to itself).
fn validate_table_shape(table: &[u32]) -> Result<()> {
    for (i, entry) in table.iter().enumerate() {
        if (entry >> 1) & 1 != 1 {
            return Err(Error::UnexpectedMmuState(
                "translation table contains a non-section descriptor",
            ));
        }
        if (entry >> 18) & 1 != 0 {
            return Err(Error::UnexpectedMmuState("translation table entry has bit 18 set"));
        }
        if entry >> 20 != i as u32 {
            return Err(Error::UnexpectedMmuState(
                "translation table is not a direct (identity) map",
            ));
        }
    }
    Ok(())
}

/// Reads SCTLR/DACR/TTBCR/TTBR0 and the full 16KiB first-level table,
/// validates their shape, then disables the MMU (clears SCTLR's M/I/Z bits).
/// Fails hard ([`Error::UnexpectedMmuState`]) on any deviation; there is no
/// "warn and continue" path — running with an unvalidated table risks
/// silent corruption once code starts executing with it live.
pub fn backup_and_disable_mmu<B: BulkTransport>(transport: &mut B, soc: &SocInfo) -> Result<MmuState> {
    let ttbr0_addr = soc
        .mmu_tt_addr
        .ok_or(Error::MissingCapability("SoC has no known MMU table address"))?;

    let (sc, s0, s1, s2, s3) = SCTLR;
    let sctlr = thunk::coproc_read(transport, soc, sc, s0, s1, s2, s3)?;
    let (dc, d0, d1, d2, d3) = DACR;
    let dacr = thunk::coproc_read(transport, soc, dc, d0, d1, d2, d3)?;
    let (tc, t0, t1, t2, t3) = TTBCR;
    let ttbcr = thunk::coproc_read(transport, soc, tc, t0, t1, t2, t3)?;
    let (rc, r0, r1, r2, r3) = TTBR0;
    let ttbr0 = thunk::coproc_read(transport, soc, rc, r0, r1, r2, r3)?;

    let was_enabled = sctlr & SCTLR_M != 0;
    if was_enabled {
        validate_registers(sctlr, dacr, ttbcr, ttbr0)?;
    }

    let table = if was_enabled {
        let mut words = vec![0u32; TABLE_ENTRIES];
        thunk::readl_n_wrapped(transport, soc, ttbr0 & !0x3FFF, &mut words)?;
        validate_table_shape(&words)?;
        words
    } else {
        synthesize_flat_table()
    };

    if was_enabled {
        let new_sctlr = sctlr & !(SCTLR_M | SCTLR_I | SCTLR_Z);
        thunk::coproc_write(transport, soc, sc, s0, s1, s2, s3, new_sctlr)?;
    }

    Ok(MmuState {
        sctlr,
        dacr,
        ttbcr,
        ttbr0,
        table,
        was_enabled,
    })
}

/// Builds an identity-mapped flat table: one section per megabyte, AP=full
/// access, domain 0, strongly-ordered everywhere except the first and last
/// sections (index 0 and `0xFFF`), which are marked normal write-back
/// cacheable. Used when the target had the MMU off (so there is no real
/// table to read back) but still needs one installed for code that assumes
/// paging is active.
pub fn synthesize_flat_table() -> Vec<u32> {
    (0..TABLE_ENTRIES as u32)
        .map(|i| section_entry(i << 20, attrs_for_synthesis(i)))
        .collect()
}

fn section_entry(base: u32, (tex, c, b): (u32, u32, u32)) -> u32 {
    let ap = 0b11; // full read/write, any privilege level
    (base & 0xFFF0_0000)
        | (tex << 12)
        | (ap << 10)
        | (0 << 5) // domain 0
        | (c << 3)
        | (b << 2)
        | ENTRY_SECTION
}

fn attrs_for_synthesis(index: u32) -> (u32, u32, u32) {
    if index == 0 || index == BROM_INDEX {
        (0b001, 1, 1) // normal, write-back cacheable
    } else {
        (0b000, 0, 0) // strongly ordered
    }
}

/// Known-good attributes for the restore path's two special ranges: DRAM
/// gets `TEX/C/B = 00100` (uncached normal memory), and the BROM's own
/// high alias at section index `0xFFF` (physical `0xFFF00000`) gets
/// `TEX/C/B = 00111` (write-back cacheable). Anything else is left alone.
fn attrs_for_restore(index: u32) -> Option<(u32, u32, u32)> {
    let base = index << 20;
    if base >= DRAM_BASE && base < DRAM_END {
        Some((0b001, 0, 0))
    } else if index == BROM_INDEX {
        Some((0b001, 1, 1))
    } else {
        None
    }
}

/// Re-tags the DRAM range and the BROM's high alias section of a captured
/// table with known-good cacheability attributes, leaving the mapped base
/// address and every other field untouched.
fn retag_known_ranges(table: &mut [u32]) {
    for (i, entry) in table.iter_mut().enumerate() {
        if *entry & ENTRY_KIND_MASK != ENTRY_SECTION {
            continue;
        }
        if let Some((tex, c, b)) = attrs_for_restore(i as u32) {
            *entry = (*entry & !0x0000_701C) | (tex << 12) | (c << 3) | (b << 2);
        }
    }
}

/// Uploads the (possibly retagged) table, restores TTBR0/TTBCR/DACR, and
/// re-enables the MMU with cache/branch-prediction bits set, invalidating
/// TLB/caches/BTB first so nothing stale survives the handoff.
pub fn restore_and_enable_mmu<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    mut state: MmuState,
) -> Result<()> {
    if !state.was_enabled {
        return Ok(());
    }

    retag_known_ranges(&mut state.table);
    let table_addr = state.ttbr0 & !0x3FFF;
    thunk::writel_n_wrapped(transport, soc, table_addr, &state.table)?;

    let (rc, r0, r1, r2, r3) = TTBR0;
    thunk::coproc_write(transport, soc, rc, r0, r1, r2, r3, state.ttbr0)?;
    let (tc, t0, t1, t2, t3) = TTBCR;
    thunk::coproc_write(transport, soc, tc, t0, t1, t2, t3, state.ttbcr)?;
    let (dc, d0, d1, d2, d3) = DACR;
    thunk::coproc_write(transport, soc, dc, d0, d1, d2, d3, state.dacr)?;

    invalidate_and_enable::<B>(transport, soc, state.sctlr)?;
    Ok(())
}

fn invalidate_and_enable<B: BulkTransport>(transport: &mut B, soc: &SocInfo, sctlr: u32) -> Result<()> {
    // TLBIALL (c8,c7,0), ICIALLU (c7,c5,0), BPIALL (c7,c5,6) then restore SCTLR.
    let (sc, s0, s1, s2, s3) = SCTLR;
    thunk::coproc_write(transport, soc, 15, 0, 8, 7, 0, 0)?;
    thunk::coproc_write(transport, soc, 15, 0, 7, 5, 0, 0)?;
    thunk::coproc_write(transport, soc, 15, 0, 7, 5, 6, 0)?;
    thunk::coproc_write(transport, soc, sc, s0, s1, s2, s3, sctlr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_table() -> Vec<u32> {
        (0..TABLE_ENTRIES as u32)
            .map(|i| (i << 20) | (0b11 << 10) | ENTRY_SECTION)
            .collect()
    }

    #[test]
    fn flat_table_identity_maps_every_megabyte() {
        let table = synthesize_flat_table();
        assert_eq!(table.len(), TABLE_ENTRIES);
        assert_eq!(table[0] & 0xFFF0_0000, 0);
        assert_eq!(table[0x400] & 0xFFF0_0000, 0x4000_0000); // DRAM_BASE
        for entry in &table {
            assert_eq!(entry & ENTRY_KIND_MASK, ENTRY_SECTION);
        }
        assert_eq!((table[0] >> 12) & 0x7, 0b001); // first section: normal
        assert_eq!((table[0xFFF] >> 12) & 0x7, 0b001); // last section: normal
        assert_eq!((table[1] >> 12) & 0x7, 0b000); // everything else: strongly ordered
    }

    #[test]
    fn validate_table_shape_accepts_direct_map() {
        assert!(validate_table_shape(&identity_table()).is_ok());
    }

    #[test]
    fn validate_table_shape_rejects_page_descriptors() {
        let mut table = identity_table();
        table[5] = (5 << 20) | 0b01; // page descriptor kind, not a section
        assert!(validate_table_shape(&table).is_err());
    }

    #[test]
    fn validate_table_shape_rejects_non_identity_mapping() {
        let mut table = identity_table();
        table[5] = (6 << 20) | (0b11 << 10) | ENTRY_SECTION; // points at the wrong section
        assert!(validate_table_shape(&table).is_err());
    }

    #[test]
    fn validate_table_shape_rejects_bit18_set() {
        let mut table = identity_table();
        table[5] |= 1 << 18;
        assert!(validate_table_shape(&table).is_err());
    }

    fn good_registers() -> (u32, u32, u32, u32) {
        (SCTLR_EXPECTED | SCTLR_M, DACR_EXPECTED, 0, 0x4000_0000)
    }

    #[test]
    fn validate_registers_accepts_the_expected_shape() {
        let (sctlr, dacr, ttbcr, ttbr0) = good_registers();
        assert!(validate_registers(sctlr, dacr, ttbcr, ttbr0).is_ok());
    }

    #[test]
    fn validate_registers_ignores_mzi_v_bits() {
        let (sctlr, dacr, ttbcr, ttbr0) = good_registers();
        assert!(validate_registers(sctlr | SCTLR_Z | SCTLR_I | SCTLR_V, dacr, ttbcr, ttbr0).is_ok());
    }

    #[test]
    fn validate_registers_rejects_unexpected_sctlr() {
        let (_, dacr, ttbcr, ttbr0) = good_registers();
        assert!(validate_registers(0, dacr, ttbcr, ttbr0).is_err());
    }

    #[test]
    fn validate_registers_rejects_non_default_dacr() {
        let (sctlr, _, ttbcr, ttbr0) = good_registers();
        assert!(validate_registers(sctlr, 0x1, ttbcr, ttbr0).is_err());
    }

    #[test]
    fn validate_registers_rejects_unaligned_ttbr0() {
        let (sctlr, dacr, ttbcr, _) = good_registers();
        assert!(validate_registers(sctlr, dacr, ttbcr, 0x1000).is_err());
    }

    #[test]
    fn validate_registers_rejects_split_ttbcr() {
        let (sctlr, dacr, _, ttbr0) = good_registers();
        assert!(validate_registers(sctlr, dacr, 0x1, ttbr0).is_err());
    }

    #[test]
    fn retag_known_ranges_updates_dram_and_brom_attrs_only() {
        let mut table = identity_table();
        retag_known_ranges(&mut table);
        let before_base = table[0x400] & 0xFFF0_0000;
        assert_eq!((table[0x400] >> 12) & 0x7, 0b001);
        assert_eq!((table[0x400] >> 3) & 0x3, 0b00); // c=0, b=0: uncached
        assert_eq!(table[0x400] & 0xFFF0_0000, before_base);

        assert_eq!((table[0xFFF] >> 12) & 0x7, 0b001);
        assert_eq!((table[0xFFF] >> 3) & 0x3, 0b11); // c=1, b=1: write-back

        // An untouched range keeps its original attrs.
        assert_eq!((table[1] >> 12) & 0x7, 0b000);
    }
}
