//! SoC info resolver (C4): given a decoded `version` reply's SoC id, yields
//! the SoC-specific address/flag record used by every higher-level
//! component. The table itself is plain data (spec.md names static per-SoC
//! tables as an out-of-scope surrounding concern); the resolver logic that
//! looks values up and reports "unsupported" is what C4 actually is.

use crate::error::{Error, Result};

/// One relocation entry: bytes that would land on `buf1` are instead written
/// to `buf2`, for `size` bytes, because `buf1` overlaps boot-ROM-owned SRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapBuffer {
    pub buf1: u32,
    pub buf2: u32,
    pub size: u32,
}

/// Immutable per-SoC record.
#[derive(Debug, Clone)]
pub struct SocInfo {
    pub soc_id: u32,
    pub name: &'static str,
    pub scratch_addr: u32,
    pub spl_addr: u32,
    pub sid_addr: Option<u32>,
    pub rvbar_reg: Option<u32>,
    pub thunk_addr: u32,
    pub thunk_size: u32,
    pub swap_buffers: &'static [SwapBuffer],
    pub mmu_tt_addr: Option<u32>,
    pub needs_l2en: bool,
}

/// Scratch buffer used for thunk code+data is bounded to 256 words.
pub const SCRATCH_WORDS: u32 = 256;
/// `readl_n`/`writel_n` payload cap: scratch minus the 12-word (48-byte) code prologue.
pub const READL_N_MAX_WORDS: u32 = SCRATCH_WORDS - 12;

// Hand-maintained table of known SoCs. Values are the well-known sunxi-tools
// constants for these chips' FEL scratch/SPL/thunk/SID/RVBAR addresses.
static SOC_TABLE: &[SocInfo] = &[
    SocInfo {
        soc_id: 0x1623,
        name: "A10",
        scratch_addr: 0x0000_2000,
        spl_addr: 0x0000_0000,
        sid_addr: None,
        rvbar_reg: None,
        thunk_addr: 0x0000_2000,
        thunk_size: 0x400,
        swap_buffers: &[],
        mmu_tt_addr: None,
        needs_l2en: false,
    },
    SocInfo {
        soc_id: 0x1639,
        name: "A20",
        scratch_addr: 0x0000_2000,
        spl_addr: 0x0000_0000,
        sid_addr: Some(0x01c2_3800),
        rvbar_reg: None,
        thunk_addr: 0x0000_2000,
        thunk_size: 0x400,
        swap_buffers: &[SwapBuffer {
            buf1: 0x0000_5c00,
            buf2: 0x0000_5800,
            size: 0x400,
        }],
        mmu_tt_addr: None,
        needs_l2en: true,
    },
    SocInfo {
        soc_id: 0x1651,
        name: "A64",
        scratch_addr: 0x0004_4000,
        spl_addr: 0x0001_0000,
        sid_addr: Some(0x01c1_4200),
        rvbar_reg: Some(0x0001_7000),
        thunk_addr: 0x0004_4000,
        thunk_size: 0x400,
        swap_buffers: &[],
        mmu_tt_addr: Some(0x0004_8000),
        needs_l2en: false,
    },
];

/// Looks up the SoC record for `soc_id`, or `None` if it has no table entry
/// (e.g. because it lacks a scratch region — spec.md's stated Non-goal).
pub fn lookup(soc_id: u32) -> Option<&'static SocInfo> {
    SOC_TABLE.iter().find(|s| s.soc_id == soc_id)
}

/// Like [`lookup`] but fatal: used by every path that actually needs SoC
/// addresses to proceed (everything except the soft `version` print path).
pub fn resolve(soc_id: u32) -> Result<&'static SocInfo> {
    lookup(soc_id).ok_or(Error::UnsupportedSoc(soc_id))
}
