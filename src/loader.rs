//! SPL/U-Boot loader (C8): drives the full state machine for handing a
//! target an SPL image over FEL — swap-buffer-aware upload, optional L2
//! enable and MMU backup, execute, handshake check, MMU restore — and the
//! follow-on mkimage-framed U-Boot upload used by the `uboot` command.

use std::thread::sleep;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::image::{self, EgonHeader};
use crate::mmu::{self, MmuState};
use crate::protocol;
use crate::soc::SocInfo;
use crate::thunk;
use crate::usb::BulkTransport;

/// Time given to the SPL to run its own early init and install the
/// `"eGON.FEL"` handshake tag before the host starts polling for it.
/// A fixed delay rather than a retry-with-backoff loop: every SPL this
/// driver targets finishes that init well under this window, and a fixed
/// wait keeps the two-request handshake check simple.
const SPL_HANDSHAKE_DELAY: Duration = Duration::from_millis(250);

/// Above this many bytes, a file passed to `spl`/`uboot` is assumed to carry
/// an mkimage-framed U-Boot tail after the eGON/SPL portion (spec.md §6/§7).
pub const SPL_LEN_LIMIT: u32 = 0x8000;

/// Splits `data` into the bytes that land at `soc.spl_addr` directly and the
/// bytes that must be relocated to a swap buffer because they'd otherwise
/// land on boot-ROM-owned SRAM while the boot ROM is still running.
struct Relocation {
    direct: Vec<(u32, std::ops::Range<usize>)>,
    relocated: Vec<(u32, u32, std::ops::Range<usize>)>, // (buf1_addr, buf2_addr, data_range)
}

fn plan_relocation(soc: &SocInfo, base_addr: u32, len: usize) -> Relocation {
    let end_addr = base_addr.wrapping_add(len as u32);
    let mut direct = vec![0..len];
    let mut relocated = Vec::new();

    for swap in soc.swap_buffers {
        let lo = swap.buf1.max(base_addr);
        let hi = (swap.buf1 + swap.size).min(end_addr);
        if lo >= hi {
            continue;
        }
        let rel_start = (lo - base_addr) as usize;
        let rel_end = (hi - base_addr) as usize;

        let mut next = Vec::new();
        for region in direct {
            let (a, b) = (region.start, region.end);
            if rel_end <= a || rel_start >= b {
                next.push(region);
                continue;
            }
            if a < rel_start {
                next.push(a..rel_start);
            }
            if rel_end < b {
                next.push(rel_end..b);
            }
        }
        direct = next;

        let buf2_addr = swap.buf2 + (lo - swap.buf1);
        relocated.push((lo, buf2_addr, rel_start..rel_end));
    }

    Relocation {
        direct: direct.into_iter().map(|r| (base_addr, r)).collect(),
        relocated,
    }
}

/// Uploads `data` to `addr`, routing any bytes that would collide with a
/// swap buffer's `buf1` range to `buf2` instead. Bytes sent to `buf2` stay
/// there — the boot ROM's FEL command loop is still running and still reads
/// `buf1`, so nothing may touch it until [`install_and_run_thunk`] copies
/// buf2 back to buf1 on-device in the instant before control leaves the
/// boot ROM.
fn upload_relocating<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    addr: u32,
    data: &[u8],
    progress: Option<&mut dyn FnMut(usize)>,
) -> Result<()> {
    let plan = plan_relocation(soc, addr, data.len());
    let mut progress = progress;

    for (base, range) in &plan.direct {
        let dest = base.wrapping_add(range.start as u32);
        protocol::write(transport, dest, &data[range.clone()], progress.as_deref_mut())?;
    }
    for (_buf1, buf2, range) in &plan.relocated {
        protocol::write(transport, *buf2, &data[range.clone()], progress.as_deref_mut())?;
    }
    Ok(())
}

/// Writes the fixed FEL→SPL handoff thunk to `soc.thunk_addr` and executes
/// it. The thunk copies every swap buffer's bytes from `buf2` back to `buf1`
/// on-device, then branches straight into `soc.spl_addr` — the only point at
/// which the relocated bytes touch boot-ROM-owned SRAM.
fn install_and_run_thunk<B: BulkTransport>(transport: &mut B, soc: &SocInfo) -> Result<()> {
    let words = thunk::spl_handoff_thunk_words(soc.spl_addr, soc.swap_buffers);
    let bytes_len = words.len() * 4;
    if bytes_len > soc.thunk_size as usize {
        return Err(Error::LimitExceeded("thunk_size"));
    }
    let mut bytes = Vec::with_capacity(bytes_len);
    for word in &words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    protocol::write(transport, soc.thunk_addr, &bytes, None)?;
    protocol::execute(transport, soc.thunk_addr)
}

/// Result of a successful SPL load: where it was placed and how big it was,
/// so later commands can enforce the overwrite guard against it.
pub struct SplLoad {
    pub entry: u32,
    pub size: u32,
}

/// Uploads and runs an eGON/SPL image, returning once the target's FEL
/// handshake confirms it came back up. `image` must already have passed
/// [`image::parse_egon`] — callers get the parsed header back via `header`.
pub fn load_spl<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    image: &[u8],
    progress: Option<&mut dyn FnMut(usize)>,
) -> Result<(SplLoad, EgonHeader)> {
    let header = image::parse_egon(image)?;
    if header.total_length > SPL_LEN_LIMIT {
        return Err(Error::LimitExceeded("spl_len_limit"));
    }
    let payload = &image[..header.total_length as usize];

    if soc.needs_l2en {
        thunk::l2_enable(transport, soc)?;
    }
    let _ = thunk::stack_probe(transport, soc); // diagnostic only; SPL boots regardless

    let mmu_state = if soc.mmu_tt_addr.is_some() {
        Some(mmu::backup_and_disable_mmu(transport, soc)?)
    } else {
        None
    };

    upload_relocating(transport, soc, soc.spl_addr, payload, progress)?;
    install_and_run_thunk(transport, soc)?;
    sleep(SPL_HANDSHAKE_DELAY);

    let mut handshake = [0u8; 8];
    protocol::read(transport, soc.spl_addr + 4, &mut handshake)?;
    if !image::handshake_matches(&handshake) {
        return Err(Error::HandshakeFailed(handshake));
    }

    if let Some(state) = mmu_state {
        restore_mmu_best_effort(transport, soc, state);
    }

    Ok((
        SplLoad {
            entry: soc.spl_addr,
            size: header.total_length,
        },
        header,
    ))
}

/// Result of a full `spl`/`uboot` load: the SPL itself, plus the U-Boot tail
/// if the source file carried one past [`SPL_LEN_LIMIT`].
pub struct LoadResult {
    pub spl: SplLoad,
    pub uboot: Option<(u32, u32)>,
}

/// Loads and runs the eGON/SPL portion of `image`, then — if `image` is
/// longer than [`SPL_LEN_LIMIT`] — parses the remainder as an mkimage-framed
/// U-Boot proper and uploads it (without executing it; the SPL's own
/// handoff, or an armed autostart, takes it from there).
pub fn load_spl_and_tail<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    image: &[u8],
    mut progress: Option<&mut dyn FnMut(usize)>,
) -> Result<LoadResult> {
    let (spl, _header) = load_spl(transport, soc, image, progress.as_deref_mut())?;

    let uboot = if image.len() > SPL_LEN_LIMIT as usize {
        let tail = &image[SPL_LEN_LIMIT as usize..];
        let header = image::parse_mkimage(tail)?;
        let data = image::mkimage_data(tail);
        upload_relocating(transport, soc, header.load_address, data, progress)?;
        Some((header.load_address, header.data_size))
    } else {
        None
    };

    Ok(LoadResult { spl, uboot })
}

/// MMU restore failures after a successful SPL handshake don't undo the
/// handoff — the target is already running the uploaded code — so they're
/// logged rather than surfaced as the command's result.
fn restore_mmu_best_effort<B: BulkTransport>(transport: &mut B, soc: &SocInfo, state: MmuState) {
    if let Err(err) = mmu::restore_and_enable_mmu(transport, soc, state) {
        log::warn!("MMU restore after SPL handoff failed: {err}");
    }
}

/// Writes the sunxi SPL handoff slots (script address + uEnv length) into
/// the already-running SPL's header, used by the `uboot`/script write paths
/// (spec.md §6's closing paragraph). No-op if the SPL isn't the sunxi flavor.
pub fn write_sunxi_handoff<B: BulkTransport>(
    transport: &mut B,
    soc: &SocInfo,
    header: &EgonHeader,
    script_address: u32,
    uenv_length: u32,
) -> Result<()> {
    if let Some(slots) = image::sunxi_handoff_slots(header, script_address, uenv_length) {
        protocol::write(transport, soc.spl_addr + 0x18, &slots, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::{resolve, SwapBuffer};

    #[test]
    fn plan_relocation_splits_around_single_swap_buffer() {
        let swap_buffers: &'static [SwapBuffer] = vec![SwapBuffer {
            buf1: 0x100,
            buf2: 0x200,
            size: 0x10,
        }]
        .leak();
        let soc = SocInfo {
            swap_buffers,
            ..resolve(0x1639).unwrap().clone()
        };
        let plan = plan_relocation(&soc, 0x0F0, 0x40);
        assert_eq!(plan.relocated.len(), 1);
        assert_eq!(plan.relocated[0].0, 0x100);
        assert_eq!(plan.relocated[0].1, 0x200);
        let total_direct: usize = plan.direct.iter().map(|(_, r)| r.len()).sum();
        let total_relocated: usize = plan.relocated.iter().map(|(_, _, r)| r.len()).sum();
        assert_eq!(total_direct + total_relocated, 0x40);
    }

    #[test]
    fn plan_relocation_is_identity_when_no_overlap() {
        let soc = resolve(0x1623).unwrap();
        let plan = plan_relocation(soc, 0x1000, 0x40);
        assert!(plan.relocated.is_empty());
        assert_eq!(plan.direct, vec![(0x1000, 0..0x40)]);
    }
}
