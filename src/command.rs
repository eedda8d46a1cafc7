//! Command dispatch (C9): one variant per CLI grammar entry, each
//! sequencing calls into C3 (protocol), C6 (thunk), C7 (mmu), and C8
//! (loader) against a session's open device.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::loader;
use crate::progress::ProgressSink;
use crate::protocol;
use crate::session::FelSession;
use crate::soc;
use crate::thunk;
use crate::usb::BulkTransport;

/// A single write/read pair targeting one address.
pub struct MemRange {
    pub address: u32,
    pub length: u32,
}

/// A (device address, host file path) pair for the `multiwrite` command.
pub struct WriteJob {
    pub address: u32,
    pub path: std::path::PathBuf,
}

pub enum Command {
    /// Prints the decoded `VERSION` reply (SoC id, name if known, protocol).
    Version,
    /// Prints the Security ID (4 words read via `readl_n`), if this SoC exposes one.
    Sid,
    /// `readl ADDR` — prints one 32-bit word.
    Readl { address: u32 },
    /// `writel ADDR VALUE` — writes one 32-bit word.
    Writel { address: u32, value: u32 },
    /// `read ADDR LENGTH FILE` — reads target memory to a host file.
    Read { range: MemRange, output: std::path::PathBuf },
    /// `write ADDR FILE` (optionally `-with-progress`/`-with-gauge`/`-with-xgauge`).
    Write { address: u32, input: std::path::PathBuf },
    /// `multiwrite (ADDR FILE)...` — several writes in one invocation.
    MultiWrite { jobs: Vec<WriteJob> },
    /// `hexdump ADDR LENGTH` — prints a hex/ASCII dump to stdout.
    Hexdump { range: MemRange },
    /// `dump ADDR LENGTH` — writes raw bytes to stdout.
    Dump { range: MemRange },
    /// `execute ADDR` — runs target code with no payload or readback.
    Execute { address: u32 },
    /// `reset64 ADDR` — sets RVBAR then issues the warm-reset-to-EL3 sequence.
    /// Cancels any pending U-Boot autostart and ends the FEL command loop.
    Reset64 { address: u32 },
    /// `clear ADDR LENGTH` — zero-fills target memory.
    Clear { range: MemRange },
    /// `fill ADDR LENGTH VALUE` — fills target memory with a repeated byte.
    Fill { range: MemRange, value: u8 },
    /// `spl FILE` — uploads and boots an eGON/SPL image, plus its U-Boot
    /// tail if the file is larger than [`loader::SPL_LEN_LIMIT`].
    Spl { image_path: std::path::PathBuf },
    /// `uboot FILE` — same upload as `spl`, then arms the resulting U-Boot
    /// (or SPL) entry point to autostart at the end of the command sequence.
    Uboot { image_path: std::path::PathBuf },
}

impl Command {
    pub fn run<B: BulkTransport>(
        self,
        session: &mut FelSession<B>,
        progress: &mut dyn ProgressSink,
    ) -> Result<Option<String>> {
        match self {
            Command::Version => run_version(session),
            Command::Sid => run_sid(session),
            Command::Readl { address } => {
                let soc = session.require_soc()?;
                let value = thunk::readl(session.transport(), soc, address)?;
                Ok(Some(format!("0x{value:08x}")))
            }
            Command::Writel { address, value } => {
                let soc = session.require_soc()?;
                thunk::writel(session.transport(), soc, address, value)?;
                Ok(None)
            }
            Command::Read { range, output } => {
                guard_against_uboot(session, range.address, range.length)?;
                let soc = session.require_soc()?;
                let mut buf = vec![0u8; range.length as usize];
                progress.start(buf.len());
                let mut cb = |n: usize| progress.update(n);
                read_chunked(session.transport(), soc, range.address, &mut buf, &mut cb)?;
                progress.finish();
                std::fs::write(&output, &buf)?;
                Ok(None)
            }
            Command::Write { address, input } => {
                let data = std::fs::read(&input)?;
                guard_against_uboot(session, address, data.len() as u32)?;
                progress.start(data.len());
                let mut cb = |n: usize| progress.update(n);
                protocol::write(session.transport(), address, &data, Some(&mut cb))?;
                progress.finish();
                Ok(None)
            }
            Command::MultiWrite { jobs } => {
                for job in jobs {
                    let data = std::fs::read(&job.path)?;
                    guard_against_uboot(session, job.address, data.len() as u32)?;
                    progress.start(data.len());
                    let mut cb = |n: usize| progress.update(n);
                    protocol::write(session.transport(), job.address, &data, Some(&mut cb))?;
                    progress.finish();
                }
                Ok(None)
            }
            Command::Hexdump { range } => {
                let soc = session.require_soc()?;
                let mut buf = vec![0u8; range.length as usize];
                thunk::readl_n_wrapped_bytes(session.transport(), soc, range.address, &mut buf)?;
                Ok(Some(hexdump(range.address, &buf)))
            }
            Command::Dump { range } => {
                let soc = session.require_soc()?;
                let mut buf = vec![0u8; range.length as usize];
                thunk::readl_n_wrapped_bytes(session.transport(), soc, range.address, &mut buf)?;
                use std::io::Write;
                std::io::stdout().write_all(&buf)?;
                Ok(None)
            }
            Command::Execute { address } => {
                protocol::execute(session.transport(), address)?;
                Ok(None)
            }
            Command::Reset64 { address } => run_reset64(session, address),
            Command::Clear { range } => {
                guard_against_uboot(session, range.address, range.length)?;
                run_fill(session, range, 0)
            }
            Command::Fill { range, value } => {
                guard_against_uboot(session, range.address, range.length)?;
                run_fill(session, range, value)
            }
            Command::Spl { image_path } => run_spl(session, &image_path, progress),
            Command::Uboot { image_path } => run_uboot(session, &image_path, progress),
        }
    }
}

fn read_chunked<B: BulkTransport>(
    transport: &mut B,
    soc: &'static soc::SocInfo,
    addr: u32,
    buf: &mut [u8],
    cb: &mut dyn FnMut(usize),
) -> Result<()> {
    let mut words = vec![0u32; (buf.len() + 3) / 4];
    thunk::readl_n_wrapped(transport, soc, addr, &mut words)?;
    for (i, w) in words.iter().enumerate() {
        let bytes = w.to_le_bytes();
        let start = i * 4;
        let n = (buf.len() - start).min(4);
        buf[start..start + n].copy_from_slice(&bytes[..n]);
    }
    cb(buf.len());
    Ok(())
}

fn run_version<B: BulkTransport>(session: &mut FelSession<B>) -> Result<Option<String>> {
    Ok(Some(format!("{} (0x{:04x})", session.soc_name(), session.soc_id())))
}

fn run_sid<B: BulkTransport>(session: &mut FelSession<B>) -> Result<Option<String>> {
    let soc = session.require_soc()?;
    let addr = soc
        .sid_addr
        .ok_or(Error::MissingCapability("this SoC has no known SID register"))?;
    let mut words = [0u32; 4];
    thunk::readl_n(session.transport(), soc, addr, 4, &mut words)?;
    let mut out = String::new();
    for w in words {
        let _ = write!(out, "{w:08x}");
    }
    Ok(Some(out))
}

/// A missing RVBAR register is not fatal: unlike a write/fill that could
/// silently corrupt memory, there's nothing to do here but warn and leave
/// the rest of a command sequence (including any armed autostart) alone.
fn run_reset64<B: BulkTransport>(session: &mut FelSession<B>, address: u32) -> Result<Option<String>> {
    let soc = match session.soc() {
        Some(soc) => soc,
        None => {
            log::warn!("reset64: unknown SoC 0x{:04x}, skipping", session.soc_id());
            return Ok(None);
        }
    };
    let rvbar = match soc.rvbar_reg {
        Some(rvbar) => rvbar,
        None => {
            log::warn!("reset64: {} has no RVBAR register, skipping", soc.name);
            return Ok(None);
        }
    };
    thunk::writel(session.transport(), soc, rvbar, address)?;
    // Warm reset into EL3 at the address just programmed into RVBAR; this
    // ends the FEL command loop, so any pending U-Boot autostart is moot.
    protocol::execute(session.transport(), rvbar)?;
    session.cancel_autostart();
    session.halt();
    Ok(None)
}

fn run_fill<B: BulkTransport>(session: &mut FelSession<B>, range: MemRange, value: u8) -> Result<Option<String>> {
    let soc = session.require_soc()?;
    let word = u32::from_le_bytes([value; 4]);
    let words = vec![word; ((range.length + 3) / 4) as usize];
    thunk::writel_n_wrapped(session.transport(), soc, range.address, &words)?;
    Ok(None)
}

fn run_spl<B: BulkTransport>(
    session: &mut FelSession<B>,
    image_path: &std::path::Path,
    progress: &mut dyn ProgressSink,
) -> Result<Option<String>> {
    let image = std::fs::read(image_path)?;
    let soc = session.require_soc()?;
    progress.start(image.len());
    let mut cb = |n: usize| progress.update(n);
    let result = loader::load_spl_and_tail(session.transport(), soc, &image, Some(&mut cb))?;
    progress.finish();
    session.set_uboot_entry(result.spl.entry, result.spl.size);
    Ok(None)
}

/// Runs the same SPL upload/execute/handshake/MMU-prep sequence as `spl`,
/// then arms the U-Boot (or SPL, if the image carried no separate tail)
/// entry point to autostart once the command sequence finishes.
fn run_uboot<B: BulkTransport>(
    session: &mut FelSession<B>,
    image_path: &std::path::Path,
    progress: &mut dyn ProgressSink,
) -> Result<Option<String>> {
    let image = std::fs::read(image_path)?;
    let soc = session.require_soc()?;
    progress.start(image.len());
    let mut cb = |n: usize| progress.update(n);
    let result = loader::load_spl_and_tail(session.transport(), soc, &image, Some(&mut cb))?;
    progress.finish();
    let autostart_addr = match result.uboot {
        Some((entry, size)) => {
            session.set_uboot_entry(entry, size);
            entry
        }
        None => {
            session.set_uboot_entry(result.spl.entry, result.spl.size);
            result.spl.entry
        }
    };
    session.arm_autostart(autostart_addr);
    Ok(None)
}

/// Rejects any write/clear/fill that would overlap the already-uploaded
/// U-Boot image range (spec.md's overwrite guard). `execute`/`readl`/etc.
/// are never guarded — only operations that clobber target memory.
fn guard_against_uboot<B: BulkTransport>(session: &FelSession<B>, address: u32, length: u32) -> Result<()> {
    if let Some((entry, size)) = session.uboot_entry() {
        let write_end = address.wrapping_add(length);
        let uboot_end = entry.wrapping_add(size);
        if address < uboot_end && write_end > entry {
            return Err(Error::OverwriteGuard { entry, size });
        }
    }
    Ok(())
}

fn hexdump(base: u32, buf: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in buf.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}: ", base as usize + row * 16);
        for byte in chunk {
            let _ = write!(out, "{byte:02x} ");
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str(" ");
        for byte in chunk {
            let c = if byte.is_ascii_graphic() { *byte as char } else { '.' };
            out.push(c);
        }
        out.push('\n');
    }
    out
}
