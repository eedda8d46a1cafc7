//! An explicit handle gathering everything a command needs to talk to one
//! attached device: the transport, resolved SoC info, and the bookkeeping
//! a command sequence accumulates (the uploaded U-Boot range for the
//! overwrite guard, an armed autostart address, whether the sequence has
//! asked to stop early). Exists so dispatch never reaches for global
//! mutable state.

use crate::error::{Error, Result};
use crate::protocol;
use crate::soc::{self, SocInfo};
use crate::usb::BulkTransport;

pub struct FelSession<B: BulkTransport> {
    transport: B,
    raw_soc_id: u32,
    soc: Option<&'static SocInfo>,
    uboot_entry: Option<(u32, u32)>,
    autostart: Option<u32>,
    halted: bool,
}

impl<B: BulkTransport> FelSession<B> {
    /// Probes the device with `VERSION` and looks up its SoC table entry.
    /// Unlike a full `resolve`, an unknown chip id is not fatal here — the
    /// `version` command must still be able to print what was read off the
    /// wire for an unsupported SoC. Anything beyond `version` that actually
    /// needs SoC addresses calls [`Self::require_soc`] instead.
    pub fn open(mut transport: B) -> Result<Self> {
        let reply = protocol::version(&mut transport)?;
        let raw_soc_id = reply.soc_id();
        let soc = soc::lookup(raw_soc_id);
        Ok(Self {
            transport,
            raw_soc_id,
            soc,
            uboot_entry: None,
            autostart: None,
            halted: false,
        })
    }

    pub fn transport(&mut self) -> &mut B {
        &mut self.transport
    }

    pub fn soc_id(&self) -> u32 {
        self.raw_soc_id
    }

    pub fn soc_name(&self) -> &'static str {
        self.soc.map(|s| s.name).unwrap_or("unknown")
    }

    /// The resolved SoC record, if this chip id has one.
    pub fn soc(&self) -> Option<&'static SocInfo> {
        self.soc
    }

    /// Like [`Self::soc`] but fatal: used by every command except `version`,
    /// which must stay usable against an unrecognized chip.
    pub fn require_soc(&self) -> Result<&'static SocInfo> {
        self.soc.ok_or(Error::UnsupportedSoc(self.raw_soc_id))
    }

    /// Records the address range a loader run just uploaded U-Boot to, so
    /// later writes in the same session can be checked against it.
    pub fn set_uboot_entry(&mut self, address: u32, size: u32) {
        self.uboot_entry = Some((address, size));
    }

    pub fn uboot_entry(&self) -> Option<(u32, u32)> {
        self.uboot_entry
    }

    /// Arms an address to be executed once the command sequence finishes,
    /// unless canceled or the sequence halts first (`uboot`'s "autostart").
    pub fn arm_autostart(&mut self, address: u32) {
        self.autostart = Some(address);
    }

    pub fn cancel_autostart(&mut self) {
        self.autostart = None;
    }

    pub fn autostart(&self) -> Option<u32> {
        self.autostart
    }

    /// Marks the sequence as finished early (`reset64` ends the FEL command
    /// loop, so nothing queued after it — including autostart — should run).
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn halted(&self) -> bool {
        self.halted
    }
}
