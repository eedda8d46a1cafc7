//! FEL command layer (C3): `version`, `read(addr,len)`, `write(addr,len)`,
//! `execute(addr)` framed over the AW-USB layer (C2).

use crate::awusb::{aw_read, aw_write};
use crate::error::Result;
use crate::usb::BulkTransport;

const OP_VERSION: u32 = 0x001;
const OP_WRITE: u32 = 0x101;
const OP_EXEC: u32 = 0x102;
const OP_READ: u32 = 0x103;

/// 16-byte FEL wire request: `{ opcode, address, length, pad }`, little-endian.
fn build_fel_request(opcode: u32, address: u32, length: u32) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[0..4].copy_from_slice(&opcode.to_le_bytes());
    buf[4..8].copy_from_slice(&address.to_le_bytes());
    buf[8..12].copy_from_slice(&length.to_le_bytes());
    buf
}

/// Decoded `version` reply (32 bytes on the wire, all fields little-endian).
#[derive(Debug, Clone, Copy)]
pub struct VersionReply {
    pub signature: [u8; 8],
    pub raw_id: u32,
    pub unknown_0a: u32,
    pub protocol: u16,
    pub unknown_12: u8,
    pub unknown_13: u8,
    pub scratchpad: u16,
}

impl VersionReply {
    /// `soc_id` is bits 8..23 of the raw id field.
    pub fn soc_id(&self) -> u32 {
        (self.raw_id >> 8) & 0xffff
    }

    fn from_bytes(buf: &[u8; 32]) -> Self {
        Self {
            signature: buf[0..8].try_into().unwrap(),
            raw_id: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            unknown_0a: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            protocol: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
            unknown_12: buf[18],
            unknown_13: buf[19],
            scratchpad: u16::from_le_bytes(buf[20..22].try_into().unwrap()),
        }
    }
}

/// Every FEL operation is the 16-byte request, an optional data payload, then
/// a trailing 8-byte FEL status read whose bytes are consumed but never
/// inspected. Each of these is its own AW-USB framed transfer with its own
/// 13-byte status trailer (handled inside `aw_write`/`aw_read`) — the 8-byte
/// read here is a FEL-level step on top of that, not a substitute for it.
fn read_fel_status<B: BulkTransport>(transport: &mut B) -> Result<()> {
    let mut status = [0u8; 8];
    aw_read(transport, &mut status)
}

/// Sends a `VERSION` request and decodes the 32-byte reply.
pub fn version<B: BulkTransport>(transport: &mut B) -> Result<VersionReply> {
    let request = build_fel_request(OP_VERSION, 0, 0);
    aw_write(transport, &request, None)?;

    let mut reply = [0u8; 32];
    aw_read(transport, &mut reply)?;
    read_fel_status(transport)?;

    Ok(VersionReply::from_bytes(&reply))
}

/// Reads `buf.len()` bytes of target memory starting at `address`.
pub fn read<B: BulkTransport>(transport: &mut B, address: u32, buf: &mut [u8]) -> Result<()> {
    let request = build_fel_request(OP_READ, address, buf.len() as u32);
    aw_write(transport, &request, None)?;
    aw_read(transport, buf)?;
    read_fel_status(transport)?;
    Ok(())
}

/// Writes `data` to target memory starting at `address`. `progress`, if
/// given, is invoked with the cumulative byte count sent.
pub fn write<B: BulkTransport>(
    transport: &mut B,
    address: u32,
    data: &[u8],
    progress: Option<&mut dyn FnMut(usize)>,
) -> Result<()> {
    let request = build_fel_request(OP_WRITE, address, data.len() as u32);
    aw_write(transport, &request, None)?;
    aw_write(transport, data, progress)?;
    read_fel_status(transport)?;
    Ok(())
}

/// Requests execution of target code at `address`. There is no data payload;
/// the boot ROM resumes the FEL command loop once the callee returns.
pub fn execute<B: BulkTransport>(transport: &mut B, address: u32) -> Result<()> {
    let request = build_fel_request(OP_EXEC, address, 0);
    aw_write(transport, &request, None)?;
    read_fel_status(transport)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::MockTransport;

    /// A 13-byte AW-USB status trailer that passes `check_status`.
    const STATUS_OK: &[u8; 13] = b"AWUS_________";

    /// 8 bytes of FEL status data, never inspected by the caller.
    const FEL_STATUS: &[u8; 8] = &[0u8; 8];

    #[test]
    fn version_decodes_soc_id() {
        let mut t = MockTransport::default();
        let mut reply = [0u8; 32];
        reply[0..8].copy_from_slice(b"AWUS\0\0\0\0");
        reply[8..12].copy_from_slice(&0x0016_2300u32.to_le_bytes());
        t.queue_recv(STATUS_OK); // status for the FEL command aw_write
        t.queue_recv(&reply);
        t.queue_recv(STATUS_OK); // status for the reply aw_read
        t.queue_recv(FEL_STATUS); // trailing FEL status data
        t.queue_recv(STATUS_OK); // status for the trailing aw_read

        let v = version(&mut t).unwrap();
        assert_eq!(v.soc_id(), 0x1623);
    }

    #[test]
    fn read_issues_one_write_and_one_read_request() {
        let mut t = MockTransport::default();
        t.queue_recv(STATUS_OK); // status for the FEL command aw_write
        t.queue_recv(&[0xAA, 0xBB, 0xCC, 0xDD]);
        t.queue_recv(STATUS_OK); // status for the data aw_read
        t.queue_recv(FEL_STATUS); // trailing FEL status data
        t.queue_recv(STATUS_OK); // status for the trailing aw_read
        let mut buf = [0u8; 4];
        read(&mut t, 0x4000_0000, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0xCC, 0xDD]);
        // Sent: AW-USB req for FEL cmd (32) + FEL request (16) + AW-USB req for
        // read (32) + AW-USB req for the trailing FEL status read (32)
        assert_eq!(t.sent.len(), 32 + 16 + 32 + 32);
    }

    #[test]
    fn write_then_readl_roundtrip_value() {
        let mut t = MockTransport::default();
        t.queue_recv(STATUS_OK); // status for the FEL command aw_write
        t.queue_recv(STATUS_OK); // status for the data aw_write
        t.queue_recv(FEL_STATUS); // trailing FEL status data
        t.queue_recv(STATUS_OK); // status for the trailing aw_read
        write(&mut t, 0x4000_0000, &0x1234_5678u32.to_le_bytes(), None).unwrap();
        assert_eq!(&t.sent[t.sent.len() - 4..], &0x1234_5678u32.to_le_bytes());
    }

    #[test]
    fn execute_reads_trailing_fel_status() {
        let mut t = MockTransport::default();
        t.queue_recv(STATUS_OK); // status for the FEL command aw_write
        t.queue_recv(FEL_STATUS); // trailing FEL status data
        t.queue_recv(STATUS_OK); // status for the trailing aw_read
        execute(&mut t, 0x4a00_0000).unwrap();
    }
}
