//! AW-USB framing (C2): wraps every transfer with a fixed 32-byte request
//! header and reads back a 13-byte status reply.

use crate::error::{Error, Result};
use crate::usb::BulkTransport;

const SUB_REQUEST_READ: u16 = 0x11;
const SUB_REQUEST_WRITE: u16 = 0x12;
const REQUEST_CONST: u32 = 0x0c00_0000;

/// Builds the 32-byte AW-USB request header for a read or write of `length`
/// bytes. Layout: 8-byte signature `"AWUC"` (nul-padded), 32-bit length,
/// fixed constant `0x0c000000`, 16-bit sub-request, 32-bit length repeated,
/// 10 bytes of padding.
fn build_request(sub_request: u16, length: u32) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[0..8].copy_from_slice(b"AWUC\0\0\0\0");
    buf[8..12].copy_from_slice(&length.to_le_bytes());
    buf[12..16].copy_from_slice(&REQUEST_CONST.to_le_bytes());
    buf[16..18].copy_from_slice(&sub_request.to_le_bytes());
    buf[18..22].copy_from_slice(&length.to_le_bytes());
    buf
}

fn check_status(status: &[u8; 13]) -> Result<()> {
    if &status[0..4] == b"AWUS" {
        Ok(())
    } else {
        Err(Error::FramingError)
    }
}

/// Writes `data` to the device: request header, payload (optionally chunked
/// for progress reporting), then the status reply.
pub fn aw_write<B: BulkTransport>(
    transport: &mut B,
    data: &[u8],
    mut progress: Option<&mut dyn FnMut(usize)>,
) -> Result<()> {
    let request = build_request(SUB_REQUEST_WRITE, data.len() as u32);
    transport.send(&request, request.len(), &mut |_| {})?;

    if !data.is_empty() {
        let chunk_size = B::chunk_size(progress.is_some());
        match progress.as_deref_mut() {
            Some(cb) => transport.send(data, chunk_size, cb)?,
            None => transport.send(data, chunk_size, &mut |_| {})?,
        }
    }

    let mut status = [0u8; 13];
    transport.recv(&mut status)?;
    check_status(&status)
}

/// Reads `buf.len()` bytes from the device: request header, payload, status.
pub fn aw_read<B: BulkTransport>(transport: &mut B, buf: &mut [u8]) -> Result<()> {
    let request = build_request(SUB_REQUEST_READ, buf.len() as u32);
    transport.send(&request, request.len(), &mut |_| {})?;

    if !buf.is_empty() {
        transport.recv(buf)?;
    }

    let mut status = [0u8; 13];
    transport.recv(&mut status)?;
    check_status(&status)
}
