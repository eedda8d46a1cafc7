//! USB transport (C1): bulk send/recv chunking, endpoint discovery, and
//! kernel-driver detach/reattach. The FEL protocol and AW-USB framing layers
//! above this module talk to a [`BulkTransport`] rather than `rusb` directly,
//! so tests can substitute an in-memory mock for the real USB endpoint pair.

use crate::error::{Error, Result};
use std::time::Duration;

/// Allwinner's FEL-mode USB vendor ID.
pub const VENDOR_ID: u16 = 0x1F3A;
/// Allwinner's FEL-mode USB product ID.
pub const PRODUCT_ID: u16 = 0xEFE8;

/// Timeout applied to every individual bulk transfer.
const TIMEOUT: Duration = Duration::from_secs(10);

/// Default chunk size for large sends; shrunk when a progress callback is
/// active so status updates fire more often.
const CHUNK_SIZE_DEFAULT: usize = 512 * 1024;
const CHUNK_SIZE_WITH_PROGRESS: usize = 128 * 1024;

/// The first bulk IN/OUT endpoint addresses found on interface 0.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub ep_in: u8,
    pub ep_out: u8,
}

/// Abstraction over a chunked bulk transfer pair, implemented by the real
/// `rusb`-backed transport and by an in-memory mock used in tests.
pub trait BulkTransport {
    /// Sends `data` in full, invoking `on_chunk(n)` after each chunk of at
    /// most `chunk_size` bytes has been written (n is the cumulative byte
    /// count sent so far).
    fn send(&mut self, data: &[u8], chunk_size: usize, on_chunk: &mut dyn FnMut(usize)) -> Result<()>;

    /// Receives exactly `buf.len()` bytes, looping over the underlying bulk
    /// transfer primitive until satisfied.
    fn recv(&mut self, buf: &mut [u8]) -> Result<()>;

    /// The chunk size to use for a send, given whether a progress callback
    /// is in play for this transaction.
    fn chunk_size(progress_active: bool) -> usize
    where
        Self: Sized,
    {
        if progress_active {
            CHUNK_SIZE_WITH_PROGRESS
        } else {
            CHUNK_SIZE_DEFAULT
        }
    }
}

/// The real `rusb`-backed bulk transport: a claimed interface plus the
/// endpoint addresses discovered on it.
pub struct UsbBulkTransport<T: rusb::UsbContext> {
    handle: rusb::DeviceHandle<T>,
    endpoints: Endpoints,
    kernel_driver_was_active: bool,
}

impl<T: rusb::UsbContext> UsbBulkTransport<T> {
    /// Opens `device`, discovers its bulk endpoints on interface 0, detaches
    /// the kernel driver if one is attached, and claims the interface.
    pub fn open(device: &rusb::Device<T>) -> Result<Self> {
        let endpoints = find_endpoints(device)?;
        let mut handle = device.open()?;

        let kernel_driver_was_active = handle.kernel_driver_active(0).unwrap_or(false);
        if kernel_driver_was_active {
            handle.detach_kernel_driver(0)?;
        }
        handle.claim_interface(0)?;

        Ok(Self {
            handle,
            endpoints,
            kernel_driver_was_active,
        })
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    pub fn handle(&self) -> &rusb::DeviceHandle<T> {
        &self.handle
    }
}

impl<T: rusb::UsbContext> Drop for UsbBulkTransport<T> {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(0);
        if self.kernel_driver_was_active {
            let _ = self.handle.attach_kernel_driver(0);
        }
    }
}

impl<T: rusb::UsbContext> BulkTransport for UsbBulkTransport<T> {
    fn send(&mut self, data: &[u8], chunk_size: usize, on_chunk: &mut dyn FnMut(usize)) -> Result<()> {
        let mut sent = 0;
        for chunk in data.chunks(chunk_size.max(1)) {
            let mut written = 0;
            while written < chunk.len() {
                written += self
                    .handle
                    .write_bulk(self.endpoints.ep_out, &chunk[written..], TIMEOUT)?;
            }
            sent += chunk.len();
            on_chunk(sent);
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            read += self
                .handle
                .read_bulk(self.endpoints.ep_in, &mut buf[read..], TIMEOUT)?;
        }
        Ok(())
    }
}

/// Every attached device matching [`VENDOR_ID`]/[`PRODUCT_ID`].
pub fn find_devices<T: rusb::UsbContext>(context: &T) -> Result<Vec<rusb::Device<T>>> {
    Ok(context
        .devices()?
        .iter()
        .filter(|d| {
            d.device_descriptor()
                .map(|desc| desc.vendor_id() == VENDOR_ID && desc.product_id() == PRODUCT_ID)
                .unwrap_or(false)
        })
        .collect())
}

/// Picks one FEL device: the explicit `bus:devnum` match if given, else the
/// sole attached device, else [`Error::TooManyMatches`] if more than one is
/// present and none was named (spec.md §6's `-d BUS:DEVNUM` flag).
pub fn pick_device<T: rusb::UsbContext>(
    context: &T,
    bus_devnum: Option<(u8, u8)>,
) -> Result<rusb::Device<T>> {
    let devices = find_devices(context)?;
    if let Some((bus, devnum)) = bus_devnum {
        devices
            .into_iter()
            .find(|d| d.bus_number() == bus && d.address() == devnum)
            .ok_or(Error::DeviceNotFound)
    } else if devices.len() > 1 {
        Err(Error::TooManyMatches)
    } else {
        devices.into_iter().next().ok_or(Error::DeviceNotFound)
    }
}

/// Scans the active configuration's interface-0 alt-settings for the first
/// bulk IN and first bulk OUT endpoint.
pub fn find_endpoints<T: rusb::UsbContext>(device: &rusb::Device<T>) -> Result<Endpoints> {
    let config = device.active_config_descriptor()?;
    let mut ep_in = None;
    let mut ep_out = None;

    for interface in config.interfaces().filter(|i| i.number() == 0) {
        for setting in interface.descriptors() {
            for endpoint in setting.endpoint_descriptors() {
                if endpoint.transfer_type() != rusb::TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    rusb::Direction::In if ep_in.is_none() => ep_in = Some(endpoint.address()),
                    rusb::Direction::Out if ep_out.is_none() => ep_out = Some(endpoint.address()),
                    _ => {}
                }
            }
        }
    }

    match (ep_in, ep_out) {
        (Some(ep_in), Some(ep_out)) => Ok(Endpoints { ep_in, ep_out }),
        _ => Err(Error::DeviceNotFound),
    }
}

/// An in-memory [`BulkTransport`] for tests — unit tests throughout this
/// crate and the integration suite in `tests/` both drive it directly.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory stand-in for the USB endpoint pair: a queue of bytes the
    /// "device" will hand back on `recv`, and a record of everything sent.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Vec<u8>,
        pub to_recv: VecDeque<u8>,
    }

    impl MockTransport {
        pub fn queue_recv(&mut self, bytes: &[u8]) {
            self.to_recv.extend(bytes);
        }
    }

    impl BulkTransport for MockTransport {
        fn send(
            &mut self,
            data: &[u8],
            chunk_size: usize,
            on_chunk: &mut dyn FnMut(usize),
        ) -> Result<()> {
            let mut sent = 0;
            for chunk in data.chunks(chunk_size.max(1)) {
                self.sent.extend_from_slice(chunk);
                sent += chunk.len();
                on_chunk(sent);
            }
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
            for byte in buf.iter_mut() {
                *byte = self
                    .to_recv
                    .pop_front()
                    .expect("mock transport ran out of queued bytes");
            }
            Ok(())
        }
    }
}
