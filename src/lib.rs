//! A library and CLI driving Allwinner's FEL USB boot-ROM recovery
//! protocol: AW-USB framing, the FEL command set, ARM thunk generation for
//! coprocessor and bulk memory access, MMU backup/restore, and the
//! SPL/U-Boot loader state machine built on top of them.
//!
//! # Example: read a word of target memory
//! ```rust, no_run
//! use fel::protocol;
//! use fel::soc;
//! use fel::usb::UsbBulkTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let context = rusb::Context::new()?;
//! let device = context
//!     .devices()?
//!     .iter()
//!     .find(|d| {
//!         d.device_descriptor()
//!             .map(|desc| desc.vendor_id() == fel::usb::VENDOR_ID && desc.product_id() == fel::usb::PRODUCT_ID)
//!             .unwrap_or(false)
//!     })
//!     .ok_or(fel::Error::DeviceNotFound)?;
//!
//! let mut transport = UsbBulkTransport::open(&device)?;
//! let reply = protocol::version(&mut transport)?;
//! let info = soc::resolve(reply.soc_id())?;
//! println!("{} at 0x{:04x}", info.name, info.soc_id);
//! # Ok(())
//! # }
//! ```

pub mod awusb;
pub mod command;
pub mod error;
pub mod image;
pub mod loader;
pub mod mmu;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod soc;
pub mod thunk;
pub mod usb;

pub use error::{Error, Result};
