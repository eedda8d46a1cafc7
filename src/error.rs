use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::result::Result as StdResult;

#[derive(Debug)]
pub enum Error {
    /// No FEL-capable USB device found (or none matching the given bus:devnum).
    DeviceNotFound,
    /// More than one FEL device is attached and none was selected explicitly.
    TooManyMatches,
    /// The connected device's `version` reply does not name an entry in the SoC table.
    UnsupportedSoc(u32),
    /// A USB transfer failed (timeout, stall, or any other libusb-level error).
    IoError(rusb::Error),
    /// An AW-USB status reply's signature did not read `"AWUS"`.
    FramingError,
    /// A loaded image failed header validation (bad magic, arch, checksum, size, alignment).
    ImageError(&'static str),
    /// The boot ROM's MMU/coprocessor state did not match any known-good shape.
    UnexpectedMmuState(&'static str),
    /// A size limit was exceeded where truncation is not an acceptable fallback.
    LimitExceeded(&'static str),
    /// A write targeted the already-uploaded U-Boot image range.
    OverwriteGuard { entry: u32, size: u32 },
    /// A capability (e.g. RVBAR) that a requested operation needs is absent for this SoC.
    MissingCapability(&'static str),
    /// The SPL did not report the `"eGON.FEL"` handshake after `execute`.
    HandshakeFailed([u8; 8]),
    /// A local file could not be read or written.
    Io(std::io::Error),
    /// A command-line argument failed validation (bad number, wrong arity, etc).
    InvalidArgument(String),
}

impl StdError for Error {}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter) -> StdResult<(), std::fmt::Error> {
        match self {
            Error::DeviceNotFound => write!(fmt, "no matching FEL device found"),
            Error::TooManyMatches => write!(
                fmt,
                "more than one FEL device attached, specify -d BUS:DEVNUM"
            ),
            Error::UnsupportedSoc(id) => write!(fmt, "unsupported SoC id 0x{:04x}", id),
            Error::IoError(e) => write!(fmt, "USB error: {}", e),
            Error::FramingError => write!(fmt, "AW-USB status framing error"),
            Error::ImageError(msg) => write!(fmt, "invalid image: {}", msg),
            Error::UnexpectedMmuState(msg) => {
                write!(fmt, "unexpected MMU/coprocessor state: {}", msg)
            }
            Error::LimitExceeded(msg) => write!(fmt, "size limit exceeded: {}", msg),
            Error::OverwriteGuard { entry, size } => write!(
                fmt,
                "write would overlap uploaded U-Boot image at 0x{:08x}..0x{:08x}",
                entry,
                entry.wrapping_add(*size)
            ),
            Error::MissingCapability(what) => write!(fmt, "missing capability: {}", what),
            Error::HandshakeFailed(got) => write!(
                fmt,
                "SPL handshake failed, got {:?} instead of \"eGON.FEL\"",
                String::from_utf8_lossy(got)
            ),
            Error::Io(e) => write!(fmt, "I/O error: {}", e),
            Error::InvalidArgument(msg) => write!(fmt, "invalid argument: {}", msg),
        }
    }
}

impl From<rusb::Error> for Error {
    fn from(error: rusb::Error) -> Self {
        Error::IoError(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

pub type Result<T> = StdResult<T, Error>;

impl Error {
    /// Process exit code per the three-way split in the CLI's external contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::IoError(_) => 2,
            _ => 1,
        }
    }
}
