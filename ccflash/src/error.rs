//! Error types for ccflash.

use std::io;
use thiserror::Error;

use crate::protocol::command::{Command, Status};
use crate::protocol::response::StorageBitmap;

/// Result type for ccflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown when the boot ROM never answers the break condition.
///
/// This failure is almost always physical, so the text points at the strap pin.
pub const UNREACHABLE_HINT: &str = "Unable to communicate with the boot loader. \
     Please make sure SOP2 is high and reset the device. \
     If you are using a LAUNCHXL board, the SOP2 jumper should be closed";

/// Broad classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Short read/write, timeout, closed channel.
    Transport,
    /// Checksum mismatch, invalid ACK, bad status.
    Protocol,
    /// Boot loader unreachable, unsupported or misconfigured.
    Negotiation,
    /// File upload failures.
    Upload,
    /// Malformed parts or configuration.
    Configuration,
}

/// Error type for ccflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The channel returned fewer bytes than requested and then signalled EOF.
    #[error("Short read: wanted {wanted} bytes, got {got}")]
    ShortRead {
        /// Requested number of bytes.
        wanted: usize,
        /// Bytes received before EOF.
        got: usize,
    },

    /// The channel accepted fewer bytes than the packet length.
    #[error("Short write: wanted {wanted} bytes, wrote {written}")]
    ShortWrite {
        /// Packet length.
        wanted: usize,
        /// Bytes accepted by the channel.
        written: usize,
    },

    /// No usable serial port was found.
    #[error("Device not found")]
    DeviceNotFound,

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Received packet checksum does not match its payload.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum carried in the packet header.
        expected: u8,
        /// Checksum computed over the received payload.
        actual: u8,
    },

    /// Two bytes were received where an ACK was expected.
    #[error("Invalid ACK ({:02x} {:02x})", .0[0], .0[1])]
    InvalidAck([u8; 2]),

    /// Packet header or length field is inconsistent.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Status byte outside the known set.
    #[error("Unrecognized status byte {0:#04x}")]
    UnrecognizedStatus(u8),

    /// A mutating command was answered with a non-Ok status.
    #[error("{command}: status {:#04x} ({status})", .status.code())]
    CommandFailed {
        /// The command that was issued.
        command: Command,
        /// The status reported by the boot loader.
        status: Status,
    },

    /// Response payload had an unexpected shape.
    #[error("{command}: malformed response: {reason}")]
    MalformedResponse {
        /// The command whose response was malformed.
        command: Command,
        /// What was wrong with it.
        reason: String,
    },

    /// Unsupported chip or operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// SLIP framing error.
    #[error("SLIP error: {0}")]
    Slip(String),

    /// The boot loader never acknowledged the break condition.
    #[error("{} (no response after {attempts} attempts)", UNREACHABLE_HINT)]
    Unreachable {
        /// Number of synchronization attempts made.
        attempts: u32,
    },

    /// Boot loader version is too old to be driven safely.
    #[error("Unsupported boot loader version ({0})")]
    UnsupportedBootloader(String),

    /// Storage bitmap lacks serial flash or RAM.
    #[error("Invalid storage configuration: {0}")]
    InvalidStorageConfiguration(StorageBitmap),

    /// Chip discriminant outside the known set.
    #[error("Unknown chip (discriminant {0:#04x})")]
    UnknownChip(u8),

    /// The NWP handover was requested twice in one session.
    #[error("Handover to the NWP boot loader was already performed")]
    HandoverAlreadyPerformed,

    /// No block size in the ladder can hold the file.
    #[error("{name}: file is too big ({size} bytes)")]
    FileTooLarge {
        /// File name.
        name: String,
        /// Requested allocation size.
        size: usize,
    },

    /// Signature blob present with a length other than the fixed one.
    #[error("{name}: invalid signature length ({len})")]
    InvalidSignatureLength {
        /// File name.
        name: String,
        /// Actual signature length.
        len: usize,
    },

    /// The open/start-upload exchange failed.
    #[error("{name}: open failed")]
    OpenFailed {
        /// File name.
        name: String,
        /// Underlying error.
        source: Box<Error>,
    },

    /// A chunk write failed.
    #[error("{name}: write failed @ {offset}")]
    ChunkFailed {
        /// File name.
        name: String,
        /// Offset of the failing chunk.
        offset: usize,
        /// Underlying error.
        source: Box<Error>,
    },

    /// The finish-upload exchange failed.
    #[error("{name}: close failed")]
    FinalizeFailed {
        /// File name.
        name: String,
        /// Underlying error.
        source: Box<Error>,
    },

    /// Image programming reported a negative extended status.
    #[error("Image programming error @ {offset}: e0 = {e0}, e1 = {e1}")]
    ImageFailed {
        /// Offset of the failing slice.
        offset: usize,
        /// First status word.
        e0: i16,
        /// Second status word.
        e1: u16,
    },

    /// Firmware part could not be loaded.
    #[error("Invalid part {name}: {reason}")]
    InvalidPart {
        /// Part name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Annotated error. Displays as `context: inner`.
    #[error("{context}: {inner}")]
    Context {
        /// Annotation.
        context: String,
        /// Underlying error.
        inner: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with an annotation.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            inner: Box::new(self),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::ShortRead { .. }
            | Self::ShortWrite { .. }
            | Self::Timeout(_)
            | Self::DeviceNotFound => ErrorKind::Transport,
            #[cfg(feature = "native")]
            Self::Serial(_) => ErrorKind::Transport,
            Self::ChecksumMismatch { .. }
            | Self::InvalidAck(_)
            | Self::InvalidPacket(_)
            | Self::UnrecognizedStatus(_)
            | Self::CommandFailed { .. }
            | Self::MalformedResponse { .. }
            | Self::Unsupported(_)
            | Self::Slip(_) => ErrorKind::Protocol,
            Self::Unreachable { .. }
            | Self::UnsupportedBootloader(_)
            | Self::InvalidStorageConfiguration(_)
            | Self::UnknownChip(_)
            | Self::HandoverAlreadyPerformed => ErrorKind::Negotiation,
            Self::FileTooLarge { .. }
            | Self::InvalidSignatureLength { .. }
            | Self::OpenFailed { .. }
            | Self::ChunkFailed { .. }
            | Self::FinalizeFailed { .. }
            | Self::ImageFailed { .. } => ErrorKind::Upload,
            Self::InvalidPart { .. } | Self::Config(_) => ErrorKind::Configuration,
            Self::Context { inner, .. } => inner.kind(),
        }
    }

    /// Returns the innermost error, skipping annotations and upload wrappers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Context { inner: source, .. }
            | Self::OpenFailed { source, .. }
            | Self::ChunkFailed { source, .. }
            | Self::FinalizeFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this error means the inbound side of the channel hit EOF.
    pub fn is_eof(&self) -> bool {
        matches!(self.root_cause(), Self::ShortRead { .. })
    }
}

/// Extension for annotating `Result`s, in the spirit of `anyhow::Context`.
pub trait ResultExt<T> {
    /// Annotate the error, if any.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Annotate the error lazily, if any.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}
