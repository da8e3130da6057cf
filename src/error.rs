// ABOUTME: Error taxonomy for the packet pump core
// ABOUTME: WouldBlock/Interrupted never escape io::RawIo, so neither variant exists here

use thiserror::Error;

/// Errors surfaced by the pump and forwarder workers.
///
/// `WouldBlock` and `Interrupted` are deliberately absent: both are transient
/// conditions absorbed internally by [`crate::io::RawIo`]'s retry loops and
/// never reach a caller.
#[derive(Debug, Error)]
pub enum PumpError {
    /// The shutdown flag was observed before an I/O call was entered.
    #[error("cancelled")]
    Cancelled,

    /// A framed read saw EOF before the expected number of bytes arrived.
    #[error("unexpected eof mid-frame")]
    UnexpectedEof,

    /// A decoded or requested length exceeded the configured MTU.
    #[error("frame of {len} bytes exceeds mtu {mtu}")]
    FrameTooLarge { len: usize, mtu: u16 },

    /// Any other I/O failure (`EBADF`, `ENOTCONN`, a persistent `EPIPE`, ...).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer allocation failed at startup.
    #[error("out of memory")]
    OutOfMemory,
}

/// Result alias for pump and forwarder operations.
pub type PumpResult<T> = Result<T, PumpError>;

/// Errors from [`crate::config`] validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("mtu {mtu} is below the minimum of {min} (576 byte IP payload + 14 byte ethernet header)")]
    MtuTooSmall { mtu: u16, min: u16 },

    #[error("preferred read size must be between 1 and 65535, got {0}")]
    InvalidReadSize(u32),
}
