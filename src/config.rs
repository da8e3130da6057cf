// ABOUTME: Validated configuration for the datagram pump and the generic forwarder
// ABOUTME: Construction is fallible: a bad mtu is a caller bug worth surfacing immediately

use std::path::PathBuf;

use tracing::warn;

use crate::error::ConfigError;
use crate::frame::{MIN_MTU, MTU_ADVISORY_MAX};

/// Configuration for [`crate::pump::DatagramPump`].
///
/// `mtu` bounds the size of a single Ethernet frame the pump will move in
/// either direction; a larger datagram arriving on `read_sock_path` is a
/// protocol violation handled by dropping it, not a configuration error.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    mtu: u16,
    read_sock_path: PathBuf,
    write_sock_path: PathBuf,
}

impl PumpConfig {
    /// Builds a validated configuration. Rejects an mtu below the hard
    /// minimum of 590; logs (but does not reject) an mtu above the 1486
    /// advisory ceiling, since that bound is a recommendation rather than
    /// a hard limit.
    pub fn new(mtu: u16, read_sock_path: impl Into<PathBuf>, write_sock_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        if mtu < MIN_MTU {
            return Err(ConfigError::MtuTooSmall { mtu, min: MIN_MTU });
        }
        if mtu > MTU_ADVISORY_MAX {
            warn!(mtu, advisory_max = MTU_ADVISORY_MAX, "mtu exceeds advisory maximum");
        }
        Ok(Self { mtu, read_sock_path: read_sock_path.into(), write_sock_path: write_sock_path.into() })
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Size of the ingress staging buffer: mtu plus the 2-byte length
    /// header. The egress direction allocates one byte more than this so
    /// an oversize TAP frame stays distinguishable from a frame that
    /// exactly fills the mtu; see `egress_buffer_len` in `src/pump.rs`.
    pub fn buffer_len(&self) -> usize {
        self.mtu as usize + crate::frame::HEADER_LEN
    }

    pub fn read_sock_path(&self) -> &std::path::Path {
        &self.read_sock_path
    }

    pub fn write_sock_path(&self) -> &std::path::Path {
        &self.write_sock_path
    }
}

/// Configuration for one direction of [`crate::forward::Forwarder`].
#[derive(Debug, Clone, Copy)]
pub struct ForwardConfig {
    read_size: u32,
    read_hdr: bool,
    write_hdr: bool,
}

impl ForwardConfig {
    /// `read_size` is the preferred chunk size used when `read_hdr` is
    /// false; it is ignored (the incoming length header governs instead)
    /// when `read_hdr` is true.
    pub fn new(read_size: u32, read_hdr: bool, write_hdr: bool) -> Result<Self, ConfigError> {
        if read_size == 0 || read_size > u16::MAX as u32 {
            return Err(ConfigError::InvalidReadSize(read_size));
        }
        Ok(Self { read_size, read_hdr, write_hdr })
    }

    pub fn read_size(&self) -> u32 {
        self.read_size
    }

    pub fn read_hdr(&self) -> bool {
        self.read_hdr
    }

    pub fn write_hdr(&self) -> bool {
        self.write_hdr
    }
}
