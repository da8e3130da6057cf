// ABOUTME: The 2-byte little-endian length-prefix codec shared by the pump and the forwarder
// ABOUTME: Encoding/decoding never touches I/O; callers validate decoded lengths against their own mtu

use thiserror::Error;

/// Hard minimum MTU: 576 byte minimum IPv4 payload plus a 14 byte Ethernet header.
pub const MIN_MTU: u16 = 576 + 14;

/// Advisory maximum MTU (carrier MTU 1500 minus the length-prefix overhead).
pub const MTU_ADVISORY_MAX: u16 = 1486;

/// Width of the length prefix in bytes.
pub const HEADER_LEN: usize = 2;

/// Failure to encode a length because it exceeds the frame's configured mtu.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("length {len} exceeds mtu {mtu}")]
pub struct FrameTooLarge {
    pub len: usize,
    pub mtu: u16,
}

/// Encodes `len` as a 2-byte little-endian header, rejecting lengths that
/// exceed `mtu`.
///
/// `len` may legally be 0..=65535 on the wire, but this crate never asks to
/// encode a length the caller did not just read from its own mtu-bounded
/// buffer, so the mtu check is the only one that matters in practice.
pub fn encode_len(len: usize, mtu: u16) -> Result<[u8; HEADER_LEN], FrameTooLarge> {
    if len > mtu as usize {
        return Err(FrameTooLarge { len, mtu });
    }
    // len <= mtu <= u16::MAX, so this cast never truncates.
    Ok((len as u16).to_le_bytes())
}

/// Decodes a 2-byte little-endian length header. Never fails: a well-formed
/// 2-byte buffer always decodes to *some* `u16`. Callers compare the result
/// against their own mtu and treat an overage as [`FrameTooLarge`].
pub fn decode_len(header: [u8; HEADER_LEN]) -> u16 {
    u16::from_le_bytes(header)
}

/// Checks a decoded length against an mtu, producing the same error
/// [`encode_len`] would have produced had it been asked to encode that length.
pub fn check_len(len: u16, mtu: u16) -> Result<(), FrameTooLarge> {
    if len > mtu {
        return Err(FrameTooLarge { len: len as usize, mtu });
    }
    Ok(())
}
