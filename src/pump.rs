// ABOUTME: The TAP-to-socket bidirectional bridge, the crate's central component
// ABOUTME: Each direction's offset state lives outside the select! branches so a dropped branch loses no progress

use std::os::fd::OwnedFd;

use tracing::{debug, error, warn};

use crate::config::PumpConfig;
use crate::control::CancelToken;
use crate::error::{PumpError, PumpResult};
use crate::frame::{check_len, decode_len, encode_len, HEADER_LEN};
use crate::io::RawIo;
use crate::stats::PumpStats;

/// Bridges a TAP character device to a pair of length-prefixed AF_UNIX
/// datagram sockets.
///
/// One egress direction (TAP read -> socket sendto) and one ingress
/// direction (socket recvfrom -> TAP write) run concurrently inside
/// [`DatagramPump::run`]; each keeps its own staging buffer and offset
/// state so that a partial write on one side never blocks progress on
/// the other.
pub struct DatagramPump {
    tap: RawIo,
    read_sock: RawIo,
    write_sock: RawIo,
    config: PumpConfig,
    stats: PumpStats,
    cancel: CancelToken,
}

impl DatagramPump {
    /// Takes ownership of three already-open, already-configured
    /// descriptors. Socket construction, TAP interface setup, and address
    /// assignment all happen before a `DatagramPump` exists.
    pub fn new(
        tap: OwnedFd,
        read_sock: OwnedFd,
        write_sock: OwnedFd,
        config: PumpConfig,
        cancel: CancelToken,
    ) -> std::io::Result<Self> {
        Ok(Self {
            tap: RawIo::new(tap)?,
            read_sock: RawIo::new(read_sock)?,
            write_sock: RawIo::new(write_sock)?,
            config,
            stats: PumpStats::new(),
            cancel,
        })
    }

    /// A cheaply cloneable handle to this pump's counters.
    pub fn stats(&self) -> PumpStats {
        self.stats.clone()
    }

    /// Runs both directions until cancelled or a fatal I/O error occurs.
    /// Returns `Ok(())` on clean shutdown.
    #[tracing::instrument(skip(self), fields(mtu = self.config.mtu()))]
    pub async fn run(&self) -> PumpResult<()> {
        let mtu = self.config.mtu();
        let mut egress = DirectionState::new(egress_buffer_len(mtu));
        let mut ingress = DirectionState::new(self.config.buffer_len());

        loop {
            if self.cancel.is_cancelled() {
                debug!("shutdown observed, pump exiting cleanly");
                return Ok(());
            }

            let result = tokio::select! {
                r = self.step_egress(&mut egress, mtu) => r,
                r = self.step_ingress(&mut ingress, mtu) => r,
            };

            match result {
                Ok(()) => continue,
                Err(PumpError::Cancelled) => {
                    debug!("shutdown observed mid-step, pump exiting cleanly");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "pump terminating on fatal error");
                    return Err(e);
                }
            }
        }
    }

    /// TAP -> write socket. Idle: read one frame from TAP and stamp a
    /// length header. Busy: `sendto` the remainder to `write_sock_path`.
    ///
    /// The read lands in a scratch region one byte wider than `mtu`, so a
    /// frame that actually exceeds `mtu` shows up as `n == mtu + 1` instead
    /// of being silently truncated to fit; `encode_len` then rejects it.
    async fn step_egress(&self, state: &mut DirectionState, mtu: u16) -> PumpResult<()> {
        if state.total == 0 {
            let n = self.tap.read_once(&mut state.buf[HEADER_LEN..], &self.cancel).await?;
            if n == 0 {
                return Ok(());
            }
            match encode_len(n, mtu) {
                Ok(header) => {
                    state.buf[0] = header[0];
                    state.buf[1] = header[1];
                    state.total = n + HEADER_LEN;
                    state.off = 0;
                }
                Err(_) => {
                    warn!(len = n, mtu, "tap produced a frame larger than mtu, dropping");
                    self.stats.record_dropped_invalid();
                    return Ok(());
                }
            }
        }

        let n = self
            .write_sock
            .send_to(&state.buf[state.off..state.total], self.config.write_sock_path(), &self.cancel)
            .await?;
        state.off += n;
        if state.off == state.total {
            self.stats.record_tap_to_sock((state.total - HEADER_LEN) as u64);
            state.total = 0;
            state.off = 0;
        }
        Ok(())
    }

    /// Read socket -> TAP. Idle: `recvfrom` one datagram and decode its
    /// header. Busy: write the payload to the TAP device.
    async fn step_ingress(&self, state: &mut DirectionState, mtu: u16) -> PumpResult<()> {
        if state.total == 0 {
            let n = self.read_sock.recv_from(&mut state.buf[..], &self.cancel).await?;
            if n == 0 {
                return Ok(());
            }
            if n < HEADER_LEN {
                warn!(n, "datagram shorter than the length header, dropping");
                self.stats.record_dropped_invalid();
                return Ok(());
            }
            let len = decode_len([state.buf[0], state.buf[1]]);
            if let Err(e) = check_len(len, mtu) {
                warn!(len = e.len, mtu, "oversize ingress datagram dropped");
                self.stats.record_dropped_invalid();
                return Ok(());
            }
            state.total = len as usize;
            state.off = 0;
        }

        if state.off < state.total {
            let n = self
                .tap
                .write_once(&state.buf[HEADER_LEN + state.off..HEADER_LEN + state.total], &self.cancel)
                .await?;
            state.off += n;
        }
        if state.total > 0 && state.off >= state.total {
            self.stats.record_sock_to_tap(state.total as u64);
            state.total = 0;
            state.off = 0;
        }
        Ok(())
    }
}

/// Capacity of the egress staging buffer: header plus one byte more than
/// `mtu`. Reading into a region only `mtu` bytes wide would cap `n` at
/// `mtu` no matter how large the real frame was, making an oversize TAP
/// frame indistinguishable from a frame that exactly fills the mtu; the
/// extra byte makes `n == mtu + 1` observable so `encode_len` can reject it.
fn egress_buffer_len(mtu: u16) -> usize {
    HEADER_LEN + mtu as usize + 1
}

/// Per-direction staging buffer and progress offsets. `total == 0` means
/// idle (no frame in flight); `off == total` means the in-flight frame just
/// finished draining, and the next step call starts a new one.
struct DirectionState {
    buf: Vec<u8>,
    total: usize,
    off: usize,
}

impl DirectionState {
    fn new(buf_len: usize) -> Self {
        Self { buf: vec![0u8; buf_len], total: 0, off: 0 }
    }
}
