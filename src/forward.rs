// ABOUTME: Generic one-directional framed forwarder between two arbitrary descriptors
// ABOUTME: Unlike the datagram pump this has no notion of TAP or AF_UNIX; it only knows read_hdr/write_hdr

use std::os::fd::OwnedFd;

use tracing::{debug, error};

use crate::config::ForwardConfig;
use crate::control::{start_detached, CancelToken, WorkerHandle};
use crate::error::{PumpError, PumpResult};
use crate::frame::{decode_len, encode_len, HEADER_LEN};
use crate::io::RawIo;

/// Copies data from one descriptor to another, one frame at a time.
///
/// Whether a "frame" is a length-prefixed unit or a raw chunk of
/// `read_size` bytes is governed independently by `read_hdr` and
/// `write_hdr`: a `Forwarder` can de-frame on read and re-frame on write,
/// or either side alone, or neither.
pub struct Forwarder {
    read: RawIo,
    write: RawIo,
    config: ForwardConfig,
    cancel: CancelToken,
}

impl Forwarder {
    pub fn new(read: OwnedFd, write: OwnedFd, config: ForwardConfig, cancel: CancelToken) -> std::io::Result<Self> {
        Ok(Self { read: RawIo::new(read)?, write: RawIo::new(write)?, config, cancel })
    }

    /// Runs until the read side reaches a clean EOF, the worker is
    /// cancelled, or a fatal I/O error occurs.
    #[tracing::instrument(skip(self), fields(read_hdr = self.config.read_hdr(), write_hdr = self.config.write_hdr()))]
    pub async fn run(&self) -> PumpResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                debug!("shutdown observed, forwarder exiting cleanly");
                return Ok(());
            }
            match self.step().await {
                Ok(true) => continue,
                Ok(false) => {
                    debug!("source reached eof, forwarder exiting cleanly");
                    return Ok(());
                }
                Err(PumpError::Cancelled) => {
                    debug!("shutdown observed mid-step, forwarder exiting cleanly");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "forwarder terminating on fatal error");
                    return Err(e);
                }
            }
        }
    }

    /// One read-then-write cycle. Returns `Ok(false)` on a clean EOF at a
    /// frame boundary, `Ok(true)` if a unit was moved and more may follow.
    async fn step(&self) -> PumpResult<bool> {
        let len = if self.config.read_hdr() {
            let mut header = [0u8; HEADER_LEN];
            if !self.read.read_exact_or_eof(&mut header, &self.cancel).await? {
                return Ok(false);
            }
            decode_len(header) as usize
        } else {
            self.config.read_size() as usize
        };

        let mut payload = vec![0u8; len];
        let n = if self.config.read_hdr() {
            self.read.read_exact(&mut payload, &self.cancel).await?;
            len
        } else {
            let n = self.read.read_once(&mut payload, &self.cancel).await?;
            if n == 0 {
                return Ok(false);
            }
            n
        };

        if self.config.write_hdr() {
            let header = encode_len(n, u16::MAX).map_err(|_| PumpError::FrameTooLarge { len: n, mtu: u16::MAX })?;
            self.write.write_vectored(vec![&header[..], &payload[..n]], &self.cancel).await?;
        } else {
            self.write.write_all(&payload[..n], &self.cancel).await?;
        }
        Ok(true)
    }
}

/// Pairs two forwarders under a shared cancellation token, spawning each
/// on its own task. Stopping either handle stops both, since they share
/// the same underlying flag: the generic analogue of the pump's single
/// `run()` multiplexing both directions itself.
pub fn bridge(
    a: Forwarder,
    b: Forwarder,
    cancel: CancelToken,
) -> (WorkerHandle<PumpResult<()>>, WorkerHandle<PumpResult<()>>) {
    let handle_a = start_detached(cancel.clone(), async move { a.run().await });
    let handle_b = start_detached(cancel, async move { b.run().await });
    (handle_a, handle_b)
}
