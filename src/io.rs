// ABOUTME: AsyncFd-backed raw descriptor wrapper and the read/write primitives built on it
// ABOUTME: This is the crate's one readiness loop; callers never see EAGAIN or EINTR

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tokio::io::unix::AsyncFd;

use crate::control::CancelToken;
use crate::error::PumpError;

/// A raw, non-blocking descriptor registered with the tokio reactor.
///
/// Every descriptor this crate touches (the TAP character device, an
/// AF_UNIX datagram socket, or an arbitrary fd handed to the generic
/// forwarder) is wrapped as a `RawIo`. All syscalls go through
/// `AsyncFd::try_io`, which is itself the readiness loop: there is no
/// separate `select`/`epoll_wait` call anywhere else in the crate.
pub struct RawIo {
    fd: AsyncFd<OwnedFd>,
}

impl RawIo {
    /// Registers `fd` with the reactor. `fd` must already be non-blocking;
    /// callers own descriptor construction (opening the TAP device,
    /// binding the sockets) before handing the fd over.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        Ok(Self { fd: AsyncFd::new(fd)? })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Single `read(2)`. Returns `Ok(0)` on EOF. Never returns a length
    /// greater than `buf.len()`. `EINTR` is retried transparently.
    pub async fn read_once(&self, buf: &mut [u8], cancel: &CancelToken) -> Result<usize, PumpError> {
        loop {
            let mut guard = wait_readable(&self.fd, cancel).await?;
            let outcome = guard.try_io(|inner| {
                let n = unsafe { libc::read(inner.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
                raw_result(n)
            });
            match outcome {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    /// Single `write(2)`. May write fewer bytes than `buf.len()`. `EINTR` is
    /// retried transparently.
    pub async fn write_once(&self, buf: &[u8], cancel: &CancelToken) -> Result<usize, PumpError> {
        loop {
            let mut guard = wait_writable(&self.fd, cancel).await?;
            let outcome = guard.try_io(|inner| {
                let n = unsafe { libc::write(inner.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
                raw_result(n)
            });
            match outcome {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    /// Loops `read_once` until exactly `buf.len()` bytes are gathered.
    /// EOF before that point is `UnexpectedEof`.
    pub async fn read_exact(&self, buf: &mut [u8], cancel: &CancelToken) -> Result<(), PumpError> {
        let mut off = 0;
        while off < buf.len() {
            let n = self.read_once(&mut buf[off..], cancel).await?;
            if n == 0 {
                return Err(PumpError::UnexpectedEof);
            }
            off += n;
        }
        Ok(())
    }

    /// Like [`RawIo::read_exact`], but a clean EOF with zero bytes gathered
    /// so far resolves to `Ok(false)` instead of an error. Used at frame
    /// boundaries, where a peer disconnecting between frames is expected.
    pub async fn read_exact_or_eof(&self, buf: &mut [u8], cancel: &CancelToken) -> Result<bool, PumpError> {
        if buf.is_empty() {
            return Ok(true);
        }
        let mut off = 0;
        while off < buf.len() {
            let n = self.read_once(&mut buf[off..], cancel).await?;
            if n == 0 {
                if off == 0 {
                    return Ok(false);
                }
                return Err(PumpError::UnexpectedEof);
            }
            off += n;
        }
        Ok(true)
    }

    /// Loops `write_once` until all of `buf` is drained.
    pub async fn write_all(&self, buf: &[u8], cancel: &CancelToken) -> Result<(), PumpError> {
        let mut off = 0;
        while off < buf.len() {
            let n = self.write_once(&buf[off..], cancel).await?;
            off += n;
        }
        Ok(())
    }

    /// `writev(2)` of `slices` as one logical write, looping on partial
    /// progress until everything is drained. Used to emit a length prefix
    /// and a payload as a single syscall without concatenating them first.
    ///
    /// The total length is accumulated across *all* slices up front
    /// (`.iter().map(|s| s.len()).sum()`), not taken from the last slice,
    /// so a short `writev` on an early slice is still tracked correctly.
    pub async fn write_vectored(&self, mut slices: Vec<&[u8]>, cancel: &CancelToken) -> Result<(), PumpError> {
        let mut remaining: usize = slices.iter().map(|s| s.len()).sum();
        while remaining > 0 {
            let mut guard = wait_writable(&self.fd, cancel).await?;
            let iovecs: Vec<libc::iovec> = slices
                .iter()
                .map(|s| libc::iovec { iov_base: s.as_ptr() as *mut _, iov_len: s.len() })
                .collect();
            let result = guard.try_io(|inner| {
                let n = unsafe {
                    libc::writev(inner.as_raw_fd(), iovecs.as_ptr(), iovecs.len() as libc::c_int)
                };
                raw_result(n)
            });
            let n = match result {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => result?,
                Err(_would_block) => continue,
            };

            remaining -= n;
            advance_slices(&mut slices, n);
        }
        Ok(())
    }

    /// `sendto(2)` to the AF_UNIX socket at `path`: the datagram pump's
    /// egress step. One call is one datagram; the kernel never splits it.
    pub async fn send_to(&self, buf: &[u8], path: &Path, cancel: &CancelToken) -> Result<usize, PumpError> {
        let (addr, addr_len) = unix_sockaddr(path)?;
        loop {
            let mut guard = wait_writable(&self.fd, cancel).await?;
            let outcome = guard.try_io(|inner| {
                let n = unsafe {
                    libc::sendto(
                        inner.as_raw_fd(),
                        buf.as_ptr().cast(),
                        buf.len(),
                        0,
                        std::ptr::addr_of!(addr).cast(),
                        addr_len,
                    )
                };
                raw_result(n)
            });
            match outcome {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    /// `recvfrom(2)` ignoring the sender address; the pump already knows
    /// which path it bound and has no use for per-datagram peer info.
    pub async fn recv_from(&self, buf: &mut [u8], cancel: &CancelToken) -> Result<usize, PumpError> {
        loop {
            let mut guard = wait_readable(&self.fd, cancel).await?;
            let outcome = guard.try_io(|inner| {
                let n = unsafe {
                    libc::recvfrom(
                        inner.as_raw_fd(),
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                        0,
                        std::ptr::null_mut(),
                        std::ptr::null_mut(),
                    )
                };
                raw_result(n)
            });
            match outcome {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }
}

fn raw_result(n: isize) -> io::Result<usize> {
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

async fn wait_readable<'a>(
    fd: &'a AsyncFd<OwnedFd>, cancel: &CancelToken,
) -> Result<tokio::io::unix::AsyncFdReadyGuard<'a, OwnedFd>, PumpError> {
    if cancel.is_cancelled() {
        return Err(PumpError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PumpError::Cancelled),
        r = fd.readable() => Ok(r?),
    }
}

async fn wait_writable<'a>(
    fd: &'a AsyncFd<OwnedFd>, cancel: &CancelToken,
) -> Result<tokio::io::unix::AsyncFdReadyGuard<'a, OwnedFd>, PumpError> {
    if cancel.is_cancelled() {
        return Err(PumpError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PumpError::Cancelled),
        r = fd.writable() => Ok(r?),
    }
}

fn advance_slices<'a>(slices: &mut Vec<&'a [u8]>, mut n: usize) {
    while n > 0 {
        let head = slices[0];
        if n < head.len() {
            slices[0] = &head[n..];
            break;
        }
        n -= head.len();
        slices.remove(0);
    }
}

fn unix_sockaddr(path: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    let bytes = path.as_os_str().as_bytes();
    // sun_path is 108 bytes on Linux and must hold a trailing NUL.
    if bytes.len() >= 108 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "unix socket path too long"));
    }

    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let len = std::mem::size_of::<libc::sa_family_t>() + bytes.len() + 1;
    Ok((addr, len as libc::socklen_t))
}
