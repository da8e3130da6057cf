// ABOUTME: Demonstrates the intended external wiring for DatagramPump: a real TAP device plus two AF_UNIX sockets
// ABOUTME: Run with `cargo run --example tap-bridge-demo`; opening /dev/net/tun requires CAP_NET_ADMIN, so this will fail without it

use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use tap_pump::{CancelToken, DatagramPump, PumpConfig};
use tracing_subscriber::EnvFilter;

mod tun {
    use std::os::fd::OwnedFd;

    #[repr(C)]
    struct IfReq {
        name: [libc::c_char; libc::IFNAMSIZ],
        flags: libc::c_short,
        _pad: [u8; 22],
    }

    /// Opens `/dev/net/tun` and attaches it to `name` in TAP mode
    /// (`IFF_TAP | IFF_NO_PI`). Interface setup like this is out of scope
    /// for the library itself; shown here only so the wiring around
    /// `DatagramPump` is concrete.
    pub fn open(name: &str) -> std::io::Result<OwnedFd> {
        use std::os::fd::FromRawFd;

        let path = std::ffi::CString::new("/dev/net/tun").unwrap();
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut req: IfReq = unsafe { std::mem::zeroed() };
        for (dst, src) in req.name.iter_mut().zip(name.as_bytes()) {
            *dst = *src as libc::c_char;
        }
        req.flags = (libc::IFF_TAP | libc::IFF_NO_PI) as libc::c_short;

        const TUNSETIFF: libc::c_ulong = 0x400454ca;
        let ret = unsafe { libc::ioctl(std::os::fd::AsRawFd::as_raw_fd(&fd), TUNSETIFF, &req) };
        if ret < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(fd)
    }
}

fn bound_datagram(path: &std::path::Path) -> std::io::Result<OwnedFd> {
    let sock = UnixDatagram::bind(path)?;
    sock.set_nonblocking(true)?;
    Ok(sock.into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let tap_name = std::env::args().nth(1).unwrap_or_else(|| "tap-pump0".to_string());
    let dir = std::env::temp_dir().join("tap-pump-demo");
    std::fs::create_dir_all(&dir)?;
    let read_path: PathBuf = dir.join("read.sock");
    let write_path: PathBuf = dir.join("write.sock");
    let _ = std::fs::remove_file(&read_path);
    let _ = std::fs::remove_file(&write_path);

    let tap = tun::open(&tap_name)?;
    tracing::info!(tap_name, fd = tap.as_raw_fd(), "tap device opened");

    let read_sock = bound_datagram(&read_path)?;
    let write_sock = bound_datagram(&write_path)?;

    let config = PumpConfig::new(1500, &read_path, &write_path)?;
    let cancel = CancelToken::new();
    let pump = DatagramPump::new(tap, read_sock, write_sock, config, cancel.clone())?;
    let stats = pump.stats();

    let handle = tokio::spawn(async move { pump.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!(?stats, "shutdown requested, stopping pump");
    cancel.cancel();
    handle.await??;

    let snapshot = stats.snapshot();
    tracing::info!(
        tap_to_sock_frames = snapshot.tap_to_sock_frames,
        sock_to_tap_frames = snapshot.sock_to_tap_frames,
        dropped_invalid = snapshot.dropped_invalid,
        "pump stopped"
    );
    Ok(())
}
