// ABOUTME: Demonstrates the generic forwarder de-framing length-prefixed messages onto stdout
// ABOUTME: Run with `cargo run --example loopback-demo`; exits once the writer task closes its end

use std::os::fd::{FromRawFd, OwnedFd};

use tap_pump::frame::encode_len;
use tap_pump::{CancelToken, ForwardConfig, Forwarder};
use tracing_subscriber::EnvFilter;

fn pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for fd in fds {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let (read_end, write_end) = pipe()?;
    // fd 1 is stdout; taking ownership here is fine since the process exits
    // right after the forwarder drains the pipe.
    let stdout = unsafe { OwnedFd::from_raw_fd(1) };

    let cancel = CancelToken::new();
    let config = ForwardConfig::new(4096, true, false)?;
    let forwarder = Forwarder::new(read_end, stdout, config, cancel)?;

    let writer = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::from(write_end);
        for line in ["hello from the demo writer\n", "a second framed message\n"] {
            let header = encode_len(line.len(), u16::MAX).expect("demo lines fit in a u16");
            file.write_all(&header)?;
            file.write_all(line.as_bytes())?;
        }
        Ok(())
    });

    tracing::info!("forwarding length-prefixed messages to stdout until the writer closes its end");
    writer.await??;
    forwarder.run().await?;
    Ok(())
}
