// ABOUTME: Crate-level integration tests exercising the public run() loops end to end
// ABOUTME: Per-primitive behavior (framing edge cases, EINTR, oversize drops) lives in each module's own tests

use std::io::{Read, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::net::UnixDatagram;
use std::time::Duration;

use crate::{bridge, CancelToken, DatagramPump, ForwardConfig, Forwarder, PumpConfig};

fn make_pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    for fd in fds {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    }
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn nonblocking_socket() -> UnixDatagram {
    let sock = UnixDatagram::unbound().unwrap();
    sock.set_nonblocking(true).unwrap();
    sock
}

fn nonblocking_bound_socket(path: &std::path::Path) -> UnixDatagram {
    let sock = UnixDatagram::bind(path).unwrap();
    sock.set_nonblocking(true).unwrap();
    sock
}

#[tokio::test]
async fn pump_run_loop_moves_frames_in_both_directions_and_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let read_path = dir.path().join("read.sock");
    let write_path = dir.path().join("write.sock");

    let read_sock = nonblocking_bound_socket(&read_path);
    let write_sock = nonblocking_bound_socket(&write_path);

    let host_peer = nonblocking_socket();
    host_peer.connect(&read_path).unwrap();

    let (tap_read_end, tap_write_end) = make_pipe();

    let mtu = 590u16;
    let config = PumpConfig::new(mtu, &read_path, &write_path).unwrap();
    let cancel = CancelToken::new();
    let pump = DatagramPump::new(tap_write_end, read_sock.into(), write_sock.into(), config, cancel.clone()).unwrap();
    let stats = pump.stats();

    let handle = tokio::spawn(async move { pump.run().await });

    let payload = b"host-to-tap-via-run-loop";
    let mut datagram = Vec::new();
    datagram.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    datagram.extend_from_slice(payload);
    host_peer.send(&datagram).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut tap_reader = std::fs::File::from(tap_read_end);
    let mut got = vec![0u8; payload.len()];
    tap_reader.read_exact(&mut got).unwrap();
    assert_eq!(&got, payload);
    assert_eq!(stats.snapshot().sock_to_tap_frames, 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.expect("pump must stop promptly after cancel").unwrap().unwrap();
}

#[tokio::test]
async fn bridged_forwarders_echo_through_two_independent_pipes() {
    let (a_in_r, a_in_w) = make_pipe();
    let (a_out_r, a_out_w) = make_pipe();
    let (b_in_r, b_in_w) = make_pipe();
    let (b_out_r, b_out_w) = make_pipe();

    let cancel = CancelToken::new();
    let config = ForwardConfig::new(32, false, false).unwrap();
    let forward_a = Forwarder::new(a_in_r, a_out_w, config, cancel.clone()).unwrap();
    let forward_b = Forwarder::new(b_in_r, b_out_w, config, cancel.clone()).unwrap();

    let (handle_a, handle_b) = bridge(forward_a, forward_b, cancel.clone());

    std::fs::File::from(a_in_w).write_all(b"ping").unwrap();
    std::fs::File::from(b_in_w).write_all(b"pong").unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut a_out = [0u8; 4];
    std::fs::File::from(a_out_r).read_exact(&mut a_out).unwrap();
    assert_eq!(&a_out, b"ping");

    let mut b_out = [0u8; 4];
    std::fs::File::from(b_out_r).read_exact(&mut b_out).unwrap();
    assert_eq!(&b_out, b"pong");

    // cancelling one handle's shared token stops both, since bridge() clones
    // one CancelToken rather than minting two independent ones
    handle_a.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle_b.join())
        .await
        .expect("both bridged forwarders must observe a shared cancellation")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn pump_drops_oversize_ingress_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let read_path = dir.path().join("read.sock");
    let write_path = dir.path().join("write.sock");

    let read_sock = nonblocking_bound_socket(&read_path);
    let write_sock = nonblocking_bound_socket(&write_path);
    let host_peer = nonblocking_socket();
    host_peer.connect(&read_path).unwrap();

    let (_tap_read_end, tap_write_end) = make_pipe();

    let mtu = 590u16;
    let config = PumpConfig::new(mtu, &read_path, &write_path).unwrap();
    let cancel = CancelToken::new();
    let pump = DatagramPump::new(tap_write_end, read_sock.into(), write_sock.into(), config, cancel.clone()).unwrap();
    let stats = pump.stats();
    let handle = tokio::spawn(async move { pump.run().await });

    // a header claiming a length far beyond the mtu; payload is irrelevant
    let mut bogus = Vec::new();
    bogus.extend_from_slice(&60000u16.to_le_bytes());
    bogus.extend_from_slice(&[0u8; 16]);
    host_peer.send(&bogus).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stats.snapshot().dropped_invalid, 1);
    assert_eq!(stats.snapshot().sock_to_tap_frames, 0);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
}
