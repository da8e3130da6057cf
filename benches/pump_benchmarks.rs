// ABOUTME: Benchmark suite for the length-prefix codec and the forwarder's per-step overhead
// ABOUTME: Measures encode/decode cost and write_vectored framing across representative frame sizes

use std::os::fd::{FromRawFd, OwnedFd};
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tap_pump::frame::{check_len, decode_len, encode_len};
use tap_pump::{CancelToken, ForwardConfig, Forwarder};

fn frame_sizes() -> [u16; 5] {
    [64, 256, 590, 1486, u16::MAX]
}

fn bench_encode_len(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_len");
    for &size in &frame_sizes() {
        group.bench_with_input(BenchmarkId::new("mtu", size), &size, |b, &mtu| {
            b.iter(|| encode_len(black_box(mtu as usize), mtu).unwrap())
        });
    }
    group.finish();
}

fn bench_decode_len(c: &mut Criterion) {
    let header = encode_len(1486, u16::MAX).unwrap();
    c.bench_function("decode_len", |b| b.iter(|| decode_len(black_box(header))));
}

fn bench_check_len(c: &mut Criterion) {
    c.bench_function("check_len_within_bounds", |b| {
        b.iter(|| check_len(black_box(1486), u16::MAX))
    });
}

fn make_pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    for fd in fds {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    }
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn bench_forwarder_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("forwarder_run_to_eof_unframed");
    group.measurement_time(Duration::from_secs(8));

    let rt = tokio::runtime::Runtime::new().unwrap();

    for &size in &[64u32, 590, 1486] {
        group.bench_with_input(BenchmarkId::new("payload_bytes", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let (in_r, in_w) = make_pipe();
                    let (_out_r, out_w) = make_pipe();
                    let config = ForwardConfig::new(size, false, false).unwrap();
                    let forwarder = Forwarder::new(in_r, out_w, config, CancelToken::new()).unwrap();
                    let payload = vec![0xABu8; size as usize];
                    // write the payload, then drop the write end so the forwarder
                    // sees a clean EOF right after moving one chunk.
                    use std::io::Write as _;
                    std::fs::File::from(in_w).write_all(&payload).unwrap();
                    (forwarder, _out_r)
                },
                |(forwarder, out_r)| {
                    rt.block_on(async move {
                        black_box(forwarder.run().await.unwrap());
                        drop(out_r);
                    });
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode_len, bench_decode_len, bench_check_len, bench_forwarder_step);
criterion_main!(benches);
