//! LOB benchmarks for TurDB
//!
//! These benchmarks measure pattern search over stream-backed and local LOBs,
//! and the cost of promoting a stream-backed LOB on first write.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use turdb_lob::{Blob, ContainerHandle, LobConnection, MemoryStoreStream};

fn payload(len: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len).map(|i| b'a' + (i % 7) as u8).collect();
    let tail = data.len() - 8;
    data[tail..].copy_from_slice(b"NEEDLE!!");
    data
}

fn streamed(conn: &LobConnection, data: &[u8]) -> Blob {
    let stream = MemoryStoreStream::with_payload(data, ContainerHandle::new());
    conn.blob_from_store_stream(Box::new(stream)).unwrap()
}

fn bench_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("lob_position");

    for size in [4 * 1024usize, 64 * 1024, 1024 * 1024] {
        let data = payload(size);
        let conn = LobConnection::new();
        let local = conn.blob_from_bytes(data.clone()).unwrap();
        let stream = streamed(&conn, &data);

        group.bench_with_input(BenchmarkId::new("local", size), &local, |b, blob| {
            b.iter(|| blob.position(Some(black_box(&b"NEEDLE"[..])), 1).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("stream", size), &stream, |b, blob| {
            b.iter(|| blob.position(Some(black_box(&b"NEEDLE"[..])), 1).unwrap());
        });
    }

    group.finish();
}

fn bench_promotion(c: &mut Criterion) {
    let mut group = c.benchmark_group("lob_promotion");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let data = payload(size);
        let dir = tempfile::tempdir().unwrap();
        let conn = LobConnection::builder()
            .spill_dir(dir.path())
            .open()
            .unwrap();

        group.bench_with_input(BenchmarkId::new("first_write", size), &data, |b, data| {
            b.iter(|| {
                let blob = streamed(&conn, data);
                blob.set_bytes(1, black_box(b"x")).unwrap();
                blob.free();
            });
        });
    }

    group.finish();
}

fn bench_get_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("lob_get_bytes");
    let data = payload(256 * 1024);
    let conn = LobConnection::new();
    let blob = streamed(&conn, &data);

    group.bench_function("sequential_4k", |b| {
        b.iter(|| {
            let mut pos = 1i64;
            while pos <= data.len() as i64 {
                black_box(blob.get_bytes(pos, 4096).unwrap());
                pos += 4096;
            }
        });
    });
    group.bench_function("backward_4k", |b| {
        b.iter(|| {
            let mut pos = data.len() as i64 - 4095;
            while pos >= 1 {
                black_box(blob.get_bytes(pos, 4096).unwrap());
                pos -= 4096;
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_position, bench_promotion, bench_get_bytes);
criterion_main!(benches);
