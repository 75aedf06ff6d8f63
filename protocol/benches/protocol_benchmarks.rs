//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for the command codec

use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use marionette_protocol::{AccountId, Command, CommandCodec, LoginRequest};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

// ============================================================================
// Encoding Benchmarks
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    group.bench_function("ping", |b| {
        let mut codec = CommandCodec::new();
        let mut buffer = BytesMut::with_capacity(1024);
        b.iter(|| {
            buffer.clear();
            codec.encode(black_box(Command::Ping), &mut buffer).unwrap();
        });
    });

    group.bench_function("login", |b| {
        let mut codec = CommandCodec::new();
        let mut buffer = BytesMut::with_capacity(1024);
        let login = Command::Login(LoginRequest::new("alice", "secret", 2, 0));
        b.iter(|| {
            buffer.clear();
            codec.encode(black_box(&login), &mut buffer).unwrap();
        });
    });

    group.finish();
}

// ============================================================================
// Decoding Benchmarks
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let mut batch = BytesMut::new();
    let mut codec = CommandCodec::new();
    for id in 0..64 {
        codec
            .encode(Command::Register(AccountId::new(id)), &mut batch)
            .unwrap();
        codec.encode(Command::Pong, &mut batch).unwrap();
    }
    let batch = batch.freeze();

    group.throughput(Throughput::Bytes(batch.len() as u64));
    group.bench_function("coalesced_batch", |b| {
        let mut codec = CommandCodec::new();
        b.iter(|| {
            let mut buffer = BytesMut::from(&batch[..]);
            let mut count = 0;
            while let Some(item) = codec.decode(&mut buffer).unwrap() {
                black_box(item);
                count += 1;
            }
            assert_eq!(count, 128);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
