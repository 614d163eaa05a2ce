// SPDX-License-Identifier: AGPL-3.0-or-later
// SochDB - LLM-Optimized Embedded Database
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Attribute Writer Benchmark
//!
//! | Scenario | What It Tests |
//! |----------|---------------|
//! | put (inline) | Decompose + prepare + apply on the calling thread |
//! | put (threaded) | Same, with per-shard worker threads |
//! | put + force_commit | Commit cost including generation bookkeeping |
//!
//! Run with: `cargo bench -p sochdb-feed --bench bench_writer`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;

use sochdb_attribute::{AttributeConfig, AttributeManager, AttributeSpec, BasicType, CollectionType, Document, FieldValue};
use sochdb_feed::{AttributeWriter, WriterConfig};

const DOCS: u32 = 1_000;

fn make_writer(config: WriterConfig) -> AttributeWriter {
    let manager = Arc::new(AttributeManager::new("bench.subdb", config.num_shards));
    let specs = [
        AttributeSpec::new("int", AttributeConfig::new(BasicType::Int64)),
        AttributeSpec::new("float", AttributeConfig::new(BasicType::Double)),
        AttributeSpec::new("title", AttributeConfig::new(BasicType::String)),
        AttributeSpec::new(
            "tags",
            AttributeConfig::new(BasicType::String).with_collection(CollectionType::Array),
        ),
    ];
    for spec in specs {
        manager.add_attribute(spec, 0).expect("Failed to add attribute");
    }
    let executor = config.build_executor().expect("Failed to build executor");
    AttributeWriter::new(manager, executor)
}

fn make_doc(lid: u32) -> Document {
    Document::new(format!("id:{}", lid))
        .with_field("int", lid as i64)
        .with_field("float", lid as f64 * 0.5)
        .with_field("title", format!("title of document {}", lid))
        .with_field(
            "tags",
            FieldValue::Array(vec![FieldValue::from("a"), FieldValue::from(format!("tag-{}", lid % 17))]),
        )
}

/// Benchmark puts with visibility delay, by executor kind
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer/put");
    group.sample_size(20);
    group.throughput(Throughput::Elements(DOCS as u64));

    let configs = [
        ("inline", WriterConfig::default()),
        ("threaded_2", WriterConfig::threaded(2)),
        ("threaded_4", WriterConfig::threaded(4)),
    ];
    for (name, config) in configs {
        let docs: Vec<Document> = (1..=DOCS).map(make_doc).collect();
        group.bench_with_input(BenchmarkId::from_parameter(name), &config, |b, &config| {
            let writer = make_writer(config);
            let mut serial = 0u64;
            b.iter(|| {
                for (i, doc) in docs.iter().enumerate() {
                    serial += 1;
                    writer.put(serial, doc, i as u32 + 1, false, None).unwrap();
                }
                writer.sync();
                black_box(serial)
            });
        });
    }
    group.finish();
}

/// Benchmark put followed by a commit every 100 documents
fn bench_put_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer/put_commit");
    group.sample_size(20);
    group.throughput(Throughput::Elements(DOCS as u64));

    let docs: Vec<Document> = (1..=DOCS).map(make_doc).collect();
    group.bench_function("inline", |b| {
        let writer = make_writer(WriterConfig::default());
        let mut serial = 0u64;
        b.iter(|| {
            for (i, doc) in docs.iter().enumerate() {
                serial += 1;
                writer.put(serial, doc, i as u32 + 1, false, None).unwrap();
                if i % 100 == 99 {
                    writer.force_commit(serial, None).unwrap();
                }
            }
            black_box(writer.committed_serial())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_put, bench_put_commit);
criterion_main!(benches);
