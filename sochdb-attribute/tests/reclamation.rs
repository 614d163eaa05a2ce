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

//! Reclamation and compaction tests for payload columns
//!
//! Randomized write/commit sequences are checked against a simple model,
//! and concurrent readers verify that pinned generations never observe
//! reclaimed or relocated payloads.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use sochdb_attribute::{
    create_attribute, AttributeConfig, AttributeReadGuard, AttributeVector, BasicType, CompactionStrategy,
    DataStoreConfig, DocId, FieldValue,
};

const NUM_LIDS: DocId = 16;

fn fragmenting_config() -> AttributeConfig {
    AttributeConfig::new(BasicType::String)
        .with_compaction(CompactionStrategy {
            dead_slack_bytes: 64,
            max_dead_ratio: 0.2,
        })
        .with_data_store(DataStoreConfig {
            buffer_size: 256,
            max_buffers: 1023,
        })
}

fn payload(lid: DocId, round: usize, len: usize) -> String {
    format!("{}:{}:{}", lid, round, "x".repeat(len))
}

#[derive(Debug, Clone)]
enum Op {
    Set { lid: DocId, len: usize },
    Clear { lid: DocId },
    Commit,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (1..NUM_LIDS, 0usize..64).prop_map(|(lid, len)| Op::Set { lid, len }),
        2 => (1..NUM_LIDS).prop_map(|lid| Op::Clear { lid }),
        2 => Just(Op::Commit),
    ]
}

// ============================================================================
// Model-based check
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Committed reads always match the model, whatever compaction did.
    #[test]
    fn test_committed_state_matches_model(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let attribute = create_attribute("s", &fragmenting_config(), 0).unwrap();
        attribute.ensure_lid_space(NUM_LIDS - 1).unwrap();

        let mut pending: HashMap<DocId, Option<String>> = HashMap::new();
        let mut committed: HashMap<DocId, String> = HashMap::new();
        let mut serial = 0u64;

        for (round, op) in ops.into_iter().enumerate() {
            match op {
                Op::Set { lid, len } => {
                    let value = payload(lid, round, len);
                    attribute.set_value(lid, &FieldValue::String(value.clone())).unwrap();
                    pending.insert(lid, Some(value));
                }
                Op::Clear { lid } => {
                    attribute.clear_doc(lid).unwrap();
                    pending.insert(lid, None);
                }
                Op::Commit => {
                    serial += 1;
                    attribute.commit(serial, serial).unwrap();
                    for (lid, value) in pending.drain() {
                        match value {
                            Some(value) => committed.insert(lid, value),
                            None => committed.remove(&lid),
                        };
                    }
                }
            }
            for lid in 1..NUM_LIDS {
                let expected = committed.get(&lid).cloned().map(FieldValue::String);
                prop_assert_eq!(attribute.get_value(lid), expected);
            }
        }

        serial += 1;
        attribute.commit(serial, serial).unwrap();
        let usage = attribute.memory_usage();
        prop_assert_eq!(usage.allocated_bytes_on_hold, 0);
        prop_assert_eq!(attribute.last_sync_token(), serial);
    }
}

// ============================================================================
// Concurrent readers
// ============================================================================

#[test]
fn test_readers_survive_compaction() {
    let attribute = create_attribute("s", &fragmenting_config(), 0).unwrap();
    attribute.ensure_lid_space(NUM_LIDS - 1).unwrap();
    attribute.commit(1, 1).unwrap();

    let done = AtomicBool::new(false);
    let reads = AtomicU64::new(0);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let guard = AttributeReadGuard::new(Arc::clone(&attribute));
                    for lid in 1..guard.doc_id_limit() {
                        if let Some(value) = guard.get_string(lid) {
                            let owner: DocId = value
                                .split(':')
                                .next()
                                .and_then(|s| s.parse().ok())
                                .unwrap();
                            assert_eq!(owner, lid, "lid {} decoded {:?}", lid, value);
                            reads.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }

        for round in 0..300usize {
            for lid in 1..NUM_LIDS {
                let value = payload(lid, round, (round * 7 + lid as usize) % 48);
                attribute.set_value(lid, &FieldValue::String(value)).unwrap();
            }
            let serial = round as u64 + 2;
            attribute.commit(serial, serial).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert!(reads.load(Ordering::Relaxed) > 0);
    let state = attribute.state();
    assert!(state["compact_generation"].as_u64().unwrap() > 0);
    for lid in 1..NUM_LIDS {
        let expected = payload(lid, 299, (299 * 7 + lid as usize) % 48);
        assert_eq!(attribute.get_value(lid), Some(FieldValue::String(expected)));
    }
}

#[test]
fn test_pinned_generation_holds_memory() {
    let attribute = create_attribute("s", &fragmenting_config(), 0).unwrap();
    attribute.ensure_lid_space(NUM_LIDS - 1).unwrap();
    for lid in 1..NUM_LIDS {
        attribute
            .set_value(lid, &FieldValue::String(payload(lid, 0, 32)))
            .unwrap();
    }
    attribute.commit(1, 1).unwrap();

    let guard = AttributeReadGuard::new(Arc::clone(&attribute));
    let pinned = guard.generation();
    for round in 1..20usize {
        for lid in 1..NUM_LIDS {
            attribute
                .set_value(lid, &FieldValue::String(payload(lid, round, 32)))
                .unwrap();
        }
        let serial = round as u64 + 1;
        attribute.commit(serial, serial).unwrap();
        assert!(attribute.first_used_generation() <= pinned);
    }
    assert!(attribute.memory_usage().allocated_bytes_on_hold > 0);
    // The guard pins memory, not values: reads see the latest commit.
    assert_eq!(guard.get_string(3), Some(payload(3, 19, 32)));

    drop(guard);
    attribute.commit(21, 21).unwrap();
    assert_eq!(attribute.memory_usage().allocated_bytes_on_hold, 0);
    assert!(attribute.first_used_generation() > pinned);
}
