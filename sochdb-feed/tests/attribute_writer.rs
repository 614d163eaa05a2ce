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

//! Attribute writer integration tests
//!
//! Drives the writer over a real manager and checks what the columns
//! expose after each operation: values, doc counts, sync tokens and the
//! shards tasks were sent to.

use std::sync::Arc;

use sochdb_attribute::{
    ArithmeticOp, AttributeConfig, AttributeError, AttributeManager, AttributeSpec, AttributeVector,
    BasicType, CachedResult, CollectionType, Document, DocumentUpdate, FieldUpdate, FieldValue,
    ImportedAttribute, ImportedAttributesRepo, Tensor, TensorType, ValueUpdate,
};
use sochdb_feed::{
    channel_callback, AttributeWriter, ExecutorObserver, ForegroundExecutor, SequencedExecutor,
    WriterConfig,
};

struct Fixture {
    manager: Arc<AttributeManager>,
    observer: Arc<ExecutorObserver<ForegroundExecutor>>,
}

impl Fixture {
    fn new(num_shards: usize) -> Self {
        Self {
            manager: Arc::new(AttributeManager::new("test.subdb", num_shards)),
            observer: Arc::new(ExecutorObserver::new(ForegroundExecutor::new(num_shards))),
        }
    }

    fn add(&self, name: &str, config: AttributeConfig) -> Arc<dyn AttributeVector> {
        self.manager.add_attribute(AttributeSpec::new(name, config), 0).unwrap()
    }

    /// Writers snapshot the attribute set, so build them after `add`.
    fn writer(&self) -> AttributeWriter {
        let executor: Arc<dyn SequencedExecutor> = self.observer.clone();
        AttributeWriter::new(Arc::clone(&self.manager), executor)
    }
}

fn int32() -> AttributeConfig {
    AttributeConfig::new(BasicType::Int32)
}

fn int32_array() -> AttributeConfig {
    AttributeConfig::new(BasicType::Int32).with_collection(CollectionType::Array)
}

fn string() -> AttributeConfig {
    AttributeConfig::new(BasicType::String)
}

fn ints(values: &[i64]) -> FieldValue {
    FieldValue::Array(values.iter().map(|&v| FieldValue::Int(v)).collect())
}

fn element(value: i64) -> FieldValue {
    FieldValue::structure([("value", FieldValue::Int(value))])
}

fn add(field: &str, operand: f64) -> FieldUpdate {
    FieldUpdate::new(field).with(ValueUpdate::Arithmetic {
        op: ArithmeticOp::Add,
        operand,
    })
}

#[test]
fn test_put_sets_and_clears_every_column() {
    let f = Fixture::new(1);
    let a1 = f.add("a1", int32());
    let a2 = f.add("a2", int32_array());
    let a3 = f.add("a3", AttributeConfig::new(BasicType::Float));
    let a4 = f.add("a4", string());
    let writer = f.writer();

    writer.put(1, &Document::new("id:1"), 1, true, None).unwrap();
    for attribute in [&a1, &a2, &a3, &a4] {
        assert_eq!(attribute.num_docs(), 2);
        assert_eq!(attribute.last_sync_token(), 1);
        assert_eq!(attribute.get_value(1), None);
    }

    let doc = Document::new("id:2")
        .with_field("a1", 10i64)
        .with_field("a2", ints(&[20, 30]))
        .with_field("a3", 10.5f64)
        .with_field("a4", "foo");
    writer.put(2, &doc, 2, true, None).unwrap();
    assert_eq!(a1.num_docs(), 3);
    assert_eq!(a1.last_sync_token(), 2);
    assert_eq!(a1.get_value(2), Some(FieldValue::Int(10)));
    assert_eq!(a2.get_value(2), Some(ints(&[20, 30])));
    assert_eq!(a3.get_value(2), Some(FieldValue::Float(10.5)));
    assert_eq!(a4.get_value(2), Some(FieldValue::from("foo")));

    // A put replaces the whole document: absent fields are cleared
    writer
        .put(3, &Document::new("id:2").with_field("a1", 15i64), 2, true, None)
        .unwrap();
    assert_eq!(a1.num_docs(), 3);
    assert_eq!(a1.get_value(2), Some(FieldValue::Int(15)));
    assert_eq!(a2.get_value(2), None);
    assert_eq!(a4.get_value(2), None);
    assert_eq!(a4.last_sync_token(), 3);
}

#[test]
fn test_remove() {
    let f = Fixture::new(1);
    let a1 = f.add("a1", int32());
    let writer = f.writer();

    writer
        .put(1, &Document::new("id:1").with_field("a1", 10i64), 1, true, None)
        .unwrap();
    writer.remove(2, 0, true, None).unwrap();
    assert_eq!(a1.last_sync_token(), 2);
    assert_eq!(a1.get_value(1), Some(FieldValue::Int(10)));

    let err = writer.remove(1, 1, true, None).unwrap_err();
    assert!(err.is_stale());
    assert_eq!(a1.get_value(1), Some(FieldValue::Int(10)));

    writer.remove(3, 1, true, None).unwrap();
    assert_eq!(a1.get_value(1), None);
    assert_eq!(a1.last_sync_token(), 3);
}

#[test]
fn test_remove_batch() {
    let f = Fixture::new(1);
    let a1 = f.add("a1", int32());
    let a2 = f.add("a2", int32_array());
    for lid in 1..=3 {
        a1.ensure_lid_space(lid).unwrap();
        a2.ensure_lid_space(lid).unwrap();
        a1.set_value(lid, &FieldValue::Int(22)).unwrap();
        a2.set_value(lid, &ints(&[33])).unwrap();
    }
    a1.commit(1, 1).unwrap();
    a2.commit(1, 1).unwrap();
    let writer = f.writer();

    writer.remove_batch(&[1, 3], 2, true, None).unwrap();
    assert_eq!(a1.get_value(1), None);
    assert_eq!(a1.get_value(2), Some(FieldValue::Int(22)));
    assert_eq!(a1.get_value(3), None);
    assert_eq!(a2.get_value(1), None);
    assert_eq!(a2.get_value(2), Some(ints(&[33])));
    assert_eq!(a2.get_value(3), None);
    assert_eq!(a1.last_sync_token(), 2);

    let (callback, rx) = channel_callback();
    writer.remove_batch(&[2, 10], 3, true, Some(callback)).unwrap();
    assert_eq!(rx.recv().unwrap(), Err(AttributeError::OutOfRange { lid: 10, limit: 4 }));
    assert_eq!(a1.get_value(2), Some(FieldValue::Int(22)));

    // A corrected retry at the rejected serial still applies
    writer.remove_batch(&[2], 3, true, None).unwrap();
    assert_eq!(a1.get_value(2), None);
    assert_eq!(a2.get_value(2), None);
    assert_eq!(a1.last_sync_token(), 3);
}

#[test]
fn test_rejected_update_leaves_value_untouched() {
    let f = Fixture::new(1);
    let a1 = f.add("a1", int32());
    let writer = f.writer();
    writer
        .put(1, &Document::new("id:1").with_field("a1", 10i64), 1, true, None)
        .unwrap();

    let update = DocumentUpdate::new("id:1").with_update(
        FieldUpdate::new("a1")
            .with(ValueUpdate::Assign(FieldValue::Int(5)))
            .with(ValueUpdate::Assign(FieldValue::from("bad"))),
    );
    let (callback, rx) = channel_callback();
    writer.update(2, &update, 1, true, Some(callback)).unwrap();
    assert!(matches!(rx.recv().unwrap(), Err(AttributeError::TypeMismatch { .. })));
    assert_eq!(a1.get_value(1), Some(FieldValue::Int(10)));

    writer.force_commit(3, None).unwrap();
    assert_eq!(a1.get_value(1), Some(FieldValue::Int(10)));
}

#[test]
fn test_shrink_flush_keeps_delayed_put_in_compacted_range() {
    let f = Fixture::new(1);
    let a1 = f.add("a1", int32());
    let writer = f.writer();
    for lid in 1..10u32 {
        let doc = Document::new(format!("id:{}", lid)).with_field("a1", lid as i64);
        writer.put(lid as u64, &doc, lid, true, None).unwrap();
    }

    writer.compact_lid_space(20, 5, None).unwrap();
    assert_eq!(a1.committed_doc_id_limit(), 5);
    assert_eq!(a1.num_docs(), 10);

    let (callback, rx) = channel_callback();
    writer
        .put(21, &Document::new("id:7").with_field("a1", 777i64), 7, false, Some(callback))
        .unwrap();
    assert_eq!(rx.recv().unwrap(), Ok(()));

    f.manager.flush_all(21).unwrap();
    assert_eq!(a1.num_docs(), 8);

    writer.force_commit(22, None).unwrap();
    assert_eq!(a1.get_value(7), Some(FieldValue::Int(777)));
    assert_eq!(a1.get_value(6), None);
    assert_eq!(a1.get_value(4), Some(FieldValue::Int(4)));
    assert_eq!(a1.committed_doc_id_limit(), 8);
}

#[test]
fn test_visibility_delay() {
    let f = Fixture::new(1);
    let a1 = f.add("a1", string());
    let doc = |value: &str| Document::new("id:1").with_field("a1", value);

    let w1 = f.writer();
    w1.put(3, &doc("10"), 1, true, None).unwrap();
    assert_eq!(a1.last_sync_token(), 3);

    w1.put(4, &doc("11"), 2, false, None).unwrap();
    assert_eq!(a1.num_docs(), 3);
    assert_eq!(a1.get_value(2), None);
    w1.put(5, &doc("20"), 4, false, None).unwrap();
    assert_eq!(a1.num_docs(), 5);
    assert_eq!(a1.last_sync_token(), 3);

    w1.force_commit(6, None).unwrap();
    assert_eq!(a1.last_sync_token(), 6);
    assert_eq!(w1.committed_serial(), 6);
    assert_eq!(a1.get_value(2), Some(FieldValue::from("11")));
    assert_eq!(a1.get_value(4), Some(FieldValue::from("20")));

    let w2 = f.writer();
    w2.put(7, &doc("11"), 2, false, None).unwrap();
    w2.put(8, &doc("10"), 2, false, None).unwrap();
    assert_eq!(a1.get_value(2), Some(FieldValue::from("11")));
    w2.force_commit(8, None).unwrap();
    assert_eq!(a1.last_sync_token(), 8);
    assert_eq!(a1.get_value(2), Some(FieldValue::from("10")));

    w1.put(9, &doc("11"), 2, false, None).unwrap();
    w1.put(10, &doc("20"), 2, false, None).unwrap();
    w1.put(11, &doc("30"), 2, false, None).unwrap();
    assert_eq!(a1.get_value(2), Some(FieldValue::from("10")));
    w1.force_commit(12, None).unwrap();
    assert_eq!(a1.last_sync_token(), 12);
    assert_eq!(a1.get_value(2), Some(FieldValue::from("30")));
    assert_eq!(w1.committed_serial(), 12);
}

#[test]
fn test_update() {
    let f = Fixture::new(1);
    let a1 = f.add("a1", int32());
    let a2 = f.add("a2", int32());
    let writer = f.writer();
    writer
        .put(
            1,
            &Document::new("id:1").with_field("a1", 10i64).with_field("a2", 20i64),
            1,
            true,
            None,
        )
        .unwrap();

    let update = DocumentUpdate::new("id:1")
        .with_update(add("a1", 5.0))
        .with_update(add("a2", 10.0))
        .with_update(add("unknown", 1.0));
    writer.update(2, &update, 1, true, None).unwrap();
    assert_eq!(a1.get_value(1), Some(FieldValue::Int(15)));
    assert_eq!(a2.get_value(1), Some(FieldValue::Int(30)));
    assert_eq!(a1.last_sync_token(), 2);

    // Replayed serial: already applied
    writer.update(2, &update, 1, true, None).unwrap();
    assert_eq!(a1.get_value(1), Some(FieldValue::Int(15)));
    assert_eq!(a2.get_value(1), Some(FieldValue::Int(30)));

    assert!(writer.update(1, &update, 1, true, None).unwrap_err().is_stale());
    assert_eq!(a1.get_value(1), Some(FieldValue::Int(15)));

    let status = a1.status();
    assert_eq!(status.non_idempotent_update_count, 1);
}

#[test]
fn test_tensor_put_and_assign() {
    let f = Fixture::new(1);
    let t1 = f.add("t1", AttributeConfig::tensor("tensor(x{},y{})"));
    let writer = f.writer();
    let tensor_type: TensorType = "tensor(x{},y{})".parse().unwrap();

    let tensor = Tensor::builder(tensor_type.clone())
        .cell(&[("x", "4"), ("y", "5")], 7.0)
        .build()
        .unwrap();
    writer
        .put(1, &Document::new("id:1").with_field("t1", tensor.clone()), 1, true, None)
        .unwrap();
    assert_eq!(t1.get_value(1), Some(FieldValue::Tensor(tensor)));

    let replacement = Tensor::builder(tensor_type)
        .cell(&[("x", "6"), ("y", "7")], 9.0)
        .build()
        .unwrap();
    let update = DocumentUpdate::new("id:1").with_update(
        FieldUpdate::new("t1").with(ValueUpdate::Assign(FieldValue::Tensor(replacement.clone()))),
    );
    writer.update(2, &update, 1, true, None).unwrap();
    assert_eq!(t1.get_value(1), Some(FieldValue::Tensor(replacement)));
}

#[test]
fn test_tasks_fan_out_one_per_shard() {
    for (num_shards, expected) in [(1, vec![0]), (2, vec![0, 1]), (8, vec![0, 1, 2])] {
        let f = Fixture::new(num_shards);
        let columns = [f.add("a1", int32()), f.add("a2", int32()), f.add("a3", int32())];
        let writer = f.writer();

        let doc = Document::new("id:1")
            .with_field("a1", 10i64)
            .with_field("a2", 15i64)
            .with_field("a3", 20i64);
        writer.put(1, &doc, 1, true, None).unwrap();
        assert_eq!(f.observer.execute_history(), expected, "{} shards", num_shards);
        for (column, value) in columns.iter().zip([10, 15, 20]) {
            assert_eq!(column.num_docs(), 2);
            assert_eq!(column.last_sync_token(), 1);
            assert_eq!(column.get_value(1), Some(FieldValue::Int(value)));
        }
    }
}

#[test]
fn test_force_commit_clears_imported_search_caches() {
    let f = Fixture::new(1);
    f.add("a1", int32());
    let repo = Arc::new(ImportedAttributesRepo::new());
    let imported = Arc::new(ImportedAttribute::new("imported_a", None));
    imported.search_cache().insert(
        "foo",
        Arc::new(CachedResult {
            hits: vec![1],
            doc_id_limit: 2,
        }),
    );
    repo.add(Arc::clone(&imported));
    f.manager.set_imported_attributes(Some(repo));
    let writer = f.writer();

    writer
        .put(1, &Document::new("id:1").with_field("a1", 1i64), 1, false, None)
        .unwrap();
    assert_eq!(imported.search_cache().size(), 1);

    writer.force_commit(10, None).unwrap();
    assert_eq!(imported.search_cache().size(), 0);
}

#[test]
fn test_force_commit_without_columns_still_completes() {
    let f = Fixture::new(1);
    let writer = f.writer();
    let (callback, rx) = channel_callback();
    writer.force_commit(5, Some(callback)).unwrap();
    assert_eq!(rx.recv().unwrap(), Ok(()));
    assert_eq!(writer.committed_serial(), 5);
    assert_eq!(f.observer.execute_count(), 0);
}

#[test]
fn test_struct_array_update_from_document() {
    let f = Fixture::new(1);
    let value = f.add("value", int32());
    let array_value = f.add("array.value", int32_array());
    let writer = f.writer();

    let doc = Document::new("id:1")
        .with_field("value", 10i64)
        .with_field("array", FieldValue::Array(vec![element(11), element(12)]));
    writer.put(10, &doc, 1, true, None).unwrap();
    assert_eq!(value.get_value(1), Some(FieldValue::Int(10)));
    assert_eq!(array_value.get_value(1), Some(ints(&[11, 12])));

    let doc = Document::new("id:1")
        .with_field("value", 20i64)
        .with_field("array", FieldValue::Array(vec![element(21)]));
    writer.update_from_document(11, &doc, 1, true, None).unwrap();
    assert_eq!(value.get_value(1), Some(FieldValue::Int(10)));
    assert_eq!(value.last_sync_token(), 10);
    assert_eq!(array_value.get_value(1), Some(ints(&[21])));
    assert_eq!(array_value.last_sync_token(), 11);
}

#[test]
fn test_struct_map_update_from_document() {
    let f = Fixture::new(1);
    let keys = f.add("map.key", int32_array());
    let values = f.add("map.value.value", int32_array());
    let writer = f.writer();

    let doc = Document::new("id:1").with_field(
        "map",
        FieldValue::Map(vec![(FieldValue::Int(1), element(11)), (FieldValue::Int(2), element(12))]),
    );
    writer.put(10, &doc, 1, true, None).unwrap();
    assert_eq!(keys.get_value(1), Some(ints(&[1, 2])));
    assert_eq!(values.get_value(1), Some(ints(&[11, 12])));

    let doc = Document::new("id:1").with_field("map", FieldValue::Map(vec![(FieldValue::Int(42), element(21))]));
    writer.update_from_document(11, &doc, 1, true, None).unwrap();
    assert_eq!(keys.get_value(1), Some(ints(&[42])));
    assert_eq!(values.get_value(1), Some(ints(&[21])));
}

#[test]
fn test_threaded_writer() {
    let manager = Arc::new(AttributeManager::new("test.subdb", 2));
    let a1 = manager.add_attribute(AttributeSpec::new("a1", int32()), 0).unwrap();
    let a2 = manager.add_attribute(AttributeSpec::new("a2", int32()), 0).unwrap();
    let executor = WriterConfig::threaded(2).build_executor().unwrap();
    let writer = AttributeWriter::new(Arc::clone(&manager), Arc::clone(&executor));

    for lid in 1..=50u32 {
        let doc = Document::new(format!("id:{}", lid))
            .with_field("a1", lid as i64)
            .with_field("a2", lid as i64 * 2);
        writer.put(lid as u64, &doc, lid, false, None).unwrap();
    }
    let (callback, rx) = channel_callback();
    writer.force_commit(100, Some(callback)).unwrap();
    assert_eq!(rx.recv().unwrap(), Ok(()));
    writer.sync();

    assert_eq!(writer.committed_serial(), 100);
    for lid in 1..=50u32 {
        assert_eq!(a1.get_value(lid), Some(FieldValue::Int(lid as i64)));
        assert_eq!(a2.get_value(lid), Some(FieldValue::Int(lid as i64 * 2)));
    }
    assert_eq!(a1.last_sync_token(), 100);
    assert_eq!(a2.last_sync_token(), 100);
    executor.shutdown();
}
