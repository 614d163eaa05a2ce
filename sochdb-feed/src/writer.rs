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

//! Attribute writer
//!
//! Front end of the write pipeline. Each operation is decomposed into
//! per-column work, expensive value encoding runs in parallel on the
//! calling side, and the cheap mutations are handed to the shard owning
//! each column: one task per shard per operation.
//!
//! ## Visibility
//!
//! With `immediate` set, every touched column commits at the operation's
//! serial number right after applying it. Otherwise changes stay in the
//! columns' change buffers until `force_commit`.

use parking_lot::Mutex;
use rayon::prelude::*;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sochdb_attribute::{
    AttributeError, AttributeManager, AttributeVector, DocId, Document, DocumentUpdate, FieldValue,
    PreparedValue, Result, SerialNum, ValueUpdate,
};

use crate::decompose::{is_nested_path, DocumentDecomposer, FieldPathDecomposer};
use crate::executor::SequencedExecutor;
use crate::write_done::{DoneCallback, WriteDoneContext};

type Column = Arc<dyn AttributeVector>;

struct WriteTarget {
    attribute: Column,
    shard: usize,
}

pub struct AttributeWriter {
    manager: Arc<AttributeManager>,
    executor: Arc<dyn SequencedExecutor>,
    decomposer: Arc<dyn DocumentDecomposer>,
    targets: Vec<WriteTarget>,
    /// Highest serial number seen by this writer
    last_serial: Mutex<SerialNum>,
    committed_serial: Arc<AtomicU64>,
}

impl AttributeWriter {
    /// Writer over the manager's current attributes.
    pub fn new(manager: Arc<AttributeManager>, executor: Arc<dyn SequencedExecutor>) -> Self {
        Self::with_decomposer(manager, executor, Arc::new(FieldPathDecomposer))
    }

    pub fn with_decomposer(
        manager: Arc<AttributeManager>,
        executor: Arc<dyn SequencedExecutor>,
        decomposer: Arc<dyn DocumentDecomposer>,
    ) -> Self {
        let num_shards = executor.num_shards();
        let targets: Vec<WriteTarget> = manager
            .get_writable_attributes()
            .into_iter()
            .map(|(attribute, shard)| WriteTarget {
                attribute,
                shard: shard % num_shards,
            })
            .collect();
        tracing::debug!(
            subdb = %manager.name(),
            attributes = targets.len(),
            num_shards,
            "created attribute writer"
        );
        Self {
            manager,
            executor,
            decomposer,
            targets,
            last_serial: Mutex::new(0),
            committed_serial: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn manager(&self) -> &Arc<AttributeManager> {
        &self.manager
    }

    /// Serial number of the last completed `force_commit`
    pub fn committed_serial(&self) -> SerialNum {
        self.committed_serial.load(Ordering::Acquire)
    }

    /// Block until every scheduled task has run.
    pub fn sync(&self) {
        self.executor.sync();
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Replace every column's value at `lid` with the document's; columns
    /// the document has no value for are cleared.
    pub fn put(
        &self,
        serial: SerialNum,
        document: &Document,
        lid: DocId,
        immediate: bool,
        on_done: Option<DoneCallback>,
    ) -> Result<()> {
        let done = WriteDoneContext::new(on_done);
        self.begin(serial, &done)?;
        let work = self.prepare(document, |_| true, &done)?;
        self.note_serial(serial);
        tracing::trace!(serial, lid, columns = work.len(), "put");
        self.dispatch(work, &done, move |(attribute, prepared): (Column, PreparedValue)| {
            if !attribute.accept_serial(serial)? {
                return Ok(());
            }
            attribute.ensure_lid_space(lid)?;
            attribute.complete_set(lid, prepared)?;
            if immediate {
                attribute.commit(serial, serial)?;
            }
            Ok(())
        })
    }

    /// Apply field updates to the columns they name. Fields without a
    /// column are ignored.
    pub fn update(
        &self,
        serial: SerialNum,
        update: &DocumentUpdate,
        lid: DocId,
        immediate: bool,
        on_done: Option<DoneCallback>,
    ) -> Result<()> {
        let done = WriteDoneContext::new(on_done);
        self.begin(serial, &done)?;
        let mut per_column: BTreeMap<usize, Vec<ValueUpdate>> = BTreeMap::new();
        for field_update in update.updates() {
            if let Some(index) = self
                .targets
                .iter()
                .position(|t| t.attribute.name() == field_update.field)
            {
                per_column
                    .entry(index)
                    .or_default()
                    .extend(field_update.updates.iter().cloned());
            }
        }
        let work: Vec<(usize, (Column, Vec<ValueUpdate>))> = per_column
            .into_iter()
            .map(|(index, updates)| {
                let target = &self.targets[index];
                (target.shard, (Arc::clone(&target.attribute), updates))
            })
            .collect();
        self.note_serial(serial);
        tracing::trace!(serial, lid, columns = work.len(), "update");
        self.dispatch(work, &done, move |(attribute, updates): (Column, Vec<ValueUpdate>)| {
            if !attribute.accept_serial(serial)? {
                return Ok(());
            }
            attribute.ensure_lid_space(lid)?;
            attribute.apply_updates(lid, &updates)?;
            if immediate {
                attribute.commit(serial, serial)?;
            }
            Ok(())
        })
    }

    /// Update from a full document: only columns addressing a nested path
    /// of a complex field (`array.value`, `map.key`) are written.
    pub fn update_from_document(
        &self,
        serial: SerialNum,
        document: &Document,
        lid: DocId,
        immediate: bool,
        on_done: Option<DoneCallback>,
    ) -> Result<()> {
        let done = WriteDoneContext::new(on_done);
        self.begin(serial, &done)?;
        let work = self.prepare(document, is_nested_path, &done)?;
        self.note_serial(serial);
        self.dispatch(work, &done, move |(attribute, prepared): (Column, PreparedValue)| {
            if !attribute.accept_serial(serial)? {
                return Ok(());
            }
            attribute.ensure_lid_space(lid)?;
            attribute.complete_set(lid, prepared)?;
            if immediate {
                attribute.commit(serial, serial)?;
            }
            Ok(())
        })
    }

    /// Clear `lid` in every column.
    pub fn remove(&self, serial: SerialNum, lid: DocId, immediate: bool, on_done: Option<DoneCallback>) -> Result<()> {
        let done = WriteDoneContext::new(on_done);
        self.begin(serial, &done)?;
        self.note_serial(serial);
        self.dispatch(self.all_columns(), &done, move |attribute: Column| {
            if !attribute.accept_serial(serial)? {
                return Ok(());
            }
            if lid < attribute.num_docs() {
                attribute.clear_doc(lid)?;
            }
            if immediate {
                attribute.commit(serial, serial)?;
            }
            Ok(())
        })
    }

    /// Clear every lid in `lids` in every column. A lid beyond a column's
    /// document count fails that column without touching it.
    pub fn remove_batch(
        &self,
        lids: &[DocId],
        serial: SerialNum,
        immediate: bool,
        on_done: Option<DoneCallback>,
    ) -> Result<()> {
        let done = WriteDoneContext::new(on_done);
        self.begin(serial, &done)?;
        self.note_serial(serial);
        let lids: Arc<[DocId]> = lids.into();
        self.dispatch(self.all_columns(), &done, move |attribute: Column| {
            // Checked before accept_serial: a rejected batch must not mark
            // its serial as applied
            let limit = attribute.num_docs();
            if let Some(&lid) = lids.iter().find(|&&lid| lid >= limit) {
                return Err(AttributeError::OutOfRange { lid, limit });
            }
            if !attribute.accept_serial(serial)? {
                return Ok(());
            }
            for &lid in lids.iter() {
                attribute.clear_doc(lid)?;
            }
            if immediate {
                attribute.commit(serial, serial)?;
            }
            Ok(())
        })
    }

    /// Commit every column at `serial`, then publish `serial` as the
    /// writer's committed token and clear imported search caches.
    pub fn force_commit(&self, serial: SerialNum, on_done: Option<DoneCallback>) -> Result<()> {
        let manager = Arc::clone(&self.manager);
        let committed = Arc::clone(&self.committed_serial);
        let completion: DoneCallback = Box::new(move |result| {
            if result.is_ok() {
                committed.fetch_max(serial, Ordering::AcqRel);
            }
            if let Some(repo) = manager.get_imported_attributes() {
                repo.clear_search_caches();
            }
            tracing::debug!(subdb = %manager.name(), serial, ok = result.is_ok(), "force commit done");
            if let Some(on_done) = on_done {
                on_done(result);
            }
        });
        let done = WriteDoneContext::new(Some(completion));
        self.begin(serial, &done)?;
        self.note_serial(serial);
        self.dispatch(self.all_columns(), &done, move |attribute: Column| {
            attribute.commit(serial, serial)
        })
    }

    /// Publish buffered changes everywhere. Columns already synced past
    /// `serial` commit without moving their sync token.
    pub fn heart_beat(&self, serial: SerialNum, on_done: Option<DoneCallback>) -> Result<()> {
        let done = WriteDoneContext::new(on_done);
        self.dispatch(self.all_columns(), &done, move |attribute: Column| {
            if serial >= attribute.last_sync_token() {
                attribute.commit(serial, serial)
            } else {
                attribute.commit_pending()
            }
        })
    }

    /// Clear lids at or above `wanted_lid_limit` in every column so the
    /// lid space can be shrunk later.
    pub fn compact_lid_space(
        &self,
        serial: SerialNum,
        wanted_lid_limit: DocId,
        on_done: Option<DoneCallback>,
    ) -> Result<()> {
        let done = WriteDoneContext::new(on_done);
        self.begin(serial, &done)?;
        self.note_serial(serial);
        self.dispatch(self.all_columns(), &done, move |attribute: Column| {
            if !attribute.accept_serial(serial)? {
                return Ok(());
            }
            attribute.compact_lid_space(wanted_lid_limit)?;
            attribute.commit(serial, serial)
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Reject serial numbers below any this writer has seen.
    fn begin(&self, serial: SerialNum, done: &WriteDoneContext) -> Result<()> {
        let last_serial = *self.last_serial.lock();
        if serial < last_serial {
            tracing::warn!(subdb = %self.manager.name(), serial, last_serial, "rejecting stale operation");
            let error = AttributeError::StaleOperation {
                attribute: self.manager.name().to_string(),
                serial,
                last_sync_token: last_serial,
            };
            done.record_error(error.clone());
            return Err(error);
        }
        Ok(())
    }

    fn note_serial(&self, serial: SerialNum) {
        let mut last_serial = self.last_serial.lock();
        *last_serial = (*last_serial).max(serial);
    }

    fn all_columns(&self) -> Vec<(usize, Column)> {
        self.targets
            .iter()
            .map(|t| (t.shard, Arc::clone(&t.attribute)))
            .collect()
    }

    /// Decompose `document` for the selected columns and encode every
    /// value in parallel. Any failure aborts the whole operation before a
    /// column is touched.
    fn prepare(
        &self,
        document: &Document,
        select: impl Fn(&str) -> bool,
        done: &WriteDoneContext,
    ) -> Result<Vec<(usize, (Column, PreparedValue))>> {
        let values: Vec<(usize, Column, Option<FieldValue>)> = self
            .targets
            .iter()
            .filter(|t| select(t.attribute.name()))
            .map(|t| {
                let value = self.decomposer.extract(document, t.attribute.name());
                (t.shard, Arc::clone(&t.attribute), value)
            })
            .collect();
        values
            .into_par_iter()
            .map(|(shard, attribute, value)| -> Result<(usize, (Column, PreparedValue))> {
                let prepared = match value {
                    Some(value) => attribute.prepare_set(&value)?,
                    None => PreparedValue::Clear,
                };
                Ok((shard, (attribute, prepared)))
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                tracing::debug!(document = document.id(), error = %e, "rejected document");
                done.record_error(e.clone());
                e
            })
    }

    /// Group `work` by shard and schedule one task per shard, in shard
    /// order. Task failures go to `done`.
    fn dispatch<T, F>(&self, work: Vec<(usize, T)>, done: &WriteDoneContext, apply: F) -> Result<()>
    where
        T: Send + 'static,
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        let apply = Arc::new(apply);
        let mut per_shard: BTreeMap<usize, Vec<T>> = BTreeMap::new();
        for (shard, item) in work {
            per_shard.entry(shard).or_default().push(item);
        }
        for (shard, batch) in per_shard {
            let apply = Arc::clone(&apply);
            let task_done = done.clone();
            let task = Box::new(move || {
                for item in batch {
                    let outcome = match catch_unwind(AssertUnwindSafe(|| apply(item))) {
                        Ok(outcome) => outcome,
                        Err(payload) => Err(AttributeError::TaskPanicked(panic_message(payload.as_ref()))),
                    };
                    if let Err(e) = outcome {
                        tracing::warn!(shard, error = %e, "attribute write failed");
                        task_done.record_error(e);
                    }
                }
            });
            if let Err(e) = self.executor.execute(shard, task) {
                done.record_error(e.clone());
                return Err(e);
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for AttributeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeWriter")
            .field("subdb", &self.manager.name())
            .field("attributes", &self.targets.len())
            .field("num_shards", &self.executor.num_shards())
            .field("committed_serial", &self.committed_serial())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ForegroundExecutor;
    use crate::write_done::channel_callback;
    use sochdb_attribute::{AttributeConfig, AttributeManagerView, AttributeSpec, BasicType};

    fn writer_with(names: &[&str]) -> AttributeWriter {
        let manager = Arc::new(AttributeManager::new("test.subdb", 1));
        for name in names {
            manager
                .add_attribute(AttributeSpec::new(*name, AttributeConfig::new(BasicType::Int32)), 0)
                .unwrap();
        }
        AttributeWriter::new(manager, Arc::new(ForegroundExecutor::new(1)))
    }

    #[test]
    fn test_rejected_value_touches_nothing() {
        let writer = writer_with(&["a1", "a2"]);
        let doc = Document::new("id:1")
            .with_field("a1", 5i64)
            .with_field("a2", "not a number");
        let (callback, rx) = channel_callback();
        let err = writer.put(1, &doc, 1, true, Some(callback)).unwrap_err();
        assert!(matches!(err, AttributeError::TypeMismatch { .. }));
        assert_eq!(rx.recv().unwrap(), Err(err));

        let a1 = writer.manager().get_attribute("a1").unwrap();
        assert_eq!(a1.num_docs(), 1);
        assert_eq!(a1.last_sync_token(), 0);
    }

    #[test]
    fn test_callback_fires_once_per_operation() {
        let writer = writer_with(&["a1", "a2", "a3"]);
        let (callback, rx) = channel_callback();
        writer
            .put(1, &Document::new("id:1").with_field("a1", 1i64), 1, false, Some(callback))
            .unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_panicking_task_fails_the_operation() {
        let writer = writer_with(&[]);
        let (callback, rx) = channel_callback();
        let done = WriteDoneContext::new(Some(callback));
        let ran = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&ran);
        writer
            .dispatch(vec![(0, 1u64), (0, 2u64)], &done, move |item: u64| {
                if item == 1 {
                    panic!("column write died");
                }
                seen.fetch_add(item, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        drop(done);
        assert_eq!(
            rx.recv().unwrap(),
            Err(AttributeError::TaskPanicked("column write died".into()))
        );
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_heart_beat_publishes_without_token_regression() {
        let writer = writer_with(&["a1"]);
        writer
            .put(5, &Document::new("id:1").with_field("a1", 1i64), 1, true, None)
            .unwrap();
        writer
            .put(6, &Document::new("id:1").with_field("a1", 2i64), 1, false, None)
            .unwrap();
        writer.heart_beat(3, None).unwrap();
        let a1 = writer.manager().get_attribute("a1").unwrap();
        assert_eq!(a1.last_sync_token(), 5);
        assert_eq!(a1.get_value(1), Some(FieldValue::Int(2)));
    }
}
