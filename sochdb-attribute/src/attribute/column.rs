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

//! Generic column mechanics

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::backend::ColumnBackend;
use super::status::{Status, StatusSnapshot};
use super::update::{apply_value_update, UpdateOutcome};
use super::{AttributeVector, PreparedValue};
use crate::config::AttributeConfig;
use crate::document::{FieldValue, ValueUpdate};
use crate::error::{AttributeError, Result};
use crate::generation::{Generation, GenerationGuard, GenerationHandler};
use crate::memory_usage::MemoryUsage;
use crate::rcu_vector::RcuVector;
use crate::tensor::TensorType;
use crate::{DocId, SerialNum};

struct ColumnWriter<C> {
    /// Changes since the last commit, at most one per lid
    pending: BTreeMap<DocId, C>,
    uncommitted_doc_id_limit: DocId,
    last_applied_serial: Option<SerialNum>,
    compact_lid_space_generation: Option<Generation>,
}

pub struct AttributeColumn<B: ColumnBackend> {
    name: String,
    config: AttributeConfig,
    backend: B,
    vector: RcuVector<B::Cell>,
    generation: GenerationHandler,
    status: Status,
    create_serial_num: SerialNum,
    num_docs: AtomicU32,
    committed_doc_id_limit: AtomicU32,
    compact_generation: AtomicU64,
    writer: Mutex<ColumnWriter<B::Cell>>,
}

impl<B: ColumnBackend> AttributeColumn<B> {
    /// New column holding only the reserved lid 0.
    pub fn new(
        name: impl Into<String>,
        config: AttributeConfig,
        backend: B,
        create_serial_num: SerialNum,
    ) -> Result<Self> {
        let vector = RcuVector::new(config.grow_strategy, backend.undefined());
        let column = Self {
            name: name.into(),
            config,
            backend,
            vector,
            generation: GenerationHandler::new(),
            status: Status::default(),
            create_serial_num,
            num_docs: AtomicU32::new(0),
            committed_doc_id_limit: AtomicU32::new(0),
            compact_generation: AtomicU64::new(0),
            writer: Mutex::new(ColumnWriter {
                pending: BTreeMap::new(),
                uncommitted_doc_id_limit: 0,
                last_applied_serial: None,
                compact_lid_space_generation: None,
            }),
        };
        {
            let mut writer = column.writer.lock();
            column.add_doc_locked(&mut writer)?;
            column.commit_locked(&mut writer)?;
        }
        Ok(column)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn check_lid(&self, lid: DocId) -> Result<()> {
        let limit = self.num_docs();
        if lid >= limit {
            return Err(AttributeError::OutOfRange { lid, limit });
        }
        Ok(())
    }

    fn add_doc_locked(&self, writer: &mut ColumnWriter<B::Cell>) -> Result<DocId> {
        let lid = self.num_docs.load(Ordering::Relaxed);
        if lid == DocId::MAX {
            return Err(AttributeError::AllocationFailure(format!(
                "attribute '{}' is out of local document ids",
                self.name
            )));
        }
        let reallocated = self
            .vector
            .push_back(self.backend.undefined(), self.generation.current_generation());
        self.num_docs.store(lid + 1, Ordering::Release);
        writer.uncommitted_doc_id_limit = writer.uncommitted_doc_id_limit.max(lid + 1);
        if reallocated {
            self.inc_generation();
        } else {
            self.reclaim_unused();
        }
        Ok(lid)
    }

    fn stage(&self, writer: &mut ColumnWriter<B::Cell>, lid: DocId, cell: B::Cell) {
        if let Some(superseded) = writer.pending.insert(lid, cell) {
            self.release(superseded);
        }
        writer.uncommitted_doc_id_limit = writer.uncommitted_doc_id_limit.max(lid + 1);
    }

    fn release(&self, cell: B::Cell) {
        if self.backend.is_defined(cell) {
            self.backend
                .release(cell, self.generation.current_generation());
        }
    }

    /// Latest value including buffered changes; what later writes build on.
    fn current_value(&self, writer: &ColumnWriter<B::Cell>, lid: DocId) -> Option<FieldValue> {
        let cell = match writer.pending.get(&lid) {
            Some(cell) => *cell,
            None => self.vector.get(lid as usize),
        };
        self.backend.decode(cell)
    }

    fn inc_generation(&self) {
        self.generation.inc_generation();
        self.reclaim_unused();
    }

    fn reclaim_unused(&self) {
        let first_used = self.generation.update_first_used_generation();
        self.vector.reclaim(first_used);
        self.backend.reclaim(first_used);
    }

    fn commit_locked(&self, writer: &mut ColumnWriter<B::Cell>) -> Result<()> {
        let generation = self.generation.current_generation();
        let changes = writer.pending.len();
        for (lid, cell) in std::mem::take(&mut writer.pending) {
            match self.vector.set(lid as usize, cell) {
                Some(old) if self.backend.is_defined(old) => self.backend.release(old, generation),
                Some(_) => {}
                None => self.release(cell),
            }
        }
        self.committed_doc_id_limit
            .store(writer.uncommitted_doc_id_limit, Ordering::Release);
        self.inc_generation();

        if self.generation.first_used_generation() > self.compact_generation.load(Ordering::Acquire) {
            let usage = self.memory_usage();
            if self
                .config
                .compaction
                .should_compact(usage.used_bytes, usage.dead_bytes)
            {
                let generation = self.generation.current_generation();
                if self.backend.compact_worst(&self.vector, generation)? {
                    self.compact_generation.store(generation, Ordering::Release);
                    self.inc_generation();
                    tracing::debug!(
                        attribute = %self.name,
                        generation,
                        dead = usage.dead_bytes,
                        used = usage.used_bytes,
                        "compacted attribute"
                    );
                }
            }
        }

        self.update_stat();
        tracing::trace!(
            attribute = %self.name,
            changes,
            generation = self.generation.current_generation(),
            "committed attribute"
        );
        Ok(())
    }

    fn update_stat(&self) {
        let committed = self.committed_doc_id_limit() as u64;
        self.status
            .update_statistics(self.num_docs() as u64, committed, &self.memory_usage());
    }

    /// Lowest lid limit a shrink may cut to: staged writes past the
    /// committed limit must survive until their commit.
    fn shrink_target(&self, writer: &ColumnWriter<B::Cell>) -> DocId {
        writer
            .uncommitted_doc_id_limit
            .max(self.committed_doc_id_limit())
    }

    fn can_shrink_locked(&self, writer: &ColumnWriter<B::Cell>) -> bool {
        let first_used = self.generation.update_first_used_generation();
        self.shrink_target(writer) < self.num_docs()
            && writer
                .compact_lid_space_generation
                .is_some_and(|generation| first_used > generation)
    }
}

impl<B: ColumnBackend> AttributeVector for AttributeColumn<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &AttributeConfig {
        &self.config
    }

    fn tensor_type(&self) -> Option<&TensorType> {
        self.backend.tensor_type()
    }

    fn create_serial_num(&self) -> SerialNum {
        self.create_serial_num
    }

    fn num_docs(&self) -> DocId {
        self.num_docs.load(Ordering::Acquire)
    }

    fn committed_doc_id_limit(&self) -> DocId {
        self.committed_doc_id_limit.load(Ordering::Acquire)
    }

    fn last_sync_token(&self) -> SerialNum {
        self.status.last_sync_token()
    }

    fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    fn current_generation(&self) -> Generation {
        self.generation.current_generation()
    }

    fn first_used_generation(&self) -> Generation {
        self.generation.first_used_generation()
    }

    fn take_generation_guard(&self) -> GenerationGuard {
        self.generation.take_guard()
    }

    fn get_value(&self, lid: DocId) -> Option<FieldValue> {
        let lid = lid as usize;
        if lid >= self.vector.len() {
            return None;
        }
        self.backend.decode(self.vector.get(lid))
    }

    fn empty_value(&self) -> Option<FieldValue> {
        self.backend.empty_value()
    }

    fn memory_usage(&self) -> MemoryUsage {
        self.vector.memory_usage() + self.backend.memory_usage()
    }

    fn state(&self) -> serde_json::Value {
        let mut state = serde_json::json!({
            "compact_generation": self.compact_generation.load(Ordering::Acquire),
            "ref_vector": { "memory_usage": self.vector.memory_usage().to_json() },
            "status": serde_json::to_value(self.status.snapshot()).unwrap_or_default(),
        });
        if let Some(store) = self.backend.store_name() {
            state[store] = serde_json::json!({ "memory_usage": self.backend.memory_usage().to_json() });
        }
        state
    }

    fn accept_serial(&self, serial: SerialNum) -> Result<bool> {
        let last_sync_token = self.status.last_sync_token();
        if serial < last_sync_token {
            tracing::warn!(
                attribute = %self.name,
                serial,
                last_sync_token,
                "rejecting stale operation"
            );
            return Err(AttributeError::StaleOperation {
                attribute: self.name.clone(),
                serial,
                last_sync_token,
            });
        }
        let mut writer = self.writer.lock();
        if serial == last_sync_token || writer.last_applied_serial.is_some_and(|applied| serial <= applied) {
            return Ok(false);
        }
        writer.last_applied_serial = Some(serial);
        Ok(true)
    }

    fn add_doc(&self) -> Result<DocId> {
        let mut writer = self.writer.lock();
        self.add_doc_locked(&mut writer)
    }

    fn prepare_set(&self, value: &FieldValue) -> Result<PreparedValue> {
        self.backend.prepare(&self.name, value)
    }

    fn complete_set(&self, lid: DocId, prepared: PreparedValue) -> Result<()> {
        self.check_lid(lid)?;
        let cell = self.backend.materialize(prepared)?;
        let mut writer = self.writer.lock();
        self.stage(&mut writer, lid, cell);
        self.status.inc_updates(true);
        Ok(())
    }

    fn clear_doc(&self, lid: DocId) -> Result<()> {
        self.check_lid(lid)?;
        let mut writer = self.writer.lock();
        self.stage(&mut writer, lid, self.backend.undefined());
        self.status.inc_updates(true);
        Ok(())
    }

    fn clear_docs(&self, lid_low: DocId, lid_limit: DocId) -> Result<()> {
        let limit = lid_limit.min(self.num_docs());
        let mut writer = self.writer.lock();
        for lid in lid_low..limit {
            self.stage(&mut writer, lid, self.backend.undefined());
        }
        Ok(())
    }

    fn apply_updates(&self, lid: DocId, updates: &[ValueUpdate]) -> Result<()> {
        self.check_lid(lid)?;
        let mut writer = self.writer.lock();
        let mut value = self.current_value(&writer, lid);
        // None: untouched, Some(None): cleared
        let mut staged: Option<Option<PreparedValue>> = None;
        for update in updates {
            let outcome = apply_value_update(
                &self.name,
                self.config.collection_type,
                value.clone(),
                self.backend.empty_value(),
                update,
            )?;
            match outcome {
                UpdateOutcome::Unchanged => {}
                UpdateOutcome::Clear => {
                    value = None;
                    staged = Some(None);
                }
                UpdateOutcome::Set(next) => {
                    staged = Some(Some(self.backend.prepare(&self.name, &next)?));
                    value = Some(next);
                }
            }
        }
        match staged {
            None => {}
            Some(None) => self.stage(&mut writer, lid, self.backend.undefined()),
            Some(Some(prepared)) => {
                let cell = self.backend.materialize(prepared)?;
                self.stage(&mut writer, lid, cell);
            }
        }
        for update in updates {
            self.status.inc_updates(update.is_idempotent());
        }
        Ok(())
    }

    fn commit(&self, first: SerialNum, last: SerialNum) -> Result<()> {
        let last_sync_token = self.status.last_sync_token();
        if first < last_sync_token {
            tracing::warn!(
                attribute = %self.name,
                serial = first,
                last_sync_token,
                "rejecting stale commit"
            );
            return Err(AttributeError::StaleOperation {
                attribute: self.name.clone(),
                serial: first,
                last_sync_token,
            });
        }
        let mut writer = self.writer.lock();
        self.commit_locked(&mut writer)?;
        self.status.set_last_sync_token(last);
        tracing::debug!(attribute = %self.name, serial = last, "attribute sync token advanced");
        Ok(())
    }

    fn commit_pending(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        self.commit_locked(&mut writer)
    }

    fn compact_lid_space(&self, wanted_lid_limit: DocId) -> Result<()> {
        let mut writer = self.writer.lock();
        self.commit_locked(&mut writer)?;
        let committed = self.committed_doc_id_limit();
        if wanted_lid_limit == 0 || wanted_lid_limit > committed {
            return Err(AttributeError::InvalidArgument(format!(
                "cannot compact lid space of '{}' to {} (committed limit {})",
                self.name, wanted_lid_limit, committed
            )));
        }
        for lid in wanted_lid_limit..committed {
            self.stage(&mut writer, lid, self.backend.undefined());
        }
        writer.uncommitted_doc_id_limit = wanted_lid_limit;
        self.commit_locked(&mut writer)?;
        writer.compact_lid_space_generation = Some(self.generation.current_generation());
        self.inc_generation();
        tracing::debug!(
            attribute = %self.name,
            wanted_lid_limit,
            num_docs = self.num_docs(),
            "compacted lid space"
        );
        Ok(())
    }

    fn can_shrink_lid_space(&self) -> bool {
        let writer = self.writer.lock();
        self.can_shrink_locked(&writer)
    }

    fn shrink_lid_space(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if !self.can_shrink_locked(&writer) {
            return Ok(());
        }
        let target = self.shrink_target(&writer);
        debug_assert!(writer.pending.range(target..).next().is_none());
        for lid in target as usize..self.vector.len() {
            self.release(self.vector.get(lid));
        }
        let old_num_docs = self.num_docs();
        let reallocated = self
            .vector
            .shrink(target as usize, self.generation.current_generation());
        self.num_docs.store(target, Ordering::Release);
        writer.uncommitted_doc_id_limit = target;
        writer.compact_lid_space_generation = None;
        if reallocated {
            self.inc_generation();
        } else {
            self.reclaim_unused();
        }
        self.update_stat();
        tracing::info!(
            attribute = %self.name,
            from = old_num_docs,
            to = target,
            "shrunk lid space"
        );
        Ok(())
    }
}

impl<B: ColumnBackend> fmt::Debug for AttributeColumn<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeColumn")
            .field("name", &self.name)
            .field("basic_type", &self.config.basic_type)
            .field("collection_type", &self.config.collection_type)
            .field("num_docs", &self.num_docs())
            .field("committed_doc_id_limit", &self.committed_doc_id_limit())
            .field("last_sync_token", &self.last_sync_token())
            .finish()
    }
}
