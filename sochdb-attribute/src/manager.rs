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

//! Attribute manager
//!
//! Owns the named columns of one document sub-database together with
//! their flush targets and writer shard assignment. Lookups go through a
//! `DashMap` so query threads never contend with the feed.

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::attribute::{create_attribute, AttributeReadGuard, AttributeVector};
use crate::config::AttributeSpec;
use crate::error::{AttributeError, Result};
use crate::flush::{AttributeFlushTarget, FlushTarget, ShrinkLidSpaceFlushTarget};
use crate::imported::ImportedAttributesRepo;
use crate::SerialNum;

#[derive(Clone)]
struct AttributeEntry {
    attribute: Arc<dyn AttributeVector>,
    shard: usize,
    /// Insertion sequence, for stable listing order
    seq: u64,
    flushed_serial_num: Arc<AtomicU64>,
    flush_target: Arc<AttributeFlushTarget>,
    shrink_target: Arc<ShrinkLidSpaceFlushTarget>,
}

/// Read side shared by the manager and its filtered views
pub trait AttributeManagerView: Send + Sync {
    fn get_attribute(&self, name: &str) -> Option<Arc<dyn AttributeVector>>;

    /// All attributes in the order they were added
    fn get_attribute_list(&self) -> Vec<Arc<dyn AttributeVector>>;

    /// Flush and shrink target per attribute, in attribute order
    fn get_flush_targets(&self) -> Vec<Arc<dyn FlushTarget>>;

    /// 0 for unknown attributes
    fn get_flushed_serial_num(&self, name: &str) -> SerialNum;

    fn readable_attribute(&self, name: &str) -> Option<AttributeReadGuard> {
        self.get_attribute(name).map(AttributeReadGuard::new)
    }
}

pub struct AttributeManager {
    name: String,
    num_shards: usize,
    attributes: DashMap<String, AttributeEntry>,
    /// (next insertion sequence, next shard)
    assign: Mutex<(u64, usize)>,
    imported: ArcSwapOption<ImportedAttributesRepo>,
}

impl AttributeManager {
    pub fn new(name: impl Into<String>, num_shards: usize) -> Self {
        Self {
            name: name.into(),
            num_shards: num_shards.max(1),
            attributes: DashMap::new(),
            assign: Mutex::new((0, 0)),
            imported: ArcSwapOption::empty(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// Create and register a column. Shards are handed out round-robin in
    /// the order attributes are added.
    pub fn add_attribute(&self, spec: AttributeSpec, create_serial_num: SerialNum) -> Result<Arc<dyn AttributeVector>> {
        let mut assign = self.assign.lock();
        if self.attributes.contains_key(&spec.name) {
            return Err(AttributeError::DuplicateAttribute(spec.name));
        }
        let attribute = create_attribute(&spec.name, &spec.config, create_serial_num)?;
        let (seq, shard) = *assign;
        *assign = (seq + 1, (shard + 1) % self.num_shards);

        let flushed_serial_num = Arc::new(AtomicU64::new(create_serial_num));
        let entry = AttributeEntry {
            flush_target: Arc::new(AttributeFlushTarget::new(
                Arc::clone(&attribute),
                Arc::clone(&flushed_serial_num),
            )),
            shrink_target: Arc::new(ShrinkLidSpaceFlushTarget::new(Arc::clone(&attribute))),
            attribute: Arc::clone(&attribute),
            shard,
            seq,
            flushed_serial_num,
        };
        self.attributes.insert(spec.name.clone(), entry);
        tracing::info!(
            subdb = %self.name,
            attribute = %spec.name,
            shard,
            create_serial_num,
            "added attribute"
        );
        Ok(attribute)
    }

    /// Drop a column from the manager. Readers holding it keep it alive.
    pub fn retire_attribute(&self, name: &str) -> Option<Arc<dyn AttributeVector>> {
        let (_, entry) = self.attributes.remove(name)?;
        tracing::info!(subdb = %self.name, attribute = name, "retired attribute");
        Some(entry.attribute)
    }

    /// Columns the feed writes to, with their shard
    pub fn get_writable_attributes(&self) -> Vec<(Arc<dyn AttributeVector>, usize)> {
        self.sorted_entries()
            .into_iter()
            .map(|entry| (entry.attribute, entry.shard))
            .collect()
    }

    pub fn shard_of(&self, name: &str) -> Option<usize> {
        self.attributes.get(name).map(|entry| entry.shard)
    }

    /// Flush every attribute at `serial`.
    pub fn flush_all(&self, serial: SerialNum) -> Result<()> {
        for target in self.get_flush_targets() {
            target.flush(serial)?;
        }
        Ok(())
    }

    pub fn set_imported_attributes(&self, repo: Option<Arc<ImportedAttributesRepo>>) {
        self.imported.store(repo);
    }

    pub fn get_imported_attributes(&self) -> Option<Arc<ImportedAttributesRepo>> {
        self.imported.load_full()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Per-attribute state explorer output
    pub fn state(&self) -> serde_json::Value {
        let mut attributes = serde_json::Map::new();
        for entry in self.sorted_entries() {
            attributes.insert(entry.attribute.name().to_string(), entry.attribute.state());
        }
        serde_json::json!({
            "subdb": self.name,
            "num_shards": self.num_shards,
            "attributes": attributes,
        })
    }

    fn sorted_entries(&self) -> Vec<AttributeEntry> {
        let mut entries: Vec<AttributeEntry> = self.attributes.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }
}

impl AttributeManagerView for AttributeManager {
    fn get_attribute(&self, name: &str) -> Option<Arc<dyn AttributeVector>> {
        self.attributes.get(name).map(|entry| Arc::clone(&entry.attribute))
    }

    fn get_attribute_list(&self) -> Vec<Arc<dyn AttributeVector>> {
        self.sorted_entries().into_iter().map(|entry| entry.attribute).collect()
    }

    fn get_flush_targets(&self) -> Vec<Arc<dyn FlushTarget>> {
        let mut targets: Vec<Arc<dyn FlushTarget>> = Vec::new();
        for entry in self.sorted_entries() {
            targets.push(entry.flush_target);
            targets.push(entry.shrink_target);
        }
        targets
    }

    fn get_flushed_serial_num(&self, name: &str) -> SerialNum {
        self.attributes
            .get(name)
            .map(|entry| entry.flushed_serial_num.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for AttributeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeManager")
            .field("name", &self.name)
            .field("num_shards", &self.num_shards)
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

/// Read-only view exposing a fixed subset of a manager's attributes
pub struct FilterAttributeManager {
    accepted: HashSet<String>,
    manager: Arc<AttributeManager>,
}

impl FilterAttributeManager {
    pub fn new<I, S>(accepted: I, manager: Arc<AttributeManager>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted: accepted.into_iter().map(Into::into).collect(),
            manager,
        }
    }

    fn accepts(&self, name: &str) -> bool {
        self.accepted.contains(name)
    }
}

impl AttributeManagerView for FilterAttributeManager {
    fn get_attribute(&self, name: &str) -> Option<Arc<dyn AttributeVector>> {
        if !self.accepts(name) {
            return None;
        }
        self.manager.get_attribute(name)
    }

    fn get_attribute_list(&self) -> Vec<Arc<dyn AttributeVector>> {
        self.manager
            .get_attribute_list()
            .into_iter()
            .filter(|attribute| self.accepts(attribute.name()))
            .collect()
    }

    fn get_flush_targets(&self) -> Vec<Arc<dyn FlushTarget>> {
        self.manager
            .sorted_entries()
            .into_iter()
            .filter(|entry| self.accepts(entry.attribute.name()))
            .flat_map(|entry| {
                [
                    entry.flush_target as Arc<dyn FlushTarget>,
                    entry.shrink_target as Arc<dyn FlushTarget>,
                ]
            })
            .collect()
    }

    fn get_flushed_serial_num(&self, name: &str) -> SerialNum {
        if !self.accepts(name) {
            return 0;
        }
        self.manager.get_flushed_serial_num(name)
    }
}
