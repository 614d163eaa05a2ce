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

//! SochDB Attribute
//!
//! In-memory attribute columns: per-field vectors indexed by a dense local
//! document id (lid).
//!
//! # Core Components
//!
//! - **Generations**: readers pin a generation; memory retired by the
//!   writer is reclaimed once no reader can reach it
//! - **RcuVector**: lock-free readable lid → cell vector
//! - **DataStore**: compacting payload store for variable-sized values
//! - **Attribute columns**: numeric, string, multi-value and tensor
//!   columns over one generic column implementation
//! - **Manager**: named columns, flush targets and shard assignment
//!
//! # Example
//!
//! ```rust,ignore
//! use sochdb_attribute::{AttributeConfig, AttributeManager, AttributeSpec, BasicType, FieldValue};
//!
//! let manager = AttributeManager::new("subdb", 1);
//! let a1 = manager.add_attribute(AttributeSpec::new("a1", AttributeConfig::new(BasicType::Int32)), 0)?;
//! a1.ensure_lid_space(1)?;
//! a1.set_value(1, &FieldValue::Int(10))?;
//! a1.commit(1, 1)?;
//! ```

pub mod attribute;
pub mod config;
pub mod data_store;
pub mod document;
pub mod entry_ref;
pub mod error;
pub mod flush;
pub mod generation;
pub mod imported;
pub mod manager;
pub mod memory_usage;
pub mod rcu_vector;
pub mod tensor;

/// Local document id
pub type DocId = u32;

/// Serial number of a feed operation
pub type SerialNum = u64;

pub use attribute::{
    create_attribute, AttributeColumn, AttributeReadGuard, AttributeVector, PreparedValue, Status,
    StatusSnapshot,
};
pub use config::{
    AttributeConfig, AttributeSpec, BasicType, CollectionType, CompactionStrategy, DataStoreConfig,
    GrowStrategy,
};
pub use data_store::DataStore;
pub use document::{ArithmeticOp, Document, DocumentUpdate, FieldUpdate, FieldValue, ValueUpdate};
pub use entry_ref::EntryRef;
pub use error::{AttributeError, Result};
pub use flush::{AttributeFlushTarget, FlushTarget, ShrinkLidSpaceFlushTarget};
pub use generation::{Generation, GenerationGuard, GenerationHandler, GenerationHoldList};
pub use imported::{BitVectorSearchCache, CachedResult, ImportedAttribute, ImportedAttributesRepo};
pub use manager::{AttributeManager, AttributeManagerView, FilterAttributeManager};
pub use memory_usage::MemoryUsage;
pub use rcu_vector::{RcuValue, RcuVector};
pub use tensor::{CellType, Dimension, Label, Tensor, TensorAddress, TensorModifyOp, TensorType};
