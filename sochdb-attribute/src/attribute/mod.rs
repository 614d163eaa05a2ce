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

//! Attribute columns
//!
//! Every column is an [`AttributeColumn`] over a [`ColumnBackend`]: the
//! lid-indexed vector, generation handling, change buffer, commit and
//! compaction live in one place, while the backend decides what a cell is
//! (an inline number or a payload ref) and how values are encoded.
//!
//! Writes follow a two-phase protocol:
//!
//! - [`AttributeVector::prepare_set`] validates and encodes a value. It
//!   touches no shared state and may run on any thread.
//! - [`AttributeVector::complete_set`] stores the prepared value in the
//!   column's change buffer and must run on the column's writer shard.
//!
//! Buffered changes become visible to readers at the next commit.

pub mod backend;
pub mod codec;
mod column;
mod factory;
mod read_guard;
pub mod status;
mod update;

use std::fmt;

pub use backend::{ColumnBackend, NumericBackend, NumericCell, PayloadBackend};
pub use codec::{MultiValueCodec, PayloadCodec, StringCodec, TensorCodec};
pub use column::AttributeColumn;
pub use factory::create_attribute;
pub use read_guard::AttributeReadGuard;
pub use status::{Status, StatusSnapshot};

use crate::config::AttributeConfig;
use crate::document::{FieldValue, ValueUpdate};
use crate::error::Result;
use crate::generation::{Generation, GenerationGuard};
use crate::memory_usage::MemoryUsage;
use crate::tensor::TensorType;
use crate::{DocId, SerialNum};

/// Output of `prepare_set`, consumed by `complete_set`
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedValue {
    Clear,
    /// Bit pattern of an inline cell
    Scalar(u64),
    /// Encoded bytes for the payload store
    Payload(Vec<u8>),
}

/// One named column.
///
/// Reader methods may be called from any thread. Writer methods must be
/// called from the column's writer shard only; they serialize on an
/// internal mutex, so calls from elsewhere are safe but unordered.
pub trait AttributeVector: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn config(&self) -> &AttributeConfig;
    fn tensor_type(&self) -> Option<&TensorType>;
    fn create_serial_num(&self) -> SerialNum;

    // ---- readers ----

    fn num_docs(&self) -> DocId;
    fn committed_doc_id_limit(&self) -> DocId;
    fn last_sync_token(&self) -> SerialNum;
    fn status(&self) -> StatusSnapshot;
    fn current_generation(&self) -> Generation;
    fn first_used_generation(&self) -> Generation;
    fn take_generation_guard(&self) -> GenerationGuard;

    /// Committed value of `lid`. Hold a generation guard while calling.
    fn get_value(&self, lid: DocId) -> Option<FieldValue>;

    /// Value reported for documents without one, if the type has one
    fn empty_value(&self) -> Option<FieldValue>;

    fn memory_usage(&self) -> MemoryUsage;

    /// State explorer output
    fn state(&self) -> serde_json::Value;

    // ---- writer ----

    /// Ok(true) to apply an operation with `serial`, Ok(false) when it
    /// was already applied, StaleOperation when it is older than the last
    /// commit.
    fn accept_serial(&self, serial: SerialNum) -> Result<bool>;

    fn add_doc(&self) -> Result<DocId>;

    fn ensure_lid_space(&self, lid: DocId) -> Result<()> {
        while self.num_docs() <= lid {
            self.add_doc()?;
        }
        Ok(())
    }

    fn prepare_set(&self, value: &FieldValue) -> Result<PreparedValue>;
    fn complete_set(&self, lid: DocId, prepared: PreparedValue) -> Result<()>;

    fn set_value(&self, lid: DocId, value: &FieldValue) -> Result<()> {
        let prepared = self.prepare_set(value)?;
        self.complete_set(lid, prepared)
    }

    fn clear_doc(&self, lid: DocId) -> Result<()>;
    fn clear_docs(&self, lid_low: DocId, lid_limit: DocId) -> Result<()>;

    /// Apply `updates` in order as one change: either every step succeeds
    /// and the result is staged, or nothing is.
    fn apply_updates(&self, lid: DocId, updates: &[ValueUpdate]) -> Result<()>;

    fn apply_update(&self, lid: DocId, update: &ValueUpdate) -> Result<()> {
        self.apply_updates(lid, std::slice::from_ref(update))
    }

    /// Publish buffered changes and set the sync token to `last`.
    fn commit(&self, first: SerialNum, last: SerialNum) -> Result<()>;

    /// Publish buffered changes, leaving the sync token alone.
    fn commit_pending(&self) -> Result<()>;

    fn compact_lid_space(&self, wanted_lid_limit: DocId) -> Result<()>;
    fn can_shrink_lid_space(&self) -> bool;
    fn shrink_lid_space(&self) -> Result<()>;
}
