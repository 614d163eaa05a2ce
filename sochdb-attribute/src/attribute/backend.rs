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

//! Value storage behind the lid-indexed vector
//!
//! A column stores one cell per lid in its `RcuVector`. Numeric columns keep
//! the value itself in the cell; payload columns keep an `EntryRef` into a
//! `DataStore` and go through a [`PayloadCodec`].

use std::fmt;
use std::marker::PhantomData;

use super::codec::PayloadCodec;
use super::PreparedValue;
use crate::config::{BasicType, DataStoreConfig};
use crate::data_store::DataStore;
use crate::document::FieldValue;
use crate::entry_ref::EntryRef;
use crate::error::{AttributeError, Result};
use crate::generation::Generation;
use crate::memory_usage::MemoryUsage;
use crate::rcu_vector::{RcuValue, RcuVector};
use crate::tensor::TensorType;

pub trait ColumnBackend: Send + Sync + 'static {
    type Cell: RcuValue + fmt::Debug;

    fn undefined(&self) -> Self::Cell;

    fn is_defined(&self, cell: Self::Cell) -> bool;

    /// Validate and encode; must not touch shared state.
    fn prepare(&self, attribute: &str, value: &FieldValue) -> Result<PreparedValue>;

    /// Turn a prepared value into a cell. Writer only.
    fn materialize(&self, prepared: PreparedValue) -> Result<Self::Cell>;

    fn decode(&self, cell: Self::Cell) -> Option<FieldValue>;

    /// The cell was replaced at `generation`.
    fn release(&self, cell: Self::Cell, generation: Generation);

    fn reclaim(&self, first_used: Generation);

    fn memory_usage(&self) -> MemoryUsage;

    fn empty_value(&self) -> Option<FieldValue>;

    fn tensor_type(&self) -> Option<&TensorType> {
        None
    }

    fn store_name(&self) -> Option<&'static str> {
        None
    }

    /// Relocate the live entries of the most fragmented buffer, rewriting
    /// `vector` in place. Returns true when a buffer was compacted.
    fn compact_worst(&self, _vector: &RcuVector<Self::Cell>, _generation: Generation) -> Result<bool> {
        Ok(false)
    }
}

// ============================================================================
// Numeric
// ============================================================================

/// Inline numeric cell with an in-band undefined value
pub trait NumericCell: RcuValue + fmt::Debug {
    const BASIC_TYPE: BasicType;

    fn undefined() -> Self;
    fn is_undefined(self) -> bool;
    fn from_field(value: &FieldValue) -> Option<Self>;
    fn to_field(self) -> FieldValue;
}

impl NumericCell for i32 {
    const BASIC_TYPE: BasicType = BasicType::Int32;

    fn undefined() -> Self {
        i32::MIN
    }
    fn is_undefined(self) -> bool {
        self == i32::MIN
    }
    fn from_field(value: &FieldValue) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
    fn to_field(self) -> FieldValue {
        FieldValue::Int(self as i64)
    }
}

impl NumericCell for i64 {
    const BASIC_TYPE: BasicType = BasicType::Int64;

    fn undefined() -> Self {
        i64::MIN
    }
    fn is_undefined(self) -> bool {
        self == i64::MIN
    }
    fn from_field(value: &FieldValue) -> Option<Self> {
        value.as_i64()
    }
    fn to_field(self) -> FieldValue {
        FieldValue::Int(self)
    }
}

impl NumericCell for f32 {
    const BASIC_TYPE: BasicType = BasicType::Float;

    fn undefined() -> Self {
        f32::NAN
    }
    fn is_undefined(self) -> bool {
        self.is_nan()
    }
    fn from_field(value: &FieldValue) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
    fn to_field(self) -> FieldValue {
        FieldValue::Float(self as f64)
    }
}

impl NumericCell for f64 {
    const BASIC_TYPE: BasicType = BasicType::Double;

    fn undefined() -> Self {
        f64::NAN
    }
    fn is_undefined(self) -> bool {
        self.is_nan()
    }
    fn from_field(value: &FieldValue) -> Option<Self> {
        value.as_f64()
    }
    fn to_field(self) -> FieldValue {
        FieldValue::Float(self)
    }
}

pub struct NumericBackend<T> {
    _marker: PhantomData<T>,
}

impl<T> NumericBackend<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for NumericBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NumericCell> ColumnBackend for NumericBackend<T> {
    type Cell = T;

    fn undefined(&self) -> T {
        T::undefined()
    }

    fn is_defined(&self, cell: T) -> bool {
        !cell.is_undefined()
    }

    fn prepare(&self, attribute: &str, value: &FieldValue) -> Result<PreparedValue> {
        T::from_field(value)
            .map(|v| PreparedValue::Scalar(v.to_bits()))
            .ok_or_else(|| {
                AttributeError::type_mismatch(
                    attribute,
                    format!(
                        "cannot assign {} '{}' to {} attribute",
                        value.type_name(),
                        value,
                        T::BASIC_TYPE.name()
                    ),
                )
            })
    }

    fn materialize(&self, prepared: PreparedValue) -> Result<T> {
        match prepared {
            PreparedValue::Clear => Ok(T::undefined()),
            PreparedValue::Scalar(bits) => Ok(T::from_bits(bits)),
            PreparedValue::Payload(_) => Err(AttributeError::InvalidArgument(
                "payload value prepared for a numeric attribute".into(),
            )),
        }
    }

    fn decode(&self, cell: T) -> Option<FieldValue> {
        (!cell.is_undefined()).then(|| cell.to_field())
    }

    fn release(&self, _cell: T, _generation: Generation) {}

    fn reclaim(&self, _first_used: Generation) {}

    fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage::default()
    }

    fn empty_value(&self) -> Option<FieldValue> {
        None
    }
}

// ============================================================================
// Payload
// ============================================================================

pub struct PayloadBackend<C> {
    codec: C,
    store: DataStore,
}

impl<C: PayloadCodec> PayloadBackend<C> {
    pub fn new(codec: C, config: DataStoreConfig) -> Self {
        Self {
            codec,
            store: DataStore::new(config),
        }
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }
}

impl<C: PayloadCodec> ColumnBackend for PayloadBackend<C> {
    type Cell = EntryRef;

    fn undefined(&self) -> EntryRef {
        EntryRef::invalid()
    }

    fn is_defined(&self, cell: EntryRef) -> bool {
        cell.is_valid()
    }

    fn prepare(&self, attribute: &str, value: &FieldValue) -> Result<PreparedValue> {
        self.codec.encode(attribute, value).map(PreparedValue::Payload)
    }

    fn materialize(&self, prepared: PreparedValue) -> Result<EntryRef> {
        match prepared {
            PreparedValue::Clear => Ok(EntryRef::invalid()),
            PreparedValue::Payload(bytes) => self.store.insert(&bytes),
            PreparedValue::Scalar(_) => Err(AttributeError::InvalidArgument(
                "scalar value prepared for a payload attribute".into(),
            )),
        }
    }

    fn decode(&self, cell: EntryRef) -> Option<FieldValue> {
        let payload = self.store.get(cell)?;
        match self.codec.decode(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(entry = ?cell, error = %e, "undecodable payload");
                None
            }
        }
    }

    fn release(&self, cell: EntryRef, generation: Generation) {
        self.store.hold(cell, generation);
    }

    fn reclaim(&self, first_used: Generation) {
        self.store.trim_hold_lists(first_used);
    }

    fn memory_usage(&self) -> MemoryUsage {
        self.store.memory_usage()
    }

    fn empty_value(&self) -> Option<FieldValue> {
        self.codec.empty_value()
    }

    fn tensor_type(&self) -> Option<&TensorType> {
        self.codec.tensor_type()
    }

    fn store_name(&self) -> Option<&'static str> {
        Some(self.codec.store_name())
    }

    fn compact_worst(&self, vector: &RcuVector<EntryRef>, generation: Generation) -> Result<bool> {
        let Some(mut context) = self.store.start_compact_worst() else {
            return Ok(false);
        };
        for lid in 0..vector.len() {
            let entry = vector.get(lid);
            if !context.is_moving(entry) {
                continue;
            }
            match self.store.move_entry(&mut context, entry) {
                Ok(moved) => {
                    vector.set(lid, moved);
                }
                Err(e) => {
                    self.store.abort_compact(context);
                    return Err(e);
                }
            }
        }
        self.store.finish_compact(context, generation);
        Ok(true)
    }
}
