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

//! Payload encodings for out-of-line column values

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::config::{BasicType, CollectionType};
use crate::document::FieldValue;
use crate::error::{AttributeError, Result};
use crate::tensor::{type_mismatch_message, Tensor, TensorType};

/// Converts a field value to and from the bytes kept in a `DataStore`.
///
/// `encode` must be pure: it runs off the column's writer shard.
pub trait PayloadCodec: Send + Sync + 'static {
    fn encode(&self, attribute: &str, value: &FieldValue) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<FieldValue>;

    /// Value reported for documents without one
    fn empty_value(&self) -> Option<FieldValue> {
        None
    }

    fn tensor_type(&self) -> Option<&TensorType> {
        None
    }

    /// Key under which the store shows up in state output
    fn store_name(&self) -> &'static str;
}

// ============================================================================
// String
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct StringCodec;

impl PayloadCodec for StringCodec {
    fn encode(&self, attribute: &str, value: &FieldValue) -> Result<Vec<u8>> {
        match value {
            FieldValue::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(AttributeError::type_mismatch(
                attribute,
                format!("cannot assign {} to string attribute", other.type_name()),
            )),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<FieldValue> {
        std::str::from_utf8(bytes)
            .map(|s| FieldValue::String(s.to_string()))
            .map_err(|e| AttributeError::Serialization(e.to_string()))
    }

    fn store_name(&self) -> &'static str {
        "string_store"
    }
}

// ============================================================================
// Tensor
// ============================================================================

#[derive(Debug, Clone)]
pub struct TensorCodec {
    tensor_type: TensorType,
}

impl TensorCodec {
    pub fn new(tensor_type: TensorType) -> Self {
        Self { tensor_type }
    }
}

impl PayloadCodec for TensorCodec {
    fn encode(&self, attribute: &str, value: &FieldValue) -> Result<Vec<u8>> {
        let tensor = value.as_tensor().ok_or_else(|| {
            AttributeError::type_mismatch(
                attribute,
                format!("cannot assign {} to tensor attribute", value.type_name()),
            )
        })?;
        if !self.tensor_type.is_assignable_from(tensor.tensor_type()) {
            return Err(AttributeError::type_mismatch(
                attribute,
                type_mismatch_message(&self.tensor_type, tensor.tensor_type()),
            ));
        }
        Ok(tensor.encode())
    }

    fn decode(&self, bytes: &[u8]) -> Result<FieldValue> {
        Tensor::decode(&self.tensor_type, bytes).map(FieldValue::Tensor)
    }

    fn empty_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Tensor(Tensor::empty(self.tensor_type.clone())))
    }

    fn tensor_type(&self) -> Option<&TensorType> {
        Some(&self.tensor_type)
    }

    fn store_name(&self) -> &'static str {
        "tensor_store"
    }
}

// ============================================================================
// Array / Weighted set
// ============================================================================

/// Array or weighted set of scalar elements.
///
/// Layout: `count: u32`, then per element the value (`i64`, `f64` or
/// `u32 len + utf8`) followed by an `i32` weight for weighted sets.
#[derive(Debug, Clone, Copy)]
pub struct MultiValueCodec {
    element_type: BasicType,
    collection: CollectionType,
}

impl MultiValueCodec {
    pub fn new(element_type: BasicType, collection: CollectionType) -> Self {
        debug_assert!(collection != CollectionType::Single);
        Self {
            element_type,
            collection,
        }
    }

    fn is_weighted(&self) -> bool {
        self.collection == CollectionType::WeightedSet
    }

    fn check_element(&self, attribute: &str, element: &FieldValue) -> Result<FieldValue> {
        let mismatch = || {
            AttributeError::type_mismatch(
                attribute,
                format!(
                    "cannot store {} element in {} collection",
                    element.type_name(),
                    self.element_type.name()
                ),
            )
        };
        match (self.element_type, element) {
            (BasicType::Int32, FieldValue::Int(v)) => i32::try_from(*v)
                .map(|v| FieldValue::Int(v as i64))
                .map_err(|_| mismatch()),
            (BasicType::Int64, FieldValue::Int(v)) => Ok(FieldValue::Int(*v)),
            (BasicType::Float, v) => v
                .as_f64()
                .map(|f| FieldValue::Float(f as f32 as f64))
                .ok_or_else(mismatch),
            (BasicType::Double, v) => v.as_f64().map(FieldValue::Float).ok_or_else(mismatch),
            (BasicType::String, FieldValue::String(s)) => Ok(FieldValue::String(s.clone())),
            _ => Err(mismatch()),
        }
    }

    /// Normalized elements with weights; weighted sets keep the last
    /// weight given for a key.
    pub(crate) fn elements(&self, attribute: &str, value: &FieldValue) -> Result<Vec<(FieldValue, i32)>> {
        let mut out: Vec<(FieldValue, i32)> = Vec::new();
        match (self.collection, value) {
            (CollectionType::Array, FieldValue::Array(items)) => {
                for item in items {
                    out.push((self.check_element(attribute, item)?, 1));
                }
            }
            (CollectionType::WeightedSet, FieldValue::WeightedSet(items)) => {
                for (item, weight) in items {
                    let item = self.check_element(attribute, item)?;
                    match out.iter_mut().find(|(existing, _)| *existing == item) {
                        Some(entry) => entry.1 = *weight,
                        None => out.push((item, *weight)),
                    }
                }
            }
            (_, other) => {
                return Err(AttributeError::type_mismatch(
                    attribute,
                    format!(
                        "cannot assign {} to {:?} attribute",
                        other.type_name(),
                        self.collection
                    ),
                ))
            }
        }
        Ok(out)
    }

    fn write_element(&self, out: &mut Vec<u8>, element: &FieldValue) -> std::io::Result<()> {
        match element {
            FieldValue::Int(v) => out.write_i64::<LittleEndian>(*v),
            FieldValue::Float(v) => out.write_f64::<LittleEndian>(*v),
            FieldValue::String(s) => {
                out.write_u32::<LittleEndian>(s.len() as u32)?;
                out.extend_from_slice(s.as_bytes());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn read_element(&self, reader: &mut Cursor<&[u8]>) -> Result<FieldValue> {
        Ok(match self.element_type {
            BasicType::Int32 | BasicType::Int64 => FieldValue::Int(reader.read_i64::<LittleEndian>()?),
            BasicType::Float | BasicType::Double => {
                FieldValue::Float(reader.read_f64::<LittleEndian>()?)
            }
            BasicType::String | BasicType::Tensor => {
                let len = reader.read_u32::<LittleEndian>()? as usize;
                let mut bytes = vec![0u8; len];
                reader.read_exact(&mut bytes)?;
                FieldValue::String(
                    String::from_utf8(bytes).map_err(|e| AttributeError::Serialization(e.to_string()))?,
                )
            }
        })
    }
}

impl PayloadCodec for MultiValueCodec {
    fn encode(&self, attribute: &str, value: &FieldValue) -> Result<Vec<u8>> {
        let elements = self.elements(attribute, value)?;
        let mut out = Vec::with_capacity(4 + elements.len() * 12);
        out.write_u32::<LittleEndian>(elements.len() as u32)?;
        for (element, weight) in &elements {
            self.write_element(&mut out, element)?;
            if self.is_weighted() {
                out.write_i32::<LittleEndian>(*weight)?;
            }
        }
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<FieldValue> {
        let mut reader = Cursor::new(bytes);
        let count = reader.read_u32::<LittleEndian>()? as usize;
        if self.is_weighted() {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let element = self.read_element(&mut reader)?;
                items.push((element, reader.read_i32::<LittleEndian>()?));
            }
            Ok(FieldValue::WeightedSet(items))
        } else {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(self.read_element(&mut reader)?);
            }
            Ok(FieldValue::Array(items))
        }
    }

    fn empty_value(&self) -> Option<FieldValue> {
        Some(if self.is_weighted() {
            FieldValue::WeightedSet(Vec::new())
        } else {
            FieldValue::Array(Vec::new())
        })
    }

    fn store_name(&self) -> &'static str {
        "multi_value_store"
    }
}
