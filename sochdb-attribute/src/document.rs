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

//! Field values, documents and document updates

use std::collections::BTreeMap;
use std::fmt;

use crate::tensor::{Tensor, TensorModifyOp};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    String(String),
    Tensor(Tensor),
    Array(Vec<FieldValue>),
    /// Element with weight; keys are unique
    WeightedSet(Vec<(FieldValue, i32)>),
    Map(Vec<(FieldValue, FieldValue)>),
    Struct(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::Tensor(_) => "tensor",
            FieldValue::Array(_) => "array",
            FieldValue::WeightedSet(_) => "weightedset",
            FieldValue::Map(_) => "map",
            FieldValue::Struct(_) => "struct",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            FieldValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldValue::Int(_) | FieldValue::Float(_) | FieldValue::String(_)
        )
    }

    /// Struct value from `(field, value)` pairs.
    pub fn structure<I, K>(fields: I) -> FieldValue
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        FieldValue::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<Tensor> for FieldValue {
    fn from(v: Tensor) -> Self {
        FieldValue::Tensor(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Tensor(t) => write!(f, "{}", t),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A document: id plus top-level fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    id: String,
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn apply(&self, value: f64, operand: f64) -> f64 {
        match self {
            ArithmeticOp::Add => value + operand,
            ArithmeticOp::Sub => value - operand,
            ArithmeticOp::Mul => value * operand,
            ArithmeticOp::Div => value / operand,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueUpdate {
    Assign(FieldValue),
    Clear,
    Arithmetic { op: ArithmeticOp, operand: f64 },
    /// Add an element (with weight 1 for weighted sets)
    Append(FieldValue),
    /// Remove all occurrences of an element
    Remove(FieldValue),
    TensorModify { op: TensorModifyOp, cells: Tensor },
    TensorAdd(Tensor),
    TensorRemove(Tensor),
}

impl ValueUpdate {
    /// Updates whose effect depends on the previous value
    pub fn is_idempotent(&self) -> bool {
        matches!(self, ValueUpdate::Assign(_) | ValueUpdate::Clear)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub field: String,
    pub updates: Vec<ValueUpdate>,
}

impl FieldUpdate {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            updates: Vec::new(),
        }
    }

    pub fn with(mut self, update: ValueUpdate) -> Self {
        self.updates.push(update);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentUpdate {
    id: String,
    updates: Vec<FieldUpdate>,
}

impl DocumentUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updates: Vec::new(),
        }
    }

    pub fn with_update(mut self, update: FieldUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn updates(&self) -> &[FieldUpdate] {
        &self.updates
    }
}
