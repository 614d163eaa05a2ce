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

//! Reader access to a column
//!
//! A guard pins the column's generation for as long as it lives, so every
//! value decoded through it stays valid even while the writer commits,
//! compacts or shrinks concurrently.

use std::sync::Arc;

use super::AttributeVector;
use crate::document::FieldValue;
use crate::generation::{Generation, GenerationGuard};
use crate::tensor::Tensor;
use crate::DocId;

pub struct AttributeReadGuard {
    attribute: Arc<dyn AttributeVector>,
    guard: GenerationGuard,
    doc_id_limit: DocId,
}

impl AttributeReadGuard {
    pub fn new(attribute: Arc<dyn AttributeVector>) -> Self {
        // The limit is read after pinning so it never exceeds what the
        // pinned generation can see.
        let guard = attribute.take_generation_guard();
        let doc_id_limit = attribute.committed_doc_id_limit();
        Self {
            attribute,
            guard,
            doc_id_limit,
        }
    }

    pub fn attribute(&self) -> &dyn AttributeVector {
        self.attribute.as_ref()
    }

    /// Committed doc id limit at the time the guard was taken
    pub fn doc_id_limit(&self) -> DocId {
        self.doc_id_limit
    }

    pub fn generation(&self) -> Generation {
        self.guard.generation()
    }

    pub fn get(&self, lid: DocId) -> Option<FieldValue> {
        if lid >= self.doc_id_limit {
            return None;
        }
        self.attribute.get_value(lid)
    }

    pub fn get_int(&self, lid: DocId) -> Option<i64> {
        self.get(lid).and_then(|v| v.as_i64())
    }

    pub fn get_float(&self, lid: DocId) -> Option<f64> {
        self.get(lid).and_then(|v| v.as_f64())
    }

    pub fn get_string(&self, lid: DocId) -> Option<String> {
        match self.get(lid)? {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Tensor at `lid`, or the empty tensor of the column type when unset.
    pub fn get_tensor(&self, lid: DocId) -> Option<Tensor> {
        match self.get(lid) {
            Some(FieldValue::Tensor(tensor)) => Some(tensor),
            Some(_) => None,
            None => self.empty_tensor(),
        }
    }

    pub fn empty_tensor(&self) -> Option<Tensor> {
        self.attribute
            .tensor_type()
            .map(|tensor_type| Tensor::empty(tensor_type.clone()))
    }
}

impl std::fmt::Debug for AttributeReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeReadGuard")
            .field("attribute", &self.attribute.name())
            .field("generation", &self.guard.generation())
            .field("doc_id_limit", &self.doc_id_limit)
            .finish()
    }
}
