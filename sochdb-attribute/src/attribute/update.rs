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

//! Applying a `ValueUpdate` to a column's current value

use crate::config::CollectionType;
use crate::document::{FieldValue, ValueUpdate};
use crate::error::{AttributeError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UpdateOutcome {
    Unchanged,
    Clear,
    Set(FieldValue),
}

/// `empty` is the column's value for documents without one; appends and
/// tensor adds start from it.
pub(crate) fn apply_value_update(
    attribute: &str,
    collection: CollectionType,
    current: Option<FieldValue>,
    empty: Option<FieldValue>,
    update: &ValueUpdate,
) -> Result<UpdateOutcome> {
    let mismatch = |what: &str, value: &FieldValue| {
        AttributeError::type_mismatch(
            attribute,
            format!("{} is not applicable to {}", what, value.type_name()),
        )
    };

    Ok(match update {
        ValueUpdate::Assign(value) => UpdateOutcome::Set(value.clone()),
        ValueUpdate::Clear => UpdateOutcome::Clear,

        ValueUpdate::Arithmetic { op, operand } => match current {
            None => UpdateOutcome::Unchanged,
            Some(FieldValue::Int(v)) => UpdateOutcome::Set(FieldValue::Int(op.apply(v as f64, *operand) as i64)),
            Some(FieldValue::Float(v)) => UpdateOutcome::Set(FieldValue::Float(op.apply(v, *operand))),
            Some(other) => return Err(mismatch("arithmetic", &other)),
        },

        ValueUpdate::Append(element) => match (collection, current.or(empty)) {
            (CollectionType::Array, Some(FieldValue::Array(mut items))) => {
                items.push(element.clone());
                UpdateOutcome::Set(FieldValue::Array(items))
            }
            (CollectionType::WeightedSet, Some(FieldValue::WeightedSet(mut items))) => {
                if !items.iter().any(|(key, _)| key == element) {
                    items.push((element.clone(), 1));
                }
                UpdateOutcome::Set(FieldValue::WeightedSet(items))
            }
            (_, Some(other)) => return Err(mismatch("append", &other)),
            (_, None) => return Err(mismatch("append", element)),
        },

        ValueUpdate::Remove(element) => match current {
            None => UpdateOutcome::Unchanged,
            Some(FieldValue::Array(mut items)) => {
                items.retain(|item| item != element);
                UpdateOutcome::Set(FieldValue::Array(items))
            }
            Some(FieldValue::WeightedSet(mut items)) => {
                items.retain(|(key, _)| key != element);
                UpdateOutcome::Set(FieldValue::WeightedSet(items))
            }
            Some(other) => return Err(mismatch("remove", &other)),
        },

        ValueUpdate::TensorModify { op, cells } => match current {
            None => UpdateOutcome::Unchanged,
            Some(FieldValue::Tensor(tensor)) => UpdateOutcome::Set(FieldValue::Tensor(tensor.modify(*op, cells)?)),
            Some(other) => return Err(mismatch("tensor modify", &other)),
        },

        ValueUpdate::TensorAdd(cells) => match current.or(empty) {
            Some(FieldValue::Tensor(tensor)) => UpdateOutcome::Set(FieldValue::Tensor(tensor.add(cells)?)),
            Some(other) => return Err(mismatch("tensor add", &other)),
            None => return Err(mismatch("tensor add", &FieldValue::Tensor(cells.clone()))),
        },

        ValueUpdate::TensorRemove(addresses) => match current {
            None => UpdateOutcome::Unchanged,
            Some(FieldValue::Tensor(tensor)) => UpdateOutcome::Set(FieldValue::Tensor(tensor.remove(addresses)?)),
            Some(other) => return Err(mismatch("tensor remove", &other)),
        },
    })
}
