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

//! Document → column value decomposition
//!
//! Column names are field paths. A plain name reads a top-level field; a
//! dotted name walks into complex fields:
//!
//! - struct: `s.f` reads field `f`
//! - array: `a.f` maps the rest of the path over every element
//! - map: `m.key` / `m.value` collect keys or values, in entry order
//!
//! So `array.value` over an array of structs yields the array of their
//! `value` fields, and `map.value.value` yields the `value` field of every
//! map value.

use sochdb_attribute::{Document, FieldValue};

pub trait DocumentDecomposer: Send + Sync {
    /// Value for the column `path`, or None when the document has none.
    fn extract(&self, document: &Document, path: &str) -> Option<FieldValue>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldPathDecomposer;

impl DocumentDecomposer for FieldPathDecomposer {
    fn extract(&self, document: &Document, path: &str) -> Option<FieldValue> {
        let mut segments = path.split('.');
        let root = document.field(segments.next()?)?;
        let rest: Vec<&str> = segments.collect();
        resolve(root, &rest)
    }
}

/// True for column names that address a nested path of a complex field.
pub fn is_nested_path(path: &str) -> bool {
    path.contains('.')
}

fn resolve(value: &FieldValue, path: &[&str]) -> Option<FieldValue> {
    let Some((segment, rest)) = path.split_first() else {
        return Some(value.clone());
    };
    match value {
        FieldValue::Struct(fields) => resolve(fields.get(*segment)?, rest),
        FieldValue::Array(items) => Some(FieldValue::Array(
            items
                .iter()
                .filter_map(|item| resolve(item, path))
                .flat_map(flatten_array)
                .collect(),
        )),
        FieldValue::Map(entries) => {
            let side: Vec<&FieldValue> = match *segment {
                "key" => entries.iter().map(|(k, _)| k).collect(),
                "value" => entries.iter().map(|(_, v)| v).collect(),
                _ => return None,
            };
            Some(FieldValue::Array(
                side.into_iter()
                    .filter_map(|v| resolve(v, rest))
                    .flat_map(flatten_array)
                    .collect(),
            ))
        }
        _ => None,
    }
}

/// Arrays nested by repeated mapping collapse into one level.
fn flatten_array(value: FieldValue) -> Vec<FieldValue> {
    match value {
        FieldValue::Array(items) => items,
        other => vec![other],
    }
}
