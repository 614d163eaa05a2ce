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

//! Error types for attribute columns and the write pipeline

use thiserror::Error;

use crate::{DocId, SerialNum};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributeError {
    #[error(
        "Stale operation on attribute '{attribute}': serial {serial} is below last sync token {last_sync_token}"
    )]
    StaleOperation {
        attribute: String,
        serial: SerialNum,
        last_sync_token: SerialNum,
    },

    #[error("Type mismatch on attribute '{attribute}': {message}")]
    TypeMismatch { attribute: String, message: String },

    #[error("Local document id {lid} is out of range (limit {limit})")]
    OutOfRange { lid: DocId, limit: DocId },

    #[error("Attribute write task panicked: {0}")]
    TaskPanicked(String),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Attribute already exists: {0}")]
    DuplicateAttribute(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid tensor type: {0}")]
    InvalidTensorType(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Executor is stopped")]
    ExecutorStopped,
}

impl AttributeError {
    pub fn type_mismatch(attribute: &str, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    /// True for serial-number regressions, which callers must never retry.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleOperation { .. })
    }
}

impl From<std::io::Error> for AttributeError {
    fn from(e: std::io::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AttributeError>;
