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

//! SochDB Feed
//!
//! Write pipeline for attribute columns: document decomposition, parallel
//! value preparation and sequenced per-shard application.
//!
//! # Example
//!
//! ```rust,ignore
//! use sochdb_feed::{AttributeWriter, WriterConfig};
//!
//! let executor = WriterConfig::threaded(4).build_executor()?;
//! let writer = AttributeWriter::new(manager, executor);
//! writer.put(1, &document, 1, false, None)?;
//! writer.force_commit(1, None)?;
//! ```

pub mod config;
pub mod decompose;
pub mod executor;
pub mod write_done;
pub mod writer;

pub use config::WriterConfig;
pub use decompose::{is_nested_path, DocumentDecomposer, FieldPathDecomposer};
pub use executor::{ExecutorObserver, ForegroundExecutor, SequencedExecutor, ShardedExecutor, Task};
pub use write_done::{channel_callback, DoneCallback, WriteDoneContext};
pub use writer::AttributeWriter;
