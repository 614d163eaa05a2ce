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

//! Write pipeline configuration

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::executor::{ForegroundExecutor, SequencedExecutor, ShardedExecutor};
use sochdb_attribute::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of sequenced write shards
    pub num_shards: usize,
    /// Run shards on worker threads instead of inline
    pub threaded: bool,
    /// Tasks queued per shard before producers block
    pub queue_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            num_shards: 1,
            threaded: false,
            queue_capacity: 1024,
        }
    }
}

impl WriterConfig {
    pub fn threaded(num_shards: usize) -> Self {
        Self {
            num_shards,
            threaded: true,
            ..Self::default()
        }
    }

    pub fn build_executor(&self) -> Result<Arc<dyn SequencedExecutor>> {
        if self.threaded {
            Ok(Arc::new(ShardedExecutor::new(self.num_shards, self.queue_capacity)?))
        } else {
            Ok(Arc::new(ForegroundExecutor::new(self.num_shards)))
        }
    }
}
