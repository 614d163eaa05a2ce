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

//! Per-column counters, refreshed at commit

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::memory_usage::MemoryUsage;
use crate::SerialNum;

#[derive(Debug, Default)]
pub struct Status {
    num_docs: AtomicU64,
    num_values: AtomicU64,
    allocated: AtomicU64,
    used: AtomicU64,
    dead: AtomicU64,
    on_hold: AtomicU64,
    on_hold_max: AtomicU64,
    last_sync_token: AtomicU64,
    update_count: AtomicU64,
    non_idempotent_update_count: AtomicU64,
}

impl Status {
    pub fn update_statistics(&self, num_docs: u64, num_values: u64, usage: &MemoryUsage) {
        self.num_docs.store(num_docs, Ordering::Relaxed);
        self.num_values.store(num_values, Ordering::Relaxed);
        self.allocated.store(usage.allocated_bytes as u64, Ordering::Relaxed);
        self.used.store(usage.used_bytes as u64, Ordering::Relaxed);
        self.dead.store(usage.dead_bytes as u64, Ordering::Relaxed);
        let on_hold = usage.allocated_bytes_on_hold as u64;
        self.on_hold.store(on_hold, Ordering::Relaxed);
        self.on_hold_max.fetch_max(on_hold, Ordering::Relaxed);
    }

    pub fn last_sync_token(&self) -> SerialNum {
        self.last_sync_token.load(Ordering::Acquire)
    }

    pub fn set_last_sync_token(&self, serial: SerialNum) {
        self.last_sync_token.store(serial, Ordering::Release);
    }

    pub fn inc_updates(&self, idempotent: bool) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        if !idempotent {
            self.non_idempotent_update_count
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            num_docs: self.num_docs.load(Ordering::Relaxed),
            num_values: self.num_values.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            used: self.used.load(Ordering::Relaxed),
            dead: self.dead.load(Ordering::Relaxed),
            on_hold: self.on_hold.load(Ordering::Relaxed),
            on_hold_max: self.on_hold_max.load(Ordering::Relaxed),
            last_sync_token: self.last_sync_token(),
            update_count: self.update_count.load(Ordering::Relaxed),
            non_idempotent_update_count: self.non_idempotent_update_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub num_docs: u64,
    pub num_values: u64,
    pub allocated: u64,
    pub used: u64,
    pub dead: u64,
    pub on_hold: u64,
    pub on_hold_max: u64,
    pub last_sync_token: SerialNum,
    pub update_count: u64,
    pub non_idempotent_update_count: u64,
}
