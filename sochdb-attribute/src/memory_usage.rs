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

//! Byte accounting shared by vectors and stores

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub allocated_bytes: usize,
    pub used_bytes: usize,
    pub dead_bytes: usize,
    pub allocated_bytes_on_hold: usize,
}

impl MemoryUsage {
    pub fn new(allocated: usize, used: usize, dead: usize, on_hold: usize) -> Self {
        Self {
            allocated_bytes: allocated,
            used_bytes: used,
            dead_bytes: dead,
            allocated_bytes_on_hold: on_hold,
        }
    }

    pub fn merge(&mut self, other: &MemoryUsage) {
        self.allocated_bytes += other.allocated_bytes;
        self.used_bytes += other.used_bytes;
        self.dead_bytes += other.dead_bytes;
        self.allocated_bytes_on_hold += other.allocated_bytes_on_hold;
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "allocated": self.allocated_bytes,
            "used": self.used_bytes,
            "dead": self.dead_bytes,
            "onHold": self.allocated_bytes_on_hold,
        })
    }
}

impl Add for MemoryUsage {
    type Output = MemoryUsage;

    fn add(mut self, rhs: MemoryUsage) -> MemoryUsage {
        self.merge(&rhs);
        self
    }
}

impl AddAssign for MemoryUsage {
    fn add_assign(&mut self, rhs: MemoryUsage) {
        self.merge(&rhs);
    }
}
