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

//! Packed payload handles
//!
//! An [`EntryRef`] packs a buffer id and an offset into 32 bits so it can be
//! published atomically in the lid-indexed vector.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ buffer (10)  │ offset in 8-byte units (22)  │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! Buffer 0 is never allocated, so the all-zero value is the invalid ref.

use std::fmt;

pub const OFFSET_BITS: u32 = 22;
pub const BUFFER_BITS: u32 = 32 - OFFSET_BITS;
/// Entries are placed on 8-byte boundaries
pub const ALIGNMENT: usize = 8;
/// Largest addressable buffer in bytes
pub const MAX_BUFFER_BYTES: usize = (1usize << OFFSET_BITS) * ALIGNMENT;
/// Buffer ids 1..=MAX_BUFFERS are usable
pub const MAX_BUFFERS: u32 = (1u32 << BUFFER_BITS) - 1;

const OFFSET_MASK: u32 = (1u32 << OFFSET_BITS) - 1;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntryRef(u32);

impl EntryRef {
    /// `offset` is in bytes and must be aligned.
    pub fn new(buffer_id: u32, offset: usize) -> Self {
        debug_assert!(buffer_id != 0 && buffer_id <= MAX_BUFFERS);
        debug_assert!(offset % ALIGNMENT == 0 && offset < MAX_BUFFER_BYTES);
        Self((buffer_id << OFFSET_BITS) | ((offset / ALIGNMENT) as u32 & OFFSET_MASK))
    }

    #[inline]
    pub const fn invalid() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub const fn buffer_id(self) -> u32 {
        self.0 >> OFFSET_BITS
    }

    /// Byte offset inside the buffer
    #[inline]
    pub const fn offset(self) -> usize {
        (self.0 & OFFSET_MASK) as usize * ALIGNMENT
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntryRef({}:{})", self.buffer_id(), self.offset())
        } else {
            write!(f, "EntryRef(invalid)")
        }
    }
}
