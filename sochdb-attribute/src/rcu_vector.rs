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

//! Generation-safe growable vector
//!
//! Readers index the currently published array without locking. The single
//! writer appends and overwrites in place; when capacity runs out it copies
//! into a larger array, publishes that array and parks the old one on a hold
//! list until no reader generation can still reach it.
//!
//! Values are stored as `AtomicU64` bit patterns. A store uses `Release`
//! and a load uses `Acquire`, so a reader that observes a new value also
//! observes everything the writer initialized before publishing it.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::GrowStrategy;
use crate::entry_ref::EntryRef;
use crate::generation::{Generation, GenerationHoldList};
use crate::memory_usage::MemoryUsage;

const CELL_BYTES: usize = std::mem::size_of::<AtomicU64>();

/// Values that fit a single atomic cell
pub trait RcuValue: Copy + Send + Sync + 'static {
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl RcuValue for i32 {
    #[inline]
    fn to_bits(self) -> u64 {
        self as u32 as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits as u32 as i32
    }
}

impl RcuValue for i64 {
    #[inline]
    fn to_bits(self) -> u64 {
        self as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
}

impl RcuValue for f32 {
    #[inline]
    fn to_bits(self) -> u64 {
        f32::to_bits(self) as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl RcuValue for f64 {
    #[inline]
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

impl RcuValue for EntryRef {
    #[inline]
    fn to_bits(self) -> u64 {
        self.raw() as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        EntryRef::from_raw(bits as u32)
    }
}

struct RcuArray<T> {
    cells: Box<[AtomicU64]>,
    _marker: PhantomData<T>,
}

impl<T: RcuValue> RcuArray<T> {
    fn filled(capacity: usize, fill: T) -> Self {
        let bits = fill.to_bits();
        Self {
            cells: (0..capacity).map(|_| AtomicU64::new(bits)).collect(),
            _marker: PhantomData,
        }
    }

    /// Copy the first `len` cells of `source` into a new array.
    fn copy_of(source: &RcuArray<T>, len: usize, capacity: usize, fill: T) -> Self {
        let array = Self::filled(capacity, fill);
        for (dst, src) in array.cells.iter().zip(source.cells.iter()).take(len) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        array
    }

    #[inline]
    fn load(&self, index: usize) -> Option<T> {
        self.cells
            .get(index)
            .map(|cell| T::from_bits(cell.load(Ordering::Acquire)))
    }

    #[inline]
    fn store(&self, index: usize, value: T) -> Option<T> {
        self.cells
            .get(index)
            .map(|cell| T::from_bits(cell.swap(value.to_bits(), Ordering::AcqRel)))
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn bytes(&self) -> usize {
        self.capacity() * CELL_BYTES
    }
}

struct RcuWriter<T> {
    grow: GrowStrategy,
    hold_list: GenerationHoldList<Arc<RcuArray<T>>>,
}

/// Lid-indexed vector with lock-free reads and a single writer
pub struct RcuVector<T: RcuValue> {
    array: ArcSwap<RcuArray<T>>,
    len: AtomicUsize,
    fill: T,
    writer: Mutex<RcuWriter<T>>,
}

impl<T: RcuValue> RcuVector<T> {
    /// `fill` is returned for slots that were never written.
    pub fn new(grow: GrowStrategy, fill: T) -> Self {
        Self {
            array: ArcSwap::from_pointee(RcuArray::filled(grow.docs_initial_capacity, fill)),
            len: AtomicUsize::new(0),
            fill,
            writer: Mutex::new(RcuWriter {
                grow,
                hold_list: GenerationHoldList::new(),
            }),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.array.load().capacity()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Read one slot. Callers bound `index` by a published lid limit; an
    /// index past the current allocation reads as the fill value.
    #[inline]
    pub fn get(&self, index: usize) -> T {
        debug_assert!(index < self.len(), "index {} out of range", index);
        self.array.load().load(index).unwrap_or(self.fill)
    }

    /// Pin the current array for repeated reads.
    pub fn snapshot(&self) -> RcuSnapshot<T> {
        let len = self.len();
        RcuSnapshot {
            array: self.array.load_full(),
            len,
            fill: self.fill,
        }
    }

    /// Append; returns true when the backing array was reallocated.
    pub fn push_back(&self, value: T, generation: Generation) -> bool {
        let mut writer = self.writer.lock();
        let len = self.len.load(Ordering::Relaxed);
        let mut reallocated = false;
        if len == self.capacity() {
            let capacity = writer.grow.next_capacity(len, len + 1);
            self.reallocate(&mut writer, len, capacity, generation);
            reallocated = true;
        }
        self.array.load().store(len, value);
        self.len.store(len + 1, Ordering::Release);
        reallocated
    }

    /// Overwrite a slot, returning the previous value, or `None` when
    /// `index` is past the end.
    pub fn set(&self, index: usize, value: T) -> Option<T> {
        let _writer = self.writer.lock();
        if index >= self.len.load(Ordering::Relaxed) {
            return None;
        }
        self.array.load().store(index, value)
    }

    /// Drop trailing slots; reallocates when the array became much larger
    /// than needed. Returns true on reallocation.
    pub fn shrink(&self, new_len: usize, generation: Generation) -> bool {
        let mut writer = self.writer.lock();
        let len = self.len.load(Ordering::Relaxed);
        if new_len >= len {
            return false;
        }
        let array = self.array.load_full();
        for index in new_len..len {
            array.store(index, self.fill);
        }
        self.len.store(new_len, Ordering::Release);
        let wanted = writer.grow.next_capacity(0, new_len);
        if array.capacity() > wanted {
            self.reallocate(&mut writer, new_len, wanted, generation);
            return true;
        }
        false
    }

    fn reallocate(&self, writer: &mut RcuWriter<T>, len: usize, capacity: usize, generation: Generation) {
        let old = self.array.load_full();
        let bytes = old.bytes();
        self.array
            .store(Arc::new(RcuArray::copy_of(&old, len, capacity, self.fill)));
        writer.hold_list.hold(generation, old, bytes);
    }

    /// Free arrays retired before `first_used`.
    pub fn reclaim(&self, first_used: Generation) -> usize {
        self.writer.lock().hold_list.reclaim(first_used, |_, _| {})
    }

    pub fn held_arrays(&self) -> usize {
        self.writer.lock().hold_list.len()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let held = self.writer.lock().hold_list.held_bytes();
        let array = self.array.load();
        MemoryUsage::new(array.bytes() + held, self.len() * CELL_BYTES, 0, held)
    }
}

impl<T: RcuValue + std::fmt::Debug> std::fmt::Debug for RcuVector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuVector")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// A pinned array plus the length that was published with it
pub struct RcuSnapshot<T: RcuValue> {
    array: Arc<RcuArray<T>>,
    len: usize,
    fill: T,
}

impl<T: RcuValue> RcuSnapshot<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        Some(self.array.load(index).unwrap_or(self.fill))
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |index| self.array.load(index).unwrap_or(self.fill))
    }
}
