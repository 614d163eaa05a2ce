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

//! Payload store for variable-length values
//!
//! Payloads live in bump-allocated buffers addressed by [`EntryRef`]. A
//! buffer id indexes a directory of atomically published slots, so readers
//! resolve a ref without locking. All mutation goes through the writer
//! mutex.
//!
//! ## Entry lifecycle
//!
//! - **insert**: copy bytes behind an 8-byte header, return the ref
//! - **hold**: the ref was replaced; bytes stay readable until its
//!   generation is no longer in use
//! - **trim**: held entries older than the first used generation become
//!   dead bytes
//! - **compact**: live entries of the most fragmented buffer are copied to
//!   fresh storage and the whole buffer is held, then freed
//!
//! ## Entry layout
//!
//! ```text
//! ┌────────────┬─────────┬───────────────────────┬─────────┐
//! │ len: u32LE │ pad (4) │ bytes[len]            │ pad → 8 │
//! └────────────┴─────────┴───────────────────────┴─────────┘
//! ```

use arc_swap::ArcSwapOption;
use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use serde::Serialize;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::DataStoreConfig;
use crate::entry_ref::{EntryRef, ALIGNMENT, MAX_BUFFER_BYTES};
use crate::error::{AttributeError, Result};
use crate::generation::{Generation, GenerationHoldList};
use crate::memory_usage::MemoryUsage;

const ENTRY_HEADER: usize = 8;

#[inline]
fn entry_size(len: usize) -> usize {
    (ENTRY_HEADER + len + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

// ============================================================================
// Buffer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum BufferState {
    /// Receiving inserts
    Active = 0,
    /// Full, entries still live
    Filled = 1,
    /// Live entries are being moved out
    Compacting = 2,
    /// Compacted, waiting for readers to leave
    Hold = 3,
}

impl BufferState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => BufferState::Active,
            1 => BufferState::Filled,
            2 => BufferState::Compacting,
            _ => BufferState::Hold,
        }
    }
}

struct Buffer {
    id: u32,
    data: NonNull<u8>,
    layout: Layout,
    used: AtomicUsize,
    dead: AtomicUsize,
    hold: AtomicUsize,
    state: AtomicU8,
}

impl Buffer {
    fn allocate(id: u32, capacity: usize) -> Result<Self> {
        let layout = Layout::from_size_align(capacity, ALIGNMENT)
            .map_err(|e| AttributeError::AllocationFailure(e.to_string()))?;
        // Zeroed so that no byte inside the buffer is ever uninitialized
        let ptr = unsafe { alloc_zeroed(layout) };
        let data = NonNull::new(ptr).ok_or_else(|| {
            AttributeError::AllocationFailure(format!("buffer of {} bytes", capacity))
        })?;
        Ok(Self {
            id,
            data,
            layout,
            used: AtomicUsize::new(0),
            dead: AtomicUsize::new(0),
            hold: AtomicUsize::new(0),
            state: AtomicU8::new(BufferState::Active as u8),
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.layout.size()
    }

    fn state(&self) -> BufferState {
        BufferState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: BufferState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Write one entry at `offset`.
    ///
    /// # Safety
    /// `offset` must be at or past `used` and the entry must fit; only the
    /// writer (holding the store mutex) may call this.
    unsafe fn write_entry(&self, offset: usize, bytes: &[u8]) {
        let mut header = [0u8; 4];
        LittleEndian::write_u32(&mut header, bytes.len() as u32);
        let dst = self.data.as_ptr().add(offset);
        std::ptr::copy_nonoverlapping(header.as_ptr(), dst, header.len());
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.add(ENTRY_HEADER), bytes.len());
    }

    /// Byte range of the entry at `offset`, bounds-checked against capacity.
    fn entry_range(&self, offset: usize) -> Option<(usize, usize)> {
        if offset + ENTRY_HEADER > self.capacity() {
            return None;
        }
        // Safety: header lies inside the allocation
        let header = unsafe { std::slice::from_raw_parts(self.data.as_ptr().add(offset), 4) };
        let len = LittleEndian::read_u32(header) as usize;
        let start = offset + ENTRY_HEADER;
        if start + len > self.capacity() {
            return None;
        }
        Some((start, len))
    }

    #[inline]
    fn slice(&self, start: usize, len: usize) -> &[u8] {
        // Safety: ranges come from entry_range, which checks capacity; bytes
        // below `used` are never written again
        unsafe { std::slice::from_raw_parts(self.data.as_ptr().add(start), len) }
    }

    fn stats(&self) -> BufferStats {
        BufferStats {
            id: self.id,
            state: self.state(),
            capacity: self.capacity(),
            used: self.used.load(Ordering::Acquire),
            dead: self.dead.load(Ordering::Acquire),
            hold: self.hold.load(Ordering::Acquire),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.data.as_ptr(), self.layout) };
    }
}

// Safety: the allocation is owned by the buffer; bytes are only written
// past `used` under the store mutex and published with a release store of
// the ref, so shared readers never race with writes to what they read.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

/// Per-buffer counters, for introspection and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub id: u32,
    pub state: BufferState,
    pub capacity: usize,
    pub used: usize,
    pub dead: usize,
    pub hold: usize,
}

// ============================================================================
// Payload
// ============================================================================

/// Borrowed view of a stored payload; keeps its buffer alive
pub struct Payload {
    buffer: Arc<Buffer>,
    start: usize,
    len: usize,
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.slice(self.start, self.len)
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("buffer", &self.buffer.id)
            .field("len", &self.len)
            .finish()
    }
}

// ============================================================================
// Data Store
// ============================================================================

/// Ongoing move of one buffer's live entries
#[derive(Debug)]
pub struct CompactionContext {
    buffer_id: u32,
    moved: usize,
}

impl CompactionContext {
    pub fn buffer_id(&self) -> u32 {
        self.buffer_id
    }

    pub fn moved(&self) -> usize {
        self.moved
    }

    #[inline]
    pub fn is_moving(&self, entry: EntryRef) -> bool {
        entry.is_valid() && entry.buffer_id() == self.buffer_id
    }
}

struct StoreWriter {
    active: Option<Arc<Buffer>>,
    free_ids: Vec<u32>,
    next_id: u32,
    entry_holds: GenerationHoldList<EntryRef>,
    buffer_holds: GenerationHoldList<Arc<Buffer>>,
    compacting: Option<u32>,
}

pub struct DataStore {
    config: DataStoreConfig,
    /// Indexed by buffer id; slot 0 stays empty
    buffers: Box<[ArcSwapOption<Buffer>]>,
    writer: Mutex<StoreWriter>,
}

impl DataStore {
    pub fn new(config: DataStoreConfig) -> Self {
        let slots = config.max_buffers as usize + 1;
        Self {
            config,
            buffers: (0..slots).map(|_| ArcSwapOption::empty()).collect(),
            writer: Mutex::new(StoreWriter {
                active: None,
                free_ids: Vec::new(),
                next_id: 1,
                entry_holds: GenerationHoldList::new(),
                buffer_holds: GenerationHoldList::new(),
                compacting: None,
            }),
        }
    }

    pub fn config(&self) -> &DataStoreConfig {
        &self.config
    }

    /// Copy `bytes` into the store.
    pub fn insert(&self, bytes: &[u8]) -> Result<EntryRef> {
        let need = entry_size(bytes.len());
        if bytes.len() > u32::MAX as usize || need > MAX_BUFFER_BYTES {
            return Err(AttributeError::AllocationFailure(format!(
                "payload of {} bytes exceeds the {} byte buffer limit",
                bytes.len(),
                MAX_BUFFER_BYTES
            )));
        }
        let mut writer = self.writer.lock();
        let buffer = self.buffer_with_room(&mut writer, need)?;
        let offset = buffer.used.load(Ordering::Relaxed);
        // Safety: buffer_with_room guarantees `need` free bytes at `offset`
        unsafe { buffer.write_entry(offset, bytes) };
        buffer.used.store(offset + need, Ordering::Release);
        Ok(EntryRef::new(buffer.id, offset))
    }

    fn buffer_with_room(&self, writer: &mut StoreWriter, need: usize) -> Result<Arc<Buffer>> {
        if let Some(active) = &writer.active {
            if active.capacity() - active.used.load(Ordering::Relaxed) >= need {
                return Ok(Arc::clone(active));
            }
            active.set_state(BufferState::Filled);
        }
        writer.active = None;

        let id = match writer.free_ids.pop() {
            Some(id) => id,
            None if writer.next_id <= self.config.max_buffers => {
                writer.next_id += 1;
                writer.next_id - 1
            }
            None => {
                return Err(AttributeError::AllocationFailure(format!(
                    "payload store exhausted all {} buffers",
                    self.config.max_buffers
                )))
            }
        };
        let capacity = self
            .config
            .buffer_size
            .max(need)
            .min(MAX_BUFFER_BYTES)
            .next_multiple_of(ALIGNMENT);
        let buffer = match Buffer::allocate(id, capacity) {
            Ok(buffer) => Arc::new(buffer),
            Err(e) => {
                writer.free_ids.push(id);
                return Err(e);
            }
        };
        self.buffers[id as usize].store(Some(Arc::clone(&buffer)));
        writer.active = Some(Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Resolve a ref. Readers must pin a generation first.
    pub fn get(&self, entry: EntryRef) -> Option<Payload> {
        if !entry.is_valid() {
            return None;
        }
        let buffer = self.buffers.get(entry.buffer_id() as usize)?.load_full()?;
        let (start, len) = buffer.entry_range(entry.offset())?;
        Some(Payload { buffer, start, len })
    }

    /// The ref was replaced at `generation`; keep its bytes until trimmed.
    pub fn hold(&self, entry: EntryRef, generation: Generation) {
        if !entry.is_valid() {
            return;
        }
        let mut writer = self.writer.lock();
        let Some(buffer) = self.buffers[entry.buffer_id() as usize].load_full() else {
            return;
        };
        let Some((_, len)) = buffer.entry_range(entry.offset()) else {
            return;
        };
        let size = entry_size(len);
        buffer.hold.fetch_add(size, Ordering::AcqRel);
        writer.entry_holds.hold(generation, entry, size);
    }

    /// Turn held entries into dead bytes and free compacted buffers whose
    /// generation is no longer in use.
    pub fn trim_hold_lists(&self, first_used: Generation) {
        let mut writer = self.writer.lock();
        let buffers = &self.buffers;
        // Entries first: an entry is never held later than its buffer
        writer.entry_holds.reclaim(first_used, |entry, size| {
            if let Some(buffer) = buffers[entry.buffer_id() as usize].load_full() {
                buffer.hold.fetch_sub(size, Ordering::AcqRel);
                buffer.dead.fetch_add(size, Ordering::AcqRel);
            }
        });
        let mut freed = Vec::new();
        writer
            .buffer_holds
            .reclaim(first_used, |buffer, _| freed.push(buffer.id));
        for id in freed {
            self.buffers[id as usize].store(None);
            writer.free_ids.push(id);
            tracing::debug!(buffer = id, first_used, "freed compacted payload buffer");
        }
    }

    /// Pick the buffer with the highest dead/used ratio and start moving
    /// its live entries out.
    pub fn start_compact_worst(&self) -> Option<CompactionContext> {
        let mut writer = self.writer.lock();
        if writer.compacting.is_some() {
            return None;
        }
        let worst = self
            .buffers
            .iter()
            .filter_map(|slot| slot.load_full())
            .filter(|b| matches!(b.state(), BufferState::Active | BufferState::Filled))
            .filter(|b| b.dead.load(Ordering::Acquire) > 0)
            .max_by(|a, b| {
                let ratio = |x: &Buffer| {
                    x.dead.load(Ordering::Acquire) as f64
                        / x.used.load(Ordering::Acquire).max(1) as f64
                };
                ratio(a)
                    .total_cmp(&ratio(b))
                    .then(a.dead.load(Ordering::Acquire).cmp(&b.dead.load(Ordering::Acquire)))
            })?;
        if writer
            .active
            .as_ref()
            .is_some_and(|active| active.id == worst.id)
        {
            writer.active = None;
        }
        worst.set_state(BufferState::Compacting);
        writer.compacting = Some(worst.id);
        Some(CompactionContext {
            buffer_id: worst.id,
            moved: 0,
        })
    }

    /// Copy `entry` out of the buffer being compacted; other refs pass
    /// through unchanged.
    pub fn move_entry(&self, context: &mut CompactionContext, entry: EntryRef) -> Result<EntryRef> {
        if !context.is_moving(entry) {
            return Ok(entry);
        }
        let payload = self.get(entry).ok_or_else(|| {
            AttributeError::InvalidArgument(format!("dangling payload ref {:?}", entry))
        })?;
        let moved = self.insert(&payload)?;
        context.moved += 1;
        Ok(moved)
    }

    /// All refs into the compacted buffer were rewritten; hold the buffer
    /// until `generation` is no longer in use.
    pub fn finish_compact(&self, context: CompactionContext, generation: Generation) {
        let mut writer = self.writer.lock();
        writer.compacting = None;
        if let Some(buffer) = self.buffers[context.buffer_id as usize].load_full() {
            buffer.set_state(BufferState::Hold);
            let bytes = buffer.capacity();
            writer.buffer_holds.hold(generation, buffer, bytes);
        }
        tracing::debug!(
            buffer = context.buffer_id,
            moved = context.moved,
            generation,
            "compacted payload buffer"
        );
    }

    /// Give up on a compaction; the buffer keeps serving reads.
    pub fn abort_compact(&self, context: CompactionContext) {
        let mut writer = self.writer.lock();
        writer.compacting = None;
        if let Some(buffer) = self.buffers[context.buffer_id as usize].load_full() {
            buffer.set_state(BufferState::Filled);
        }
        tracing::warn!(
            buffer = context.buffer_id,
            moved = context.moved,
            "aborted payload compaction"
        );
    }

    /// Drop all held entries and buffers regardless of readers.
    pub fn reclaim_all(&self) {
        self.trim_hold_lists(Generation::MAX);
    }

    pub fn buffer_stats(&self) -> Vec<BufferStats> {
        self.buffers
            .iter()
            .filter_map(|slot| slot.load_full())
            .map(|buffer| buffer.stats())
            .collect()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = MemoryUsage::default();
        for stats in self.buffer_stats() {
            usage.allocated_bytes += stats.capacity;
            usage.used_bytes += stats.used;
            usage.dead_bytes += stats.dead;
            usage.allocated_bytes_on_hold += stats.hold;
            if stats.state == BufferState::Hold {
                usage.allocated_bytes_on_hold += stats.used - stats.dead - stats.hold;
            }
        }
        usage
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("config", &self.config)
            .field("memory_usage", &self.memory_usage())
            .finish()
    }
}
