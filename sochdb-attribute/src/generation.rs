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

//! Generation tracking and hold lists
//!
//! Readers pin the current generation for the lifetime of a
//! [`GenerationGuard`]. The single writer advances the generation on every
//! commit and parks memory that readers may still reach on a
//! [`GenerationHoldList`], tagged with the generation that was current when
//! it became unreachable.
//!
//! ```text
//!   gen 4 (retired)   gen 5 (retired)   gen 6 (current)
//!   ┌────────────┐    ┌────────────┐    ┌────────────┐
//!   │ readers: 0 │    │ readers: 2 │    │ readers: 7 │
//!   └────────────┘    └────────────┘    └────────────┘
//!                        ↑
//!               first used generation = 5
//!
//!   hold list: (3, old array) (4, entry) (5, entry) (6, entry)
//!              └──── reclaimable ───┘
//! ```
//!
//! Held items tagged with generation G are released once
//! `first_used_generation > G`.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Generation = u64;

/// Reader count for one generation
#[derive(Debug)]
struct GenerationHold {
    generation: Generation,
    ref_count: AtomicU64,
}

impl GenerationHold {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            ref_count: AtomicU64::new(0),
        }
    }
}

/// Pins one generation while alive
#[derive(Debug)]
pub struct GenerationGuard {
    hold: Arc<GenerationHold>,
}

impl GenerationGuard {
    pub fn generation(&self) -> Generation {
        self.hold.generation
    }
}

impl Clone for GenerationGuard {
    fn clone(&self) -> Self {
        self.hold.ref_count.fetch_add(1, Ordering::SeqCst);
        Self {
            hold: Arc::clone(&self.hold),
        }
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.hold.ref_count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-column generation counter with reader tracking
#[derive(Debug)]
pub struct GenerationHandler {
    current: ArcSwap<GenerationHold>,
    /// Mirrors `current.generation`; readers validate against it
    generation: AtomicU64,
    first_used: AtomicU64,
    /// Retired generations, oldest first (writer only)
    retired: Mutex<VecDeque<Arc<GenerationHold>>>,
}

impl GenerationHandler {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(GenerationHold::new(0)),
            generation: AtomicU64::new(0),
            first_used: AtomicU64::new(0),
            retired: Mutex::new(VecDeque::new()),
        }
    }

    /// Pin the current generation.
    ///
    /// The reader bumps the count first and then re-checks that the hold is
    /// still current. Combined with the writer publishing the next
    /// generation before it inspects retired counts, a reader either shows
    /// up in the count or retries on the new generation.
    pub fn take_guard(&self) -> GenerationGuard {
        loop {
            let hold = self.current.load_full();
            hold.ref_count.fetch_add(1, Ordering::SeqCst);
            if self.generation.load(Ordering::SeqCst) == hold.generation {
                return GenerationGuard { hold };
            }
            hold.ref_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn current_generation(&self) -> Generation {
        self.generation.load(Ordering::Acquire)
    }

    /// Oldest generation a reader may still observe, as of the last update.
    pub fn first_used_generation(&self) -> Generation {
        self.first_used.load(Ordering::Acquire)
    }

    /// Writer only.
    pub fn inc_generation(&self) {
        let next = self.current_generation() + 1;
        let old = self.current.swap(Arc::new(GenerationHold::new(next)));
        self.generation.store(next, Ordering::SeqCst);
        self.retired.lock().push_back(old);
        self.update_first_used_generation();
    }

    /// Drop retired generations without readers and recompute the oldest
    /// generation in use.
    pub fn update_first_used_generation(&self) -> Generation {
        let mut retired = self.retired.lock();
        while let Some(front) = retired.front() {
            if front.ref_count.load(Ordering::SeqCst) != 0 {
                break;
            }
            retired.pop_front();
        }
        let first = retired
            .front()
            .map(|hold| hold.generation)
            .unwrap_or_else(|| self.current_generation());
        self.first_used.store(first, Ordering::Release);
        first
    }

    /// Readers currently pinning `generation`.
    pub fn generation_ref_count(&self, generation: Generation) -> u64 {
        let current = self.current.load();
        if current.generation == generation {
            return current.ref_count.load(Ordering::SeqCst);
        }
        self.retired
            .lock()
            .iter()
            .find(|hold| hold.generation == generation)
            .map(|hold| hold.ref_count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn has_readers(&self) -> bool {
        self.current.load().ref_count.load(Ordering::SeqCst) != 0
            || self
                .retired
                .lock()
                .iter()
                .any(|hold| hold.ref_count.load(Ordering::SeqCst) != 0)
    }
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Items parked until no reader can reach them
#[derive(Debug)]
pub struct GenerationHoldList<T> {
    held: VecDeque<HeldItem<T>>,
    held_bytes: usize,
}

#[derive(Debug)]
struct HeldItem<T> {
    generation: Generation,
    bytes: usize,
    item: T,
}

impl<T> GenerationHoldList<T> {
    pub fn new() -> Self {
        Self {
            held: VecDeque::new(),
            held_bytes: 0,
        }
    }

    /// Park `item`; generations must be pushed in non-decreasing order.
    pub fn hold(&mut self, generation: Generation, item: T, bytes: usize) {
        debug_assert!(self
            .held
            .back()
            .map_or(true, |last| last.generation <= generation));
        self.held_bytes += bytes;
        self.held.push_back(HeldItem {
            generation,
            bytes,
            item,
        });
    }

    /// Release every item tagged with a generation below `first_used`,
    /// oldest first.
    pub fn reclaim(&mut self, first_used: Generation, mut release: impl FnMut(T, usize)) -> usize {
        let mut count = 0;
        while let Some(front) = self.held.front() {
            if front.generation >= first_used {
                break;
            }
            if let Some(held) = self.held.pop_front() {
                self.held_bytes -= held.bytes;
                release(held.item, held.bytes);
                count += 1;
            }
        }
        count
    }

    pub fn reclaim_all(&mut self, release: impl FnMut(T, usize)) -> usize {
        self.reclaim(Generation::MAX, release)
    }

    pub fn held_bytes(&self) -> usize {
        self.held_bytes
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl<T> Default for GenerationHoldList<T> {
    fn default() -> Self {
        Self::new()
    }
}
