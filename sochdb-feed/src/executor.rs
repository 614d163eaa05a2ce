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

//! Sequenced shard executors
//!
//! Every attribute is pinned to one shard. Tasks sent to the same shard run
//! strictly in submission order; tasks on different shards may run in
//! parallel.
//!
//! ```text
//! writer ──┬──> [shard 0 queue] ──> worker "attr-shard-0"
//!          ├──> [shard 1 queue] ──> worker "attr-shard-1"
//!          └──> [shard N queue] ──> worker "attr-shard-N"
//! ```

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use sochdb_attribute::{AttributeError, Result};

/// Unit of work for one shard
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait SequencedExecutor: Send + Sync {
    fn num_shards(&self) -> usize;

    /// Queue `task` on `shard` (taken modulo the shard count).
    fn execute(&self, shard: usize, task: Task) -> Result<()>;

    /// Block until every task queued before the call has run.
    fn sync(&self);

    /// Drain queued tasks and stop accepting new ones.
    fn shutdown(&self);
}

// ============================================================================
// Foreground
// ============================================================================

/// Runs every task inline on the calling thread.
///
/// Ordering is trivially sequential, which makes it the executor of choice
/// for deterministic tests whatever the shard count.
#[derive(Debug)]
pub struct ForegroundExecutor {
    num_shards: usize,
    stopped: AtomicBool,
}

impl ForegroundExecutor {
    pub fn new(num_shards: usize) -> Self {
        Self {
            num_shards: num_shards.max(1),
            stopped: AtomicBool::new(false),
        }
    }
}

impl SequencedExecutor for ForegroundExecutor {
    fn num_shards(&self) -> usize {
        self.num_shards
    }

    fn execute(&self, _shard: usize, task: Task) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(AttributeError::ExecutorStopped);
        }
        task();
        Ok(())
    }

    fn sync(&self) {}

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

// ============================================================================
// Sharded
// ============================================================================

enum ShardMessage {
    Run(Task),
    Sync(Sender<()>),
}

/// One worker thread per shard, each draining its own queue.
pub struct ShardedExecutor {
    num_shards: usize,
    senders: RwLock<Vec<Sender<ShardMessage>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ShardedExecutor {
    /// Spawn `num_shards` workers with queues of `queue_capacity` tasks.
    /// A full queue blocks the producer.
    pub fn new(num_shards: usize, queue_capacity: usize) -> Result<Self> {
        let num_shards = num_shards.max(1);
        let mut senders = Vec::with_capacity(num_shards);
        let mut handles = Vec::with_capacity(num_shards);
        for shard in 0..num_shards {
            let (tx, rx) = bounded(queue_capacity.max(1));
            let handle = thread::Builder::new()
                .name(format!("attr-shard-{}", shard))
                .spawn(move || run_shard(shard, rx))
                .map_err(|e| {
                    AttributeError::AllocationFailure(format!("cannot spawn shard worker {}: {}", shard, e))
                })?;
            senders.push(tx);
            handles.push(handle);
        }
        tracing::debug!(num_shards, queue_capacity, "started shard executor");
        Ok(Self {
            num_shards,
            senders: RwLock::new(senders),
            handles: Mutex::new(handles),
        })
    }
}

fn run_shard(shard: usize, inbox: Receiver<ShardMessage>) {
    for message in inbox.iter() {
        match message {
            ShardMessage::Run(task) => {
                if std::panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    tracing::error!(shard, "attribute write task panicked");
                }
            }
            ShardMessage::Sync(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!(shard, "shard worker stopped");
}

impl SequencedExecutor for ShardedExecutor {
    fn num_shards(&self) -> usize {
        self.num_shards
    }

    fn execute(&self, shard: usize, task: Task) -> Result<()> {
        let senders = self.senders.read();
        let sender = senders
            .get(shard % self.num_shards)
            .ok_or(AttributeError::ExecutorStopped)?;
        sender
            .send(ShardMessage::Run(task))
            .map_err(|_| AttributeError::ExecutorStopped)
    }

    fn sync(&self) {
        let senders = self.senders.read().clone();
        let (ack_tx, ack_rx) = bounded(senders.len().max(1));
        let mut pending = 0;
        for sender in &senders {
            if sender.send(ShardMessage::Sync(ack_tx.clone())).is_ok() {
                pending += 1;
            }
        }
        drop(ack_tx);
        for _ in 0..pending {
            if ack_rx.recv().is_err() {
                break;
            }
        }
    }

    fn shutdown(&self) {
        // Dropping the senders lets each worker drain its queue and exit
        self.senders.write().clear();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            let _ = handle.join();
        }
        tracing::debug!(num_shards = self.num_shards, "shard executor shut down");
    }
}

impl Drop for ShardedExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ShardedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedExecutor")
            .field("num_shards", &self.num_shards)
            .field("running", &!self.senders.read().is_empty())
            .finish()
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Wraps an executor and records the shard of every executed task.
pub struct ExecutorObserver<E> {
    inner: E,
    history: Mutex<Vec<usize>>,
}

impl<E: SequencedExecutor> ExecutorObserver<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Shards in the order tasks were handed to them
    pub fn execute_history(&self) -> Vec<usize> {
        self.history.lock().clone()
    }

    pub fn execute_count(&self) -> usize {
        self.history.lock().len()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl<E: SequencedExecutor> SequencedExecutor for ExecutorObserver<E> {
    fn num_shards(&self) -> usize {
        self.inner.num_shards()
    }

    fn execute(&self, shard: usize, task: Task) -> Result<()> {
        self.history.lock().push(shard % self.inner.num_shards());
        self.inner.execute(shard, task)
    }

    fn sync(&self) {
        self.inner.sync();
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_foreground_runs_inline() {
        let executor = ForegroundExecutor::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        executor
            .execute(3, Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        executor.shutdown();
        assert_eq!(
            executor.execute(0, Box::new(|| {})).unwrap_err(),
            AttributeError::ExecutorStopped
        );
    }

    #[test]
    fn test_sharded_preserves_order_per_shard() {
        let executor = ShardedExecutor::new(3, 64).unwrap();
        let seen: Arc<Vec<Mutex<Vec<usize>>>> = Arc::new((0..3).map(|_| Mutex::new(Vec::new())).collect());
        for i in 0..300 {
            let seen = Arc::clone(&seen);
            let shard = i % 3;
            executor
                .execute(shard, Box::new(move || seen[shard].lock().push(i)))
                .unwrap();
        }
        executor.sync();
        for (shard, values) in seen.iter().enumerate() {
            let values = values.lock();
            assert_eq!(values.len(), 100);
            assert!(values.windows(2).all(|w| w[0] < w[1]));
            assert!(values.iter().all(|v| v % 3 == shard));
        }
    }

    #[test]
    fn test_sharded_survives_panicking_task() {
        let executor = ShardedExecutor::new(1, 8).unwrap();
        executor.execute(0, Box::new(|| panic!("boom"))).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        executor
            .execute(0, Box::new(move || r.store(true, Ordering::SeqCst)))
            .unwrap();
        executor.sync();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shutdown_drains_and_rejects() {
        let executor = ShardedExecutor::new(2, 16).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for shard in 0..10 {
            let c = Arc::clone(&counter);
            executor
                .execute(shard, Box::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        executor.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(executor.execute(0, Box::new(|| {})).is_err());
        executor.shutdown();
    }

    #[test]
    fn test_observer_records_shards() {
        let observer = ExecutorObserver::new(ForegroundExecutor::new(2));
        observer.execute(0, Box::new(|| {})).unwrap();
        observer.execute(3, Box::new(|| {})).unwrap();
        assert_eq!(observer.execute_history(), vec![0, 1]);
        observer.clear_history();
        assert_eq!(observer.execute_count(), 0);
    }
}
