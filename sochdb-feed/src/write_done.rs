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

//! Completion tracking for fanned-out writes
//!
//! Every task scheduled for an operation holds a clone of the operation's
//! [`WriteDoneContext`]. The callback fires once, when the last clone is
//! dropped, with the first error any task recorded.

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;

use sochdb_attribute::{AttributeError, Result};

pub type DoneCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

struct DoneState {
    callback: Mutex<Option<DoneCallback>>,
    first_error: Mutex<Option<AttributeError>>,
}

impl Drop for DoneState {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.get_mut().take() {
            let result = match self.first_error.get_mut().take() {
                Some(error) => Err(error),
                None => Ok(()),
            };
            callback(result);
        }
    }
}

#[derive(Clone)]
pub struct WriteDoneContext {
    state: Arc<DoneState>,
}

impl WriteDoneContext {
    pub fn new(callback: Option<DoneCallback>) -> Self {
        Self {
            state: Arc::new(DoneState {
                callback: Mutex::new(callback),
                first_error: Mutex::new(None),
            }),
        }
    }

    /// Keep `error` unless an earlier one was recorded.
    pub fn record_error(&self, error: AttributeError) {
        let mut slot = self.state.first_error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    pub fn has_error(&self) -> bool {
        self.state.first_error.lock().is_some()
    }
}

impl std::fmt::Debug for WriteDoneContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteDoneContext")
            .field("pending", &Arc::strong_count(&self.state))
            .field("has_error", &self.has_error())
            .finish()
    }
}

/// Callback that forwards the outcome to a channel, for callers that want
/// to block on completion.
pub fn channel_callback() -> (DoneCallback, Receiver<Result<()>>) {
    let (tx, rx) = bounded(1);
    let callback: DoneCallback = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (callback, rx)
}
