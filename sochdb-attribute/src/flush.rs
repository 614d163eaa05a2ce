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

//! Flush targets
//!
//! Persistence is owned by the caller. A flush target only tells the
//! caller what can be flushed and records the serial number each flush
//! covered, so replay can start after it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::attribute::AttributeVector;
use crate::error::Result;
use crate::SerialNum;

pub trait FlushTarget: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Serial number covered by the last completed flush
    fn flushed_serial_num(&self) -> SerialNum;

    /// Bytes expected to be released by flushing now
    fn approx_memory_gain(&self) -> usize;

    fn flush(&self, serial: SerialNum) -> Result<()>;
}

/// Records the attribute's committed state as flushed.
pub struct AttributeFlushTarget {
    name: String,
    attribute: Arc<dyn AttributeVector>,
    flushed_serial_num: Arc<AtomicU64>,
}

impl AttributeFlushTarget {
    pub fn new(attribute: Arc<dyn AttributeVector>, flushed_serial_num: Arc<AtomicU64>) -> Self {
        Self {
            name: format!("attribute.flush.{}", attribute.name()),
            attribute,
            flushed_serial_num,
        }
    }
}

impl FlushTarget for AttributeFlushTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn flushed_serial_num(&self) -> SerialNum {
        self.flushed_serial_num.load(Ordering::Acquire)
    }

    fn approx_memory_gain(&self) -> usize {
        0
    }

    fn flush(&self, serial: SerialNum) -> Result<()> {
        let previous = self.flushed_serial_num.fetch_max(serial, Ordering::AcqRel);
        if serial > previous {
            tracing::info!(
                attribute = %self.attribute.name(),
                serial,
                last_sync_token = self.attribute.last_sync_token(),
                "flushed attribute"
            );
        }
        Ok(())
    }
}

impl fmt::Debug for AttributeFlushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeFlushTarget")
            .field("name", &self.name)
            .field("flushed_serial_num", &self.flushed_serial_num())
            .finish()
    }
}

/// Gives back memory held by lids beyond a compacted lid space.
pub struct ShrinkLidSpaceFlushTarget {
    name: String,
    attribute: Arc<dyn AttributeVector>,
    flushed_serial_num: AtomicU64,
}

impl ShrinkLidSpaceFlushTarget {
    pub fn new(attribute: Arc<dyn AttributeVector>) -> Self {
        Self {
            name: format!("attribute.shrink.{}", attribute.name()),
            flushed_serial_num: AtomicU64::new(attribute.create_serial_num()),
            attribute,
        }
    }
}

impl FlushTarget for ShrinkLidSpaceFlushTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn flushed_serial_num(&self) -> SerialNum {
        self.flushed_serial_num.load(Ordering::Acquire)
    }

    fn approx_memory_gain(&self) -> usize {
        if !self.attribute.can_shrink_lid_space() {
            return 0;
        }
        let surplus = self.attribute.num_docs() - self.attribute.committed_doc_id_limit();
        surplus as usize * std::mem::size_of::<u64>()
    }

    fn flush(&self, serial: SerialNum) -> Result<()> {
        self.attribute.shrink_lid_space()?;
        self.flushed_serial_num.fetch_max(serial, Ordering::AcqRel);
        Ok(())
    }
}

impl fmt::Debug for ShrinkLidSpaceFlushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShrinkLidSpaceFlushTarget")
            .field("name", &self.name)
            .field("flushed_serial_num", &self.flushed_serial_num())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::create_attribute;
    use crate::config::{AttributeConfig, BasicType};

    #[test]
    fn test_flush_keeps_highest_serial() {
        let attribute = create_attribute("a", &AttributeConfig::new(BasicType::Int32), 0).unwrap();
        let target = AttributeFlushTarget::new(attribute, Arc::new(AtomicU64::new(0)));
        assert_eq!(target.name(), "attribute.flush.a");
        target.flush(10).unwrap();
        target.flush(7).unwrap();
        assert_eq!(target.flushed_serial_num(), 10);
    }

    #[test]
    fn test_shrink_target_shrinks() {
        let attribute = create_attribute("a", &AttributeConfig::new(BasicType::Int32), 0).unwrap();
        attribute.ensure_lid_space(9).unwrap();
        attribute.commit(1, 1).unwrap();
        attribute.compact_lid_space(4).unwrap();

        let target = ShrinkLidSpaceFlushTarget::new(Arc::clone(&attribute));
        assert_eq!(target.name(), "attribute.shrink.a");
        assert_eq!(target.approx_memory_gain(), 6 * 8);
        target.flush(2).unwrap();
        assert_eq!(attribute.num_docs(), 4);
        assert_eq!(target.approx_memory_gain(), 0);
        assert_eq!(target.flushed_serial_num(), 2);
    }
}
