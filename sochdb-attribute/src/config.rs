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

//! Attribute and store configuration

use serde::{Deserialize, Serialize};

use crate::error::{AttributeError, Result};
use crate::tensor::TensorType;

/// Value type stored per element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasicType {
    Int32,
    Int64,
    Float,
    Double,
    String,
    Tensor,
}

impl BasicType {
    pub fn name(&self) -> &'static str {
        match self {
            BasicType::Int32 => "int32",
            BasicType::Int64 => "int64",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::String => "string",
            BasicType::Tensor => "tensor",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, BasicType::Int32 | BasicType::Int64)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, BasicType::Float | BasicType::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_floating_point()
    }
}

/// Number of values per document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    #[default]
    Single,
    Array,
    WeightedSet,
}

/// Growth policy for the lid-indexed vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowStrategy {
    /// Capacity of the first allocation
    pub docs_initial_capacity: usize,
    /// Relative growth on reallocation
    pub docs_grow_percent: usize,
    /// Absolute growth on reallocation
    pub docs_grow_delta: usize,
}

impl Default for GrowStrategy {
    fn default() -> Self {
        Self {
            docs_initial_capacity: 1024,
            docs_grow_percent: 50,
            docs_grow_delta: 0,
        }
    }
}

impl GrowStrategy {
    pub fn new(initial: usize, grow_percent: usize, grow_delta: usize) -> Self {
        Self {
            docs_initial_capacity: initial,
            docs_grow_percent: grow_percent,
            docs_grow_delta: grow_delta,
        }
    }

    /// Capacity to allocate when `needed` elements must fit in `current`.
    pub fn next_capacity(&self, current: usize, needed: usize) -> usize {
        let grown = if current == 0 {
            self.docs_initial_capacity
        } else {
            current + current * self.docs_grow_percent / 100 + self.docs_grow_delta
        };
        grown.max(needed).max(1)
    }
}

/// When to relocate live payloads out of a fragmented buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactionStrategy {
    /// Dead bytes tolerated before compaction is considered
    pub dead_slack_bytes: usize,
    /// Dead/used ratio above which compaction runs
    pub max_dead_ratio: f64,
}

impl Default for CompactionStrategy {
    fn default() -> Self {
        Self {
            dead_slack_bytes: 0x10000, // 64 KiB
            max_dead_ratio: 0.2,
        }
    }
}

impl CompactionStrategy {
    pub fn should_compact(&self, used: usize, dead: usize) -> bool {
        dead >= self.dead_slack_bytes && (dead as f64) > (used as f64) * self.max_dead_ratio
    }
}

/// Payload store sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// Bytes per buffer (entries larger than this get a dedicated buffer)
    pub buffer_size: usize,
    /// Upper bound on live buffers, limited by the entry ref encoding
    pub max_buffers: u32,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1 << 20,
            max_buffers: crate::entry_ref::MAX_BUFFERS,
        }
    }
}

/// Full description of one attribute column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub basic_type: BasicType,
    #[serde(default)]
    pub collection_type: CollectionType,
    /// Tensor type spec, e.g. `tensor(x{},y{})`; required for tensors
    #[serde(default)]
    pub tensor_type: Option<String>,
    #[serde(default)]
    pub grow_strategy: GrowStrategy,
    #[serde(default)]
    pub compaction: CompactionStrategy,
    #[serde(default)]
    pub data_store: DataStoreConfig,
}

impl AttributeConfig {
    pub fn new(basic_type: BasicType) -> Self {
        Self {
            basic_type,
            collection_type: CollectionType::Single,
            tensor_type: None,
            grow_strategy: GrowStrategy::default(),
            compaction: CompactionStrategy::default(),
            data_store: DataStoreConfig::default(),
        }
    }

    pub fn tensor(spec: &str) -> Self {
        Self {
            tensor_type: Some(spec.to_string()),
            ..Self::new(BasicType::Tensor)
        }
    }

    pub fn with_collection(mut self, collection_type: CollectionType) -> Self {
        self.collection_type = collection_type;
        self
    }

    pub fn with_grow_strategy(mut self, grow_strategy: GrowStrategy) -> Self {
        self.grow_strategy = grow_strategy;
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionStrategy) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn with_data_store(mut self, data_store: DataStoreConfig) -> Self {
        self.data_store = data_store;
        self
    }

    /// Reject combinations no column kind implements.
    pub fn validate(&self) -> Result<()> {
        match (self.basic_type, self.collection_type) {
            (BasicType::Tensor, CollectionType::Single) => {
                let spec = self.tensor_type.as_deref().ok_or_else(|| {
                    AttributeError::InvalidArgument("tensor attribute without tensor type".into())
                })?;
                spec.parse::<TensorType>()?;
            }
            (BasicType::Tensor, other) => {
                return Err(AttributeError::InvalidArgument(format!(
                    "tensor attributes must be single-valued, got {:?}",
                    other
                )));
            }
            _ => {}
        }
        if self.data_store.buffer_size == 0 {
            return Err(AttributeError::InvalidArgument(
                "data store buffer size must be positive".into(),
            ));
        }
        if self.data_store.max_buffers == 0
            || self.data_store.max_buffers > crate::entry_ref::MAX_BUFFERS
        {
            return Err(AttributeError::InvalidArgument(format!(
                "max_buffers must be in 1..={}",
                crate::entry_ref::MAX_BUFFERS
            )));
        }
        Ok(())
    }

    pub fn parsed_tensor_type(&self) -> Result<Option<TensorType>> {
        self.tensor_type
            .as_deref()
            .map(str::parse::<TensorType>)
            .transpose()
    }
}

/// Name plus config, as handed to the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub config: AttributeConfig,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, config: AttributeConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_strategy_default() {
        let g = GrowStrategy::default();
        assert_eq!(g.next_capacity(0, 1), 1024);
        assert_eq!(g.next_capacity(1024, 1025), 1536);
        assert_eq!(g.next_capacity(2, 10), 10);
    }

    #[test]
    fn test_compaction_threshold() {
        let c = CompactionStrategy::default();
        assert!(!c.should_compact(1_000_000, 0xffff));
        assert!(!c.should_compact(1_000_000, 0x10000));
        assert!(c.should_compact(300_000, 0x10000));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = AttributeConfig::tensor("tensor(x{},y{})");
        let json = serde_json::to_string(&config).unwrap();
        let back: AttributeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);

        let minimal: AttributeConfig = serde_json::from_str(r#"{"basic_type":"int32"}"#).unwrap();
        assert_eq!(minimal.collection_type, CollectionType::Single);
        assert_eq!(minimal.grow_strategy, GrowStrategy::default());
    }

    #[test]
    fn test_validate() {
        assert!(AttributeConfig::new(BasicType::Tensor).validate().is_err());
        assert!(AttributeConfig::tensor("tensor(x[3])").validate().is_ok());
        assert!(AttributeConfig::tensor("tensor(x[3])")
            .with_collection(CollectionType::Array)
            .validate()
            .is_err());
        assert!(AttributeConfig::new(BasicType::String)
            .with_collection(CollectionType::WeightedSet)
            .validate()
            .is_ok());
    }
}
