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

use std::sync::Arc;

use super::backend::{NumericBackend, PayloadBackend};
use super::codec::{MultiValueCodec, StringCodec, TensorCodec};
use super::{AttributeColumn, AttributeVector};
use crate::config::{AttributeConfig, BasicType, CollectionType};
use crate::error::{AttributeError, Result};
use crate::SerialNum;

/// Build the column kind matching `config`.
pub fn create_attribute(
    name: &str,
    config: &AttributeConfig,
    create_serial_num: SerialNum,
) -> Result<Arc<dyn AttributeVector>> {
    config.validate()?;
    let cfg = config.clone();
    let store = config.data_store;
    let attribute: Arc<dyn AttributeVector> = match (config.basic_type, config.collection_type) {
        (BasicType::Int32, CollectionType::Single) => {
            Arc::new(AttributeColumn::new(name, cfg, NumericBackend::<i32>::new(), create_serial_num)?)
        }
        (BasicType::Int64, CollectionType::Single) => {
            Arc::new(AttributeColumn::new(name, cfg, NumericBackend::<i64>::new(), create_serial_num)?)
        }
        (BasicType::Float, CollectionType::Single) => {
            Arc::new(AttributeColumn::new(name, cfg, NumericBackend::<f32>::new(), create_serial_num)?)
        }
        (BasicType::Double, CollectionType::Single) => {
            Arc::new(AttributeColumn::new(name, cfg, NumericBackend::<f64>::new(), create_serial_num)?)
        }
        (BasicType::String, CollectionType::Single) => Arc::new(AttributeColumn::new(
            name,
            cfg,
            PayloadBackend::new(StringCodec, store),
            create_serial_num,
        )?),
        (BasicType::Tensor, _) => {
            let tensor_type = config.parsed_tensor_type()?.ok_or_else(|| {
                AttributeError::InvalidArgument(format!("tensor attribute '{}' has no tensor type", name))
            })?;
            Arc::new(AttributeColumn::new(
                name,
                cfg,
                PayloadBackend::new(TensorCodec::new(tensor_type), store),
                create_serial_num,
            )?)
        }
        (element, collection) => Arc::new(AttributeColumn::new(
            name,
            cfg,
            PayloadBackend::new(MultiValueCodec::new(element, collection), store),
            create_serial_num,
        )?),
    };
    tracing::debug!(
        attribute = name,
        basic_type = config.basic_type.name(),
        collection = ?config.collection_type,
        create_serial_num,
        "created attribute"
    );
    Ok(attribute)
}
