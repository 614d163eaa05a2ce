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

//! Tensor values
//!
//! A tensor type is a set of named dimensions, each either mapped
//! (`x{}`, string labels) or indexed (`x[3]`, dense 0-based labels), plus a
//! cell type. Dimensions are kept sorted by name, so an address is the
//! list of labels in that order.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use crate::error::{AttributeError, Result};

const FORMAT_SPARSE: u8 = 1;
const FORMAT_DENSE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellType {
    #[default]
    Double,
    Float,
}

impl CellType {
    #[inline]
    fn normalize(&self, value: f64) -> f64 {
        match self {
            CellType::Double => value,
            CellType::Float => value as f32 as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub name: String,
    /// `None` for mapped dimensions
    pub size: Option<u32>,
}

impl Dimension {
    pub fn mapped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn indexed(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.size.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    cell_type: CellType,
    dimensions: Vec<Dimension>,
}

impl TensorType {
    pub fn new(cell_type: CellType, mut dimensions: Vec<Dimension>) -> Result<Self> {
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in dimensions.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(AttributeError::InvalidTensorType(format!(
                    "duplicate dimension '{}'",
                    pair[0].name
                )));
            }
        }
        if let Some(dim) = dimensions.iter().find(|d| d.size == Some(0)) {
            return Err(AttributeError::InvalidTensorType(format!(
                "indexed dimension '{}' has size 0",
                dim.name
            )));
        }
        Ok(Self {
            cell_type,
            dimensions,
        })
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn is_dense(&self) -> bool {
        self.dimensions.iter().all(|d| !d.is_mapped())
    }

    pub fn has_mapped_dimensions(&self) -> bool {
        self.dimensions.iter().any(Dimension::is_mapped)
    }

    pub fn dense_cell_count(&self) -> usize {
        self.dimensions
            .iter()
            .filter_map(|d| d.size)
            .map(|size| size as usize)
            .product()
    }

    /// Same dimensions, same sizes, same cell type.
    pub fn is_assignable_from(&self, other: &TensorType) -> bool {
        self == other
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    fn dimension_list(&self) -> String {
        self.dimensions
            .iter()
            .map(|d| match d.size {
                Some(size) => format!("{}[{}]", d.name, size),
                None => format!("{}{{}}", d.name),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell_type {
            CellType::Double => write!(f, "tensor({})", self.dimension_list()),
            CellType::Float => write!(f, "tensor<float>({})", self.dimension_list()),
        }
    }
}

impl FromStr for TensorType {
    type Err = AttributeError;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid = || AttributeError::InvalidTensorType(spec.to_string());
        let rest = spec.trim().strip_prefix("tensor").ok_or_else(invalid)?;
        let (cell_type, rest) = if let Some(after) = rest.strip_prefix('<') {
            let (name, after) = after.split_once('>').ok_or_else(invalid)?;
            let cell_type = match name.trim() {
                "double" => CellType::Double,
                "float" => CellType::Float,
                _ => return Err(invalid()),
            };
            (cell_type, after)
        } else {
            (CellType::Double, rest)
        };
        let body = rest
            .trim()
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(invalid)?;

        let mut dimensions = Vec::new();
        for part in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let dimension = if let Some(name) = part.strip_suffix("{}") {
                Dimension::mapped(name.trim())
            } else if let Some((name, size)) = part.strip_suffix(']').and_then(|p| p.split_once('[')) {
                let size = size.trim().parse::<u32>().map_err(|_| invalid())?;
                Dimension::indexed(name.trim(), size)
            } else {
                return Err(invalid());
            };
            let valid_name = !dimension.name.is_empty()
                && dimension
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_name {
                return Err(invalid());
            }
            dimensions.push(dimension);
        }
        TensorType::new(cell_type, dimensions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Indexed(u32),
    Mapped(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Indexed(i) => write!(f, "{}", i),
            Label::Mapped(s) => f.write_str(s),
        }
    }
}

/// Labels in dimension order
pub type TensorAddress = SmallVec<[Label; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorModifyOp {
    Replace,
    Add,
    Multiply,
}

impl TensorModifyOp {
    fn apply(&self, old: f64, operand: f64) -> f64 {
        match self {
            TensorModifyOp::Replace => operand,
            TensorModifyOp::Add => old + operand,
            TensorModifyOp::Multiply => old * operand,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    tensor_type: TensorType,
    cells: BTreeMap<TensorAddress, f64>,
}

impl Tensor {
    /// No cells for types with mapped dimensions, all zeros for dense ones.
    pub fn empty(tensor_type: TensorType) -> Self {
        let mut cells = BTreeMap::new();
        if tensor_type.is_dense() {
            for address in dense_addresses(&tensor_type) {
                cells.insert(address, 0.0);
            }
        }
        Self { tensor_type, cells }
    }

    pub fn builder(tensor_type: TensorType) -> TensorBuilder {
        TensorBuilder {
            tensor: Tensor::empty(tensor_type),
            error: None,
        }
    }

    /// Dense tensor from values in row-major order.
    pub fn from_dense(tensor_type: TensorType, values: &[f64]) -> Result<Self> {
        if !tensor_type.is_dense() || values.len() != tensor_type.dense_cell_count() {
            return Err(AttributeError::InvalidArgument(format!(
                "{} values do not fill {}",
                values.len(),
                tensor_type
            )));
        }
        let cell_type = tensor_type.cell_type();
        let cells = dense_addresses(&tensor_type)
            .zip(values.iter())
            .map(|(address, value)| (address, cell_type.normalize(*value)))
            .collect();
        Ok(Self { tensor_type, cells })
    }

    pub fn tensor_type(&self) -> &TensorType {
        &self.tensor_type
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> impl Iterator<Item = (&TensorAddress, f64)> {
        self.cells.iter().map(|(address, value)| (address, *value))
    }

    /// Look up a cell by `(dimension, label)` pairs.
    pub fn cell(&self, address: &[(&str, &str)]) -> Option<f64> {
        let address = resolve_address(&self.tensor_type, address).ok()?;
        self.cells.get(&address).copied()
    }

    /// Apply `op` to cells present in both tensors.
    pub fn modify(&self, op: TensorModifyOp, update: &Tensor) -> Result<Tensor> {
        self.check_same_dimensions(update)?;
        let mut result = self.clone();
        let cell_type = result.tensor_type.cell_type();
        for (address, operand) in update.cells() {
            if let Some(value) = result.cells.get_mut(address) {
                *value = cell_type.normalize(op.apply(*value, operand));
            }
        }
        Ok(result)
    }

    /// Insert or overwrite cells; needs a mapped dimension.
    pub fn add(&self, update: &Tensor) -> Result<Tensor> {
        self.check_same_dimensions(update)?;
        if !self.tensor_type.has_mapped_dimensions() {
            return Err(AttributeError::InvalidArgument(format!(
                "cannot add cells to dense tensor {}",
                self.tensor_type
            )));
        }
        let mut result = self.clone();
        let cell_type = result.tensor_type.cell_type();
        for (address, value) in update.cells() {
            result.cells.insert(address.clone(), cell_type.normalize(value));
        }
        Ok(result)
    }

    /// Remove cells whose mapped labels match an address of `addresses`,
    /// a tensor over a subset of this tensor's mapped dimensions.
    pub fn remove(&self, addresses: &Tensor) -> Result<Tensor> {
        let positions = addresses
            .tensor_type
            .dimensions()
            .iter()
            .map(|d| match self.tensor_type.index_of(&d.name) {
                Some(index) if d.is_mapped() && self.tensor_type.dimensions[index].is_mapped() => {
                    Ok(index)
                }
                _ => Err(type_mismatch(&self.tensor_type, &addresses.tensor_type)),
            })
            .collect::<Result<Vec<_>>>()?;
        if positions.is_empty() {
            return Err(type_mismatch(&self.tensor_type, &addresses.tensor_type));
        }
        let mut result = self.clone();
        for (address, _) in addresses.cells() {
            result.cells.retain(|cell, _| {
                !positions
                    .iter()
                    .zip(address.iter())
                    .all(|(&pos, label)| &cell[pos] == label)
            });
        }
        Ok(result)
    }

    fn check_same_dimensions(&self, other: &Tensor) -> Result<()> {
        if self.tensor_type.dimensions != other.tensor_type.dimensions {
            return Err(type_mismatch(&self.tensor_type, &other.tensor_type));
        }
        Ok(())
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    pub fn encode(&self) -> Vec<u8> {
        let dense = self.tensor_type.is_dense();
        let value_size = match self.tensor_type.cell_type() {
            CellType::Double => 8,
            CellType::Float => 4,
        };
        let mut out = Vec::with_capacity(5 + self.cells.len() * (value_size + if dense { 0 } else { 8 }));
        // Writes into a Vec cannot fail
        let _ = self.write_to(&mut out, dense);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>, dense: bool) -> std::io::Result<()> {
        out.write_u8(if dense { FORMAT_DENSE } else { FORMAT_SPARSE })?;
        out.write_u32::<LittleEndian>(self.cells.len() as u32)?;
        for (address, value) in &self.cells {
            if !dense {
                for label in address {
                    match label {
                        Label::Indexed(index) => out.write_u32::<LittleEndian>(*index)?,
                        Label::Mapped(name) => {
                            out.write_u32::<LittleEndian>(name.len() as u32)?;
                            out.extend_from_slice(name.as_bytes());
                        }
                    }
                }
            }
            match self.tensor_type.cell_type() {
                CellType::Double => out.write_f64::<LittleEndian>(*value)?,
                CellType::Float => out.write_f32::<LittleEndian>(*value as f32)?,
            }
        }
        Ok(())
    }

    pub fn decode(tensor_type: &TensorType, bytes: &[u8]) -> Result<Tensor> {
        let mut reader = Cursor::new(bytes);
        let format = reader.read_u8()?;
        let count = reader.read_u32::<LittleEndian>()? as usize;
        let read_value = |reader: &mut Cursor<&[u8]>| -> Result<f64> {
            Ok(match tensor_type.cell_type() {
                CellType::Double => reader.read_f64::<LittleEndian>()?,
                CellType::Float => reader.read_f32::<LittleEndian>()? as f64,
            })
        };
        let mut cells = BTreeMap::new();
        match format {
            FORMAT_DENSE => {
                if !tensor_type.is_dense() || count != tensor_type.dense_cell_count() {
                    return Err(AttributeError::Serialization(format!(
                        "dense payload with {} cells does not match {}",
                        count, tensor_type
                    )));
                }
                for address in dense_addresses(tensor_type) {
                    cells.insert(address, read_value(&mut reader)?);
                }
            }
            FORMAT_SPARSE => {
                for _ in 0..count {
                    let mut address = TensorAddress::new();
                    for dim in tensor_type.dimensions() {
                        let raw = reader.read_u32::<LittleEndian>()?;
                        if dim.is_mapped() {
                            let start = reader.position() as usize;
                            let end = start + raw as usize;
                            let label = bytes
                                .get(start..end)
                                .ok_or_else(|| AttributeError::Serialization("truncated label".into()))?;
                            let label = std::str::from_utf8(label)
                                .map_err(|e| AttributeError::Serialization(e.to_string()))?;
                            address.push(Label::Mapped(label.to_string()));
                            reader.set_position(end as u64);
                        } else {
                            address.push(Label::Indexed(raw));
                        }
                    }
                    cells.insert(address, read_value(&mut reader)?);
                }
            }
            other => {
                return Err(AttributeError::Serialization(format!(
                    "unknown tensor format {}",
                    other
                )))
            }
        }
        Ok(Tensor {
            tensor_type: tensor_type.clone(),
            cells,
        })
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{{", self.tensor_type)?;
        for (i, (address, value)) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str("{")?;
            for (j, (dim, label)) in self.tensor_type.dimensions.iter().zip(address).enumerate() {
                if j > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}:{}", dim.name, label)?;
            }
            write!(f, "}}:{}", value)?;
        }
        f.write_str("}")
    }
}

pub struct TensorBuilder {
    tensor: Tensor,
    error: Option<AttributeError>,
}

impl TensorBuilder {
    /// Set one cell by `(dimension, label)` pairs; errors surface in `build`.
    pub fn cell(mut self, address: &[(&str, &str)], value: f64) -> Self {
        if self.error.is_none() {
            match resolve_address(&self.tensor.tensor_type, address) {
                Ok(address) => {
                    let value = self.tensor.tensor_type.cell_type().normalize(value);
                    self.tensor.cells.insert(address, value);
                }
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    pub fn build(self) -> Result<Tensor> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.tensor),
        }
    }
}

fn resolve_address(tensor_type: &TensorType, address: &[(&str, &str)]) -> Result<TensorAddress> {
    if address.len() != tensor_type.dimensions.len() {
        return Err(AttributeError::InvalidArgument(format!(
            "address has {} labels, {} needs {}",
            address.len(),
            tensor_type,
            tensor_type.dimensions.len()
        )));
    }
    tensor_type
        .dimensions
        .iter()
        .map(|dim| {
            let (_, label) = address
                .iter()
                .find(|(name, _)| *name == dim.name)
                .ok_or_else(|| {
                    AttributeError::InvalidArgument(format!("missing label for dimension '{}'", dim.name))
                })?;
            match dim.size {
                None => Ok(Label::Mapped(label.to_string())),
                Some(size) => match label.parse::<u32>() {
                    Ok(index) if index < size => Ok(Label::Indexed(index)),
                    _ => Err(AttributeError::InvalidArgument(format!(
                        "label '{}' out of range for {}[{}]",
                        label, dim.name, size
                    ))),
                },
            }
        })
        .collect()
}

/// Every address of a dense type in row-major order.
fn dense_addresses(tensor_type: &TensorType) -> impl Iterator<Item = TensorAddress> + '_ {
    let sizes: Vec<u32> = tensor_type.dimensions.iter().filter_map(|d| d.size).collect();
    let total = tensor_type.dense_cell_count();
    (0..total).map(move |mut flat| {
        let mut address = TensorAddress::from_elem(Label::Indexed(0), sizes.len());
        for (slot, size) in address.iter_mut().zip(sizes.iter()).rev() {
            *slot = Label::Indexed((flat % *size as usize) as u32);
            flat /= *size as usize;
        }
        address
    })
}

/// Message used whenever a tensor does not fit a column's type
pub fn type_mismatch_message(field: &TensorType, other: &TensorType) -> String {
    format!(
        "Field tensor type is '{}' but other tensor type is '{}'",
        field, other
    )
}

fn type_mismatch(field: &TensorType, other: &TensorType) -> AttributeError {
    AttributeError::InvalidArgument(type_mismatch_message(field, other))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse_xy() -> TensorType {
        "tensor(x{},y{})".parse().unwrap()
    }

    #[test]
    fn test_parse_and_print() {
        let t: TensorType = "tensor(y{}, x{})".parse().unwrap();
        assert_eq!(t.to_string(), "tensor(x{},y{})");
        let d: TensorType = "tensor<float>(x[3])".parse().unwrap();
        assert_eq!(d.cell_type(), CellType::Float);
        assert!(d.is_dense());
        assert_eq!(d.to_string(), "tensor<float>(x[3])");
        let m: TensorType = "tensor(a{},b[2])".parse().unwrap();
        assert!(m.has_mapped_dimensions() && !m.is_dense());

        for bad in ["tensor(x{},x{})", "tensor(x[0])", "matrix(x{})", "tensor<int8>(x[2])", "tensor(x[a])"] {
            assert!(bad.parse::<TensorType>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_builder_and_lookup() {
        let t = Tensor::builder(sparse_xy())
            .cell(&[("x", "4"), ("y", "5")], 7.0)
            .build()
            .unwrap();
        assert_eq!(t.cell(&[("y", "5"), ("x", "4")]), Some(7.0));
        assert_eq!(t.len(), 1);
        assert!(Tensor::builder(sparse_xy()).cell(&[("x", "4")], 1.0).build().is_err());

        let dense: TensorType = "tensor(x[2])".parse().unwrap();
        assert!(Tensor::builder(dense).cell(&[("x", "2")], 1.0).build().is_err());
    }

    #[test]
    fn test_empty_dense_is_zero_filled() {
        let t = Tensor::empty("tensor(x[2],y[3])".parse().unwrap());
        assert_eq!(t.len(), 6);
        assert!(t.cells().all(|(_, v)| v == 0.0));
        assert!(Tensor::empty(sparse_xy()).is_empty());
    }

    #[test]
    fn test_dense_row_major() {
        let tt: TensorType = "tensor(x[2],y[2])".parse().unwrap();
        let t = Tensor::from_dense(tt, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.cell(&[("x", "0"), ("y", "1")]), Some(2.0));
        assert_eq!(t.cell(&[("x", "1"), ("y", "0")]), Some(3.0));
    }

    #[test]
    fn test_encode_decode() {
        let sparse = Tensor::builder(sparse_xy())
            .cell(&[("x", "a"), ("y", "b")], 1.5)
            .cell(&[("x", ""), ("y", "long label")], -2.0)
            .build()
            .unwrap();
        assert_eq!(Tensor::decode(&sparse_xy(), &sparse.encode()).unwrap(), sparse);

        let ft: TensorType = "tensor<float>(x[3])".parse().unwrap();
        let dense = Tensor::from_dense(ft.clone(), &[0.1, 0.2, 0.3]).unwrap();
        let bytes = dense.encode();
        assert_eq!(bytes.len(), 5 + 12);
        assert_eq!(Tensor::decode(&ft, &bytes).unwrap(), dense);

        assert!(Tensor::decode(&ft, &bytes[..7]).is_err());
    }

    #[test]
    fn test_partial_updates() {
        let t = Tensor::builder(sparse_xy())
            .cell(&[("x", "a"), ("y", "1")], 2.0)
            .cell(&[("x", "b"), ("y", "1")], 3.0)
            .build()
            .unwrap();
        let delta = Tensor::builder(sparse_xy())
            .cell(&[("x", "a"), ("y", "1")], 10.0)
            .cell(&[("x", "c"), ("y", "1")], 10.0)
            .build()
            .unwrap();

        let added = t.modify(TensorModifyOp::Add, &delta).unwrap();
        assert_eq!(added.cell(&[("x", "a"), ("y", "1")]), Some(12.0));
        assert_eq!(added.cell(&[("x", "c"), ("y", "1")]), None);

        let multiplied = t.modify(TensorModifyOp::Multiply, &delta).unwrap();
        assert_eq!(multiplied.cell(&[("x", "a"), ("y", "1")]), Some(20.0));

        let merged = t.add(&delta).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.cell(&[("x", "a"), ("y", "1")]), Some(10.0));

        let x_only: TensorType = "tensor(x{})".parse().unwrap();
        let remove = Tensor::builder(x_only).cell(&[("x", "a")], 1.0).build().unwrap();
        let removed = t.remove(&remove).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed.cell(&[("x", "b"), ("y", "1")]), Some(3.0));
    }

    #[test]
    fn test_mismatch_message() {
        let dense = Tensor::empty("tensor(x[2])".parse().unwrap());
        let err = Tensor::empty(sparse_xy()).modify(TensorModifyOp::Replace, &dense).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: Field tensor type is 'tensor(x{},y{})' but other tensor type is 'tensor(x[2])'"
        );
        assert!(dense.add(&dense).is_err());
    }
}
