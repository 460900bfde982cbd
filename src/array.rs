//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Packflow.
//! The Packflow project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Feature Matrix Module
//!
//! Builds 2-D feature matrices out of record batches. One row per record, one
//! column per feature name, in feature-name order. Missing fields become a null
//! placeholder before dtype coercion.
//!
//! When no dtype is requested the element type is inferred from the cells:
//! all booleans → `bool`, all integers → `int64`, all numbers → `float64`,
//! anything else → `object` (the JSON values themselves).

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PfError, Result};
use crate::nested::get_field;
use crate::record::{expect_record, json_kind};

/// Element type of a [`PfArray`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PfArrayDtype {
    Float32,
    Float64,
    Int64,
    Bool,
    Object,
}

impl PfArrayDtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            PfArrayDtype::Float32 => "float32",
            PfArrayDtype::Float64 => "float64",
            PfArrayDtype::Int64 => "int64",
            PfArrayDtype::Bool => "bool",
            PfArrayDtype::Object => "object",
        }
    }
}

/// A typed 2-D feature matrix.
#[derive(Clone, Debug, PartialEq)]
pub enum PfArray {
    Float32(Array2<f32>),
    Float64(Array2<f64>),
    Int64(Array2<i64>),
    Bool(Array2<bool>),
    Object(Array2<Value>),
}

impl PfArray {
    pub fn dtype(&self) -> PfArrayDtype {
        match self {
            PfArray::Float32(_) => PfArrayDtype::Float32,
            PfArray::Float64(_) => PfArrayDtype::Float64,
            PfArray::Int64(_) => PfArrayDtype::Int64,
            PfArray::Bool(_) => PfArrayDtype::Bool,
            PfArray::Object(_) => PfArrayDtype::Object,
        }
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            PfArray::Float32(a) => a.dim(),
            PfArray::Float64(a) => a.dim(),
            PfArray::Int64(a) => a.dim(),
            PfArray::Bool(a) => a.dim(),
            PfArray::Object(a) => a.dim(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.shape().0
    }

    pub fn as_f64(&self) -> Option<&Array2<f64>> {
        match self {
            PfArray::Float64(a) => Some(a),
            _ => None,
        }
    }

    /// Copies the matrix into `float64`, converting cells where possible.
    pub fn to_f64(&self) -> Result<Array2<f64>> {
        match self {
            PfArray::Float64(a) => Ok(a.clone()),
            PfArray::Float32(a) => Ok(a.mapv(f64::from)),
            PfArray::Int64(a) => Ok(a.mapv(|v| v as f64)),
            PfArray::Bool(a) => Ok(a.mapv(|v| if v { 1.0 } else { 0.0 })),
            PfArray::Object(a) => {
                let cells = a.iter().map(to_float).collect::<Result<Vec<_>>>()?;
                shaped(a.dim(), cells)
            }
        }
    }
}

/// Assembles a feature matrix from records.
///
/// `feature_names` are looked up with [`get_field`], so nested paths joined by
/// `delimiter` are allowed. Rows that are not mappings fail, naming the index.
pub fn records_to_array(
    batch: &[Value],
    feature_names: &[String],
    dtype: Option<PfArrayDtype>,
    delimiter: &str,
) -> Result<PfArray> {
    let rows = extract_rows(batch, feature_names, delimiter)?;
    let dim = (batch.len(), feature_names.len());
    let cells: Vec<Value> = rows.into_iter().flatten().collect();

    match dtype.unwrap_or_else(|| infer_dtype(&cells)) {
        PfArrayDtype::Float64 => {
            let values = cells.iter().map(to_float).collect::<Result<Vec<_>>>()?;
            shaped(dim, values).map(PfArray::Float64)
        }
        PfArrayDtype::Float32 => {
            let values = cells
                .iter()
                .map(|cell| to_float(cell).map(|v| v as f32))
                .collect::<Result<Vec<_>>>()?;
            shaped(dim, values).map(PfArray::Float32)
        }
        PfArrayDtype::Int64 => {
            let values = cells.iter().map(to_int).collect::<Result<Vec<_>>>()?;
            shaped(dim, values).map(PfArray::Int64)
        }
        PfArrayDtype::Bool => {
            let values = cells.iter().map(to_bool).collect();
            shaped(dim, values).map(PfArray::Bool)
        }
        PfArrayDtype::Object => shaped(dim, cells).map(PfArray::Object),
    }
}

#[cfg(not(feature = "parallel"))]
fn extract_rows(batch: &[Value], feature_names: &[String], delimiter: &str) -> Result<Vec<Vec<Value>>> {
    batch
        .iter()
        .enumerate()
        .map(|(index, row)| extract_row(row, index, feature_names, delimiter))
        .collect()
}

#[cfg(feature = "parallel")]
fn extract_rows(batch: &[Value], feature_names: &[String], delimiter: &str) -> Result<Vec<Vec<Value>>> {
    use rayon::prelude::*;

    batch
        .par_iter()
        .enumerate()
        .map(|(index, row)| extract_row(row, index, feature_names, delimiter))
        .collect()
}

fn extract_row(row: &Value, index: usize, feature_names: &[String], delimiter: &str) -> Result<Vec<Value>> {
    let record = expect_record(row, index)?;
    Ok(feature_names
        .iter()
        .map(|feature| get_field(record, feature, delimiter).unwrap_or(Value::Null))
        .collect())
}

fn infer_dtype(cells: &[Value]) -> PfArrayDtype {
    if cells.is_empty() {
        return PfArrayDtype::Float64;
    }
    if cells.iter().all(Value::is_boolean) {
        return PfArrayDtype::Bool;
    }
    if cells.iter().all(|cell| cell.is_i64()) {
        return PfArrayDtype::Int64;
    }
    if cells.iter().all(Value::is_number) {
        return PfArrayDtype::Float64;
    }
    PfArrayDtype::Object
}

fn shaped<T>(dim: (usize, usize), cells: Vec<T>) -> Result<Array2<T>> {
    Array2::from_shape_vec(dim, cells)
        .map_err(|err| PfError::validation(format!("cannot shape feature matrix as {dim:?}: {err}")))
}

fn to_float(cell: &Value) -> Result<f64> {
    match cell {
        Value::Null => Ok(f64::NAN),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64().ok_or_else(|| cast_error(cell, PfArrayDtype::Float64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| cast_error(cell, PfArrayDtype::Float64)),
        _ => Err(cast_error(cell, PfArrayDtype::Float64)),
    }
}

fn to_int(cell: &Value) -> Result<i64> {
    match cell {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
            .ok_or_else(|| cast_error(cell, PfArrayDtype::Int64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| cast_error(cell, PfArrayDtype::Int64)),
        _ => Err(cast_error(cell, PfArrayDtype::Int64)),
    }
}

fn to_bool(cell: &Value) -> bool {
    match cell {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn cast_error(cell: &Value, dtype: PfArrayDtype) -> PfError {
    PfError::validation(format!(
        "cannot convert {} value {cell} to {}",
        json_kind(cell),
        dtype.as_str()
    ))
}
