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

//! # Packflow Record Module
//!
//! Records are the unit of data that enters and leaves every backend. A record
//! is a string-keyed JSON mapping; a batch is an ordered sequence of rows.
//!
//! Key order is insertion order (`serde_json` is built with `preserve_order`).
//! It only carries meaning for the array preprocessor, which lays columns out
//! by feature position rather than by key order.
//!
//! A batch is kept as `Vec<Value>` rather than `Vec<PfRecord>` because raw
//! caller input is not guaranteed to be made of mappings; the validation
//! harness and the preprocessors report the first offending row instead.

use serde_json::{Map, Value};

use crate::errors::{PfError, Result};

/// One input or output row.
pub type PfRecord = Map<String, Value>;

/// Ordered rows processed together through one pipeline call.
pub type PfBatch = Vec<Value>;

/// Human-readable name of a JSON value's kind, used in error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Borrows row `index` of a batch as a record, or explains why it is not one.
pub fn expect_record(value: &Value, index: usize) -> Result<&PfRecord> {
    value.as_object().ok_or_else(|| {
        PfError::validation(format!(
            "Value at index {index} is not a mapping. Type found was {}",
            json_kind(value)
        ))
    })
}
