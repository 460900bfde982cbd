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

//! # Validation Harness
//!
//! Drives a backend with sample inputs and checks what every deployment
//! harness relies on:
//!
//! - inputs are a sequence of mappings (a single mapping is wrapped first)
//! - outputs are a sequence with one element per input
//! - every output element is a mapping
//! - every output element serializes to JSON
//!
//! A backend that fails while running is reported as [`PfError::Runtime`],
//! never as a validation failure.

use serde_json::Value;

use crate::backend::PfCallable;
use crate::errors::{PfError, Result};
use crate::record::{expect_record, json_kind};
use crate::value::PfValue;

/// Contract checks around one backend.
pub struct PfValidator<'a> {
    backend: &'a dyn PfCallable,
}

impl<'a> PfValidator<'a> {
    pub fn new(backend: &'a dyn PfCallable) -> Self {
        PfValidator { backend }
    }

    /// Runs the backend on `inputs` and returns its checked, native outputs.
    pub fn run(&self, inputs: Value) -> Result<Value> {
        let (inputs, single_record) = match inputs {
            Value::Object(record) => (Value::Array(vec![Value::Object(record)]), true),
            other => (other, false),
        };
        let input_len = check_inputs(&inputs)?;

        let outputs = self.backend.call(inputs).map_err(|err| {
            PfError::runtime_with(
                "Error encountered when running the inference backend. This is not a validation issue.",
                err,
            )
        })?;

        let rows = check_outputs(input_len, outputs)?;
        if single_record {
            return rows
                .into_iter()
                .next()
                .ok_or_else(|| PfError::validation("Backend returned no output for a single record input"));
        }
        Ok(Value::Array(rows))
    }
}

fn check_inputs(inputs: &Value) -> Result<usize> {
    let rows = inputs.as_array().ok_or_else(|| {
        PfError::validation(format!(
            "Production inputs will be in a list format. Input type received was {}",
            json_kind(inputs)
        ))
    })?;
    for (index, row) in rows.iter().enumerate() {
        expect_record(row, index)?;
    }
    Ok(rows.len())
}

fn check_outputs(input_len: usize, outputs: PfValue) -> Result<Vec<Value>> {
    let items = outputs.into_items().map_err(|other| {
        PfError::validation(format!(
            "Outputs must be a sequence. Type received was {}",
            other.type_name()
        ))
    })?;

    if items.len() != input_len {
        return Err(PfError::validation(format!(
            "Inputs and Outputs must have matching lengths. Received {input_len} inputs and returned {} outputs.",
            items.len()
        )));
    }

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_mapping() {
            return Err(PfError::validation(format!(
                "Outputs must be a sequence of mappings. Value at index {index} is not a mapping. Type found was {}",
                item.type_name()
            )));
        }
        let row = item.into_json().map_err(|err| {
            PfError::validation(format!(
                "Value at index {index} is not JSON Serializable. Please ensure returned values are native types. Error: {err}"
            ))
        })?;
        rows.push(row);
    }
    Ok(rows)
}
