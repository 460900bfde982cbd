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

//! # Preprocessor Module
//!
//! Preprocessors reshape a raw record batch into the representation a backend
//! asked for through [`PfBackendConfig::input_format`]. A preprocessor is built
//! once per backend instance by [`get_preprocessor`]. That is where it checks
//! the configuration, so an incompatible setup fails at construction rather
//! than on the first call.
//!
//! | format        | strategy                    | output            |
//! |---------------|-----------------------------|-------------------|
//! | `passthrough` | [`PfPassthroughPreprocessor`] | the batch as-is   |
//! | `records`     | [`PfRecordsPreprocessor`]     | reshaped records  |
//! | `array`       | [`PfArrayPreprocessor`]       | [`PfArray`] matrix |
//!
//! Calls go through [`run_preprocessor`], which reclassifies any failure as
//! [`PfError::PreprocessorRuntime`] with the original error as its source.

use std::fmt;

use serde_json::{Map, Value};

use crate::array::{records_to_array, PfArray};
use crate::config::{PfBackendConfig, PfInputFormat};
use crate::errors::{PfError, Result};
use crate::nested::{flatten, unflatten};
use crate::record::{expect_record, PfBatch, PfRecord};
use crate::value::PfValue;

/// Strategy that turns a raw batch into pipeline-ready input.
pub trait PfPreprocessor: fmt::Debug + Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn process(&self, batch: PfBatch) -> Result<PfValue>;
}

/// Runs a preprocessor, reclassifying failures.
pub fn run_preprocessor(preprocessor: &dyn PfPreprocessor, batch: PfBatch) -> Result<PfValue> {
    preprocessor
        .process(batch)
        .map_err(|err| PfError::PreprocessorRuntime { source: err.into() })
}

/// Builds the preprocessor selected by `config.input_format`.
pub fn get_preprocessor(config: &PfBackendConfig) -> Result<Box<dyn PfPreprocessor>> {
    let preprocessor: Box<dyn PfPreprocessor> = match config.input_format {
        PfInputFormat::Records => Box::new(PfRecordsPreprocessor::new(config.clone())),
        PfInputFormat::Array => Box::new(PfArrayPreprocessor::new(config.clone())?),
        PfInputFormat::Passthrough => Box::new(PfPassthroughPreprocessor),
    };
    Ok(preprocessor)
}

/// Identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfPassthroughPreprocessor;

impl PfPreprocessor for PfPassthroughPreprocessor {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn process(&self, batch: PfBatch) -> Result<PfValue> {
        Ok(PfValue::records(batch))
    }
}

/// Flattens, renames, selects and re-nests each record.
///
/// Without renames, features or flattening the strategy behaves as a
/// passthrough. `flatten_lists` alone does not count: lists are only
/// enumerated as part of a flatten that happens for another reason.
#[derive(Debug, Clone)]
pub struct PfRecordsPreprocessor {
    config: PfBackendConfig,
    passthrough: bool,
}

impl PfRecordsPreprocessor {
    pub fn new(config: PfBackendConfig) -> Self {
        let passthrough = config.rename_fields.is_empty()
            && config.feature_names.is_empty()
            && !config.flatten_nested_inputs;
        if passthrough {
            log::info!(
                "Current config does not require preprocessing steps. Defaulting to Passthrough mode."
            );
        }
        PfRecordsPreprocessor { config, passthrough }
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    fn process_row(&self, row: &Value, index: usize) -> Result<Value> {
        let delimiter = self.config.nested_field_delimiter.as_str();
        let flat = flatten(expect_record(row, index)?, delimiter, self.config.flatten_lists);

        let mut processed = Map::new();
        for (old, new) in &self.config.rename_fields {
            processed.insert(new.clone(), flat.get(old).cloned().unwrap_or(Value::Null));
        }

        if self.config.feature_names.is_empty() {
            for (key, value) in flat {
                if self.config.rename_fields.contains_key(&key) || processed.contains_key(&key) {
                    continue;
                }
                processed.insert(key, value);
            }
        } else {
            for feature in &self.config.feature_names {
                if !processed.contains_key(feature) {
                    let value = flat.get(feature).cloned().unwrap_or(Value::Null);
                    processed.insert(feature.clone(), value);
                }
            }
        }

        let record: PfRecord = if self.config.flatten_nested_inputs {
            processed
        } else {
            unflatten(&processed, delimiter, self.config.flatten_lists)?
        };
        Ok(Value::Object(record))
    }

    #[cfg(not(feature = "parallel"))]
    fn process_rows(&self, batch: &[Value]) -> Result<Vec<Value>> {
        batch
            .iter()
            .enumerate()
            .map(|(index, row)| self.process_row(row, index))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn process_rows(&self, batch: &[Value]) -> Result<Vec<Value>> {
        use rayon::prelude::*;

        batch
            .par_iter()
            .enumerate()
            .map(|(index, row)| self.process_row(row, index))
            .collect()
    }
}

impl PfPreprocessor for PfRecordsPreprocessor {
    fn name(&self) -> &'static str {
        "records"
    }

    fn process(&self, batch: PfBatch) -> Result<PfValue> {
        if self.passthrough {
            return Ok(PfValue::records(batch));
        }
        self.process_rows(&batch).map(PfValue::records)
    }
}

/// Builds a feature matrix, one column per configured feature.
#[derive(Debug, Clone)]
pub struct PfArrayPreprocessor {
    config: PfBackendConfig,
    /// Source key for each feature, renames reversed.
    features: Vec<String>,
}

impl PfArrayPreprocessor {
    pub fn new(config: PfBackendConfig) -> Result<Self> {
        if config.feature_names.is_empty() {
            return Err(PfError::preprocessor_init(format!(
                "This preprocessor requires `feature_names` to be defined. Received config: {config:?}"
            )));
        }

        let features = config
            .feature_names
            .iter()
            .map(|feature| {
                config
                    .rename_fields
                    .iter()
                    .rev()
                    .find(|(_, new)| *new == feature)
                    .map(|(old, _)| old.clone())
                    .unwrap_or_else(|| feature.clone())
            })
            .collect();

        Ok(PfArrayPreprocessor { config, features })
    }

    /// Keys read from each record, in column order.
    pub fn source_features(&self) -> &[String] {
        &self.features
    }
}

impl PfPreprocessor for PfArrayPreprocessor {
    fn name(&self) -> &'static str {
        "array"
    }

    fn process(&self, batch: PfBatch) -> Result<PfValue> {
        let array: PfArray = records_to_array(
            &batch,
            &self.features,
            self.config.array_dtype,
            &self.config.nested_field_delimiter,
        )?;
        Ok(PfValue::foreign(array))
    }
}
