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

//! # Inference Backend Module
//!
//! A backend is user code hidden behind a record-in/record-out contract.
//! [`PfInferenceBackend`] wraps a [`PfBackend`] implementation and runs every
//! call through four stages:
//!
//! ```text
//! preprocess -> transform_inputs? -> execute -> transform_outputs?
//! ```
//!
//! `preprocess` is driven by the resolved configuration. `execute` is the only
//! hook a backend must provide; the two transforms run only when the backend
//! returns them from [`PfBackend::transform_inputs`] and
//! [`PfBackend::transform_outputs`].
//!
//! ## Implementing a Backend
//!
//! ```rust
//! use packflow::backend::{PfBackend, PfInferenceBackend, PfStageFn};
//! use packflow::config::PfBackendConfig;
//! use packflow::normalize::ensure_valid_output;
//! use packflow::value::PfValue;
//! use serde_json::json;
//!
//! struct Scorer;
//!
//! impl Scorer {
//!     fn to_records(&self, outputs: PfValue) -> anyhow::Result<PfValue> {
//!         Ok(PfValue::records(ensure_valid_output(outputs, "score")?))
//!     }
//! }
//!
//! impl PfBackend for Scorer {
//!     type Config = PfBackendConfig;
//!
//!     fn execute(&self, inputs: PfValue) -> anyhow::Result<PfValue> {
//!         let rows = inputs.sequence_len().unwrap_or(0);
//!         Ok(PfValue::from(vec![0.5; rows]))
//!     }
//!
//!     fn transform_outputs() -> Option<PfStageFn<Self>> {
//!         Some(Self::to_records)
//!     }
//! }
//!
//! let backend = PfInferenceBackend::new(Scorer, json!({"verbose": false}))?;
//! let out = backend.call(json!([{"x": 1}]))?;
//! # Ok::<(), packflow::errors::PfError>(())
//! ```
//!
//! ## Errors
//!
//! - Inputs that are neither a mapping nor a sequence fail before any stage runs.
//! - A failing stage becomes [`PfError::Runtime`] naming the stage, with the
//!   original error as its source.
//! - A final value that is not a sequence is a runtime error naming its type.
//! - `initialize` failures surface as [`PfError::Initialization`] from the
//!   constructor.

use std::sync::Mutex;
use std::time::Instant;

use serde_json::Value;

use crate::config::{load_backend_configuration, PfConfigModel};
use crate::errors::{PfError, Result};
use crate::metrics::{duration_ms, PfExecutionMetrics, PfExecutionTimes};
use crate::preprocessors::{get_preprocessor, run_preprocessor, PfPreprocessor};
use crate::record::json_kind;
use crate::validation::PfValidator;
use crate::value::PfValue;

/// Signature of the optional transform hooks.
pub type PfStageFn<B> = fn(&B, PfValue) -> anyhow::Result<PfValue>;

/// User-provided inference code.
pub trait PfBackend: Send + Sync + Sized + 'static {
    /// Configuration schema; [`crate::config::PfBackendConfig`] unless extended.
    type Config: PfConfigModel;

    /// Runs once while the backend is constructed.
    fn initialize(&mut self, _config: &Self::Config) -> anyhow::Result<()> {
        Ok(())
    }

    /// Main inference step.
    fn execute(&self, inputs: PfValue) -> anyhow::Result<PfValue>;

    fn transform_inputs() -> Option<PfStageFn<Self>> {
        None
    }

    fn transform_outputs() -> Option<PfStageFn<Self>> {
        None
    }

    /// Whether the backend can take calls.
    fn ready(&self) -> bool {
        true
    }
}

/// Object-safe view of a constructed backend.
pub trait PfCallable: Send + Sync {
    fn call(&self, inputs: Value) -> Result<PfValue>;

    fn metrics(&self) -> Option<PfExecutionMetrics>;

    fn ready(&self) -> bool;
}

impl std::fmt::Debug for dyn PfCallable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PfCallable").field("ready", &self.ready()).finish()
    }
}

/// A backend bound to its configuration and preprocessor.
pub struct PfInferenceBackend<B: PfBackend> {
    backend: B,
    config: B::Config,
    preprocessor: Box<dyn PfPreprocessor>,
    transform_inputs: Option<PfStageFn<B>>,
    transform_outputs: Option<PfStageFn<B>>,
    metrics: Mutex<Option<PfExecutionMetrics>>,
}

impl<B: PfBackend> std::fmt::Debug for PfInferenceBackend<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PfInferenceBackend")
            .field("backend", &std::any::type_name::<B>())
            .field("config", &self.config)
            .field("preprocessor", &self.preprocessor)
            .finish()
    }
}

impl<B: PfBackend> PfInferenceBackend<B> {
    /// Resolves the configuration from `kwargs` and the environment, then
    /// initializes the backend.
    pub fn new(backend: B, kwargs: Value) -> Result<Self> {
        let config = load_backend_configuration::<B::Config>(kwargs)?;
        Self::with_config(backend, config)
    }

    /// Builds from an already resolved configuration.
    pub fn with_config(mut backend: B, config: B::Config) -> Result<Self> {
        let base = config.backend_config();
        base.validate()?;
        let preprocessor = get_preprocessor(base)?;

        let start = Instant::now();
        backend
            .initialize(&config)
            .map_err(|source| PfError::Initialization { source })?;
        if config.backend_config().verbose {
            log::info!(
                "Initialized {} in {:.4} ms",
                std::any::type_name::<B>(),
                duration_ms(start.elapsed())
            );
        }

        Ok(PfInferenceBackend {
            backend,
            config,
            preprocessor,
            transform_inputs: B::transform_inputs(),
            transform_outputs: B::transform_outputs(),
            metrics: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &B::Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Name of the preprocessor selected at construction.
    pub fn preprocessor_name(&self) -> &'static str {
        self.preprocessor.name()
    }

    pub fn ready(&self) -> bool {
        self.backend.ready()
    }

    /// Metrics of the last successful call.
    pub fn metrics(&self) -> Option<PfExecutionMetrics> {
        match self.metrics.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_metrics(&self, metrics: Option<PfExecutionMetrics>) {
        match self.metrics.lock() {
            Ok(mut slot) => *slot = metrics,
            Err(poisoned) => *poisoned.into_inner() = metrics,
        }
    }

    /// Runs the full pipeline on one record or a batch.
    ///
    /// A single record comes back as a single element.
    pub fn call(&self, inputs: Value) -> Result<PfValue> {
        let (batch, single_record) = match inputs {
            Value::Object(record) => (vec![Value::Object(record)], true),
            Value::Array(rows) => (rows, false),
            other => {
                return Err(PfError::runtime(format!(
                    "Inputs must be a mapping or a sequence of records. Type received: {}",
                    json_kind(&other)
                )))
            }
        };
        self.store_metrics(None);
        let batch_size = batch.len();
        let mut times = PfExecutionTimes::default();

        let (preprocessed, elapsed) = profile_stage("preprocess", || {
            run_preprocessor(self.preprocessor.as_ref(), batch).map_err(anyhow::Error::from)
        })?;
        times.preprocess = elapsed;

        let features = match self.transform_inputs {
            Some(hook) => {
                let (features, elapsed) =
                    profile_stage("transform_inputs", || hook(&self.backend, preprocessed))?;
                times.transform_inputs = Some(elapsed);
                features
            }
            None => preprocessed,
        };

        let (results, elapsed) = profile_stage("execute", || self.backend.execute(features))?;
        times.execute = elapsed;

        let outputs = match self.transform_outputs {
            Some(hook) => {
                let (outputs, elapsed) =
                    profile_stage("transform_outputs", || hook(&self.backend, results))?;
                times.transform_outputs = Some(elapsed);
                outputs
            }
            None => results,
        };

        if !outputs.is_sequence() {
            return Err(PfError::runtime(format!(
                "Output of inference backend is not a sequence. Received type: {}",
                outputs.type_name()
            )));
        }

        let outputs = if single_record {
            first_item(outputs)?
        } else {
            outputs
        };

        let metrics = PfExecutionMetrics::new(batch_size, times);
        if self.config.backend_config().verbose {
            match serde_json::to_string(&metrics) {
                Ok(snapshot) => log::info!("{snapshot}"),
                Err(_) => log::info!("{metrics:?}"),
            }
        }
        self.store_metrics(Some(metrics));

        Ok(outputs)
    }

    /// Runs the validation harness against this backend.
    pub fn validate(&self, inputs: Value) -> Result<Value> {
        PfValidator::new(self).run(inputs)
    }
}

impl<B: PfBackend> PfCallable for PfInferenceBackend<B> {
    fn call(&self, inputs: Value) -> Result<PfValue> {
        PfInferenceBackend::call(self, inputs)
    }

    fn metrics(&self) -> Option<PfExecutionMetrics> {
        PfInferenceBackend::metrics(self)
    }

    fn ready(&self) -> bool {
        PfInferenceBackend::ready(self)
    }
}

/// Times one stage and wraps its failure with the stage name.
fn profile_stage<F>(stage: &str, step: F) -> Result<(PfValue, f64)>
where
    F: FnOnce() -> anyhow::Result<PfValue>,
{
    let start = Instant::now();
    let output = step().map_err(|err| {
        PfError::runtime_with(format!("{stage}() failed with the following error: {err}"), err)
    })?;
    Ok((output, duration_ms(start.elapsed())))
}

fn first_item(outputs: PfValue) -> Result<PfValue> {
    let items = outputs
        .into_items()
        .map_err(|other| PfError::runtime(format!("expected a sequence, found {}", other.type_name())))?;
    items
        .into_iter()
        .next()
        .ok_or_else(|| PfError::runtime("Inference backend returned no output for a single record input"))
}
