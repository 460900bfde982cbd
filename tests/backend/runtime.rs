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

use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use packflow::array::PfArray;
use packflow::backend::{PfBackend, PfCallable, PfInferenceBackend, PfStageFn};
use packflow::config::{PfBackendConfig, PfConfigModel};
use packflow::errors::PfError;
use packflow::normalize::ensure_valid_output;
use packflow::value::PfValue;
use proptest::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};

fn quiet() -> Value {
    json!({"verbose": false})
}

struct Identity;

impl PfBackend for Identity {
    type Config = PfBackendConfig;

    fn execute(&self, inputs: PfValue) -> anyhow::Result<PfValue> {
        Ok(inputs)
    }
}

/// Sums feature columns of the array input and names the result.
#[derive(Default)]
struct RowSum {
    calls: AtomicUsize,
}

impl RowSum {
    fn to_records(&self, outputs: PfValue) -> anyhow::Result<PfValue> {
        Ok(PfValue::records(ensure_valid_output(outputs, "total")?))
    }
}

impl PfBackend for RowSum {
    type Config = PfBackendConfig;

    fn execute(&self, inputs: PfValue) -> anyhow::Result<PfValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let matrix = inputs
            .downcast_ref::<PfArray>()
            .ok_or_else(|| anyhow::anyhow!("expected a feature matrix"))?
            .to_f64()?;
        let sums: Vec<f64> = matrix.rows().into_iter().map(|row| row.sum()).collect();
        Ok(PfValue::from(sums))
    }

    fn transform_outputs() -> Option<PfStageFn<Self>> {
        Some(Self::to_records)
    }
}

struct Failing;

impl PfBackend for Failing {
    type Config = PfBackendConfig;

    fn execute(&self, _inputs: PfValue) -> anyhow::Result<PfValue> {
        anyhow::bail!("model exploded")
    }
}

struct NotASequence;

impl PfBackend for NotASequence {
    type Config = PfBackendConfig;

    fn execute(&self, _inputs: PfValue) -> anyhow::Result<PfValue> {
        Ok(PfValue::foreign(Array2::<f64>::zeros((1, 1))))
    }
}

struct BrokenInit;

impl PfBackend for BrokenInit {
    type Config = PfBackendConfig;

    fn initialize(&mut self, _config: &Self::Config) -> anyhow::Result<()> {
        anyhow::bail!("weights missing")
    }

    fn execute(&self, inputs: PfValue) -> anyhow::Result<PfValue> {
        Ok(inputs)
    }
}

#[derive(Debug, Deserialize)]
struct ScaleConfig {
    #[serde(flatten)]
    base: PfBackendConfig,
    factor: i64,
}

impl PfConfigModel for ScaleConfig {
    fn backend_config(&self) -> &PfBackendConfig {
        &self.base
    }
}

/// Multiplies field `x` by a configured factor, keeping a prepared copy.
#[derive(Default)]
struct Scale {
    factor: i64,
}

impl Scale {
    fn tag_inputs(&self, inputs: PfValue) -> anyhow::Result<PfValue> {
        let rows = inputs.into_json()?;
        let tagged = rows
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|row| json!({"x": row["x"].as_i64().unwrap_or(0), "seen": true}))
            .collect();
        Ok(PfValue::records(tagged))
    }
}

impl PfBackend for Scale {
    type Config = ScaleConfig;

    fn initialize(&mut self, config: &ScaleConfig) -> anyhow::Result<()> {
        self.factor = config.factor;
        Ok(())
    }

    fn execute(&self, inputs: PfValue) -> anyhow::Result<PfValue> {
        let rows = inputs.into_json()?;
        let scaled = rows
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|row| json!({"y": row["x"].as_i64().unwrap_or(0) * self.factor, "seen": row["seen"]}))
            .collect();
        Ok(PfValue::records(scaled))
    }

    fn transform_inputs() -> Option<PfStageFn<Self>> {
        Some(Self::tag_inputs)
    }
}

#[test]
fn identity_preserves_batches() {
    let backend = PfInferenceBackend::new(Identity, quiet()).unwrap();
    let batch = json!([{"a": 1}, {"b": {"c": [1, 2]}}]);
    let out = backend.call(batch.clone()).unwrap();
    assert_eq!(out.into_json().unwrap(), batch);
}

#[test]
fn scalar_input_fails_before_any_stage() {
    let backend = PfInferenceBackend::new(RowSum::default(), json!({"verbose": false, "input_format": "array", "feature_names": ["a"]})).unwrap();
    let err = backend.call(json!(5)).unwrap_err();
    assert!(matches!(err, PfError::Runtime { .. }));
    assert_eq!(backend.backend().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn array_pipeline_runs_all_configured_stages() {
    let backend = PfInferenceBackend::new(
        RowSum::default(),
        json!({"verbose": true, "input_format": "array", "feature_names": ["a", "b.c"]}),
    )
    .unwrap();
    let out = backend.call(json!([{"a": 1, "b": {"c": 2}}, {"a": 3}])).unwrap();
    let out = out.into_json().unwrap();
    assert_eq!(out[0], json!({"total": 3.0}));
    assert!(out[1]["total"].is_null());

    let metrics = backend.metrics().unwrap();
    assert_eq!(metrics.batch_size, 2);
    assert!(metrics.execution_times.transform_inputs.is_none());
    assert!(metrics.execution_times.transform_outputs.is_some());
    assert!(metrics.total_execution_time >= metrics.execution_times.execute);
}

#[test]
fn single_record_is_unwrapped() {
    let backend = PfInferenceBackend::new(
        RowSum::default(),
        json!({"verbose": false, "input_format": "array", "feature_names": ["a"]}),
    )
    .unwrap();
    let out = backend.call(json!({"a": 4})).unwrap();
    assert_eq!(out.into_json().unwrap(), json!({"total": 4.0}));
    assert_eq!(backend.metrics().unwrap().batch_size, 1);
}

#[test]
fn stage_failures_name_the_stage_and_keep_the_cause() {
    let backend = PfInferenceBackend::new(Failing, quiet()).unwrap();
    let err = backend.call(json!([{}])).unwrap_err();
    assert!(matches!(err, PfError::Runtime { .. }));
    assert!(err.to_string().starts_with("execute() failed with the following error: model exploded"));
    assert_eq!(err.source().unwrap().to_string(), "model exploded");
    assert!(backend.metrics().is_none());
}

#[test]
fn preprocess_failures_are_runtime_errors() {
    let backend = PfInferenceBackend::new(Identity, json!({"verbose": false, "feature_names": ["a"]})).unwrap();
    let err = backend.call(json!([1])).unwrap_err();
    assert!(err.to_string().starts_with("preprocess() failed"));
}

#[test]
fn non_sequence_outputs_are_rejected() {
    let backend = PfInferenceBackend::new(NotASequence, quiet()).unwrap();
    let err = backend.call(json!([{}])).unwrap_err();
    assert!(matches!(err, PfError::Runtime { .. }));
    assert!(err.to_string().contains("Array"));
}

#[test]
fn initialize_failures_abort_construction() {
    let err = PfInferenceBackend::new(BrokenInit, quiet()).unwrap_err();
    assert!(matches!(err, PfError::Initialization { .. }));
    assert!(err.to_string().contains("weights missing"));
}

#[test]
fn invalid_configuration_aborts_construction() {
    let err = PfInferenceBackend::new(Identity, json!({"input_format": "array"})).unwrap_err();
    assert!(matches!(err, PfError::PreprocessorInit { .. }));
}

#[test]
fn custom_schema_reaches_initialize_and_transform_inputs_runs() {
    let backend = PfInferenceBackend::new(Scale::default(), json!({"verbose": false, "factor": 3})).unwrap();
    assert_eq!(backend.config().factor, 3);
    let out = backend.call(json!([{"x": 2}, {"x": 5}])).unwrap();
    assert_eq!(out.into_json().unwrap(), json!([{"y": 6, "seen": true}, {"y": 15, "seen": true}]));
    assert!(backend.metrics().unwrap().execution_times.transform_inputs.is_some());
}

#[test]
fn callable_facade_and_validate_agree() {
    let backend = PfInferenceBackend::new(Identity, quiet()).unwrap();
    let callable: &dyn PfCallable = &backend;
    assert!(callable.ready());
    let via_facade = callable.call(json!([{"k": 1}])).unwrap().into_json().unwrap();
    assert_eq!(backend.validate(json!([{"k": 1}])).unwrap(), via_facade);
}

proptest! {
    #[test]
    fn identity_output_length_matches_input(len in 0usize..20) {
        let backend = PfInferenceBackend::new(Identity, quiet()).unwrap();
        let batch: Vec<Value> = (0..len).map(|i| json!({"i": i})).collect();
        let out = backend.call(Value::Array(batch)).unwrap();
        prop_assert_eq!(out.sequence_len(), Some(len));
    }
}
