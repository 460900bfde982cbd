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

use std::time::Duration;

use packflow::backend::{PfBackend, PfInferenceBackend};
use packflow::config::PfBackendConfig;
use packflow::errors::PfError;
use packflow::validation::PfValidator;
use packflow::value::PfValue;
use serde_json::{json, Value};

/// Returns whatever it was built with, ignoring inputs.
struct Canned(fn() -> PfValue);

impl PfBackend for Canned {
    type Config = PfBackendConfig;

    fn execute(&self, _inputs: PfValue) -> anyhow::Result<PfValue> {
        Ok((self.0)())
    }
}

struct Crashing;

impl PfBackend for Crashing {
    type Config = PfBackendConfig;

    fn execute(&self, _inputs: PfValue) -> anyhow::Result<PfValue> {
        anyhow::bail!("division by zero")
    }
}

fn canned(output: fn() -> PfValue) -> PfInferenceBackend<Canned> {
    PfInferenceBackend::new(Canned(output), json!({"verbose": false})).unwrap()
}

#[test]
fn matching_outputs_pass() {
    let backend = canned(|| PfValue::records(vec![json!({"score": 0.1}), json!({"score": 0.9})]));
    let out = backend.validate(json!([{"x": 1}, {"x": 2}])).unwrap();
    assert_eq!(out, json!([{"score": 0.1}, {"score": 0.9}]));
}

#[test]
fn extra_outputs_fail_with_both_counts() {
    let backend = canned(|| PfValue::records(vec![json!({}), json!({})]));
    let err = backend.validate(json!([{}])).unwrap_err();
    assert!(matches!(err, PfError::Validation { .. }));
    assert!(err
        .to_string()
        .contains("Inputs and Outputs must have matching lengths. Received 1 inputs and returned 2 outputs."));
}

#[test]
fn non_mapping_elements_fail() {
    let backend = canned(|| PfValue::records(vec![json!({"ok": true}), json!(7)]));
    let err = backend.validate(json!([{}, {}])).unwrap_err();
    assert!(matches!(err, PfError::Validation { .. }));
    assert!(err.to_string().contains("index 1"));
}

#[test]
fn unserializable_values_fail() {
    let backend = canned(|| {
        let mut row = indexmap::IndexMap::new();
        row.insert("elapsed".to_string(), PfValue::foreign(Duration::from_secs(1)));
        PfValue::from(vec![PfValue::from(row)])
    });
    let err = backend.validate(json!([{}])).unwrap_err();
    assert!(matches!(err, PfError::Validation { .. }));
    assert!(err.to_string().contains("is not JSON Serializable"));
}

#[test]
fn backend_failures_are_not_validation_issues() {
    let backend = PfInferenceBackend::new(Crashing, json!({"verbose": false})).unwrap();
    let err = PfValidator::new(&backend).run(json!([{"x": 1}])).unwrap_err();
    assert!(matches!(err, PfError::Runtime { .. }));
    assert!(err.to_string().contains("This is not a validation issue."));
}

#[test]
fn list_inputs_are_required() {
    let backend = canned(|| PfValue::records(Vec::new()));
    let err = backend.validate(json!("text")).unwrap_err();
    assert!(err.to_string().contains("Production inputs will be in a list format"));
}

#[test]
fn single_record_validates_as_one_element_batch() {
    let backend = canned(|| PfValue::records(vec![json!({"label": "spam"})]));
    let out: Value = backend.validate(json!({"text": "buy now"})).unwrap();
    assert_eq!(out, json!({"label": "spam"}));
}
