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

use std::fs;
use std::sync::Mutex;

use packflow::config::{
    deep_merge, load_backend_configuration, load_overrides, resolve_configs, resolve_with_overrides,
    PfBackendConfig, PfConfigModel, PfInputFormat, BACKEND_CONFIG_ENV_VAR,
};
use packflow::errors::PfError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

/// Tests touching the override environment variable run one at a time.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn with_override_file<T>(contents: Option<(&str, &str)>, run: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let dir = TempDir::new().unwrap();
    match contents {
        Some((name, body)) => {
            let path = dir.path().join(name);
            fs::write(&path, body).unwrap();
            std::env::set_var(BACKEND_CONFIG_ENV_VAR, &path);
        }
        None => std::env::remove_var(BACKEND_CONFIG_ENV_VAR),
    }
    let out = run();
    std::env::remove_var(BACKEND_CONFIG_ENV_VAR);
    out
}

#[derive(Debug, Deserialize)]
struct ThresholdConfig {
    #[serde(flatten)]
    base: PfBackendConfig,
    threshold: f64,
}

impl PfConfigModel for ThresholdConfig {
    fn backend_config(&self) -> &PfBackendConfig {
        &self.base
    }
}

#[test]
fn no_override_source_uses_kwargs() {
    let config: PfBackendConfig = with_override_file(None, || {
        load_backend_configuration::<PfBackendConfig>(json!({"flatten_nested_inputs": true, "feature_names": ["bar"]}))
            .unwrap()
    });
    assert_eq!(
        config,
        PfBackendConfig {
            flatten_nested_inputs: true,
            feature_names: vec!["bar".to_string()],
            ..Default::default()
        }
    );
}

#[test]
fn override_file_wins_over_kwargs() {
    let body = r#"{"configs": {"feature_names": ["foo.bar", "baz.zip"], "verbose": false}}"#;
    let config: PfBackendConfig = with_override_file(Some(("valid-config.json", body)), || {
        load_backend_configuration::<PfBackendConfig>(json!({"flatten_nested_inputs": true, "feature_names": ["bar"]}))
            .unwrap()
    });
    assert!(config.flatten_nested_inputs);
    assert!(!config.verbose);
    assert_eq!(config.feature_names, vec!["foo.bar".to_string(), "baz.zip".to_string()]);
}

#[test]
fn yaml_override_files_are_accepted() {
    let body = "configs:\n  input_format: numpy\n  feature_names: [a]\n";
    let merged = with_override_file(Some(("overrides.yaml", body)), || resolve_configs(json!({})).unwrap());
    assert_eq!(merged, json!({"input_format": "numpy", "feature_names": ["a"]}));
}

#[test]
fn missing_wrapper_key_degrades_to_kwargs() {
    let body = r#"{"feature_names": ["ignored"]}"#;
    let merged = with_override_file(Some(("invalid-config.json", body)), || {
        resolve_configs(json!({"verbose": true})).unwrap()
    });
    assert_eq!(merged, json!({"verbose": true}));
}

#[test]
fn malformed_file_degrades_to_kwargs() {
    let merged = with_override_file(Some(("broken.json", "{not json")), || {
        resolve_configs(json!({"verbose": true})).unwrap()
    });
    assert_eq!(merged, json!({"verbose": true}));
}

#[test]
fn nonexistent_path_degrades_to_defaults() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::env::set_var(BACKEND_CONFIG_ENV_VAR, "nonexistent.json");
    let config: PfBackendConfig = load_backend_configuration(Value::Null).unwrap();
    std::env::remove_var(BACKEND_CONFIG_ENV_VAR);
    assert_eq!(config, PfBackendConfig::default());
}

#[test]
fn load_overrides_reads_the_configs_mapping() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("configs.json");
    fs::write(&path, r#"{"configs": {"rename_fields": {"a": "b"}}}"#).unwrap();
    let overrides = load_overrides(&path);
    assert_eq!(Value::Object(overrides), json!({"rename_fields": {"a": "b"}}));
}

#[test]
fn nested_mappings_merge_and_sequences_replace() {
    let mut overrides = Map::new();
    overrides.insert("rename_fields".to_string(), json!({"b": "y"}));
    overrides.insert("feature_names".to_string(), json!(["y"]));
    let merged = resolve_with_overrides(
        json!({"rename_fields": {"a": "x"}, "feature_names": ["x", "z"]}),
        overrides,
    )
    .unwrap();
    assert_eq!(merged, json!({"rename_fields": {"a": "x", "b": "y"}, "feature_names": ["y"]}));
    assert_eq!(deep_merge(json!([1, 2]), json!([3])), json!([3]));
}

#[test]
fn extended_schema_requires_its_fields() {
    let err = with_override_file(None, || {
        load_backend_configuration::<ThresholdConfig>(json!({"verbose": false})).unwrap_err()
    });
    assert!(matches!(err, PfError::Config { .. }));

    let config: ThresholdConfig = with_override_file(None, || {
        load_backend_configuration::<ThresholdConfig>(json!({"threshold": 0.7, "input_format": "passthrough"}))
            .unwrap()
    });
    assert_eq!(config.threshold, 0.7);
    assert_eq!(config.backend_config().input_format, PfInputFormat::Passthrough);
}
