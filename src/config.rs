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

//! # Backend Configuration Module
//!
//! Resolves the configuration a backend instance runs with. Resolution happens
//! once, at construction:
//!
//! 1. Constructor options (`kwargs`) form the base document.
//! 2. Overrides are read from the file named by [`BACKEND_CONFIG_ENV_VAR`]. The
//!    file holds a top-level `"configs"` mapping; JSON by default, YAML when the
//!    extension is `.yaml` or `.yml`.
//! 3. The two are deep-merged, overrides winning at every key.
//! 4. The merged document is deserialized into the target schema. Serde
//!    defaults fill optional fields; a missing required field is fatal.
//!
//! An absent, unreadable or malformed override file never fails resolution. It
//! is logged and treated as "no overrides".
//!
//! ## Custom schemas
//!
//! ```rust
//! use packflow::config::{PfBackendConfig, PfConfigModel};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct ScorerConfig {
//!     #[serde(flatten)]
//!     base: PfBackendConfig,
//!     threshold: f64,
//! }
//!
//! impl PfConfigModel for ScorerConfig {
//!     fn backend_config(&self) -> &PfBackendConfig {
//!         &self.base
//!     }
//! }
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::array::PfArrayDtype;
use crate::errors::{PfError, Result};

/// Environment variable naming the override file.
pub const BACKEND_CONFIG_ENV_VAR: &str = "PACKFLOW_BACKEND_CONFIG";

/// Top-level key of the override document.
pub const OVERRIDES_KEY: &str = "configs";

/// Representation the preprocessor hands to the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PfInputFormat {
    Passthrough,
    #[default]
    Records,
    #[serde(alias = "numpy")]
    Array,
}

/// Options every backend understands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PfBackendConfig {
    /// Log initialization timing and per-call metrics.
    pub verbose: bool,
    pub input_format: PfInputFormat,
    /// Old key → new key.
    pub rename_fields: IndexMap<String, String>,
    /// Ordered feature list; defines column order for arrays.
    pub feature_names: Vec<String>,
    pub flatten_nested_inputs: bool,
    pub flatten_lists: bool,
    pub nested_field_delimiter: String,
    /// Element type for array inputs; inferred when unset.
    pub array_dtype: Option<PfArrayDtype>,
}

impl Default for PfBackendConfig {
    fn default() -> Self {
        PfBackendConfig {
            verbose: true,
            input_format: PfInputFormat::Records,
            rename_fields: IndexMap::new(),
            feature_names: Vec::new(),
            flatten_nested_inputs: false,
            flatten_lists: false,
            nested_field_delimiter: ".".to_string(),
            array_dtype: None,
        }
    }
}

impl PfBackendConfig {
    /// Checks constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.nested_field_delimiter.is_empty() {
            return Err(PfError::config("nested_field_delimiter must not be empty"));
        }
        Ok(())
    }
}

/// A configuration schema a backend can declare.
///
/// Extension schemas embed [`PfBackendConfig`] (usually via
/// `#[serde(flatten)]`) and expose it through [`PfConfigModel::backend_config`].
pub trait PfConfigModel: DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    fn backend_config(&self) -> &PfBackendConfig;
}

impl PfConfigModel for PfBackendConfig {
    fn backend_config(&self) -> &PfBackendConfig {
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MergeStrategy {
    Merge,
    Override,
}

/// Per-type strategies; the first predicate that holds for both sides wins.
const MERGE_STRATEGIES: &[(fn(&Value) -> bool, MergeStrategy)] = &[
    (Value::is_object, MergeStrategy::Merge),
    (Value::is_array, MergeStrategy::Override),
];

fn strategy_for(base: &Value, overrides: &Value) -> MergeStrategy {
    MERGE_STRATEGIES
        .iter()
        .find(|(applies, _)| applies(base) && applies(overrides))
        .map(|(_, strategy)| *strategy)
        .unwrap_or(MergeStrategy::Override)
}

/// Deep-merges `overrides` into `base`.
///
/// Mappings merge key by key; every other pairing, sequences included, is
/// replaced wholesale by the override.
pub fn deep_merge(base: Value, overrides: Value) -> Value {
    match strategy_for(&base, &overrides) {
        MergeStrategy::Merge => match (base, overrides) {
            (Value::Object(mut merged), Value::Object(incoming)) => {
                for (key, value) in incoming {
                    let next = match merged.remove(&key) {
                        Some(existing) => deep_merge(existing, value),
                        None => value,
                    };
                    merged.insert(key, next);
                }
                Value::Object(merged)
            }
            (_, overrides) => overrides,
        },
        MergeStrategy::Override => overrides,
    }
}

/// Reads the `"configs"` mapping of an override file.
///
/// Every failure degrades to an empty mapping with a log entry.
pub fn load_overrides(path: &Path) -> Map<String, Value> {
    if !path.exists() {
        log::error!(
            "Falling back to empty configuration. Reason: Configuration file does not exist at provided path {}",
            path.display()
        );
        return Map::new();
    }

    let document = match read_document(path) {
        Ok(document) => document,
        Err(err) => {
            log::error!("Falling back to empty configuration. Reason: Exception encountered: {err}");
            return Map::new();
        }
    };
    log::debug!("Loaded overrides from {}: {document}", path.display());

    match document.get(OVERRIDES_KEY) {
        Some(Value::Object(configs)) => configs.clone(),
        Some(other) => {
            log::warn!(
                "Falling back to empty configuration. Reason: \"{OVERRIDES_KEY}\" must be a mapping, found {other}"
            );
            Map::new()
        }
        None => {
            log::warn!(
                "Falling back to empty configuration. Reason: Loaded config does not contain \"{OVERRIDES_KEY}\" parent key."
            );
            Map::new()
        }
    }
}

fn read_document(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if is_yaml {
        Ok(serde_yaml::from_str(&text)?)
    } else {
        Ok(serde_json::from_str(&text)?)
    }
}

/// Overrides named by [`BACKEND_CONFIG_ENV_VAR`], or nothing when it is unset.
pub fn load_overrides_from_env() -> Map<String, Value> {
    match std::env::var(BACKEND_CONFIG_ENV_VAR) {
        Ok(path) if !path.is_empty() => load_overrides(Path::new(&path)),
        _ => Map::new(),
    }
}

/// Merges constructor options with an explicit override mapping.
pub fn resolve_with_overrides(kwargs: Value, overrides: Map<String, Value>) -> Result<Value> {
    let base = match kwargs {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(PfError::config(format!(
                "backend options must be a mapping, found {other}"
            )))
        }
    };
    Ok(deep_merge(base, Value::Object(overrides)))
}

/// Merges constructor options with the environment's override file.
pub fn resolve_configs(kwargs: Value) -> Result<Value> {
    resolve_with_overrides(kwargs, load_overrides_from_env())
}

/// Deserializes a merged document into schema `C`.
pub fn validate_config<C: PfConfigModel>(merged: Value) -> Result<C> {
    let config: C = serde_json::from_value(merged)
        .map_err(|err| PfError::config(format!("invalid backend configuration: {err}")))?;
    config.backend_config().validate()?;
    log::info!("Configuration: {config:?}");
    Ok(config)
}

/// Full resolution: environment overrides, deep merge, schema validation.
pub fn load_backend_configuration<C: PfConfigModel>(kwargs: Value) -> Result<C> {
    let merged = resolve_configs(kwargs)?;
    log::debug!("Loaded raw configuration: {merged}");
    validate_config(merged)
}
