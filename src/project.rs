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

//! # Project Descriptor Module
//!
//! A project directory carries a `packflow.yaml` descriptor:
//!
//! ```yaml
//! # metadata
//! name: churn-model
//! version: "1.2.0"
//! description: Scores churn risk
//! maintainers: [ml-team]
//!
//! # runtime
//! inference_backend: models.churn:Backend
//! loader: local
//! ```
//!
//! `name` is normalized (`-` becomes `_`, surrounding `_` trimmed) and must then
//! consist of letters and underscores only. `inference_backend` must hold
//! exactly one colon. Keys outside the known set are kept in `extra`.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PfError, Result};

/// Descriptor file name inside a project directory.
pub const PROJECT_CONFIG_NAME: &str = "packflow.yaml";

/// How the entry point is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PfLoaderKind {
    /// Backend code shipped inside the project.
    #[default]
    Local,
    /// Backend code provided by an installed module.
    Module,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PfProjectConfig {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub maintainers: Vec<String>,

    #[serde(default = "default_inference_backend")]
    pub inference_backend: String,
    #[serde(default)]
    pub loader: PfLoaderKind,
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn default_inference_backend() -> String {
    "inference:Backend".to_string()
}

fn default_runtime_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

type PfPattern = std::result::Result<Regex, regex::Error>;

fn compiled(slot: &'static OnceLock<PfPattern>, pattern: &str) -> Result<&'static Regex> {
    slot.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|err| PfError::config(format!("invalid descriptor pattern '{pattern}': {err}")))
}

fn name_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<PfPattern> = OnceLock::new();
    compiled(&PATTERN, r"^[A-Za-z_]+$")
}

fn entry_point_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<PfPattern> = OnceLock::new();
    compiled(&PATTERN, r"^[^:]+:[^:]+$")
}

/// `-` → `_`, then surrounding underscores trimmed.
pub fn normalize_name(name: &str) -> String {
    name.replace('-', "_").trim_matches('_').to_string()
}

impl PfProjectConfig {
    /// Descriptor with defaults for everything but the name.
    pub fn new(name: &str) -> Result<Self> {
        let mut config = PfProjectConfig {
            name: name.to_string(),
            version: String::new(),
            description: String::new(),
            maintainers: Vec::new(),
            inference_backend: default_inference_backend(),
            loader: PfLoaderKind::default(),
            runtime_version: default_runtime_version(),
            extra: IndexMap::new(),
        };
        config.normalize()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut config: PfProjectConfig = serde_yaml::from_str(text)
            .map_err(|err| PfError::config(format!("invalid project descriptor: {err}")))?;
        config.normalize()?;
        Ok(config)
    }

    /// Reads `packflow.yaml` from `base_dir`.
    pub fn from_project_path(base_dir: impl AsRef<Path>) -> Result<Self> {
        let path = base_dir.as_ref().join(PROJECT_CONFIG_NAME);
        let text = fs::read_to_string(&path).map_err(|err| {
            PfError::Io(format!(
                "Not a valid packflow project: {} does not exist ({err})",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    fn normalize(&mut self) -> Result<()> {
        self.name = normalize_name(&self.name);
        if !name_pattern()?.is_match(&self.name) {
            return Err(PfError::config(format!(
                "project name '{}' must contain only letters and underscores",
                self.name
            )));
        }
        if !entry_point_pattern()?.is_match(&self.inference_backend) {
            return Err(PfError::config(format!(
                "inference_backend '{}' must look like 'module.path:Object'",
                self.inference_backend
            )));
        }
        Ok(())
    }
}
