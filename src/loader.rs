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

//! # Backend Loader Module
//!
//! Resolves an entry point such as `models.churn:Backend` into a live backend.
//! Entry points are registered up front together with a factory; the factory
//! receives the constructor options and returns a ready backend.
//!
//! ```rust
//! use packflow::backend::PfBackend;
//! use packflow::config::PfBackendConfig;
//! use packflow::loader::{construct, PfBackendRegistry};
//! use packflow::value::PfValue;
//!
//! #[derive(Default)]
//! struct Echo;
//!
//! impl PfBackend for Echo {
//!     type Config = PfBackendConfig;
//!     fn execute(&self, inputs: PfValue) -> anyhow::Result<PfValue> {
//!         Ok(inputs)
//!     }
//! }
//!
//! let mut registry = PfBackendRegistry::new();
//! registry.register("inference:Backend", construct::<Echo>)?;
//! let backend = registry.load("inference:Backend", serde_json::json!({}))?;
//! # Ok::<(), packflow::errors::PfError>(())
//! ```
//!
//! Any failure (malformed entry point, unknown entry point, failing factory)
//! is reported as [`PfError::Load`] with the cause attached.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::backend::{PfBackend, PfCallable, PfInferenceBackend};
use crate::errors::{PfError, Result};
use crate::project::PfProjectConfig;

/// Builds a backend from constructor options.
pub type PfBackendFactory = fn(Value) -> anyhow::Result<Box<dyn PfCallable>>;

/// Factory for any default-constructible backend.
pub fn construct<B: PfBackend + Default>(kwargs: Value) -> anyhow::Result<Box<dyn PfCallable>> {
    Ok(Box::new(PfInferenceBackend::new(B::default(), kwargs)?))
}

/// Splits `module.path:Object` into its two parts.
pub fn inference_backend_parts(path: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = path.split(':').collect();
    match parts.as_slice() {
        [module, object] => Ok((module.to_string(), object.to_string())),
        _ => Err(PfError::load(format!(
            "Path must contain exactly one colon separating module and object, got '{path}'"
        ))),
    }
}

/// Entry point → factory.
#[derive(Debug, Default)]
pub struct PfBackendRegistry {
    factories: HashMap<String, PfBackendFactory>,
}

impl PfBackendRegistry {
    pub fn new() -> Self {
        PfBackendRegistry {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, entry_point: &str, factory: PfBackendFactory) -> Result<()> {
        inference_backend_parts(entry_point)?;
        if self.factories.insert(entry_point.to_string(), factory).is_some() {
            log::warn!("Replacing backend factory registered for {entry_point}");
        }
        Ok(())
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.contains_key(entry_point)
    }

    /// Registered entry points, sorted.
    pub fn entry_points(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolves `entry_point` and constructs the backend with `kwargs`.
    pub fn load(&self, entry_point: &str, kwargs: Value) -> Result<Box<dyn PfCallable>> {
        let (module, object) = inference_backend_parts(entry_point)?;
        let factory = self.factories.get(entry_point).copied().ok_or_else(|| {
            PfError::load(format!(
                "Backend with name `{object}` does not exist in module `{module}`"
            ))
        })?;
        factory(kwargs).map_err(|err| {
            PfError::load_with(
                format!("Unable to load inference backend `{entry_point}` with error: {err}"),
                err,
            )
        })
    }

    /// Reads the project descriptor in `project_dir` and loads its entry point.
    pub fn load_from_project(&self, project_dir: impl AsRef<Path>, kwargs: Value) -> Result<Box<dyn PfCallable>> {
        let project = PfProjectConfig::from_project_path(project_dir)?;
        log::debug!(
            "Loading {} from project {} with the {:?} loader",
            project.inference_backend,
            project.name,
            project.loader
        );
        self.load(&project.inference_backend, kwargs)
    }
}
