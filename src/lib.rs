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

//! # Packflow Library
//!
//! Packflow puts arbitrary inference or analysis code behind one
//! record-in/record-out contract, so the same backend can be validated,
//! profiled and moved between deployment harnesses unchanged.
//!
//! ## Module Overview
//!
//! - **record**: records, batches and JSON kind naming
//! - **value**: `PfValue`, the value passed between pipeline stages
//! - **nested**: flatten/unflatten of nested records, path lookup
//! - **config**: backend configuration and its override file
//! - **array**: feature matrices built from records
//! - **preprocessors**: passthrough, records and array input strategies
//! - **normalize**: conversion of foreign outputs into JSON records
//! - **backend**: the `PfBackend` trait and the execution pipeline
//! - **metrics**: per-call stage timings
//! - **validation**: contract checks run before deployment
//! - **project**: the `packflow.yaml` project descriptor
//! - **loader**: entry point registry
//!
//! ## Feature Flags
//!
//! - `arrow`: arrow2 series and frame outputs
//! - `image`: image outputs encoded as base64 PNG
//! - `parallel`: row preprocessing with Rayon
//! - `torch`: libtorch tensor outputs (needs a local libtorch)
//! - `full`: `arrow`, `image` and `parallel` (default)
//!
//! ## Error Handling
//!
//! Every fallible call returns `Result<T, PfError>`. Backend hooks return
//! `anyhow::Result`, and their failures are wrapped into the `PfError` variant
//! of the stage that ran them.
//!
//! ## Logging
//!
//! Packflow logs through the `log` facade and never installs a logger.

pub mod errors;
pub mod record;
pub mod value;
pub mod nested;
pub mod config;
pub mod array;
pub mod preprocessors;
pub mod normalize;
pub mod backend;
pub mod metrics;
pub mod validation;
pub mod project;
pub mod loader;

pub use errors::{PfError, Result};
pub use record::{PfBatch, PfRecord};
pub use value::{PfForeign, PfValue};
pub use nested::{flatten, flatten_records, get_field, unflatten};
pub use config::{
    load_backend_configuration, PfBackendConfig, PfConfigModel, PfInputFormat, BACKEND_CONFIG_ENV_VAR,
};
pub use array::{records_to_array, PfArray, PfArrayDtype};
pub use preprocessors::{get_preprocessor, PfPreprocessor};
pub use normalize::{ensure_native, ensure_valid_output, PfNormalizer, PfTypeHandler};
pub use backend::{PfBackend, PfCallable, PfInferenceBackend, PfStageFn};
pub use metrics::{PfExecutionMetrics, PfExecutionTimes};
pub use validation::PfValidator;
pub use project::{PfLoaderKind, PfProjectConfig};
pub use loader::{construct, inference_backend_parts, PfBackendRegistry};
