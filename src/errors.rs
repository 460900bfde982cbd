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

//! # Packflow Error Module
//!
//! This module defines the error taxonomy shared by every Packflow component.
//!
//! ## Error Categories
//!
//! - **Initialization**: user `initialize` code failed while constructing a backend
//! - **Runtime**: a pipeline stage failed, or the pipeline received/produced a
//!   value of the wrong shape
//! - **Validation**: inputs or outputs violate the record contract
//! - **PreprocessorInit**: the configuration is incompatible with the selected
//!   preprocessor
//! - **PreprocessorRuntime**: a preprocessing call failed
//! - **Load**: an entry point could not be resolved into a live backend
//! - **UnsupportedType**: output normalization met a type no handler converts
//! - **Config**: the merged configuration does not satisfy its schema
//!
//! A backend that crashed is `Runtime`; one that returned the wrong shape is
//! `Validation`.
//!
//! Every wrapping variant keeps the original failure as its `source()`.
//!
//! ## Usage
//!
//! ```rust
//! use packflow::errors::{PfError, Result};
//!
//! fn check(rows: usize, outputs: usize) -> Result<()> {
//!     if rows != outputs {
//!         return Err(PfError::validation("length mismatch"));
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

use thiserror::Error;

/// Convenience result type used throughout Packflow.
pub type Result<T> = std::result::Result<T, PfError>;

/// Canonical error enumeration for Packflow.
#[derive(Debug, Error)]
pub enum PfError {
    /// User initialization code failed; fatal to backend construction.
    #[error("Failed to initialize inference backend: {source}")]
    Initialization {
        #[source]
        source: anyhow::Error,
    },

    /// A pipeline stage failed or the pipeline saw a malformed value.
    #[error("{message}")]
    Runtime {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Inputs or outputs violate the record contract.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Configuration incompatible with the selected preprocessor.
    #[error("preprocessor init error: {message}")]
    PreprocessorInit { message: String },

    /// A preprocessing call failed.
    #[error("Failed to preprocess inputs with the following exception: {source}")]
    PreprocessorRuntime {
        #[source]
        source: anyhow::Error,
    },

    /// Failure to resolve an entry point into a live backend.
    #[error("load error: {message}")]
    Load {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Output normalization encountered a type with no registered handler.
    #[error(
        "Returned type \"{type_name}\" is not supported. Please convert this object to a native type in your backend."
    )]
    UnsupportedType { type_name: String },

    /// The merged configuration failed schema validation.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<io::Error> for PfError {
    fn from(err: io::Error) -> Self {
        PfError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PfError {
    fn from(err: serde_json::Error) -> Self {
        PfError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for PfError {
    fn from(err: serde_yaml::Error) -> Self {
        PfError::Serde(err.to_string())
    }
}

impl PfError {
    /// Runtime error without an underlying cause.
    pub fn runtime<T: Into<String>>(message: T) -> Self {
        PfError::Runtime {
            message: message.into(),
            source: None,
        }
    }

    /// Runtime error that keeps the failure that triggered it.
    pub fn runtime_with(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        PfError::Runtime {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Helper to construct validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        PfError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct preprocessor initialization errors.
    pub fn preprocessor_init<T: Into<String>>(message: T) -> Self {
        PfError::PreprocessorInit {
            message: message.into(),
        }
    }

    /// Helper to construct load errors.
    pub fn load<T: Into<String>>(message: T) -> Self {
        PfError::Load {
            message: message.into(),
            source: None,
        }
    }

    /// Load error that keeps the failure that triggered it.
    pub fn load_with(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        PfError::Load {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Helper to construct unsupported-type errors.
    pub fn unsupported_type<T: Into<String>>(type_name: T) -> Self {
        PfError::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Helper to construct configuration errors.
    pub fn config<T: Into<String>>(message: T) -> Self {
        PfError::Config {
            message: message.into(),
        }
    }
}
