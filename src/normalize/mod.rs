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

//! # Output Normalization Module
//!
//! Backends may return matrices, tensors, data frames or images. This module
//! coerces such values into plain JSON so outputs can leave the process.
//!
//! ## Conversion Order
//!
//! [`ensure_native`] works depth-first:
//!
//! 1. Native JSON is returned unchanged.
//! 2. A foreign value is offered to every available handler in priority order
//!    (array-like, arrow series, arrow frame, tensor scalar, tensor, image).
//!    The first handler whose type test passes converts it.
//! 3. Mappings and sequences are rebuilt with their children converted.
//! 4. Anything left fails with [`PfError::UnsupportedType`].
//!
//! Handlers whose cargo feature is disabled stay registered but report
//! themselves unavailable and are skipped.
//!
//! ## Output Records
//!
//! [`ensure_valid_output`] turns one converted value per row into a record,
//! wrapping non-mappings under a parent key:
//!
//! ```text
//! [0, 1]      -> [{"prediction": 0}, {"prediction": 1}]
//! [[5], {..}] -> [{"prediction": 5}, {..}]
//! ```

pub mod handlers;

use std::any::Any;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::errors::{PfError, Result};
use crate::record::json_kind;
use crate::value::PfValue;

pub use handlers::{
    PfArrayLikeHandler, PfArrowFrameHandler, PfArrowSeriesHandler, PfImageHandler,
    PfTensorHandler, PfTensorScalarHandler,
};

/// Parent key used when the caller does not name one.
pub const DEFAULT_PARENT_KEY: &str = "output";

/// Converts one family of foreign types into JSON.
pub trait PfTypeHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the library backing this handler was compiled in.
    fn available(&self) -> bool {
        true
    }

    fn is_type(&self, obj: &dyn Any) -> bool;

    fn convert(&self, obj: &dyn Any) -> Result<Value>;
}

/// Ordered set of available handlers.
pub struct PfNormalizer {
    handlers: Vec<Box<dyn PfTypeHandler>>,
}

impl Default for PfNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PfNormalizer {
    /// Built-in handlers, in priority order, filtered by availability.
    pub fn new() -> Self {
        let builtin: Vec<Box<dyn PfTypeHandler>> = vec![
            Box::new(PfArrayLikeHandler),
            Box::new(PfArrowSeriesHandler),
            Box::new(PfArrowFrameHandler),
            Box::new(PfTensorScalarHandler),
            Box::new(PfTensorHandler),
            Box::new(PfImageHandler),
        ];
        let mut normalizer = PfNormalizer {
            handlers: Vec::with_capacity(builtin.len()),
        };
        for handler in builtin {
            normalizer = normalizer.with_handler(handler);
        }
        normalizer
    }

    /// Appends a handler after the existing ones.
    pub fn with_handler(mut self, handler: Box<dyn PfTypeHandler>) -> Self {
        if handler.available() {
            self.handlers.push(handler);
        } else {
            log::debug!("{} type converter is not available in this build", handler.name());
        }
        self
    }

    /// Names of the active handlers, in the order they are tried.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    pub fn ensure_native(&self, value: PfValue) -> Result<Value> {
        match value {
            PfValue::Json(value) => Ok(value),
            PfValue::Foreign(foreign) => {
                let obj = foreign.as_any();
                match self.handlers.iter().find(|handler| handler.is_type(obj)) {
                    Some(handler) => handler.convert(obj),
                    None => Err(PfError::unsupported_type(foreign.type_name())),
                }
            }
            PfValue::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key, self.ensure_native(value)?);
                }
                Ok(Value::Object(map))
            }
            PfValue::Seq(items) => items
                .into_iter()
                .map(|item| self.ensure_native(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }

    pub fn ensure_valid_output(&self, output: PfValue, parent_key: &str) -> Result<Vec<Value>> {
        let rows = match output.into_items() {
            Ok(items) => items
                .into_iter()
                .map(|item| self.ensure_native(item))
                .collect::<Result<Vec<_>>>()?,
            Err(other) => match self.ensure_native(other)? {
                Value::Array(rows) => rows,
                value => {
                    return Err(PfError::validation(format!(
                        "Output must be a sequence of rows, found {}",
                        json_kind(&value)
                    )))
                }
            },
        };
        Ok(rows.into_iter().map(|row| wrap_row(row, parent_key)).collect())
    }
}

fn wrap_row(row: Value, parent_key: &str) -> Value {
    match row {
        Value::Object(_) => row,
        Value::Array(mut items) if items.len() == 1 => {
            let mut record = Map::with_capacity(1);
            record.insert(parent_key.to_string(), items.remove(0));
            Value::Object(record)
        }
        other => {
            let mut record = Map::with_capacity(1);
            record.insert(parent_key.to_string(), other);
            Value::Object(record)
        }
    }
}

/// Process-wide normalizer with the built-in handlers, built on first use.
pub fn default_normalizer() -> &'static PfNormalizer {
    static NORMALIZER: OnceLock<PfNormalizer> = OnceLock::new();
    NORMALIZER.get_or_init(PfNormalizer::new)
}

/// Recursively converts `value` into native JSON.
pub fn ensure_native(value: impl Into<PfValue>) -> Result<Value> {
    default_normalizer().ensure_native(value.into())
}

/// Converts every row of `output` and wraps non-mappings under `parent_key`.
pub fn ensure_valid_output(output: impl Into<PfValue>, parent_key: &str) -> Result<Vec<Value>> {
    default_normalizer().ensure_valid_output(output.into(), parent_key)
}
