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

//! # Packflow Value Module
//!
//! [`PfValue`] is the value that travels between pipeline stages. Stages are
//! free to hand each other anything: native JSON records, a feature matrix, a
//! tensor, an image, or a container mixing native and foreign entries.
//!
//! - `Json` holds a fully native tree. It is already serializable.
//! - `Map` and `Seq` are containers whose children may still be foreign.
//! - `Foreign` boxes an arbitrary Rust object together with its type name so
//!   errors can name the offending type.
//!
//! Sets have no variant of their own; converting a `HashSet` or `BTreeSet`
//! materializes a `Seq` in iteration order.

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::errors::{PfError, Result};
use crate::record::json_kind;

/// An arbitrary object produced by backend code.
pub struct PfForeign {
    type_name: &'static str,
    inner: Box<dyn Any + Send>,
}

impl PfForeign {
    pub fn new<T: Any + Send>(value: T) -> Self {
        PfForeign {
            type_name: std::any::type_name::<T>(),
            inner: Box::new(value),
        }
    }

    /// Fully qualified Rust type name of the boxed value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn as_any(&self) -> &dyn Any {
        self.inner.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Takes the boxed value back out, or returns `self` unchanged on a type mismatch.
    pub fn downcast<T: Any>(self) -> std::result::Result<T, Self> {
        let type_name = self.type_name;
        match self.inner.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(inner) => Err(PfForeign { type_name, inner }),
        }
    }
}

impl fmt::Debug for PfForeign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PfForeign({})", self.type_name)
    }
}

/// Dynamic value exchanged between pipeline stages.
#[derive(Debug)]
pub enum PfValue {
    Json(Value),
    Map(IndexMap<String, PfValue>),
    Seq(Vec<PfValue>),
    Foreign(PfForeign),
}

impl PfValue {
    /// Boxes any Rust object as a foreign value.
    pub fn foreign<T: Any + Send>(value: T) -> Self {
        PfValue::Foreign(PfForeign::new(value))
    }

    /// Wraps a batch of native rows.
    pub fn records(batch: Vec<Value>) -> Self {
        PfValue::Json(Value::Array(batch))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PfValue::Json(value) => json_kind(value),
            PfValue::Map(_) => "mapping",
            PfValue::Seq(_) => "sequence",
            PfValue::Foreign(foreign) => foreign.type_name(),
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, PfValue::Seq(_) | PfValue::Json(Value::Array(_)))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, PfValue::Map(_) | PfValue::Json(Value::Object(_)))
    }

    /// Number of elements when the value is a sequence.
    pub fn sequence_len(&self) -> Option<usize> {
        match self {
            PfValue::Seq(items) => Some(items.len()),
            PfValue::Json(Value::Array(items)) => Some(items.len()),
            _ => None,
        }
    }

    /// Splits a sequence into its elements; any other value is handed back.
    pub fn into_items(self) -> std::result::Result<Vec<PfValue>, PfValue> {
        match self {
            PfValue::Seq(items) => Ok(items),
            PfValue::Json(Value::Array(items)) => {
                Ok(items.into_iter().map(PfValue::Json).collect())
            }
            other => Err(other),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            PfValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            PfValue::Foreign(foreign) => foreign.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Strict JSON conversion without any capability handler.
    ///
    /// Fails on the first foreign value encountered; see
    /// [`crate::normalize::ensure_native`] for the converting variant.
    pub fn into_json(self) -> Result<Value> {
        match self {
            PfValue::Json(value) => Ok(value),
            PfValue::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key, value.into_json()?);
                }
                Ok(Value::Object(map))
            }
            PfValue::Seq(items) => items
                .into_iter()
                .map(PfValue::into_json)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            PfValue::Foreign(foreign) => Err(PfError::Serde(format!(
                "Object of type {} is not JSON serializable",
                foreign.type_name()
            ))),
        }
    }
}

impl From<Value> for PfValue {
    fn from(value: Value) -> Self {
        PfValue::Json(value)
    }
}

impl From<Map<String, Value>> for PfValue {
    fn from(map: Map<String, Value>) -> Self {
        PfValue::Json(Value::Object(map))
    }
}

impl From<PfForeign> for PfValue {
    fn from(foreign: PfForeign) -> Self {
        PfValue::Foreign(foreign)
    }
}

macro_rules! impl_scalar_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PfValue {
                fn from(value: $ty) -> Self {
                    PfValue::Json(Value::from(value))
                }
            }
        )*
    };
}

impl_scalar_from!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, &str);

impl<T: Into<PfValue>> From<Option<T>> for PfValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PfValue::Json(Value::Null), Into::into)
    }
}

impl<T: Into<PfValue>> From<Vec<T>> for PfValue {
    fn from(items: Vec<T>) -> Self {
        PfValue::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PfValue>> From<HashSet<T>> for PfValue {
    fn from(items: HashSet<T>) -> Self {
        PfValue::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PfValue>> From<BTreeSet<T>> for PfValue {
    fn from(items: BTreeSet<T>) -> Self {
        PfValue::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PfValue>> From<IndexMap<String, T>> for PfValue {
    fn from(entries: IndexMap<String, T>) -> Self {
        PfValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<PfValue>> From<HashMap<String, T>> for PfValue {
    fn from(entries: HashMap<String, T>) -> Self {
        PfValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
