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

//! # Nested-Field Codec
//!
//! Converts between nested records and flat records whose keys are path
//! segments joined by a delimiter.
//!
//! ```text
//! {"foo": {"bar": 0, "baz": [1]}}
//!     flatten(":")                -> {"foo:bar": 0, "foo:baz": [1]}
//!     flatten(":", lists = true)  -> {"foo:bar": 0, "foo:baz:0": 1}
//! ```
//!
//! Empty mappings and sequences survive as leaves so shapes round-trip.
//! `unflatten` takes the same `lists` switch as `flatten`: only when lists were
//! enumerated is a mapping whose keys are exactly `0..n` rebuilt as a sequence
//! in index order. Otherwise digit keys stay mapping keys.

use serde_json::{Map, Value};

use crate::errors::{PfError, Result};
use crate::record::{expect_record, json_kind, PfRecord};

/// Flattens one record into delimiter-joined keys.
pub fn flatten(tree: &PfRecord, delimiter: &str, flatten_lists: bool) -> PfRecord {
    let mut flat = Map::new();
    for (key, value) in tree {
        flatten_into(&mut flat, key.clone(), value, delimiter, flatten_lists);
    }
    flat
}

fn flatten_into(
    flat: &mut PfRecord,
    path: String,
    value: &Value,
    delimiter: &str,
    flatten_lists: bool,
) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(flat, join(&path, key, delimiter), child, delimiter, flatten_lists);
            }
        }
        Value::Array(items) if flatten_lists && !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                let segment = index.to_string();
                flatten_into(flat, join(&path, &segment, delimiter), child, delimiter, flatten_lists);
            }
        }
        leaf => {
            flat.insert(path, leaf.clone());
        }
    }
}

fn join(prefix: &str, segment: &str, delimiter: &str) -> String {
    let mut joined = String::with_capacity(prefix.len() + delimiter.len() + segment.len());
    joined.push_str(prefix);
    joined.push_str(delimiter);
    joined.push_str(segment);
    joined
}

/// Flattens every row of a batch; rows must be mappings.
pub fn flatten_records(batch: &[Value], delimiter: &str, flatten_lists: bool) -> Result<Vec<Value>> {
    batch
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let record = expect_record(row, index)?;
            Ok(Value::Object(flatten(record, delimiter, flatten_lists)))
        })
        .collect()
}

/// Rebuilds a nested record from delimiter-joined keys.
///
/// Pass the `flatten_lists` value used to produce `flat`. Fails when two keys
/// disagree about the shape of a path, e.g. `a` holding a scalar while `a.b`
/// expects `a` to be a mapping.
pub fn unflatten(flat: &PfRecord, delimiter: &str, flatten_lists: bool) -> Result<PfRecord> {
    let mut root = Map::new();
    for (key, value) in flat {
        let segments: Vec<&str> = key.split(delimiter).collect();
        insert_path(&mut root, &segments, value.clone(), key)?;
    }
    if !flatten_lists {
        return Ok(root);
    }
    Ok(root
        .into_iter()
        .map(|(key, value)| (key, rebuild_sequences(value)))
        .collect())
}

fn insert_path(node: &mut PfRecord, segments: &[&str], value: Value, full_key: &str) -> Result<()> {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Ok(()),
    };

    if rest.is_empty() {
        if let Some(existing) = node.get(*head) {
            return Err(collision(full_key, existing));
        }
        node.insert((*head).to_string(), value);
        return Ok(());
    }

    let child = node
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match child {
        Value::Object(map) => insert_path(map, rest, value, full_key),
        other => Err(PfError::validation(format!(
            "cannot unflatten key '{full_key}': segment '{head}' already holds a {}",
            json_kind(other)
        ))),
    }
}

fn collision(full_key: &str, existing: &Value) -> PfError {
    PfError::validation(format!(
        "cannot unflatten key '{full_key}': path already holds a {}",
        json_kind(existing)
    ))
}

fn rebuild_sequences(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: PfRecord = map
                .into_iter()
                .map(|(key, child)| (key, rebuild_sequences(child)))
                .collect();
            match index_order(&map) {
                Some(order) => {
                    let mut slots: Vec<Option<Value>> = vec![None; order.len()];
                    for ((_, child), index) in map.into_iter().zip(order) {
                        slots[index] = Some(child);
                    }
                    Value::Array(slots.into_iter().map(|slot| slot.unwrap_or(Value::Null)).collect())
                }
                None => Value::Object(map),
            }
        }
        other => other,
    }
}

/// Position of each key when the keys are exactly the indices `0..n`.
fn index_order(map: &PfRecord) -> Option<Vec<usize>> {
    if map.is_empty() {
        return None;
    }
    let mut seen = vec![false; map.len()];
    let mut order = Vec::with_capacity(map.len());
    for key in map.keys() {
        if !key.bytes().all(|b| b.is_ascii_digit()) || (key.len() > 1 && key.starts_with('0')) {
            return None;
        }
        let index: usize = key.parse().ok()?;
        if index >= map.len() || seen[index] {
            return None;
        }
        seen[index] = true;
        order.push(index);
    }
    Some(order)
}

/// Reads one field by path.
///
/// A key that literally equals `path` wins over a nested path, so keys that
/// contain the delimiter stay addressable. Otherwise the record is flattened
/// (sequences kept as leaves) and `path` is looked up in the result.
pub fn get_field(tree: &PfRecord, path: &str, delimiter: &str) -> Option<Value> {
    if let Some(value) = tree.get(path) {
        return Some(value.clone());
    }
    let mut flat = flatten(tree, delimiter, false);
    flat.remove(path)
}
