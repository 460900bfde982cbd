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

use std::collections::HashSet;

use indexmap::IndexMap;
use ndarray::{array, Array2};
use packflow::array::PfArray;
use packflow::errors::PfError;
use packflow::normalize::{default_normalizer, ensure_native, ensure_valid_output, PfNormalizer};
use packflow::value::PfValue;
use proptest::prelude::*;
use serde_json::{json, Value};

#[test]
fn scalars_are_wrapped_under_the_parent_key() {
    let out = ensure_valid_output(json!([0, 1]), "prediction").unwrap();
    assert_eq!(out, vec![json!({"prediction": 0}), json!({"prediction": 1})]);
}

#[test]
fn matrix_rows_become_records() {
    let matrix = PfValue::foreign(PfArray::Float64(array![[0.25], [0.75]]));
    let out = ensure_valid_output(matrix, "score").unwrap();
    assert_eq!(out, vec![json!({"score": 0.25}), json!({"score": 0.75})]);
}

#[test]
fn mixed_containers_are_converted_depth_first() {
    let mut row = IndexMap::new();
    row.insert("label".to_string(), PfValue::from("cat"));
    row.insert("logits".to_string(), PfValue::foreign(array![1.5f32, -0.5]));
    row.insert("ids".to_string(), PfValue::from(vec![PfValue::foreign(array![[1i64, 2]])]));
    let out = ensure_native(PfValue::Map(row)).unwrap();
    assert_eq!(out, json!({"label": "cat", "logits": [1.5, -0.5], "ids": [[[1, 2]]]}));
}

#[test]
fn sets_become_sequences() {
    let set: HashSet<i64> = [7].into_iter().collect();
    assert_eq!(ensure_native(PfValue::from(set)).unwrap(), json!([7]));
}

#[test]
fn unsupported_types_report_their_name() {
    let err = ensure_native(PfValue::foreign(std::time::Duration::from_millis(3))).unwrap_err();
    assert!(matches!(err, PfError::UnsupportedType { .. }));
    assert!(err.to_string().contains("Duration"));
}

#[test]
fn array_like_handler_is_tried_first() {
    let names = default_normalizer().handler_names();
    assert_eq!(names.first(), Some(&"array-like"));
    assert_eq!(PfNormalizer::new().handler_names(), names);
}

#[cfg(feature = "arrow")]
#[test]
fn arrow_series_becomes_a_list() {
    use arrow2::array::{Array, Float64Array};

    let series: Box<dyn Array> = Float64Array::from(vec![Some(1.0), None]).boxed();
    assert_eq!(ensure_native(PfValue::foreign(series)).unwrap(), json!([1.0, null]));
}

#[cfg(not(feature = "arrow"))]
#[test]
fn arrow_handlers_are_inactive_without_the_feature() {
    assert!(!default_normalizer().handler_names().contains(&"arrow-series"));
}

fn native() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn ensure_native_is_idempotent(value in native(), rows in 1usize..4, cols in 1usize..4) {
        let once = ensure_native(value.clone()).unwrap();
        prop_assert_eq!(&once, &value);
        prop_assert_eq!(ensure_native(once.clone()).unwrap(), once);

        let matrix = Array2::<i64>::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as i64);
        let converted = ensure_native(PfValue::foreign(matrix)).unwrap();
        prop_assert_eq!(ensure_native(converted.clone()).unwrap(), converted);
    }
}
