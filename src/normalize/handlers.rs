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

//! Built-in type handlers.
//!
//! | handler            | feature  | accepts                                          |
//! |--------------------|----------|--------------------------------------------------|
//! | array-like         | always   | `PfArray`, `Array1/2/D` of common element types  |
//! | arrow series       | `arrow`  | `Box<dyn arrow2::array::Array>`                  |
//! | arrow frame        | `arrow`  | `(Schema, Chunk<Box<dyn Array>>)`, bare `Chunk`  |
//! | tensor scalar      | `torch`  | `tch::Tensor` with one element                   |
//! | tensor             | `torch`  | any `tch::Tensor`                                |
//! | image              | `image`  | `DynamicImage`, `RgbImage`, `RgbaImage`, `GrayImage` |
//!
//! Non-finite floats become `null`, as JSON has no representation for them.

use std::any::Any;

use ndarray::{Array1, Array2, ArrayD, ArrayViewD};
use serde_json::Value;

use crate::array::PfArray;
use crate::errors::{PfError, Result};

use super::PfTypeHandler;

/// Element types accepted inside plain ndarray containers.
macro_rules! array_like_elements {
    ($on_element:ident) => {
        $on_element!(f64, |v: &f64| Value::from(*v));
        $on_element!(f32, |v: &f32| Value::from(f64::from(*v)));
        $on_element!(i64, |v: &i64| Value::from(*v));
        $on_element!(i32, |v: &i32| Value::from(*v));
        $on_element!(u8, |v: &u8| Value::from(*v));
        $on_element!(bool, |v: &bool| Value::Bool(*v));
        $on_element!(Value, |v: &Value| v.clone());
    };
}

fn view_to_json<A>(view: ArrayViewD<'_, A>, cell: &dyn Fn(&A) -> Value) -> Value {
    if view.ndim() == 0 {
        return view.iter().next().map(cell).unwrap_or(Value::Null);
    }
    Value::Array(view.outer_iter().map(|sub| view_to_json(sub, cell)).collect())
}

fn pf_array_to_json(array: &PfArray) -> Value {
    match array {
        PfArray::Float32(a) => view_to_json(a.view().into_dyn(), &|v: &f32| Value::from(f64::from(*v))),
        PfArray::Float64(a) => view_to_json(a.view().into_dyn(), &|v: &f64| Value::from(*v)),
        PfArray::Int64(a) => view_to_json(a.view().into_dyn(), &|v: &i64| Value::from(*v)),
        PfArray::Bool(a) => view_to_json(a.view().into_dyn(), &|v: &bool| Value::Bool(*v)),
        PfArray::Object(a) => view_to_json(a.view().into_dyn(), &|v: &Value| v.clone()),
    }
}

/// Feature matrices and plain ndarray containers → nested lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfArrayLikeHandler;

impl PfTypeHandler for PfArrayLikeHandler {
    fn name(&self) -> &'static str {
        "array-like"
    }

    fn is_type(&self, obj: &dyn Any) -> bool {
        if obj.is::<PfArray>() {
            return true;
        }
        macro_rules! matches_element {
            ($elem:ty, $cell:expr) => {
                if obj.is::<Array1<$elem>>() || obj.is::<Array2<$elem>>() || obj.is::<ArrayD<$elem>>() {
                    return true;
                }
            };
        }
        array_like_elements!(matches_element);
        false
    }

    fn convert(&self, obj: &dyn Any) -> Result<Value> {
        if let Some(array) = obj.downcast_ref::<PfArray>() {
            return Ok(pf_array_to_json(array));
        }
        macro_rules! convert_element {
            ($elem:ty, $cell:expr) => {
                if let Some(a) = obj.downcast_ref::<Array1<$elem>>() {
                    return Ok(view_to_json(a.view().into_dyn(), &$cell));
                }
                if let Some(a) = obj.downcast_ref::<Array2<$elem>>() {
                    return Ok(view_to_json(a.view().into_dyn(), &$cell));
                }
                if let Some(a) = obj.downcast_ref::<ArrayD<$elem>>() {
                    return Ok(view_to_json(a.view(), &$cell));
                }
            };
        }
        array_like_elements!(convert_element);
        Err(PfError::unsupported_type("array-like"))
    }
}

#[cfg(feature = "arrow")]
mod arrow_values {
    use arrow2::array::{Array, BooleanArray, PrimitiveArray, Utf8Array};
    use arrow2::chunk::Chunk;
    use serde_json::{Map, Value};

    use crate::errors::{PfError, Result};

    pub(super) fn column_to_json(array: &dyn Array) -> Result<Vec<Value>> {
        macro_rules! primitive {
            ($($native:ty),*) => {
                $(
                    if let Some(values) = array.as_any().downcast_ref::<PrimitiveArray<$native>>() {
                        return Ok(values
                            .iter()
                            .map(|v| v.map_or(Value::Null, |v| Value::from(*v)))
                            .collect());
                    }
                )*
            };
        }
        primitive!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

        if let Some(values) = array.as_any().downcast_ref::<BooleanArray>() {
            return Ok(values.iter().map(|v| v.map_or(Value::Null, Value::Bool)).collect());
        }
        if let Some(values) = array.as_any().downcast_ref::<Utf8Array<i32>>() {
            return Ok(values.iter().map(|v| v.map_or(Value::Null, Value::from)).collect());
        }
        if let Some(values) = array.as_any().downcast_ref::<Utf8Array<i64>>() {
            return Ok(values.iter().map(|v| v.map_or(Value::Null, Value::from)).collect());
        }
        Err(PfError::unsupported_type(format!("arrow2 {:?} array", array.data_type())))
    }

    /// `{"columns", "index", "data"}` layout, rows in `data`.
    pub(super) fn frame_to_json(columns: Vec<Value>, chunk: &Chunk<Box<dyn Array>>) -> Result<Value> {
        let converted = chunk
            .arrays()
            .iter()
            .map(|array| column_to_json(array.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let rows = chunk.len();
        let data = (0..rows)
            .map(|row| {
                Value::Array(
                    converted
                        .iter()
                        .map(|column| column.get(row).cloned().unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .collect();

        let mut split = Map::with_capacity(3);
        split.insert("columns".to_string(), Value::Array(columns));
        split.insert("index".to_string(), Value::Array((0..rows).map(Value::from).collect()));
        split.insert("data".to_string(), Value::Array(data));
        Ok(Value::Object(split))
    }
}

/// A single arrow2 column → list.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfArrowSeriesHandler;

impl PfTypeHandler for PfArrowSeriesHandler {
    fn name(&self) -> &'static str {
        "arrow-series"
    }

    fn available(&self) -> bool {
        cfg!(feature = "arrow")
    }

    #[cfg(feature = "arrow")]
    fn is_type(&self, obj: &dyn Any) -> bool {
        obj.is::<Box<dyn arrow2::array::Array>>()
    }

    #[cfg(not(feature = "arrow"))]
    fn is_type(&self, _obj: &dyn Any) -> bool {
        false
    }

    #[cfg(feature = "arrow")]
    fn convert(&self, obj: &dyn Any) -> Result<Value> {
        let array = obj
            .downcast_ref::<Box<dyn arrow2::array::Array>>()
            .ok_or_else(|| PfError::unsupported_type("arrow-series"))?;
        arrow_values::column_to_json(array.as_ref()).map(Value::Array)
    }

    #[cfg(not(feature = "arrow"))]
    fn convert(&self, _obj: &dyn Any) -> Result<Value> {
        Err(PfError::unsupported_type("arrow-series"))
    }
}

/// An arrow2 chunk, with or without schema → split-orientation mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfArrowFrameHandler;

#[cfg(feature = "arrow")]
type PfArrowFrame = (
    arrow2::datatypes::Schema,
    arrow2::chunk::Chunk<Box<dyn arrow2::array::Array>>,
);

impl PfTypeHandler for PfArrowFrameHandler {
    fn name(&self) -> &'static str {
        "arrow-frame"
    }

    fn available(&self) -> bool {
        cfg!(feature = "arrow")
    }

    #[cfg(feature = "arrow")]
    fn is_type(&self, obj: &dyn Any) -> bool {
        obj.is::<PfArrowFrame>() || obj.is::<arrow2::chunk::Chunk<Box<dyn arrow2::array::Array>>>()
    }

    #[cfg(not(feature = "arrow"))]
    fn is_type(&self, _obj: &dyn Any) -> bool {
        false
    }

    #[cfg(feature = "arrow")]
    fn convert(&self, obj: &dyn Any) -> Result<Value> {
        if let Some((schema, chunk)) = obj.downcast_ref::<PfArrowFrame>() {
            let columns = schema
                .fields
                .iter()
                .map(|field| Value::from(field.name.clone()))
                .collect();
            return arrow_values::frame_to_json(columns, chunk);
        }
        if let Some(chunk) = obj.downcast_ref::<arrow2::chunk::Chunk<Box<dyn arrow2::array::Array>>>() {
            let columns = (0..chunk.arrays().len()).map(Value::from).collect();
            return arrow_values::frame_to_json(columns, chunk);
        }
        Err(PfError::unsupported_type("arrow-frame"))
    }

    #[cfg(not(feature = "arrow"))]
    fn convert(&self, _obj: &dyn Any) -> Result<Value> {
        Err(PfError::unsupported_type("arrow-frame"))
    }
}

#[cfg(feature = "torch")]
mod tensor_values {
    use ndarray::{ArrayD, IxDyn};
    use serde_json::Value;
    use tch::{Device, Kind, Tensor};

    use crate::errors::{PfError, Result};

    fn flat_values(tensor: &Tensor) -> Result<Vec<Value>> {
        let flat = tensor.detach().to_device(Device::Cpu).flatten(0, -1);
        let kind = flat.kind();
        if kind == Kind::Bool {
            let values = Vec::<i64>::try_from(flat.to_kind(Kind::Int64))
                .map_err(|err| PfError::runtime_with("failed to read tensor values", err))?;
            return Ok(values.into_iter().map(|v| Value::Bool(v != 0)).collect());
        }
        if matches!(kind, Kind::Half | Kind::BFloat16 | Kind::Float | Kind::Double) {
            let values = Vec::<f64>::try_from(flat.to_kind(Kind::Double))
                .map_err(|err| PfError::runtime_with("failed to read tensor values", err))?;
            return Ok(values.into_iter().map(Value::from).collect());
        }
        let values = Vec::<i64>::try_from(flat.to_kind(Kind::Int64))
            .map_err(|err| PfError::runtime_with("failed to read tensor values", err))?;
        Ok(values.into_iter().map(Value::from).collect())
    }

    pub(super) fn scalar_to_json(tensor: &Tensor) -> Result<Value> {
        flat_values(tensor)?
            .into_iter()
            .next()
            .ok_or_else(|| PfError::runtime("tensor holds no element"))
    }

    pub(super) fn tensor_to_json(tensor: &Tensor) -> Result<Value> {
        let shape: Vec<usize> = tensor.size().into_iter().map(|d| d.max(0) as usize).collect();
        let values = flat_values(tensor)?;
        let array = ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|err| PfError::runtime_with("tensor shape does not match its values", err))?;
        Ok(super::view_to_json(array.view(), &|v: &Value| v.clone()))
    }
}

/// One-element tensors → their scalar.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfTensorScalarHandler;

impl PfTypeHandler for PfTensorScalarHandler {
    fn name(&self) -> &'static str {
        "tensor-scalar"
    }

    fn available(&self) -> bool {
        cfg!(feature = "torch")
    }

    #[cfg(feature = "torch")]
    fn is_type(&self, obj: &dyn Any) -> bool {
        obj.downcast_ref::<tch::Tensor>()
            .map_or(false, |tensor| tensor.numel() == 1)
    }

    #[cfg(not(feature = "torch"))]
    fn is_type(&self, _obj: &dyn Any) -> bool {
        false
    }

    #[cfg(feature = "torch")]
    fn convert(&self, obj: &dyn Any) -> Result<Value> {
        let tensor = obj
            .downcast_ref::<tch::Tensor>()
            .ok_or_else(|| PfError::unsupported_type("tensor-scalar"))?;
        tensor_values::scalar_to_json(tensor)
    }

    #[cfg(not(feature = "torch"))]
    fn convert(&self, _obj: &dyn Any) -> Result<Value> {
        Err(PfError::unsupported_type("tensor-scalar"))
    }
}

/// Tensors → nested lists, detached and moved to the CPU first.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfTensorHandler;

impl PfTypeHandler for PfTensorHandler {
    fn name(&self) -> &'static str {
        "tensor"
    }

    fn available(&self) -> bool {
        cfg!(feature = "torch")
    }

    #[cfg(feature = "torch")]
    fn is_type(&self, obj: &dyn Any) -> bool {
        obj.is::<tch::Tensor>()
    }

    #[cfg(not(feature = "torch"))]
    fn is_type(&self, _obj: &dyn Any) -> bool {
        false
    }

    #[cfg(feature = "torch")]
    fn convert(&self, obj: &dyn Any) -> Result<Value> {
        let tensor = obj
            .downcast_ref::<tch::Tensor>()
            .ok_or_else(|| PfError::unsupported_type("tensor"))?;
        tensor_values::tensor_to_json(tensor)
    }

    #[cfg(not(feature = "torch"))]
    fn convert(&self, _obj: &dyn Any) -> Result<Value> {
        Err(PfError::unsupported_type("tensor"))
    }
}

/// Images → base64-encoded PNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfImageHandler;

#[cfg(feature = "image")]
fn as_dynamic_image(obj: &dyn Any) -> Option<image::DynamicImage> {
    use image::DynamicImage;

    if let Some(img) = obj.downcast_ref::<DynamicImage>() {
        return Some(img.clone());
    }
    if let Some(img) = obj.downcast_ref::<image::RgbImage>() {
        return Some(DynamicImage::ImageRgb8(img.clone()));
    }
    if let Some(img) = obj.downcast_ref::<image::RgbaImage>() {
        return Some(DynamicImage::ImageRgba8(img.clone()));
    }
    if let Some(img) = obj.downcast_ref::<image::GrayImage>() {
        return Some(DynamicImage::ImageLuma8(img.clone()));
    }
    None
}

impl PfTypeHandler for PfImageHandler {
    fn name(&self) -> &'static str {
        "image"
    }

    fn available(&self) -> bool {
        cfg!(feature = "image")
    }

    #[cfg(feature = "image")]
    fn is_type(&self, obj: &dyn Any) -> bool {
        obj.is::<image::DynamicImage>()
            || obj.is::<image::RgbImage>()
            || obj.is::<image::RgbaImage>()
            || obj.is::<image::GrayImage>()
    }

    #[cfg(not(feature = "image"))]
    fn is_type(&self, _obj: &dyn Any) -> bool {
        false
    }

    #[cfg(feature = "image")]
    fn convert(&self, obj: &dyn Any) -> Result<Value> {
        use base64::Engine;
        use std::io::Cursor;

        let img = as_dynamic_image(obj).ok_or_else(|| PfError::unsupported_type("image"))?;
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageOutputFormat::Png)
            .map_err(|err| PfError::runtime_with("failed to encode image as PNG", err))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(buffer.into_inner());
        Ok(Value::String(encoded))
    }

    #[cfg(not(feature = "image"))]
    fn convert(&self, _obj: &dyn Any) -> Result<Value> {
        Err(PfError::unsupported_type("image"))
    }
}
