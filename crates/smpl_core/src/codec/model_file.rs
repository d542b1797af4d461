//! Named-array access to SMPL model files, independent of how they are stored

use crate::error::SmplError;
use ndarray as nd;
use ndarray_npy::NpzReader;
use serde_json::Value;
use smpl_utils::io::FileLoader;
use std::{
    collections::BTreeMap,
    io::{BufReader, Read, Seek},
    path::Path,
};

/// A model file that can hand out its arrays by name as f32
pub trait ModelArrays {
    fn array_names(&self) -> Vec<String>;
    fn read_f32(&mut self, name: &str) -> Result<nd::ArrayD<f32>, SmplError>;

    fn has_array(&self, name: &str) -> bool {
        self.array_names().iter().any(|n| n == name)
    }
    fn read_f32_dim<D: nd::Dimension>(&mut self, name: &str) -> Result<nd::Array<f32, D>, SmplError> {
        let array = self.read_f32(name)?;
        array
            .into_dimensionality::<D>()
            .map_err(|e| SmplError::InvalidModel(format!("array `{name}` has unexpected rank: {e}")))
    }
}

pub struct NpzModelArrays<R: Read + Seek> {
    npz: NpzReader<R>,
    names: Vec<String>,
}
impl NpzModelArrays<BufReader<std::fs::File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SmplError> {
        let path = path.as_ref();
        let file = FileLoader::open(path).map_err(|e| SmplError::io(path, e))?;
        Self::new(BufReader::new(file))
    }
}
impl<R: Read + Seek> NpzModelArrays<R> {
    pub fn new(reader: R) -> Result<Self, SmplError> {
        let mut npz = NpzReader::new(reader)?;
        let names = npz
            .names()?
            .into_iter()
            .map(|name| name.strip_suffix(".npy").map(str::to_string).unwrap_or(name))
            .collect();
        Ok(Self { npz, names })
    }

    /// Reads an array as whatever element type it was stored with. Returns
    /// `None` when the dtype is not one of the numeric types we know.
    pub fn read_any(&mut self, name: &str) -> Result<Option<NpzArray>, SmplError> {
        if !self.has_array(name) {
            return Err(SmplError::MissingArray(name.to_string()));
        }
        let npz = &mut self.npz;
        macro_rules! try_read {
            ($npz:expr, $name:expr, $ty:ty, $variant:ident) => {
                if let Ok(array) = $npz.by_name::<nd::OwnedRepr<$ty>, nd::IxDyn>($name) {
                    return Ok(Some(NpzArray::$variant(array)));
                }
            };
        }
        try_read!(npz, name, f32, F32);
        try_read!(npz, name, f64, F64);
        try_read!(npz, name, i64, I64);
        try_read!(npz, name, i32, I32);
        try_read!(npz, name, u64, U64);
        try_read!(npz, name, u32, U32);
        try_read!(npz, name, u8, U8);
        try_read!(npz, name, bool, Bool);
        Ok(None)
    }
}
impl<R: Read + Seek> ModelArrays for NpzModelArrays<R> {
    fn array_names(&self) -> Vec<String> {
        self.names.clone()
    }
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_precision_loss)]
    fn read_f32(&mut self, name: &str) -> Result<nd::ArrayD<f32>, SmplError> {
        match self.read_any(name)? {
            Some(NpzArray::F32(a)) => Ok(a),
            Some(NpzArray::F64(a)) => Ok(a.mapv(|x| x as f32)),
            Some(NpzArray::I64(a)) => Ok(a.mapv(|x| x as f32)),
            Some(NpzArray::I32(a)) => Ok(a.mapv(|x| x as f32)),
            Some(NpzArray::U64(a)) => Ok(a.mapv(|x| x as f32)),
            Some(NpzArray::U32(a)) => Ok(a.mapv(|x| x as f32)),
            Some(NpzArray::U8(a)) => Ok(a.mapv(f32::from)),
            Some(NpzArray::Bool(_)) | None => Err(SmplError::InvalidModel(format!("array `{name}` is not numeric"))),
        }
    }
}

/// An npz entry with its stored element type
#[derive(Debug, Clone)]
pub enum NpzArray {
    F32(nd::ArrayD<f32>),
    F64(nd::ArrayD<f64>),
    I64(nd::ArrayD<i64>),
    I32(nd::ArrayD<i32>),
    U64(nd::ArrayD<u64>),
    U32(nd::ArrayD<u32>),
    U8(nd::ArrayD<u8>),
    Bool(nd::ArrayD<bool>),
}

/// A converted model: a JSON object whose values are nested numeric arrays
pub struct JsonModelArrays {
    entries: BTreeMap<String, Value>,
}
impl JsonModelArrays {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SmplError> {
        let path = path.as_ref();
        let file = FileLoader::open(path).map_err(|e| SmplError::io(path, e))?;
        let value: Value = serde_json::from_reader(BufReader::new(file))?;
        Self::from_value(value)
    }
    pub fn from_value(value: Value) -> Result<Self, SmplError> {
        match value {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().collect(),
            }),
            _ => Err(SmplError::InvalidModel("model json must be an object".to_string())),
        }
    }
}
impl ModelArrays for JsonModelArrays {
    fn array_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
    fn read_f32(&mut self, name: &str) -> Result<nd::ArrayD<f32>, SmplError> {
        let value = self.entries.get(name).ok_or_else(|| SmplError::MissingArray(name.to_string()))?;
        json_to_array(value).map_err(|reason| SmplError::InvalidModel(format!("array `{name}`: {reason}")))
    }
}

/// Turns a rectangular nested JSON array (or a single number) into an array
pub fn json_to_array(value: &Value) -> Result<nd::ArrayD<f32>, String> {
    let mut shape = Vec::new();
    let mut cur = value;
    while let Value::Array(items) = cur {
        shape.push(items.len());
        match items.first() {
            Some(first) => cur = first,
            None => break,
        }
    }
    let mut data = Vec::with_capacity(shape.iter().product());
    flatten_json(value, &shape, 0, &mut data)?;
    nd::ArrayD::from_shape_vec(nd::IxDyn(&shape), data).map_err(|e| e.to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn flatten_json(value: &Value, shape: &[usize], depth: usize, data: &mut Vec<f32>) -> Result<(), String> {
    match value {
        Value::Array(items) => {
            if depth >= shape.len() || items.len() != shape[depth] {
                return Err(format!("ragged nested array at depth {depth}"));
            }
            items.iter().try_for_each(|item| flatten_json(item, shape, depth + 1, data))
        }
        Value::Number(n) if depth == shape.len() => {
            let v = n.as_f64().ok_or_else(|| format!("number {n} out of range"))?;
            data.push(v as f32);
            Ok(())
        }
        Value::Bool(b) if depth == shape.len() => {
            data.push(if *b { 1.0 } else { 0.0 });
            Ok(())
        }
        other => Err(format!("unexpected value `{other}` at depth {depth}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_arrays_become_ndarrays() {
        let arr = json_to_array(&json!([[[1, 2], [3, 4]], [[5, 6], [7, 8.5]]])).unwrap();
        assert_eq!(arr.shape(), &[2, 2, 2]);
        assert_eq!(arr[[1, 1, 1]], 8.5);
    }

    #[test]
    fn scalars_are_zero_dimensional() {
        let arr = json_to_array(&json!(3)).unwrap();
        assert_eq!(arr.ndim(), 0);
    }

    #[test]
    fn ragged_arrays_are_rejected() {
        assert!(json_to_array(&json!([[1, 2], [3]])).is_err());
        assert!(json_to_array(&json!([[1, 2], 3])).is_err());
        assert!(json_to_array(&json!([["a", "b"]])).is_err());
    }

    #[test]
    fn json_model_reports_missing_arrays() {
        let mut model = JsonModelArrays::from_value(json!({"v_template": [[0, 0, 0]]})).unwrap();
        assert!(model.has_array("v_template"));
        assert!(matches!(model.read_f32("weights"), Err(SmplError::MissingArray(_))));
        let v: nd::Array2<f32> = model.read_f32_dim("v_template").unwrap();
        assert_eq!(v.dim(), (1, 3));
        assert!(model.read_f32_dim::<nd::Ix3>("v_template").is_err());
    }
}
