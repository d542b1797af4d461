//! Converts SMPL model files (python pickles or npz archives) to json

use crate::codec::model_file::{ModelArrays, NpzArray, NpzModelArrays};
use crate::codec::pickle::{self, PyValue};
use crate::codec::py_objects;
use crate::common::types::Gender;
use crate::error::SmplError;
use log::{info, warn};
use ndarray as nd;
use serde_json::{Map, Value};
use smpl_utils::io::{FileLoader, FileType};
use std::{
    fs,
    io::{BufReader, BufWriter, Read},
    path::{Path, PathBuf},
};

/// Arrays the forward pass needs. A conversion that keeps none of them did
/// not produce a model.
pub const REQUIRED_MODEL_KEYS: [&str; 6] = ["v_template", "shapedirs", "posedirs", "J_regressor", "weights", "kintree_table"];

/// A model value after conversion
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEntry {
    /// Nested numeric array, a plain number or text
    Array(Value),
    Skipped { reason: String },
}

/// Anything that can be turned into a nested numeric array
pub trait ToNestedArray {
    fn to_nested_array(&self) -> ModelEntry;
}

impl ToNestedArray for PyValue {
    fn to_nested_array(&self) -> ModelEntry {
        match py_to_json(self) {
            Ok(value) => ModelEntry::Array(value),
            Err(reason) => ModelEntry::Skipped { reason },
        }
    }
}

fn float_to_json(f: f64) -> Result<Value, String> {
    serde_json::Number::from_f64(f).map(Value::Number).ok_or_else(|| format!("non-finite value {f}"))
}

fn py_to_json(value: &PyValue) -> Result<Value, String> {
    match value {
        PyValue::None => Ok(Value::Null),
        PyValue::Bool(b) => Ok(Value::Bool(*b)),
        PyValue::Int(i) => Ok(Value::from(*i)),
        PyValue::Float(f) => float_to_json(*f),
        PyValue::Str(s) => Ok(Value::String(s.clone())),
        PyValue::List(items) | PyValue::Tuple(items) => items.iter().map(py_to_json).collect::<Result<Vec<_>, _>>().map(Value::Array),
        PyValue::Object { .. } => match py_objects::decode_array(value)?.to_nested_array() {
            ModelEntry::Array(json) => Ok(json),
            ModelEntry::Skipped { reason } => Err(reason),
        },
        PyValue::BigInt(_) => Err("integer out of 64-bit range".to_string()),
        PyValue::Bytes(_) => Err("raw bytes".to_string()),
        PyValue::Dict(_) => Err("nested dictionary".to_string()),
        PyValue::Set(_) => Err("set".to_string()),
        PyValue::Global { module, name } => Err(format!("python class {module}.{name}")),
    }
}

impl ToNestedArray for NpzArray {
    fn to_nested_array(&self) -> ModelEntry {
        let non_finite = match self {
            NpzArray::F32(a) => a.iter().find(|v| !v.is_finite()).map(|&v| f64::from(v)),
            NpzArray::F64(a) => a.iter().find(|v| !v.is_finite()).copied(),
            _ => None,
        };
        if let Some(v) = non_finite {
            return ModelEntry::Skipped {
                reason: format!("non-finite value {v}"),
            };
        }
        let value = match self {
            NpzArray::F32(a) => array_to_json(&a.view()),
            NpzArray::F64(a) => array_to_json(&a.view()),
            NpzArray::I64(a) => array_to_json(&a.view()),
            NpzArray::I32(a) => array_to_json(&a.view()),
            NpzArray::U64(a) => array_to_json(&a.view()),
            NpzArray::U32(a) => array_to_json(&a.view()),
            NpzArray::U8(a) => array_to_json(&a.view()),
            NpzArray::Bool(a) => array_to_json(&a.view()),
        };
        ModelEntry::Array(value)
    }
}

/// Nested json arrays following the array's axes, a scalar for 0-d arrays.
/// Float arrays must be finite, see [`NpzArray::to_nested_array`].
pub fn array_to_json<T: Copy + Into<Value>>(array: &nd::ArrayViewD<T>) -> Value {
    if array.ndim() == 0 {
        return array.first().map_or(Value::Null, |&v| v.into());
    }
    Value::Array(array.outer_iter().map(|sub| array_to_json(&sub)).collect())
}

/// Reads every entry of a pickled model dictionary. numpy arrays, chumpy
/// variables and scipy sparse matrices are decoded to nested arrays.
///
/// # Errors
/// Will error if the pickle is malformed or its top level is not a dict
pub fn read_pickle_entries<R: Read>(reader: R) -> Result<Vec<(String, ModelEntry)>, SmplError> {
    let PyValue::Dict(dict) = pickle::from_reader(reader)? else {
        return Err(SmplError::InvalidModel("pickled model must be a dictionary".to_string()));
    };
    let mut entries = Vec::with_capacity(dict.len());
    for (key, data) in &dict {
        let key = match key {
            PyValue::Str(s) => s.clone(),
            PyValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            other => {
                warn!("Skipping non string key {other:?}");
                continue;
            }
        };
        entries.push((key, data.to_nested_array()));
    }
    Ok(entries)
}

/// Reads every array of an npz archive
///
/// # Errors
/// Will error if the archive cannot be read
pub fn read_npz_entries<M>(arrays: &mut NpzModelArrays<M>) -> Result<Vec<(String, ModelEntry)>, SmplError>
where
    M: Read + std::io::Seek,
{
    let mut entries = Vec::new();
    for name in arrays.array_names() {
        let entry = match arrays.read_any(&name)? {
            Some(array) => array.to_nested_array(),
            None => ModelEntry::Skipped {
                reason: "unsupported dtype".to_string(),
            },
        };
        entries.push((name, entry));
    }
    Ok(entries)
}

/// Reads a model file, dispatching on its extension
///
/// # Errors
/// Will error for unreadable or unsupported files
pub fn read_model_entries<P: AsRef<Path>>(model_path: P) -> Result<Vec<(String, ModelEntry)>, SmplError> {
    let model_path = model_path.as_ref();
    match FileType::from_path(model_path) {
        FileType::Pkl => {
            let file = FileLoader::open(model_path).map_err(|e| SmplError::io(model_path, e))?;
            read_pickle_entries(BufReader::new(file))
        }
        FileType::Npz => read_npz_entries(&mut NpzModelArrays::open(model_path)?),
        _ => Err(SmplError::UnsupportedFile {
            path: model_path.to_path_buf(),
            reason: "expected a .pkl or .npz model".to_string(),
        }),
    }
}

/// Keeps the converted entries, reporting each skipped one
pub fn collect_entries(entries: Vec<(String, ModelEntry)>) -> Map<String, Value> {
    let mut output = Map::new();
    for (key, entry) in entries {
        match entry {
            ModelEntry::Array(value) => {
                output.insert(key, value);
            }
            ModelEntry::Skipped { reason } => warn!("Skipping key {key} (unsupported type: {reason})"),
        }
    }
    output
}

/// Warns about each missing model array and fails when none is left
///
/// # Errors
/// Will error if none of [`REQUIRED_MODEL_KEYS`] was converted
pub fn check_required_keys(output: &Map<String, Value>) -> Result<(), SmplError> {
    let missing: Vec<&str> = REQUIRED_MODEL_KEYS.iter().copied().filter(|key| !output.contains_key(*key)).collect();
    if missing.len() == REQUIRED_MODEL_KEYS.len() {
        return Err(SmplError::InvalidModel(format!("none of {} could be converted", REQUIRED_MODEL_KEYS.join(", "))));
    }
    for key in missing {
        warn!("Converted model has no `{key}`");
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub output_dir: PathBuf,
    /// Overrides the gender read from the file name
    pub gender: Option<Gender>,
}
impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            gender: None,
        }
    }
}

/// Path of the json written for a model of `gender`
pub fn output_path(output_dir: &Path, gender: Gender) -> PathBuf {
    output_dir.join(format!("SMPL_{}.json", gender.file_tag()))
}

/// Converts one model file and returns the path of the written json
///
/// # Errors
/// Will error if the model cannot be read or the output cannot be written
pub fn convert_model_file<P: AsRef<Path>>(model_path: P, options: &ConvertOptions) -> Result<PathBuf, SmplError> {
    let model_path = model_path.as_ref();
    let output = collect_entries(read_model_entries(model_path)?);
    check_required_keys(&output)?;

    let gender = options.gender.unwrap_or_else(|| Gender::from_model_filename(model_path));
    fs::create_dir_all(&options.output_dir).map_err(|e| SmplError::io(&options.output_dir, e))?;
    let out_path = output_path(&options.output_dir, gender);

    info!("Writing {} ({} entries)", out_path.display(), output.len());
    let file = fs::File::create(&out_path).map_err(|e| SmplError::io(&out_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &output)?;
    std::io::Write::flush(&mut writer).map_err(|e| SmplError::io(&out_path, e))?;
    Ok(out_path)
}
