//! Decodes the array-like python objects found in SMPL model pickles: numpy
//! ndarrays, chumpy variables and scipy sparse matrices.

use crate::codec::model_file::NpzArray;
use crate::codec::pickle::PyValue;
use ndarray as nd;
use ndarray::ShapeBuilder;

/// What a pickled object turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyObjectKind {
    NdArray,
    Chumpy,
    SparseMatrix,
    Other,
}

pub fn object_kind(value: &PyValue) -> PyObjectKind {
    match value.class_path() {
        Some(("numpy.core.multiarray" | "numpy._core.multiarray", "_reconstruct"))
        | Some(("numpy.core.numeric" | "numpy._core.numeric", "_frombuffer")) => PyObjectKind::NdArray,
        Some((module, _)) if module.starts_with("chumpy") => PyObjectKind::Chumpy,
        Some((module, "csc_matrix" | "csr_matrix")) if module.starts_with("scipy.sparse") => PyObjectKind::SparseMatrix,
        _ => PyObjectKind::Other,
    }
}

/// Decodes an ndarray, a chumpy variable or a sparse matrix (as a dense f64
/// matrix, like `toarray()`)
pub fn decode_array(value: &PyValue) -> Result<NpzArray, String> {
    match object_kind(value) {
        PyObjectKind::NdArray => decode_ndarray(value),
        PyObjectKind::Chumpy => decode_chumpy(value),
        PyObjectKind::SparseMatrix => decode_sparse(value),
        PyObjectKind::Other => Err(match value.class_path() {
            Some((module, name)) => format!("python object {module}.{name}"),
            None => "not an array object".to_string(),
        }),
    }
}

struct Dtype {
    kind: char,
    size: usize,
    little_endian: bool,
}

fn parse_dtype(dtype: &PyValue) -> Result<Dtype, String> {
    let PyValue::Object { args, state, .. } = dtype else {
        return Err("array dtype is not a numpy dtype".to_string());
    };
    let descr = args.first().and_then(PyValue::as_str).ok_or("dtype without a type string")?;
    // the byte order lives in the state, the descr may also carry one
    let state_order = state.as_deref().and_then(|s| match s {
        PyValue::Tuple(items) => items.get(1).and_then(PyValue::as_str),
        _ => None,
    });
    let (descr_order, code) = match descr.chars().next() {
        Some(c @ ('<' | '>' | '|' | '=')) => (Some(c), &descr[1..]),
        _ => (None, descr),
    };
    let order = descr_order.or_else(|| state_order.and_then(|o| o.chars().next())).unwrap_or('=');
    let mut chars = code.chars();
    let kind = chars.next().ok_or("empty dtype")?;
    let size = chars.as_str().parse::<usize>().map_err(|_| format!("unsupported dtype `{descr}`"))?;
    let little_endian = match order {
        '>' => false,
        '<' => true,
        _ => cfg!(target_endian = "little"),
    };
    Ok(Dtype { kind, size, little_endian })
}

fn parse_shape(shape: &PyValue) -> Result<Vec<usize>, String> {
    match shape {
        PyValue::Tuple(dims) | PyValue::List(dims) => dims
            .iter()
            .map(|d| d.as_int().and_then(|d| usize::try_from(d).ok()).ok_or_else(|| "invalid array dimension".to_string()))
            .collect(),
        PyValue::Int(d) => usize::try_from(*d).map(|d| vec![d]).map_err(|_| "invalid array dimension".to_string()),
        _ => Err("invalid array shape".to_string()),
    }
}

fn elements<const N: usize>(raw: &[u8], little_endian: bool) -> impl Iterator<Item = [u8; N]> + '_ {
    raw.chunks_exact(N).map(move |chunk| {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(chunk);
        if !little_endian {
            bytes.reverse();
        }
        bytes
    })
}

fn shaped<T>(shape: &[usize], fortran: bool, data: Vec<T>) -> Result<nd::ArrayD<T>, String> {
    let dim = nd::IxDyn(shape);
    let array = if fortran {
        nd::ArrayD::from_shape_vec(dim.f(), data)
    } else {
        nd::ArrayD::from_shape_vec(dim, data)
    };
    array.map_err(|e| e.to_string())
}

/// Raw buffer of `shape` elements of `dtype` into a typed array. Narrow
/// integer types are widened to the nearest type json export supports.
fn decode_buffer(shape: &[usize], dtype: &Dtype, fortran: bool, raw: &[u8]) -> Result<NpzArray, String> {
    let count: usize = shape.iter().product();
    if count.checked_mul(dtype.size) != Some(raw.len()) {
        return Err(format!(
            "buffer of {} bytes does not hold {count} elements of {}{}",
            raw.len(),
            dtype.kind,
            dtype.size
        ));
    }
    let le = dtype.little_endian;
    Ok(match (dtype.kind, dtype.size) {
        ('f', 4) => NpzArray::F32(shaped(shape, fortran, elements::<4>(raw, le).map(f32::from_le_bytes).collect())?),
        ('f', 8) => NpzArray::F64(shaped(shape, fortran, elements::<8>(raw, le).map(f64::from_le_bytes).collect())?),
        ('i', 1) => NpzArray::I32(shaped(shape, fortran, elements::<1>(raw, le).map(|b| i32::from(i8::from_le_bytes(b))).collect())?),
        ('i', 2) => NpzArray::I32(shaped(shape, fortran, elements::<2>(raw, le).map(|b| i32::from(i16::from_le_bytes(b))).collect())?),
        ('i', 4) => NpzArray::I32(shaped(shape, fortran, elements::<4>(raw, le).map(i32::from_le_bytes).collect())?),
        ('i', 8) => NpzArray::I64(shaped(shape, fortran, elements::<8>(raw, le).map(i64::from_le_bytes).collect())?),
        ('u', 1) => NpzArray::U8(shaped(shape, fortran, raw.to_vec())?),
        ('u', 2) => NpzArray::U32(shaped(shape, fortran, elements::<2>(raw, le).map(|b| u32::from(u16::from_le_bytes(b))).collect())?),
        ('u', 4) => NpzArray::U32(shaped(shape, fortran, elements::<4>(raw, le).map(u32::from_le_bytes).collect())?),
        ('u', 8) => NpzArray::U64(shaped(shape, fortran, elements::<8>(raw, le).map(u64::from_le_bytes).collect())?),
        ('b', 1) => NpzArray::Bool(shaped(shape, fortran, raw.iter().map(|&b| b != 0).collect())?),
        (kind, size) => return Err(format!("unsupported dtype {kind}{size}")),
    })
}

/// `numpy.core.multiarray._reconstruct` followed by `__setstate__`, or the
/// protocol 5 `_frombuffer(buffer, dtype, shape, order)`
pub fn decode_ndarray(value: &PyValue) -> Result<NpzArray, String> {
    let PyValue::Object { args, state, .. } = value else {
        return Err("not an ndarray".to_string());
    };
    if value.class_path().is_some_and(|(_, name)| name == "_frombuffer") {
        let [buffer, dtype, shape, order] = args.as_slice() else {
            return Err("unexpected _frombuffer arguments".to_string());
        };
        let raw = buffer.as_bytes().ok_or("ndarray buffer is not bytes")?;
        let fortran = order.as_str() == Some("F");
        return decode_buffer(&parse_shape(shape)?, &parse_dtype(dtype)?, fortran, &raw);
    }

    let Some(PyValue::Tuple(items)) = state.as_deref() else {
        return Err("ndarray without state".to_string());
    };
    // (version, shape, dtype, is_fortran, data); very old pickles omit the version
    let fields = match items.len() {
        5 => &items[1..],
        4 => &items[..],
        n => return Err(format!("unexpected ndarray state of {n} fields")),
    };
    let shape = parse_shape(&fields[0])?;
    let dtype = parse_dtype(&fields[1])?;
    let fortran = fields[2].as_int().is_some_and(|f| f != 0);
    let raw = fields[3].as_bytes().ok_or("object arrays are not supported")?;
    decode_buffer(&shape, &dtype, fortran, &raw)
}

/// A chumpy leaf variable keeps its value in `x`
fn decode_chumpy(value: &PyValue) -> Result<NpzArray, String> {
    let PyValue::Object { state: Some(state), .. } = value else {
        return Err("chumpy object without state".to_string());
    };
    match state.get("x") {
        Some(x) if object_kind(x) == PyObjectKind::NdArray => decode_ndarray(x),
        Some(PyValue::Float(f)) => Ok(NpzArray::F64(nd::arr0(*f).into_dyn())),
        Some(PyValue::Int(i)) => Ok(NpzArray::I64(nd::arr0(*i).into_dyn())),
        Some(_) => Err("chumpy value is not an array".to_string()),
        None => Err("chumpy expression without a stored value".to_string()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_f64_vec(array: &NpzArray) -> Vec<f64> {
    match array {
        NpzArray::F32(a) => a.iter().map(|&v| f64::from(v)).collect(),
        NpzArray::F64(a) => a.iter().copied().collect(),
        NpzArray::I64(a) => a.iter().map(|&v| v as f64).collect(),
        NpzArray::I32(a) => a.iter().map(|&v| f64::from(v)).collect(),
        NpzArray::U64(a) => a.iter().map(|&v| v as f64).collect(),
        NpzArray::U32(a) => a.iter().map(|&v| f64::from(v)).collect(),
        NpzArray::U8(a) => a.iter().map(|&v| f64::from(v)).collect(),
        NpzArray::Bool(a) => a.iter().map(|&v| f64::from(u8::from(v))).collect(),
    }
}

fn to_index_vec(array: &NpzArray) -> Result<Vec<usize>, String> {
    let bad = || "negative or non integer sparse index".to_string();
    match array {
        NpzArray::I64(a) => a.iter().map(|&v| usize::try_from(v).map_err(|_| bad())).collect(),
        NpzArray::I32(a) => a.iter().map(|&v| usize::try_from(v).map_err(|_| bad())).collect(),
        NpzArray::U64(a) => a.iter().map(|&v| usize::try_from(v).map_err(|_| bad())).collect(),
        NpzArray::U32(a) => a.iter().map(|&v| usize::try_from(v).map_err(|_| bad())).collect(),
        NpzArray::U8(a) => Ok(a.iter().map(|&v| usize::from(v)).collect()),
        _ => Err(bad()),
    }
}

/// Compressed sparse column/row matrix to a dense one. Duplicate entries are
/// summed.
fn decode_sparse(value: &PyValue) -> Result<NpzArray, String> {
    let PyValue::Object { state: Some(state), .. } = value else {
        return Err("sparse matrix without state".to_string());
    };
    let column_major = value.class_path().is_some_and(|(_, name)| name == "csc_matrix");
    let field = |key: &str| state.get(key).ok_or_else(|| format!("sparse matrix without `{key}`"));
    let shape = parse_shape(state.get("_shape").map_or_else(|| field("shape"), Ok)?)?;
    let [nrows, ncols] = shape[..] else {
        return Err(format!("sparse matrix of rank {}", shape.len()));
    };
    let data = to_f64_vec(&decode_array(field("data")?)?);
    let indices = to_index_vec(&decode_array(field("indices")?)?)?;
    let indptr = to_index_vec(&decode_array(field("indptr")?)?)?;

    let (outer, inner) = if column_major { (ncols, nrows) } else { (nrows, ncols) };
    if indptr.len() != outer + 1 || indices.len() != data.len() || indptr.last().is_some_and(|&end| end > data.len()) {
        return Err("inconsistent sparse matrix".to_string());
    }
    let mut dense = nd::Array2::<f64>::zeros((nrows, ncols));
    for (o, window) in indptr.windows(2).enumerate() {
        for k in window[0]..window[1] {
            let i = indices[k];
            if i >= inner {
                return Err(format!("sparse index {i} out of bounds"));
            }
            let pos = if column_major { (i, o) } else { (o, i) };
            dense[pos] += data[k];
        }
    }
    Ok(NpzArray::F64(dense.into_dyn()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(module: &str, name: &str) -> PyValue {
        PyValue::Global {
            module: module.to_string(),
            name: name.to_string(),
        }
    }

    fn dtype(descr: &str, order: &str) -> PyValue {
        PyValue::Object {
            class: Box::new(global("numpy", "dtype")),
            args: vec![PyValue::Str(descr.to_string()), PyValue::Bool(false), PyValue::Bool(true)],
            state: Some(Box::new(PyValue::Tuple(vec![PyValue::Int(3), PyValue::Str(order.to_string())]))),
        }
    }

    fn ndarray(shape: &[i64], descr: &str, fortran: bool, raw: Vec<u8>) -> PyValue {
        PyValue::Object {
            class: Box::new(global("numpy.core.multiarray", "_reconstruct")),
            args: vec![global("numpy", "ndarray"), PyValue::Tuple(vec![PyValue::Int(0)]), PyValue::Str("b".to_string())],
            state: Some(Box::new(PyValue::Tuple(vec![
                PyValue::Int(1),
                PyValue::Tuple(shape.iter().map(|&d| PyValue::Int(d)).collect()),
                dtype(descr, "<"),
                PyValue::Bool(fortran),
                PyValue::Bytes(raw),
            ]))),
        }
    }

    fn f64_bytes(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn i32_bytes(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn dict(items: Vec<(&str, PyValue)>) -> PyValue {
        PyValue::Dict(items.into_iter().map(|(k, v)| (PyValue::Str(k.to_string()), v)).collect())
    }

    #[test]
    fn c_and_fortran_order() {
        let c = decode_array(&ndarray(&[2, 3], "f8", false, f64_bytes(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]))).unwrap();
        let NpzArray::F64(c) = c else { panic!("expected f64") };
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c[[1, 0]], 3.0);

        let f = decode_array(&ndarray(&[2, 3], "f8", true, f64_bytes(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]))).unwrap();
        let NpzArray::F64(f) = f else { panic!("expected f64") };
        assert_eq!(f[[1, 0]], 1.0);
        assert_eq!(f[[0, 1]], 2.0);
    }

    #[test]
    fn dtype_kind_selects_the_element_type() {
        let raw: Vec<u8> = [-1i64, 0, 1].iter().flat_map(|v| v.to_le_bytes()).collect();
        let NpzArray::I64(a) = decode_array(&ndarray(&[1, 3], "i8", false, raw.clone())).unwrap() else { panic!("expected i64") };
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![-1, 0, 1]);
        assert!(matches!(decode_array(&ndarray(&[1, 3], "f8", false, raw)).unwrap(), NpzArray::F64(_)));
    }

    #[test]
    fn big_endian_buffers() {
        let raw: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let NpzArray::F32(a) = decode_array(&ndarray(&[2], ">f4", false, raw)).unwrap() else { panic!("expected f32") };
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![1.5, -2.0]);
    }

    #[test]
    fn buffer_size_is_checked() {
        assert!(decode_array(&ndarray(&[2, 3], "f8", false, f64_bytes(&[0.0; 5]))).is_err());
    }

    #[test]
    fn chumpy_variable_yields_its_value() {
        let ch = PyValue::Object {
            class: Box::new(global("chumpy.ch", "Ch")),
            args: vec![],
            state: Some(Box::new(dict(vec![("x", ndarray(&[2], "f8", false, f64_bytes(&[4.0, 5.0])))]))),
        };
        assert_eq!(object_kind(&ch), PyObjectKind::Chumpy);
        let NpzArray::F64(a) = decode_array(&ch).unwrap() else { panic!("expected f64") };
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![4.0, 5.0]);
    }

    #[test]
    fn csc_matrix_becomes_dense() {
        // [[1, 0, 0], [0, 0, 2]] stored column-wise
        let csc = PyValue::Object {
            class: Box::new(global("scipy.sparse.csc", "csc_matrix")),
            args: vec![],
            state: Some(Box::new(dict(vec![
                ("_shape", PyValue::Tuple(vec![PyValue::Int(2), PyValue::Int(3)])),
                ("data", ndarray(&[2], "f8", false, f64_bytes(&[1.0, 2.0]))),
                ("indices", ndarray(&[2], "i4", false, i32_bytes(&[0, 1]))),
                ("indptr", ndarray(&[4], "i4", false, i32_bytes(&[0, 1, 1, 2]))),
                ("maxprint", PyValue::Int(50)),
            ]))),
        };
        let NpzArray::F64(dense) = decode_array(&csc).unwrap() else { panic!("expected f64") };
        assert_eq!(dense, nd::array![[1.0, 0.0, 0.0], [0.0, 0.0, 2.0]].into_dyn());
    }

    #[test]
    fn unknown_objects_are_reported_by_class() {
        let obj = PyValue::Object {
            class: Box::new(global("mymod", "Thing")),
            args: vec![],
            state: None,
        };
        assert_eq!(decode_array(&obj).unwrap_err(), "python object mymod.Thing");
    }
}
