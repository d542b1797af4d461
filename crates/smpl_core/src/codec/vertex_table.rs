use crate::error::SmplError;
use log::debug;
use ndarray as nd;
use smpl_utils::io::FileLoader;
use std::{
    io::{BufRead, BufReader, Write},
    path::Path,
};

/// Rows are vertices, columns are coordinates (normally x, y, z)
pub type VertexTable = nd::Array2<f64>;

/// Reads a whitespace-delimited numeric table from disk
pub fn read_vertex_table<P: AsRef<Path>>(path: P) -> Result<VertexTable, SmplError> {
    let path = path.as_ref();
    let file = FileLoader::open(path).map_err(|e| SmplError::io(path, e))?;
    let table = parse_vertex_table(BufReader::new(file)).map_err(|err| match err {
        SmplError::Io { source, .. } => SmplError::io(path, source),
        other => other,
    })?;
    debug!("Loaded {:?} table from {}", table.dim(), path.display());
    Ok(table)
}

/// Parses one row per line. Blank lines and everything after a `#` are
/// ignored. All rows must have the same number of fields.
pub fn parse_vertex_table<R: BufRead>(reader: R) -> Result<VertexTable, SmplError> {
    let mut values: Vec<f64> = Vec::new();
    let mut num_cols: Option<usize> = None;
    let mut num_rows = 0;

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SmplError::io("<input>", e))?;
        let content = line.split('#').next().unwrap_or_default();
        let row_start = values.len();
        for field in content.split_whitespace() {
            let value = field.parse::<f64>().map_err(|_| SmplError::Parse {
                line: line_idx + 1,
                reason: format!("`{field}` is not a number"),
            })?;
            values.push(value);
        }
        let row_len = values.len() - row_start;
        if row_len == 0 {
            continue;
        }
        match num_cols {
            None => num_cols = Some(row_len),
            Some(expected) if expected != row_len => {
                return Err(SmplError::Parse {
                    line: line_idx + 1,
                    reason: format!("expected {expected} columns, found {row_len}"),
                });
            }
            Some(_) => {}
        }
        num_rows += 1;
    }

    Ok(nd::Array2::from_shape_vec((num_rows, num_cols.unwrap_or(0)), values)?)
}

/// Writes one row per line with a fixed number of decimals
pub fn write_vertex_table<W: Write, A>(writer: &mut W, vertices: &nd::ArrayView2<A>, precision: usize) -> std::io::Result<()>
where
    A: std::fmt::Display,
{
    for row in vertices.rows() {
        let line = row.iter().map(|v| format!("{v:.precision$}")).collect::<Vec<_>>().join(" ");
        writeln!(writer, "{line}")?;
    }
    Ok(())
}
