//! Element-wise comparison of two vertex tables produced by different
//! implementations of the same forward pass.

use crate::error::SmplError;
use log::info;
use ndarray as nd;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Largest absolute difference per coordinate that still counts as a match
pub const DEFAULT_TOLERANCE: f64 = 1e-5;
/// Number of mismatching rows listed in a report; the count is never truncated
pub const MAX_REPORTED_MISMATCHES: usize = 10;

/// A row whose coordinates differ beyond the tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub index: usize,
    pub row_a: Vec<f64>,
    pub row_b: Vec<f64>,
}

/// Verdict of a single comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexComparison {
    pub num_rows: usize,
    pub tolerance: f64,
    /// Exact number of mismatching rows
    pub mismatch_count: usize,
    /// The first mismatching rows in ascending index order
    pub mismatches: Vec<Mismatch>,
    pub max_abs_diff: f64,
}

/// Compares two tables of identical shape row by row.
///
/// A row mismatches when any of its element-wise absolute differences is not
/// `<= tolerance`, so NaN differences count as mismatches.
///
/// # Errors
/// Returns [`SmplError::ShapeMismatch`] without comparing anything if the
/// tables differ in row or column count.
pub fn compare(table_a: &nd::ArrayView2<f64>, table_b: &nd::ArrayView2<f64>, tolerance: f64) -> Result<VertexComparison, SmplError> {
    if table_a.dim() != table_b.dim() {
        return Err(SmplError::ShapeMismatch {
            lhs: table_a.dim(),
            rhs: table_b.dim(),
        });
    }

    let mut mismatch_count = 0;
    let mut mismatches = Vec::new();
    let mut max_abs_diff: f64 = 0.0;
    for (index, (row_a, row_b)) in table_a.rows().into_iter().zip(table_b.rows()).enumerate() {
        let mut row_matches = true;
        for (a, b) in row_a.iter().zip(row_b.iter()) {
            let diff = (a - b).abs();
            max_abs_diff = max_abs_diff.max(diff);
            row_matches &= diff <= tolerance;
        }
        if row_matches {
            continue;
        }
        mismatch_count += 1;
        if mismatches.len() < MAX_REPORTED_MISMATCHES {
            mismatches.push(Mismatch {
                index,
                row_a: row_a.to_vec(),
                row_b: row_b.to_vec(),
            });
        }
    }

    info!(
        "Compared {} rows at tolerance {tolerance:e}: {mismatch_count} mismatching, max abs diff {max_abs_diff:e}",
        table_a.nrows()
    );

    Ok(VertexComparison {
        num_rows: table_a.nrows(),
        tolerance,
        mismatch_count,
        mismatches,
        max_abs_diff,
    })
}

fn format_row(row: &[f64]) -> String {
    let values: Vec<String> = row.iter().map(ToString::to_string).collect();
    format!("[{}]", values.join(" "))
}

impl VertexComparison {
    pub fn passed(&self) -> bool {
        self.mismatch_count == 0
    }

    /// Writes the human readable verdict
    pub fn write_report<W: Write>(&self, writer: &mut W, label_a: &str, label_b: &str) -> std::io::Result<()> {
        if self.passed() {
            return writeln!(writer, "All vertices match up to 5 decimal places!");
        }
        writeln!(
            writer,
            "Mismatches found at {} vertices (difference above {:e}):",
            self.mismatch_count, self.tolerance
        )?;
        for mismatch in &self.mismatches {
            writeln!(
                writer,
                "Vertex {}: {label_a} = {}, {label_b} = {}",
                mismatch.index,
                format_row(&mismatch.row_a),
                format_row(&mismatch.row_b)
            )?;
        }
        Ok(())
    }

    pub fn report_string(&self, label_a: &str, label_b: &str) -> String {
        let mut out = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_report(&mut out, label_a, label_b);
        String::from_utf8_lossy(&out).into_owned()
    }
}
