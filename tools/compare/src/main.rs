use clap::Parser;
use smpl_core::codec::vertex_table::read_vertex_table;
use smpl_core::metrics::vertex_compare::{compare, DEFAULT_TOLERANCE};
use smpl_core::SmplError;
use smpl_utils::logger::{setup_logger, LogLevel};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Compares two whitespace-delimited vertex tables (one vertex per line) and reports the vertices whose coordinates differ by more than the tolerance"
)]
struct Args {
    file_a: PathBuf,
    file_b: PathBuf,
    /// Largest absolute difference per coordinate that still counts as a match
    #[arg(default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
    /// Name used for the first table in the report
    #[arg(long, default_value = "A")]
    label_a: String,
    #[arg(long, default_value = "B")]
    label_b: String,
    /// Print the comparison as json instead of the text report
    #[arg(long)]
    json: bool,
    /// Exit with status 1 when any vertex mismatches
    #[arg(long)]
    strict: bool,
}

/// Compares the two tables named in `args` and writes the verdict to `out`.
/// Returns whether every vertex matched.
fn run<W: Write>(args: &Args, out: &mut W) -> Result<bool, SmplError> {
    let table_a = read_vertex_table(&args.file_a)?;
    let table_b = read_vertex_table(&args.file_b)?;
    let comparison = compare(&table_a.view(), &table_b.view(), args.tolerance)?;

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &comparison)?;
        writeln!(out).map_err(|e| SmplError::io("<stdout>", e))?;
    } else {
        comparison
            .write_report(out, &args.label_a, &args.label_b)
            .map_err(|e| SmplError::io("<stdout>", e))?;
    }
    Ok(comparison.passed())
}

/// Process status for the outcome of [`run`], errors are described on `err`.
/// Mismatches only fail with `--strict`.
fn exit_status<E: Write>(args: &Args, outcome: Result<bool, SmplError>, err: &mut E) -> u8 {
    // stderr being gone does not change the status
    let _ = match outcome {
        Ok(passed) if passed || !args.strict => return 0,
        Ok(_) => return 1,
        Err(SmplError::ShapeMismatch { lhs, rhs }) => writeln!(err, "Shape mismatch between files!")
            .and_then(|()| writeln!(err, "{}: {lhs:?}, {}: {rhs:?}", args.file_a.display(), args.file_b.display())),
        Err(e) => writeln!(err, "Error: {e}"),
    };
    1
}

fn main() -> ExitCode {
    setup_logger(LogLevel::Info);
    let args = Args::parse();
    let outcome = run(&args, &mut std::io::stdout().lock());
    ExitCode::from(exit_status(&args, outcome, &mut std::io::stderr().lock()))
}
