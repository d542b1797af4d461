use clap::Parser;
use log::info;
use ndarray as nd;
use smpl_core::codec::vertex_table::read_vertex_table;
use smpl_core::metrics::chamfer::{reference_clouds, ChamferDistance, ChamferOptions, Reduction};
use smpl_core::SmplError;
use smpl_utils::logger::{setup_logger, LogLevel};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Computes the Chamfer distance between two batches of point clouds, by default the built-in 2x5x3 check clouds"
)]
struct Args {
    /// Vertex table used as the source cloud, replaces the built-in clouds
    #[arg(long, requires = "target")]
    source: Option<PathBuf>,
    #[arg(long, requires = "source")]
    target: Option<PathBuf>,
    /// Only the forward (source to target) term
    #[arg(long)]
    single_direction: bool,
    /// Only the backward (target to source) term, ignored unless --single-direction is set
    #[arg(long)]
    reverse: bool,
    /// sum, mean or none
    #[arg(long, default_value = "sum")]
    point_reduction: Reduction,
    /// sum, mean or none
    #[arg(long, default_value = "mean")]
    batch_reduction: Reduction,
}

#[allow(clippy::cast_possible_truncation)]
fn load_cloud(path: &Path) -> Result<nd::Array3<f32>, SmplError> {
    let table = read_vertex_table(path)?.mapv(|v| v as f32);
    Ok(table.insert_axis(nd::Axis(0)))
}

/// `--reverse` only has a meaning for a single direction
fn chamfer_options(args: &Args) -> ChamferOptions {
    ChamferOptions {
        bidirectional: !args.single_direction,
        reverse: args.reverse && args.single_direction,
        point_reduction: args.point_reduction,
        batch_reduction: args.batch_reduction,
    }
}

fn run(args: &Args) -> Result<(), SmplError> {
    let (source, target) = match (&args.source, &args.target) {
        (Some(source), Some(target)) => (load_cloud(source)?, load_cloud(target)?),
        _ => reference_clouds(),
    };
    println!("Source clouds:\n{source}");
    println!("Target clouds:\n{target}");

    let chamfer = ChamferDistance::new(chamfer_options(args));
    info!("Computing chamfer distance with {:?}", chamfer.options);

    let start = Instant::now();
    let dist = chamfer.compute(&source.view(), &target.view())?;
    let elapsed = start.elapsed();

    println!("Time taken: {:.6} seconds", elapsed.as_secs_f64());
    if dist.ndim() == 0 {
        println!("Chamfer distance: {}", dist.sum());
    } else {
        println!("Chamfer distance:\n{dist}");
    }
    Ok(())
}

fn main() -> ExitCode {
    setup_logger(LogLevel::Info);
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("chamfer_check").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn reverse_alone_keeps_both_directions() {
        let options = chamfer_options(&parse(&["--reverse"]));
        assert!(options.bidirectional);
        assert!(!options.reverse);
    }

    #[test]
    fn reverse_with_single_direction() {
        let options = chamfer_options(&parse(&["--single-direction", "--reverse"]));
        assert!(!options.bidirectional);
        assert!(options.reverse);
    }

    #[test]
    fn reductions_are_parsed() {
        let options = chamfer_options(&parse(&["--point-reduction", "none", "--batch-reduction", "sum"]));
        assert_eq!(options.point_reduction, Reduction::Keep);
        assert_eq!(options.batch_reduction, Reduction::Sum);
    }

    #[test]
    fn source_requires_target() {
        assert!(Args::try_parse_from(["chamfer_check", "--source", "a.txt"]).is_err());
    }
}
