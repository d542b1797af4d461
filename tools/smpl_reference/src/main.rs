use clap::Parser;
use log::info;
use ndarray as nd;
use smpl_core::codec::vertex_table::write_vertex_table;
use smpl_core::common::{betas::Betas, pose::Pose, smpl_model::SmplModel, types::Gender};
use smpl_core::SmplError;
use smpl_utils::logger::{setup_logger, LogLevel};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_BETAS: f32 = 0.1;
const DEFAULT_GLOBAL_ORIENT: f32 = 0.7;
const DEFAULT_BODY_POSE: f32 = -0.2;
const DEFAULT_TRANSL: f32 = 3.5;
const OUTPUT_PRECISION: usize = 8;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Runs the SMPL forward pass with constant parameters and writes the vertices as a text table, as a reference for other implementations"
)]
#[command(allow_negative_numbers = true)]
struct Args {
    /// Model file (.npz or the .json written by smpl2json)
    model_path: PathBuf,
    output_file: PathBuf,
    /// Value of every shape coefficient
    #[arg(long, default_value_t = DEFAULT_BETAS)]
    betas: f32,
    /// Value of every global orientation component
    #[arg(long, default_value_t = DEFAULT_GLOBAL_ORIENT)]
    global_orient: f32,
    /// Value of every body joint axis-angle component
    #[arg(long, default_value_t = DEFAULT_BODY_POSE)]
    body_pose: f32,
    #[arg(long, default_value_t = DEFAULT_TRANSL)]
    transl: f32,
    #[arg(short, long, default_value = "neutral")]
    gender: Gender,
}

fn run(args: &Args) -> Result<(), SmplError> {
    let model = SmplModel::new_from_file(&args.model_path, args.gender)?;
    info!(
        "Loaded {} model with {} verts, {} joints, {} betas",
        args.gender,
        model.num_verts(),
        model.num_joints(),
        model.num_betas()
    );

    let betas = Betas::new_filled(model.num_betas(), args.betas);
    let pose = Pose::new_filled(model.num_joints(), args.global_orient, args.body_pose);
    let transl = nd::Array1::from_elem(3, args.transl);
    let output = model.forward(&betas, &pose, &transl)?;
    info!("Posed {} vertices and {} joints", output.num_verts(), output.num_joints());

    let file = File::create(&args.output_file).map_err(|e| SmplError::io(&args.output_file, e))?;
    let mut writer = BufWriter::new(file);
    write_vertex_table(&mut writer, &output.verts.view(), OUTPUT_PRECISION)
        .and_then(|()| writer.flush())
        .map_err(|e| SmplError::io(&args.output_file, e))?;
    Ok(())
}

fn main() -> ExitCode {
    setup_logger(LogLevel::Info);
    let args = Args::parse();
    match run(&args) {
        Ok(()) => {
            println!("Vertices written to {}", args.output_file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
