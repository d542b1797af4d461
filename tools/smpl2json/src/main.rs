use clap::Parser;
use log::info;
use smpl_core::common::types::Gender;
use smpl_core::conversions::model2json::{convert_model_file, ConvertOptions};
use smpl_utils::logger::{setup_logger, LogLevel};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Converts SMPL model files (.pkl or .npz) into SMPL_<GENDER>.json files of nested numeric arrays"
)]
struct Args {
    /// Model files to convert, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
    /// Gender of the model (neutral, male or female). Inferred from the file name when omitted
    #[arg(short, long)]
    gender: Option<Gender>,
}

fn main() -> ExitCode {
    setup_logger(LogLevel::Info);
    let args = Args::parse();
    let options = ConvertOptions {
        output_dir: args.output_dir,
        gender: args.gender,
    };
    for file in &args.files {
        info!("Converting {}", file.display());
        match convert_model_file(file, &options) {
            Ok(out_path) => println!("Writing {}", out_path.display()),
            Err(e) => {
                eprintln!("Error converting {}: {e}", file.display());
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
