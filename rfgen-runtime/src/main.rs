use anyhow::{anyhow, Result};
use clap::{arg, ArgAction, ArgMatches, Command};
use rfgen_runtime::{generate, Backend};
use rfgen_structs::{config::KernelSettings, core::InputData};
use rfgen_utils::{compress_obj, jsonify, load_json_arg};
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

fn generator_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(
            arg!(<SETTINGS> "Settings json string or path to json file")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            arg!(<INPUT> "Input json string, path to json file, or '-' for stdin")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            arg!(--threads [THREADS] "Number of CPU worker threads (default: all cores)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--gpu [GPU] "Run on this CUDA device instead of the CPU")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--output [OUTPUT_FILE] "If set, the output data will be saved to this file path (default json)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--compress [COMPRESS] "If output file is set, the output data will be compressed as zlib")
                .action(ArgAction::SetTrue),
        )
}

fn cli() -> Command {
    Command::new("rfgen-runtime")
        .about("Generates structured random features")
        .arg_required_else_help(true)
        .subcommand(generator_command("features", "Computes random features"))
        .subcommand(generator_command(
            "gradient",
            "Computes random features and their lengthscale gradient",
        ))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn main() {
    init_tracing();
    let matches = cli().get_matches();

    if let Err(e) = match matches.subcommand() {
        Some(("features", sub_m)) => run(sub_m, false),
        Some(("gradient", sub_m)) => run(sub_m, true),
        _ => Err(anyhow!("Invalid subcommand")),
    } {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn required<'a>(sub_m: &'a ArgMatches, name: &str) -> Result<&'a String> {
    sub_m
        .get_one::<String>(name)
        .ok_or_else(|| anyhow!("Missing argument {}", name))
}

fn run(sub_m: &ArgMatches, with_gradient: bool) -> Result<()> {
    let settings = load_json_arg::<KernelSettings>(required(sub_m, "SETTINGS")?)
        .map_err(|e| anyhow!("Failed to load settings: {}", e))?;
    let input = load_json_arg::<InputData>(required(sub_m, "INPUT")?)
        .map_err(|e| anyhow!("Failed to load input: {}", e))?;
    let backend = select_backend(
        sub_m.get_one::<usize>("threads").copied(),
        sub_m.get_one::<usize>("gpu").copied(),
    )?;

    let output_data = generate(&settings, &input, &backend, with_gradient)?;

    match sub_m.get_one::<PathBuf>("output") {
        Some(path) => {
            if sub_m.get_flag("compress") {
                fs::write(path, compress_obj(&output_data)?)?;
            } else {
                fs::write(path, jsonify(&output_data)?)?;
            }
            println!("output_data written to: {:?}", path);
        }
        None => println!("{}", jsonify(&output_data)?),
    }
    Ok(())
}

fn select_backend(threads: Option<usize>, gpu: Option<usize>) -> Result<Backend> {
    match gpu {
        #[cfg(feature = "cuda")]
        Some(ordinal) => Ok(Backend::Gpu(rfgen_kernels::gpu::GpuContext::new(ordinal)?)),
        #[cfg(not(feature = "cuda"))]
        Some(_) => Err(anyhow!("--gpu requires a build with the 'cuda' feature")),
        None => {
            let num_threads = threads.unwrap_or_else(|| {
                std::thread::available_parallelism().map_or(1, |n| n.get())
            });
            Ok(Backend::Cpu { num_threads })
        }
    }
}
