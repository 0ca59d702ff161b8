#![doc = include_str!("../../README.md")]
#![warn(clippy::pedantic)]
#![warn(unused_crate_dependencies)]
// This lint is too noisy and enforces a style that reduces readability in many cases.
#![allow(clippy::module_name_repetitions)]

mod cli;
mod logging;

use crate::cli::{BuildArgs, Cli, Command, InspectArgs, RunArgs};
use crate::logging::{log_error, setup_logging};
use clap::Parser;
use dockyard::build::base::LocalBaseStore;
use dockyard::build::BuildSequencer;
use dockyard::data::descriptor::DESCRIPTOR_FILE_NAME;
use dockyard::exit_code;
use dockyard::launch::process::ProcessRuntime;
use dockyard::launch::{AppExit, LaunchComposer};
use dockyard::store::{ImageStore, StoreError, StoredImage};
use dockyard::{BuildError, LaunchError};
use log::info;

// Suppress warnings due to the `unused_crate_dependencies` lint not handling integration tests well.
#[cfg(test)]
use assert_cmd as _;
#[cfg(test)]
use tempfile as _;

fn main() {
    let cli = Cli::parse();

    if let Err(error) = setup_logging(cli.verbose, cli.quiet) {
        eprintln!("Unable to initialize logger: {error}");
        std::process::exit(exit_code::GENERIC_UNSPECIFIED_ERROR);
    }

    let code = match cli.command {
        Command::Build(args) => run_build_command(&args),
        Command::Run(args) => run_run_command(&args),
        Command::Inspect(args) => run_inspect_command(&args),
    };

    std::process::exit(code);
}

fn run_build_command(args: &BuildArgs) -> i32 {
    let descriptor_path = args
        .file
        .clone()
        .unwrap_or_else(|| args.context.join(DESCRIPTOR_FILE_NAME));

    let sequencer = BuildSequencer::new(
        ImageStore::new(&args.store.store),
        LocalBaseStore::new(&args.bases),
        &args.index,
    );

    info!("Building image {} from {}", args.tag, descriptor_path.display());

    match sequencer.build(&args.context, &descriptor_path, &args.tag) {
        Ok(image) => {
            println!("{}", image.dir().display());
            exit_code::GENERIC_SUCCESS
        }
        Err(error) => {
            log_error("Build failed", build_error_body(&error));
            error.exit_code()
        }
    }
}

fn build_error_body(error: &BuildError) -> String {
    match error {
        BuildError::CannotReadDescriptor(_) => format!(
            "{error}\nHint: Verify that a readable file named \"{DESCRIPTOR_FILE_NAME}\" exists in the build context or pass --file."
        ),
        BuildError::BaseUnavailable(_) => {
            format!("{error}\nHint: Verify the base environment exists in the base store (--bases).")
        }
        _ => error.to_string(),
    }
}

fn run_run_command(args: &RunArgs) -> i32 {
    match run_image(args) {
        Ok(exit) => exit.code,
        Err(error) => {
            log_error("Launch failed", error.to_string());
            error.exit_code()
        }
    }
}

fn run_image(args: &RunArgs) -> Result<AppExit, LaunchError> {
    let image = ImageStore::new(&args.store.store).open(&args.tag)?;
    let launch = &image.config().launch;

    let mut composer = LaunchComposer::new(ProcessRuntime::for_image(&image)?);
    composer.launcher(launch.launcher.clone());

    let configured_host = launch.host.to_string();
    let descriptor = composer.compose(
        &launch.entry_point,
        Some(args.host.as_deref().unwrap_or(&configured_host)),
        Some(args.port.unwrap_or(i64::from(launch.port))),
    )?;

    composer.execute(&descriptor)
}

fn run_inspect_command(args: &InspectArgs) -> i32 {
    match ImageStore::new(&args.store.store).open(&args.tag) {
        Ok(image) => {
            print_image(&image);
            exit_code::GENERIC_SUCCESS
        }
        Err(error @ StoreError::ImageNotFound(_)) => {
            log_error(
                "Image not found",
                format!(
                    "{error}\nHint: Build it with: dockyard build --tag {}",
                    args.tag
                ),
            );
            exit_code::GENERIC_UNSPECIFIED_ERROR
        }
        Err(error) => {
            log_error("Cannot read image", error.to_string());
            exit_code::GENERIC_UNSPECIFIED_ERROR
        }
    }
}

fn print_image(image: &StoredImage) {
    let config = image.config();

    println!("Image:       {}", config.tag);
    println!("Base:        {} ({})", config.base, config.base_digest);
    println!("Working dir: {}", config.working_dir.display());
    println!("Command:     {}", config.launch.command_line());
    println!(
        "Ports:       {}",
        config
            .exposed_ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    println!("Environment:");
    for (key, value) in &config.env {
        println!("  {key}={value}");
    }

    println!("Packages:");
    for package in &config.dependencies {
        println!("  {} {}", package.name, package.version);
    }
}
