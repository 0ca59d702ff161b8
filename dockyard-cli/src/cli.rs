use clap::{ArgAction, Args, Parser, Subcommand};
use dockyard::data::image::ImageTag;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dockyard", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Log more details, can be repeated
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Builds an image from the image descriptor of a build context
    Build(BuildArgs),
    /// Runs the foreground process of an image
    Run(RunArgs),
    /// Prints the launch command, environment and installed packages of an image
    Inspect(InspectArgs),
}

#[derive(Args)]
pub(crate) struct StoreArgs {
    /// Directory of the image store
    #[arg(long, env = "DOCKYARD_STORE", default_value = ".dockyard/images")]
    pub store: PathBuf,
}

#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Build context directory
    #[arg(default_value = ".")]
    pub context: PathBuf,
    /// Image descriptor, defaults to 'dockyard.toml' in the build context
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Tag of the built image
    #[arg(short, long)]
    pub tag: ImageTag,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Directory of the base environment store
    #[arg(long, env = "DOCKYARD_BASES", default_value = ".dockyard/bases")]
    pub bases: PathBuf,
    /// Package index that dependencies are resolved against
    #[arg(long, env = "DOCKYARD_INDEX", default_value = ".dockyard/index.toml")]
    pub index: PathBuf,
}

#[derive(Args)]
pub(crate) struct RunArgs {
    /// Tag of the image to run
    pub tag: ImageTag,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Host to bind to instead of the image's configured host
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind to instead of the image's configured port
    #[arg(long, allow_negative_numbers = true)]
    pub port: Option<i64>,
}

#[derive(Args)]
pub(crate) struct InspectArgs {
    /// Tag of the image to inspect
    pub tag: ImageTag,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_command() {
        // Trigger Clap's internal assertions that validate the command configuration.
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_build_defaults() {
        let cli = Cli::try_parse_from(["dockyard", "build", "--tag", "service"]).unwrap();

        let Command::Build(args) = cli.command else {
            panic!("Expected build command");
        };

        assert_eq!(args.context, PathBuf::from("."));
        assert_eq!(args.file, None);
        assert_eq!(args.tag.as_str(), "service");
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "dockyard", "-vv", "run", "service", "--host", "127.0.0.1", "--port", "-1",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("Expected run command");
        };

        assert_eq!(args.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(args.port, Some(-1));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn reject_invalid_tag() {
        assert!(Cli::try_parse_from(["dockyard", "inspect", "not a tag"]).is_err());
    }
}
