use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "devbox",
    version,
    about = "Build, save, load, start, enter, stop and clean the GPU development container.",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Print every docker invocation before running it
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<gpu_devbox::ColorMode>,

    /// Directory holding devbox.yml, .env and container/ (default: current directory)
    #[arg(long = "project-dir", global = true)]
    pub(crate) project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Build the image from the container definition (offers to save an archive)
    Build,
    /// Save the built image to the archive file
    Save,
    /// Load the image from the archive file
    Load,
    /// Open a shell in the container, starting it first if needed
    Run,
    /// Start the container (idempotent)
    Start,
    /// Stop the container and optionally remove it
    Stop,
    /// Remove the container; optionally the image, archive and cache volumes
    Clean {
        /// Also offer to delete the saved image archive
        #[arg(long = "purge-archive")]
        purge_archive: bool,
        /// Also offer to delete the package cache volumes
        #[arg(long = "purge-volumes")]
        purge_volumes: bool,
    },
    /// Show execution mode, image, archive, container and volume state
    Status {
        /// Machine-readable key=value lines on stdout
        #[arg(long)]
        porcelain: bool,
    },
    /// Follow the container's logs
    Logs,
}

impl Command {
    /// Commands that change host or daemon state and therefore show the privileged banner.
    pub(crate) fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Run | Command::Start | Command::Stop | Command::Clean { .. }
        )
    }

    pub(crate) fn needs_gpu(&self) -> bool {
        matches!(self, Command::Run | Command::Start)
    }
}
