use crate::config::DEFAULT_CONFIG_FILE;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "guac-stack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate a Guacamole deployment from a small configuration document")]
#[command(long_about = "Compiles one configuration document into a docker-compose topology, nginx configuration and, with Let's Encrypt, a certificate bootstrap script that all agree on the same domain and paths.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration document
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = "GUAC_STACK_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty configuration document
    Init,

    /// Print the value stored at a dotted key path
    Get {
        /// Key path, e.g. ssl.domain
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Store a value at a dotted key path
    Set {
        /// Key path, e.g. versions.guacamole
        #[arg(value_name = "PATH")]
        path: String,

        /// Value; `true`/`false` are stored as booleans, anything else as text
        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Generate the deployment artifacts
    Generate {
        /// Output directory for generated files
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// Fail instead of prompting for unset values
        #[arg(long)]
        non_interactive: bool,

        /// Print generated files instead of writing them
        #[arg(long)]
        dry_run: bool,

        /// Pull the pinned images after generation
        #[arg(long, conflicts_with = "dry_run")]
        pull: bool,
    },
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
