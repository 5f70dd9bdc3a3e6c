#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use depmap_core::ResolverConfig;
use miette::Result;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "depmap")]
#[command(author, version, about = "Inspect installed npm packages and their exports", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON output on stdout and JSON logs on stderr
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Resolver config file (JSON)
    #[arg(long, global = true, value_name = "FILE", env = "DEPMAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// List installed packages and where they were found
    Locations {
        /// Only show versions of this package
        #[arg(long)]
        name: Option<String>,
    },

    /// List the importable subpaths of a package
    Exports {
        /// Installed package as name@version
        #[arg(required_unless_present = "dir", conflicts_with = "dir")]
        id: Option<String>,

        /// Package directory to inspect instead of an installed package
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Accepted export condition, highest priority first (repeatable)
        #[arg(long = "condition", value_name = "KEY")]
        conditions: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    let config = match &cli.config {
        Some(path) => ResolverConfig::load(path).map_err(commands::report)?,
        None => ResolverConfig::default(),
    };
    debug!(cwd = %cwd.display(), ?config, "Starting");

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Locations { name }) => {
            commands::locations::run(&cwd, &config, name.as_deref(), cli.json)
        }
        Some(Commands::Exports {
            id,
            dir,
            conditions,
        }) => {
            let config = if conditions.is_empty() {
                config
            } else {
                config.with_condition_keys(conditions)
            };
            let target = match (&id, &dir) {
                (_, Some(dir)) => commands::exports::Target::Directory(dir),
                (Some(id), None) => commands::exports::Target::Installed(id),
                (None, None) => {
                    return Err(miette::miette!("Either a package id or --dir is required"))
                }
            };
            commands::exports::run(&cwd, config, target, cli.json)
        }
    }
}
