#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

mod commands;
mod logging;

use bundle_free_core::Config;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bundle-free")]
#[command(author, version, about = "Serve ES module apps straight from node_modules", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (logs, and the resolve report)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the development server
    Serve {
        /// Port to listen on
        #[arg(long, short = 'p', default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Mount path of the application
        #[arg(long)]
        base: Option<String>,

        /// Application directory
        #[arg(long)]
        path: Option<PathBuf>,

        /// Package to expose through the import map (repeatable)
        #[arg(long = "module", short = 'm', value_name = "NAME")]
        modules: Vec<String>,

        /// Serve the default document for unmatched requests
        #[arg(long)]
        spa: bool,

        /// Inject the error overlay
        #[arg(long)]
        overlay: bool,

        /// Inject the live-reload client
        #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_LIVERELOAD_PORT_STR)]
        livereload: Option<u16>,

        /// Open browser automatically
        #[arg(long)]
        open: bool,

        /// Path to config file (overrides auto-discovery)
        #[arg(long, short = 'c', value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Explain how a package resolves
    Resolve {
        /// Package name
        name: String,

        /// Sub-path (e.g. "./utils"); defaults to the package root
        subpath: Option<String>,

        /// Condition to resolve under (repeatable, default "import")
        #[arg(long = "condition", value_name = "C")]
        conditions: Vec<String>,
    },

    /// Print the import map for the configured modules
    Importmap {
        /// Package to expose (repeatable)
        #[arg(long = "module", short = 'm', value_name = "NAME")]
        modules: Vec<String>,

        /// Mount path the map is resolved against
        #[arg(long)]
        base: Option<String>,

        /// Path to config file (overrides auto-discovery)
        #[arg(long, short = 'c', value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

/// `--livereload` without a value; matches `config::DEFAULT_LIVERELOAD_PORT`.
const DEFAULT_LIVERELOAD_PORT_STR: &str = "35729";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    let rt = tokio::runtime::Runtime::new().into_diagnostic()?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            base,
            path,
            modules,
            spa,
            overlay,
            livereload,
            open,
            config: config_file,
        } => {
            let span = tracing::info_span!("serve", cmd = "serve", cwd = %cwd.display());
            let _guard = span.enter();
            let action = commands::serve::ServeAction {
                cwd: config.cwd.clone(),
                port,
                host,
                base,
                path,
                modules,
                spa,
                overlay,
                livereload,
                open,
                config: config_file,
            };
            rt.block_on(commands::serve::run(action))
        }
        Commands::Resolve {
            name,
            subpath,
            conditions,
        } => rt.block_on(commands::resolve::run(
            &config.cwd,
            &name,
            subpath.as_deref(),
            &conditions,
            cli.json,
        )),
        Commands::Importmap {
            modules,
            base,
            config: config_file,
        } => rt.block_on(commands::importmap::run(
            &config.cwd,
            &modules,
            base.as_deref(),
            config_file,
        )),
    }
}
