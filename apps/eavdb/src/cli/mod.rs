//! # eavdb CLI Module
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP server
//! - `run` - Feed a JSON-lines message script through a responder
//! - `check` - Parse and compile a rule document, report diagnostics
//! - `hash` - Evaluate rules (plus a script) and print per-database hashes
//! - `export` - Evaluate rules (plus a script) and write one database in canonical form

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use eavdb_core::EavError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// eavdb - incremental fact store and rule evaluator
#[derive(Parser, Debug)]
#[command(name = "eavdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file (missing file means defaults)
    #[arg(short, long, global = true, default_value = "eavdb.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a JSON-lines message script, printing every reply
    Run {
        /// Script file, one message per line
        #[arg(short, long)]
        script: PathBuf,
    },

    /// Parse and compile a rule document
    Check {
        /// Rule document (JSON)
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Evaluate rules and print the hash of every database
    Hash {
        /// Rule document (JSON)
        #[arg(short, long)]
        rules: PathBuf,

        /// Messages to feed after the initial evaluation
        #[arg(short, long)]
        script: Option<PathBuf>,
    },

    /// Evaluate rules and write one database in canonical binary form
    Export {
        /// Rule document (JSON)
        #[arg(short, long)]
        rules: PathBuf,

        /// Messages to feed after the initial evaluation
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Database to export
        #[arg(short, long, default_value = "browser")]
        database: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), EavError> {
    let json_mode = cli.json_mode;
    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command()
            .print_help()
            .map_err(|e| EavError::IoError(e.to_string()))?;
        return Ok(());
    };

    let mut config = Config::load(&cli.config)?;
    if cli.verbose {
        tracing::info!(config = ?config, "configuration");
    }

    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(config).await
        }
        Commands::Run { script } => cmd_run(config, &script),
        Commands::Check { rules } => cmd_check(&config, &rules, json_mode),
        Commands::Hash { rules, script } => {
            cmd_hash(config, &rules, script.as_deref(), json_mode)
        }
        Commands::Export {
            rules,
            script,
            database,
            output,
        } => cmd_export(config, &rules, script.as_deref(), &database, &output),
    }
}
