//! # eavdb
//!
//! The eavdb binary: an HTTP server and a CLI around one responder.
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! eavdb serve --host 0.0.0.0 --port 8080
//!
//! # Compile a rule document and report diagnostics
//! eavdb check -r rules.json
//!
//! # Evaluate rules, feed events, print database hashes
//! eavdb hash -r rules.json -s events.jsonl
//! ```

use clap::Parser;
use eavdb::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // EAVDB_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("EAVDB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "eavdb=info,eavdb_core=info,tower_http=debug".into());

    // Logs go to stderr; stdout carries command output.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    eprintln!(
        r#"
  eavdb v{}
  entity / attribute / value, evaluated to a fixpoint
"#,
        env!("CARGO_PKG_VERSION")
    );
}
