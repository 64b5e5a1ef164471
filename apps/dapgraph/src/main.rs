//! # dapgraph - Debug Session Inspector
//!
//! Loads a snapshot of debugger state (sessions, threads, frames, scopes,
//! variables, breakpoints) and queries or edits it from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Resolve a pattern against the focused frame
//! dapgraph -s session.dapg resolve '@frame/scopes'
//!
//! # Every stopped thread, as JSON
//! dapgraph -s session.dapg --json-mode resolve --all 'threads(state=stopped)'
//!
//! # Toggle a breakpoint and save it back
//! dapgraph -s session.dapg toggle --path /src/app.py --line 3
//! ```

use clap::Parser;
use dapgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // DAPGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("DAPGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let cli = cli::Cli::parse();
    let default_filter = if cli.verbose {
        "dapgraph=debug,dapgraph_core=debug"
    } else {
        "dapgraph=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

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

    // Core handles are !Send; every task stays on this thread.
    let local = tokio::task::LocalSet::new();
    if let Err(e) = local.run_until(cli::execute(cli)).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
