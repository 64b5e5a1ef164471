//! # dapgraph CLI Module
//!
//! ## Available Commands
//!
//! - `resolve` - Resolve a query pattern
//! - `parse` - Parse a pattern and print its canonical form
//! - `view` - Show a window over a filtered, sorted entity list
//! - `stats` - Entity and edge counts
//! - `focus` - Focus an entity (saved into the snapshot)
//! - `toggle` - Toggle a breakpoint (saved into the snapshot)
//! - `convert` - Re-encode the snapshot (binary <-> JSON by extension)

mod commands;

use crate::config::AppConfig;
use crate::snapshot_file::load_state;
use clap::{Parser, Subcommand};
use dapgraph_core::GraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// dapgraph - debug session inspector
///
/// Queries and edits snapshots of the reactive debugger graph.
#[derive(Parser, Debug)]
#[command(name = "dapgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Snapshot file (`.json` for JSON, anything else binary)
    #[arg(short, long, global = true, default_value = "session.dapg")]
    pub snapshot: PathBuf,

    /// Configuration file (falls back to $DAPGRAPH_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Focus scope anchors resolve in (default: global)
    #[arg(long, global = true)]
    pub scope: Option<String>,

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
    /// Resolve a query pattern
    Resolve {
        /// Pattern, e.g. `@session/threads(state=stopped)`
        pattern: String,

        /// Print every match instead of the single result
        #[arg(short, long)]
        all: bool,
    },

    /// Parse a pattern and print its canonical form
    Parse {
        pattern: String,
    },

    /// Show a window over entities of one type
    View {
        /// Entity type
        #[arg(short, long)]
        kind: String,

        /// Predicate `field<op>value` with op one of = != < <= > >= (repeatable)
        #[arg(short = 'w', long = "where")]
        predicates: Vec<String>,

        /// Sort by this property
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Window offset
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Window size (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show entity and edge counts
    Stats,

    /// Focus an entity and save the snapshot
    Focus {
        uri: String,
    },

    /// Toggle a breakpoint and save the snapshot
    Toggle {
        /// Source file path
        #[arg(short, long)]
        path: String,

        /// 1-based line
        #[arg(short = 'n', long)]
        line: u32,

        /// 1-based column
        #[arg(long)]
        column: Option<u32>,
    },

    /// Write the snapshot to another file, re-encoded by extension
    Convert {
        #[arg(short, long)]
        output: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
///
/// Must run inside a `LocalSet`.
pub async fn execute(cli: Cli) -> Result<(), GraphError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let state = load_state(Some(&cli.snapshot), config.schema())?;
    let ctx = Context {
        state,
        snapshot: cli.snapshot,
        scope: cli.scope,
        json_mode: cli.json_mode,
        default_limit: config.view.default_limit,
    };

    match cli.command {
        Some(Commands::Resolve { pattern, all }) => cmd_resolve(&ctx, &pattern, all),
        Some(Commands::Parse { pattern }) => cmd_parse(&ctx, &pattern),
        Some(Commands::View {
            kind,
            predicates,
            sort,
            desc,
            offset,
            limit,
        }) => cmd_view(
            &ctx,
            &ViewArgs {
                kind,
                predicates,
                sort,
                descending: desc,
                offset,
                limit,
            },
        ),
        Some(Commands::Stats) | None => cmd_stats(&ctx),
        Some(Commands::Focus { uri }) => cmd_focus(&ctx, &uri),
        Some(Commands::Toggle { path, line, column }) => {
            cmd_toggle(&ctx, &path, line, column).await
        }
        Some(Commands::Convert { output }) => cmd_convert(&ctx, &output),
    }
}
