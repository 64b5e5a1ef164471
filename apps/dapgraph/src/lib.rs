//! # dapgraph
//!
//! Inspector for dapgraph debug-session snapshots: configuration, snapshot
//! file handling and the CLI commands. The binary in `main.rs` only sets up
//! logging and the runtime.

pub mod cli;
pub mod config;
pub mod snapshot_file;
