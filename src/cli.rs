//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Method-interception logging pipeline
#[derive(Parser, Debug)]
#[command(name = "interlog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline config file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Validate the config and print a summary
    Check,

    /// Print the interception decision of every method in a type manifest
    Resolve {
        /// Type manifest (TOML, `[[types]]` tables)
        #[arg(long, value_name = "FILE")]
        types: PathBuf,
    },

    /// Run the pipeline against generated calls and print statistics
    Demo {
        /// Number of intercepted calls to generate
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
}

// =============================================================================
// Tests
// =============================================================================
