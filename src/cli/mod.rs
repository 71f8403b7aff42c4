//! CLI module - Command-line interface for symptom-proxy
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// symptom-proxy - MedlinePlus symptom search proxy
/// Translates symptom queries into cached health-topic lookups
#[derive(Parser)]
#[command(name = "symptom-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API with the daily cache sweeper (default)
    #[command(alias = "daemon")]
    Serve,

    /// Run a single search and print the JSON response
    #[command(alias = "q")]
    Query {
        /// Symptom phrase, or keywords with --terms
        #[arg(required = true)]
        symptom: Vec<String>,
        /// Search each argument as a separate exact-phrase keyword
        #[arg(long)]
        terms: bool,
    },

    /// Create default config file
    InitConfig,
}

pub use commands::*;
