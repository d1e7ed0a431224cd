//! CLI module for GraphMind
//!
//! Provides subcommands:
//! - `ask`: answer one question and print the response
//! - `config`: print the effective configuration

pub mod ask;
pub mod config;

use clap::{Parser, Subcommand};

/// GraphMind - agentic hybrid-retrieval question answering
#[derive(Parser)]
#[command(name = "graphmind")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Answer a question
    Ask(ask::AskArgs),

    /// Print the effective configuration as JSON
    Config,
}
