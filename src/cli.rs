use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// System audio through CPAL
    Cpal,
    /// Software sink, no audio hardware
    Null,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "music-box")]
#[command(about = "Two-deck mixer and sample player for the terminal")]
pub struct Cli {
    /// Configuration file read before the first prompt.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Append log output to this file instead of stderr.
    #[arg(short = 'l', long)]
    pub log_file: Option<PathBuf>,

    /// No prompt and no chatter, for scripted input.
    #[arg(short, long)]
    pub quiet: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Audio backend.
    #[arg(long, value_enum, default_value_t = BackendKind::Cpal)]
    pub backend: BackendKind,
}
