pub mod audio;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod state;

use std::{fs::OpenOptions, io, sync::Arc};

use anyhow::Context as _;
use clap::Parser as _;

use audio::{
    backend::{AudioBackend, NullBackend},
    cpal_backend::CpalBackend,
    decoder::SymphoniaDecoder,
};
use cli::{BackendKind, Cli};
use commands::Shell;
use config::Config;
use state::AppState;

/// Sink names offered by the null backend.
const NULL_SINKS: [&str; 2] = ["null-speakers", "null-headphones"];

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    log::info!("music-box starting up ({:?} backend)", cli.backend);

    let backend: Box<dyn AudioBackend> = match cli.backend {
        BackendKind::Cpal => Box::new(CpalBackend::new()),
        BackendKind::Null => Box::new(NullBackend::new(NULL_SINKS)),
    };

    let mut config = Config::default();
    if let Some(path) = &cli.config {
        config
            .load_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    let state = AppState::new(backend, Arc::new(SymphoniaDecoder)).with_config(config);
    let mut shell = Shell::new(state, io::stdout(), cli.quiet);
    shell.run(io::stdin().lock())?;

    log::info!("music-box exiting");
    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let default = if cli.verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));
    builder.format_timestamp_millis();
    if let Some(path) = &cli.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}
