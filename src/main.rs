use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use hookgate::Config;
use hookgate::cli::{self, Cli, Commands};
use hookgate::config::{LogFormat, LoggingConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Config(args) => {
            // Config commands must work even when the file does not parse.
            init_logging(&LoggingConfig::default(), None, verbose)?;
            cli::config::run(args, config_path)
        }
        Commands::Serve(args) => cli::serve::run(args, load_config(config_path, verbose)?).await,
        Commands::Sign(args) => cli::sign::run(args, &load_config(config_path, verbose)?),
        Commands::Verify(args) => cli::verify::run(args, &load_config(config_path, verbose)?).await,
        Commands::Keys(args) => cli::keys::run(args, &load_config(config_path, verbose)?).await,
        Commands::Paths => cli::paths::run(&load_config(config_path, verbose)?),
    }
}

/// Load the config and start logging as it describes.
fn load_config(config_path: Option<&str>, verbose: bool) -> Result<Config> {
    let config = Config::load_with_override(config_path)?;
    init_logging(&config.logging, config.log_file(), verbose)?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig, file: Option<PathBuf>, verbose: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let (writer, ansi) = match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }

    Ok(())
}
