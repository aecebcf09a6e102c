use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{Config, DEFAULT_CONFIG_TEMPLATE};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., verification.scheme)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., verification.auto_reject)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config_override: Option<&str>) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(config_override, &format),
        ConfigCommands::Get { key } => get_config(config_override, &key),
        ConfigCommands::Set { key, value } => set_config(config_override, &key, &value),
        ConfigCommands::Path => show_path(config_override),
        ConfigCommands::Init { force } => init_config(config_override, force),
    }
}

fn show_config(config_override: Option<&str>, format: &str) -> Result<()> {
    let mut config = Config::load_with_override(config_override)?;
    // The secret may be a literal; never echo it.
    if config.verification.secret.is_some() {
        config.verification.secret = Some("<redacted>".to_string());
    }

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        _ => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

fn get_config(config_override: Option<&str>, key: &str) -> Result<()> {
    let config = Config::load_with_override(config_override)?;
    let value = config.get_value(key)?;
    println!("{}", value);
    Ok(())
}

fn set_config(config_override: Option<&str>, key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_with_override(config_override)?;
    config.set_value(key, value)?;
    config.save()?;
    let shown = if key == "verification.secret" {
        "<set>"
    } else {
        value
    };
    println!("Set {} = {}", key, shown);
    Ok(())
}

fn show_path(config_override: Option<&str>) -> Result<()> {
    match config_override {
        Some(path) => println!("{}", shellexpand::tilde(path)),
        None => println!("{}", Config::config_path()?.display()),
    }
    Ok(())
}

fn init_config(config_override: Option<&str>, force: bool) -> Result<()> {
    let path = match config_override {
        Some(path) => std::path::PathBuf::from(shellexpand::tilde(path).as_ref()),
        None => Config::config_path()?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;

    println!("Created config file at {}", path.display());
    Ok(())
}
