use anyhow::{Context, Result};
use clap::Args;

use crate::config::Config;
use crate::signature::{KeyProvider, RemoteKeyProvider};

#[derive(Args)]
pub struct KeysArgs {
    /// Key set URL (overrides keys.url)
    #[arg(long)]
    pub url: Option<String>,

    /// Print each key's PEM as well
    #[arg(long)]
    pub pem: bool,
}

pub async fn run(args: KeysArgs, config: &Config) -> Result<()> {
    let mut key_config = config.key_config();
    if let Some(url) = args.url {
        key_config.url = url;
    }

    let provider = RemoteKeyProvider::new(key_config).context("Failed to create key provider")?;
    let keys = provider
        .fetch_key_set()
        .await
        .with_context(|| format!("Failed to fetch keys from {}", provider.url()))?;

    println!("Keys from {} ({})", provider.url(), keys.len());
    println!();
    for entry in keys.entries() {
        let current = if entry.is_current { " (current)" } else { "" };
        println!("{}  {}{}", entry.identifier, entry.algorithm(), current);
        if args.pem {
            println!("{}", entry.material.trim());
            println!();
        }
    }

    Ok(())
}
