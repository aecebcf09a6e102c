use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

use super::BodyArgs;
use crate::config::Config;
use crate::signature::{
    PublicKeyVerifier, RemoteKeyProvider, Scheme, VerificationOutcome, check_shared_secret,
};

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub body: BodyArgs,

    /// Signature header value (sha256=<hex> or base64 for public-key)
    #[arg(short, long)]
    pub signature: String,

    /// Key identifier; selects the public-key scheme unless --scheme is given
    #[arg(short, long)]
    pub key_id: Option<String>,

    /// Scheme to verify with (defaults to verification.scheme)
    #[arg(long)]
    pub scheme: Option<Scheme>,
}

pub async fn run(args: VerifyArgs, config: &Config) -> Result<()> {
    let scheme = args.scheme.unwrap_or(match args.key_id {
        Some(_) => Scheme::PublicKey,
        None => config.verification.scheme,
    });
    let body = args.body.read()?;

    let result = match scheme {
        Scheme::SharedSecret => check_shared_secret(
            config.shared_secret().as_ref(),
            &body,
            Some(args.signature.as_str()),
        ),
        Scheme::PublicKey => {
            let provider = RemoteKeyProvider::new(config.key_config())
                .context("Failed to create key provider")?;
            PublicKeyVerifier::new(Arc::new(provider))
                .check(&body, Some(args.signature.as_str()), args.key_id.as_deref())
                .await
        }
    };

    let outcome = match &result {
        Ok(()) => VerificationOutcome::ok(),
        Err(e) => {
            eprintln!("{}", e);
            VerificationOutcome::rejected(e.reason())
        }
    };

    if outcome.is_valid() {
        println!("valid ({})", scheme);
        Ok(())
    } else {
        println!("invalid ({}): {}", scheme, outcome.reason());
        std::process::exit(1);
    }
}
