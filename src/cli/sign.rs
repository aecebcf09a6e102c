use anyhow::{Result, bail};
use clap::Args;

use super::BodyArgs;
use crate::config::Config;
use crate::signature::{HMAC_SIGNATURE_HEADER, SharedSecret, compute_signature};

#[derive(Args)]
pub struct SignArgs {
    #[command(flatten)]
    pub body: BodyArgs,

    /// Secret to sign with (defaults to verification.secret)
    #[arg(long, env = "HOOKGATE_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Print the full header line instead of just the value
    #[arg(long)]
    pub header: bool,
}

pub fn run(args: SignArgs, config: &Config) -> Result<()> {
    let secret = match args.secret {
        Some(s) if !s.is_empty() => SharedSecret::from(s),
        _ => match config.shared_secret() {
            Some(secret) => secret,
            None => bail!("No shared secret configured. Pass --secret or set verification.secret"),
        },
    };

    let body = args.body.read()?;
    let signature = compute_signature(&secret, &body)?;

    if args.header {
        println!("{}: {}", HMAC_SIGNATURE_HEADER, signature);
    } else {
        println!("{}", signature);
    }
    Ok(())
}
