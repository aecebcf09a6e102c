use anyhow::Result;
use clap::Args;

use crate::config::Config;
use crate::server::Server;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind (overrides server.bind)
    #[arg(long)]
    pub bind: Option<String>,

    /// Reject failed verifications with 401 (overrides verification.auto_reject)
    #[arg(long)]
    pub auto_reject: Option<bool>,
}

pub async fn run(args: ServeArgs, config: Config) -> Result<()> {
    let mut config = config;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(auto_reject) = args.auto_reject {
        config.verification.auto_reject = auto_reject;
    }

    Server::new(&config)?.run().await
}
