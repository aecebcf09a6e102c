pub mod config;
pub mod keys;
pub mod paths;
pub mod serve;
pub mod sign;
pub mod verify;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hookgate")]
#[command(author, version, about = "Signature verification gate for webhook callbacks")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "HOOKGATE_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server with the verification gate installed
    Serve(serve::ServeArgs),

    /// Compute the x-hub-signature-256 header for a body
    Sign(sign::SignArgs),

    /// Check a signature against a body (exit code 1 when invalid)
    Verify(verify::VerifyArgs),

    /// List the public keys published by the key authority
    Keys(keys::KeysArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved XDG directory paths
    Paths,
}

/// Where a command reads the raw body from. Stdin when neither flag is given.
#[derive(Args, Debug, Clone)]
pub struct BodyArgs {
    /// Body as a literal string
    #[arg(short, long, conflicts_with = "file")]
    pub body: Option<String>,

    /// Read the body from a file, byte for byte
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

impl BodyArgs {
    pub fn read(&self) -> Result<Vec<u8>> {
        if let Some(body) = &self.body {
            return Ok(body.as_bytes().to_vec());
        }
        if let Some(path) = &self.file {
            return std::fs::read(path)
                .with_context(|| format!("Failed to read body from {}", path.display()));
        }
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read body from stdin")?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn verify_parses_key_id() {
        let cli = Cli::try_parse_from([
            "hookgate",
            "verify",
            "--body",
            "{}",
            "--signature",
            "abc",
            "--key-id",
            "k1",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify(args) => {
                assert_eq!(args.key_id.as_deref(), Some("k1"));
                assert_eq!(args.body.body.as_deref(), Some("{}"));
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn body_and_file_conflict() {
        let result = Cli::try_parse_from([
            "hookgate", "sign", "--body", "{}", "--file", "body.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn body_from_file_is_read_verbatim() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"{ \"a\" : 1 }\n").unwrap();
        let args = BodyArgs {
            body: None,
            file: Some(tmp.path().to_path_buf()),
        };
        assert_eq!(args.read().unwrap(), b"{ \"a\" : 1 }\n");
    }
}
