//! CLI subcommand: `hookgate paths`
//!
//! Prints all resolved XDG-compliant paths for debugging and scripting.

use anyhow::Result;

use crate::config::Config;
use crate::paths::Paths;

pub fn run(config: &Config) -> Result<()> {
    let paths = Paths::resolve()?;

    println!("hookgate Paths (XDG Base Directory)");
    println!("===================================");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config.toml:    {}", paths.config_file().display());
    println!("  in use:         {}", config.file_path().display());
    println!();
    println!("State:      {}", paths.state_dir.display());
    println!("  logs:           {}", paths.logs_dir().display());
    match config.log_file() {
        Some(file) => println!("  log file:       {}", file.display()),
        None => println!("  log file:       (stderr only)"),
    }

    Ok(())
}
