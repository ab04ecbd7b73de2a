//! Configuration loading.
//!
//! Precedence, lowest first: built-in defaults, the TOML file named by
//! `--config <path>` (or `BASTION_CONFIG`), then `BASTION_*` variables.

use std::path::PathBuf;

use bastion_core::{BastionConfig, ConfigError};

/// The config file named on the command line or in `BASTION_CONFIG`.
pub fn config_path<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var("BASTION_CONFIG").ok().map(PathBuf::from)
}

pub fn load_config<I>(args: I) -> Result<BastionConfig, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut config = match config_path(args) {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading config file");
            BastionConfig::from_path(&path)?
        }
        None => BastionConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}
