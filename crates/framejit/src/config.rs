//! `framejit.toml`

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use framejit_transform::CompileOptions;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "framejit.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compile: CompileOptions,
}

impl Config {
    pub fn parse(text: &str) -> Result<Config> {
        toml::from_str(text).map_err(|e| anyhow!("invalid configuration: {}", e))
    }
}

/// Read `explicit`, or `framejit.toml` in the working directory when it
/// exists. No file means defaults.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path,
        None if Path::new(CONFIG_FILE).is_file() => Path::new(CONFIG_FILE),
        None => return Ok(Config::default()),
    };
    let text = fs::read_to_string(path).map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    let config = Config::parse(&text)?;
    log::debug!("loaded {}: {:?}", path.display(), config.compile);
    Ok(config)
}
