//! `config`: show or initialize the config file.

use anyhow::Context;
use std::path::Path;

use crate::config::{self, Config};

pub fn cmd_config(explicit: Option<&Path>, init: bool, force: bool, show: bool) -> anyhow::Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_path().context("could not determine config directory")?,
    };
    println!("Config file: {}", path.display());

    if init {
        if path.exists() && !force {
            println!("Already exists (use --force to overwrite)");
        } else {
            config::save_to(&Config::default(), &path)?;
            println!("Wrote default configuration");
        }
    }

    if show {
        let config = if path.exists() {
            config::load_from(&path)?
        } else {
            Config::default()
        };
        println!("\n{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        cmd_config(Some(&path), true, false, false).unwrap();
        assert_eq!(config::load_from(&path).unwrap(), Config::default());

        // Existing files are kept without --force
        std::fs::write(&path, "[capture]\nfps = 24\n").unwrap();
        cmd_config(Some(&path), true, false, true).unwrap();
        assert_eq!(config::load_from(&path).unwrap().capture.fps, 24);

        cmd_config(Some(&path), true, true, false).unwrap();
        assert_eq!(config::load_from(&path).unwrap().capture.fps, 60);
    }
}
