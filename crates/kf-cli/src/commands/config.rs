//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use kf_core::config::{self, ConfigFile};

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Show the effective configuration
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_path(config_path);

    let config = if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
        config::load_config::<ConfigFile>(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?
    } else {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing defaults; run 'kforward config init' to create one");
        ConfigFile::default()
    };
    println!();

    let content = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{}", content);

    Ok(())
}

/// Print the configuration directory
pub fn config_path() {
    println!("{}", config::default_config_dir().display());
}

/// Write a default configuration file
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &ConfigFile::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    print_success(&format!("Created configuration file: {:?}", path));

    Ok(())
}
