use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use xmerge_core::Config;
use xmerge_core::config::{DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILENAME};

use crate::cli_args::ConfigArgs;
use crate::commands::save_with_overwrite_prompt;
use crate::output;

pub fn handle_config_command(args: &ConfigArgs, project_root: &Path, quiet: bool) -> Result<()> {
    let content = Config::default()
        .to_toml_string()
        .context("Failed to serialize default configuration")?;

    if !args.save {
        return output::write_to_stdout(&content);
    }

    let save_path = project_root
        .join(DEFAULT_CONFIG_DIR)
        .join(DEFAULT_CONFIG_FILENAME);
    if save_with_overwrite_prompt(&save_path, content.as_bytes(), "Config file", quiet)? && !quiet {
        println!(
            "{} Default config saved to: {}",
            "✅".green(),
            save_path.display().to_string().blue()
        );
    }
    Ok(())
}
