use anyhow::{Context, Result};
use log;
use xmerge_core::{Config, spawn_restore};

use crate::cli_args::RestoreArgs;
use crate::commands::wait_for;
use crate::load_config_for_command;
use crate::output;

pub fn handle_restore_command(args: RestoreArgs, quiet: bool) -> Result<()> {
    let destination = match &args.dest {
        Some(dest) => dest.clone(),
        None => {
            let project_root =
                Config::determine_project_root(args.project_config.project_root.as_ref())
                    .context("Failed to determine project root")?;
            let config = load_config_for_command(&project_root, &args.project_config, None)
                .context("Failed to load configuration")?;
            config.restore_destination(&project_root)
        }
    };
    log::info!(
        "Restoring {} into {}",
        args.artifact.display(),
        destination.display()
    );

    let summary = wait_for(spawn_restore(args.artifact.clone(), destination)?)
        .with_context(|| format!("Failed to restore from {}", args.artifact.display()))?;

    if !summary.failures.is_empty() {
        log::warn!(
            "{} of {} file(s) could not be written",
            summary.failures.len(),
            summary.attempted
        );
    }
    if !quiet {
        output::print_restore_summary(&summary);
    }
    Ok(())
}
