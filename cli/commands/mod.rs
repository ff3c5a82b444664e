pub mod completion;
pub mod config;
pub mod merge;
pub mod restore;
pub mod tree;

use anyhow::{Context, Result};
use colored::*;
use log;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use xmerge_core::{
    Config, SelectionProject, SelectionState, SharedSelection, TaskHandle, spawn_scan,
};

use crate::cli_args::SelectionOpts;

/// Blocks until `handle` finishes, forwarding its progress to the log.
pub fn wait_for<T: Send + 'static>(handle: TaskHandle<T>) -> xmerge_core::Result<T> {
    for progress in handle.progress().iter() {
        match (progress.percent(), progress.current.as_deref()) {
            (Some(pct), Some(item)) => log::debug!("{:?} {:>3}% {}", progress.stage, pct, item),
            (None, Some(item)) => log::trace!("{:?} #{} {}", progress.stage, progress.completed, item),
            (Some(pct), None) => log::debug!("{:?} {:>3}%", progress.stage, pct),
            (None, None) => {}
        }
    }
    handle.join()
}

/// Scans the project on a worker, then applies `--selection` and
/// `--exclude` to the fresh tree.
pub fn prepare_selection(
    project_root: &Path,
    config: &Config,
    opts: &SelectionOpts,
) -> Result<SharedSelection> {
    let rules = config.build_ignore_rules(project_root);
    let shared = SharedSelection::new();
    let files = wait_for(spawn_scan(shared.clone(), project_root.to_path_buf(), rules)?)
        .with_context(|| format!("Failed to scan {}", project_root.display()))?;
    log::info!("Found {} file(s) under {}", files, project_root.display());

    if let Some(path) = &opts.selection {
        let project = SelectionProject::load(path)
            .with_context(|| format!("Failed to load selection from {}", path.display()))?;
        let mut guard = shared.write()?;
        if let Some(tree) = guard.as_mut() {
            let missing = project.apply(tree)?;
            if !missing.is_empty() {
                log::warn!(
                    "{} saved path(s) no longer exist: {}",
                    missing.len(),
                    missing.join(", ")
                );
            }
        }
    }

    for relative in &opts.exclude {
        let relative = relative.trim_start_matches("./").trim_matches('/');
        shared
            .toggle(relative, SelectionState::Excluded)
            .with_context(|| format!("Cannot exclude '{}'", relative))?;
        log::debug!("Excluded {}", relative);
    }
    Ok(shared)
}

/// Writes `content` to `path`, asking before replacing an existing file.
/// Quiet mode never prompts, so an existing file is an error there.
/// Returns `false` when the user declined.
pub fn save_with_overwrite_prompt(path: &Path, content: &[u8], what: &str, quiet: bool) -> Result<bool> {
    if path.exists() {
        if quiet {
            anyhow::bail!(
                "Target file '{}' exists. Overwrite prevented in quiet mode.",
                path.display()
            );
        }
        print!(
            "{} {} already exists at '{}'. Overwrite? [{}/{}] ",
            "⚠️".yellow(),
            what,
            path.display().to_string().cyan(),
            "y".green(),
            "N".red()
        );
        io::stdout().flush().context("Failed to flush stdout")?;
        let mut response = String::new();
        io::stdin()
            .read_line(&mut response)
            .context("Failed to read user input")?;
        if !response.trim().eq_ignore_ascii_case("y") {
            println!("Save cancelled.");
            return Ok(false);
        }
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Saved {} to {}", what.to_lowercase(), path.display());
    Ok(true)
}
