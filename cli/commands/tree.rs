use anyhow::{Context, Result};
use log;
use xmerge_core::{AppError, Config, SelectionProject, render_manifest};

use crate::cli_args::TreeArgs;
use crate::commands::prepare_selection;
use crate::load_config_for_command;
use crate::output;

pub fn handle_tree_command(args: TreeArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    let config =
        load_config_for_command(&project_root, &args.project_config, Some(&args.selection))
            .context("Failed to load configuration")?;

    let shared = prepare_selection(&project_root, &config, &args.selection)?;
    let guard = shared.read()?;
    let tree = guard
        .as_ref()
        .ok_or_else(|| AppError::InvalidState("scan produced no tree".to_string()))?;

    output::print_tree_summary(
        &render_manifest(tree),
        tree.count_selected_files(tree.root()),
        tree.count_files(tree.root()),
    );

    if let Some(path) = &args.save_selection {
        SelectionProject::from_tree(tree)
            .save(path)
            .with_context(|| format!("Failed to save selection to {}", path.display()))?;
        if !quiet {
            println!("Selection saved to: {}", path.display());
        }
        log::debug!("Selection written for {}", tree.root_path().display());
    }
    Ok(())
}
