use anyhow::{Context, Result};
use log;
use std::str::FromStr;
use xmerge_core::{
    AppError, CancelToken, Config, OutputFormat, ProgressSink, merge, parse_byte_size, spawn_merge,
};

use crate::cli_args::MergeArgs;
use crate::commands::{prepare_selection, wait_for};
use crate::load_config_for_command;
use crate::output;

pub fn handle_merge_command(args: MergeArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", project_root.display());

    let mut config =
        load_config_for_command(&project_root, &args.project_config, Some(&args.selection))
            .context("Failed to load configuration")?;
    if let Some(format) = &args.format {
        config.merge.format = OutputFormat::from_str(format)?;
    }
    if let Some(size) = &args.max_size {
        // Validate early so a typo fails before the scan starts.
        parse_byte_size(size)?;
        config.merge.max_file_size = size.clone();
    }
    if args.no_detect_encoding {
        config.merge.detect_encoding = false;
    }
    let options = config.merge_options().context("Invalid merge settings")?;
    log::debug!("Merge options: {}", options.settings_summary());

    let shared = prepare_selection(&project_root, &config, &args.selection)?;

    if args.stdout {
        let guard = shared.read()?;
        let tree = guard
            .as_ref()
            .ok_or_else(|| AppError::InvalidState("scan produced no tree".to_string()))?;
        let (text, summary) =
            merge::serialize_with(tree, &options, &CancelToken::new(), &ProgressSink::noop())
                .context("Failed to build the merge report")?;
        output::write_to_stdout(&text)?;
        log::info!(
            "Merged {} file(s), {} recorded without content",
            summary.embedded,
            summary.skipped.len()
        );
        return Ok(());
    }

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| config.default_output_path(&project_root));
    log::info!("Writing report to {}", output_path.display());
    let summary = wait_for(spawn_merge(shared, options, output_path.clone())?)
        .with_context(|| format!("Failed to write merge report {}", output_path.display()))?;

    if !quiet {
        output::print_merge_summary(&summary);
    }
    Ok(())
}
