mod cli_args;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use log;
use std::path::Path;
use std::process;

use cli_args::{Cli, Commands, ProjectConfigOpts, SelectionOpts};
use xmerge_core::{AppError, Config};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    let quiet = cli_args.quiet;

    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(cli_args, quiet) {
        Ok(_) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = exit_code_for(&e);
            if exit_code == 4 {
                if !quiet {
                    eprintln!("{} {:#}", "Cancelled:".yellow().bold(), e);
                }
            } else if !quiet || exit_code == 1 {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                if !quiet {
                    eprintln!("{}", "Rerun with -v (or -vv) to see the log.".dimmed());
                }
            } else {
                log::error!("Application failed: {:#}", e);
            }
            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AppError>() {
        Some(AppError::Config(_)) => 1,
        Some(AppError::TomlParse(_)) => 1,
        Some(AppError::TomlSerialize(_)) => 1,
        Some(AppError::InvalidArgument(_)) => 1,
        Some(AppError::InvalidState(_)) => 1,
        Some(AppError::Json(_)) => 1,
        Some(AppError::Io(_)) => 2,
        Some(AppError::FileRead { .. }) => 2,
        Some(AppError::FileWrite { .. }) => 2,
        Some(AppError::DirCreation { .. }) => 2,
        Some(AppError::WalkDir(_)) => 2,
        Some(AppError::Glob(_)) => 2,
        Some(AppError::ArtifactFormat(_)) => 3,
        Some(AppError::NoFilesToRestore(_)) => 3,
        Some(AppError::Cancelled(_)) => 4,
        Some(_) => 1,
        None => 1,
    }
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

fn run_app(cli: Cli, quiet: bool) -> Result<()> {
    match cli.command {
        None => {
            Cli::command().print_help()?;
        }
        Some(command) => match command {
            Commands::Merge(args) => {
                log::debug!("Executing 'merge' command...");
                commands::merge::handle_merge_command(args, quiet)?;
            }
            Commands::Tree(args) => {
                log::debug!("Executing 'tree' command...");
                commands::tree::handle_tree_command(args, quiet)?;
            }
            Commands::Restore(args) => {
                log::debug!("Executing 'restore' command...");
                commands::restore::handle_restore_command(args, quiet)?;
            }
            Commands::Completion(args) => {
                log::debug!("Executing 'completion' command...");
                commands::completion::handle_completion_command(&args, quiet)?;
            }
            Commands::Config(args) => {
                log::debug!("Executing 'config' command...");
                let project_root =
                    Config::determine_project_root(args.project_config.project_root.as_ref())
                        .context("Failed to determine project root for config command")?;
                commands::config::handle_config_command(&args, &project_root, quiet)?;
            }
        },
    }
    Ok(())
}

/// Loads the config file (if any) and applies the selection flags on top.
pub fn load_config_for_command(
    project_root: &Path,
    project_opts: &ProjectConfigOpts,
    selection_opts: Option<&SelectionOpts>,
) -> Result<Config> {
    let config_path = Config::resolve_config_path(
        project_root,
        project_opts.config_file.as_ref(),
        project_opts.disable_config_file,
    )
    .context("Failed to resolve configuration path")?;

    let mut config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(opts) = selection_opts {
        log::trace!("Applying selection CLI overrides to config...");
        if opts.include_hidden {
            config.general.include_hidden = true;
        }
        if opts.no_builtin_ignores {
            config.general.use_builtin_ignores = false;
        }
        if let Some(path) = &opts.ignore_file {
            // Relative to where the command runs, not to the project root.
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            config.general.ignore_file = Some(cwd.join(path));
        }
    }
    log::trace!("Effective config: {:?}", config);
    Ok(config)
}
