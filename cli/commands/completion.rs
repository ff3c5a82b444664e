use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use colored::*;
use std::path::{Path, PathBuf};
use xmerge_core::config::DEFAULT_CONFIG_DIR;

use crate::cli_args::{Cli, CompletionArgs};
use crate::commands::save_with_overwrite_prompt;
use crate::output;

/// Completion scripts live next to the rest of the xmerge user data:
/// `~/.xtools/xmerge/completions/`.
const COMPLETIONS_DIR: &str = "completions";

pub fn handle_completion_command(args: &CompletionArgs, quiet: bool) -> Result<()> {
    let shell = args.shell.or_else(Shell::from_env).unwrap_or(Shell::Fish);
    log::debug!("Generating completions for {}", shell);
    let script = render_script(shell)?;

    if !args.save {
        return output::write_to_stdout(&script);
    }

    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => default_completion_dir()?,
    };
    let save_path = dir.join(script_file_name(shell));
    if !save_with_overwrite_prompt(&save_path, script.as_bytes(), "Completion script", quiet)? {
        return Ok(());
    }
    if !quiet {
        println!(
            "{} {} completions saved to: {}",
            "✅".green(),
            shell.to_string().cyan(),
            save_path.display().to_string().blue()
        );
        println!("{} {}", "Enable them with:".dimmed(), activation_hint(shell, &save_path));
    }
    Ok(())
}

fn render_script(shell: Shell) -> Result<String> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();
    let mut buffer = Vec::new();
    generate(shell, &mut command, bin_name, &mut buffer);
    String::from_utf8(buffer).context("Generated completion script is not valid UTF-8")
}

fn default_completion_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_CONFIG_DIR).join(COMPLETIONS_DIR))
        .context("Could not determine the home directory; pass --dir")
}

/// Zsh only autoloads `_<command>` files from `fpath`.
fn script_file_name(shell: Shell) -> &'static str {
    match shell {
        Shell::Bash => "xmerge.bash",
        Shell::Zsh => "_xmerge",
        Shell::Fish => "xmerge.fish",
        Shell::PowerShell => "xmerge.ps1",
        Shell::Elvish => "xmerge.elv",
        _ => "xmerge.completion",
    }
}

fn activation_hint(shell: Shell, script: &Path) -> String {
    let path = script.display();
    match shell {
        Shell::Bash => format!("echo 'source \"{}\"' >> ~/.bashrc", path),
        Shell::Zsh => {
            let dir = script.parent().unwrap_or(script).display();
            format!("add 'fpath=(\"{}\" $fpath)' before compinit in ~/.zshrc", dir)
        }
        Shell::Fish => format!("ln -s \"{}\" ~/.config/fish/completions/", path),
        Shell::PowerShell => format!("add '. \"{}\"' to $PROFILE", path),
        Shell::Elvish => format!("add 'eval (slurp < \"{}\")' to ~/.config/elvish/rc.elv", path),
        _ => format!("source \"{}\" from your shell profile", path),
    }
}
