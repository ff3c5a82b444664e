use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectConfigOpts {
    #[arg(
        long,
        help = "Specify the directory to scan (default: current dir).",
        help_heading = "Project Setup",
        value_name = "PATH"
    )]
    pub project_root: Option<PathBuf>,

    #[arg(
        long,
        help = "Specify path/filename of the TOML config file (default: .xtools/xmerge/xmerge.toml).",
        value_name = "CONFIG_FILE",
        conflicts_with = "disable_config_file",
        help_heading = "Project Setup"
    )]
    pub config_file: Option<String>,

    #[arg(
        long,
        help = "Disable loading any TOML config file.",
        conflicts_with = "config_file",
        help_heading = "Project Setup"
    )]
    pub disable_config_file: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionOpts {
    #[arg(
        long,
        help = "Scan hidden files and directories (names starting with '.').",
        help_heading = "Selection"
    )]
    pub include_hidden: bool,

    #[arg(
        long,
        value_name = "FILE",
        help = "Read ignore patterns from FILE instead of the default ignore.txt.",
        help_heading = "Selection"
    )]
    pub ignore_file: Option<PathBuf>,

    #[arg(
        long,
        help = "Do not apply the built-in ignore patterns.",
        help_heading = "Selection"
    )]
    pub no_builtin_ignores: bool,

    #[arg(
        short = 'x',
        long,
        value_name = "REL_PATH",
        help = "Exclude a file or directory (relative to the project root). Repeatable.",
        help_heading = "Selection"
    )]
    pub exclude: Vec<String>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Start from a saved selection (JSON) instead of selecting everything.",
        help_heading = "Selection"
    )]
    pub selection: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(
    name = "xmerge",
    author,
    version,
    about = "Merge a directory's text files into one report, and restore them from it.",
    long_about = "xmerge scans a directory, lets you pick files with ignore patterns and exclusions, \nand writes a single plain-text or markdown report holding a tree of the selection \nand the content of every selected file. `xmerge restore` rebuilds the files from a report.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  xmerge merge -f markdown -x tests\n  xmerge tree --save-selection sel.json\n  xmerge merge --selection sel.json --stdout\n  xmerge restore outputFolder/mergeOutput.txt -d ./copy",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase message verbosity (-v, -vv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(
        visible_alias = "m",
        about = "Merge the selected files into a single report."
    )]
    Merge(MergeArgs),

    #[command(
        visible_alias = "t",
        about = "Show the selection tree without writing a report."
    )]
    Tree(TreeArgs),

    #[command(
        visible_alias = "r",
        about = "Recreate files from a merge report."
    )]
    Restore(RestoreArgs),

    #[command(about = "Print or install shell completion scripts.")]
    Completion(CompletionArgs),

    #[command(about = "Show or save the default configuration file structure.")]
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,

    #[arg(short = 'f', long, help = "Set the report format.", value_name = "FORMAT", value_parser = ["text", "txt", "markdown", "md"], help_heading = "Output Control")]
    pub format: Option<String>,

    #[arg(
        long,
        value_name = "SIZE",
        help = "Skip files larger than SIZE (e.g. '500KB', '2MB') [default: 1MB].",
        help_heading = "Output Control"
    )]
    pub max_size: Option<String>,

    #[arg(
        long,
        help = "Read every file as UTF-8 instead of guessing its encoding.",
        help_heading = "Output Control"
    )]
    pub no_detect_encoding: bool,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the report to FILE (default: outputFolder/mergeOutput.<ext>).",
        help_heading = "Output Control",
        conflicts_with = "stdout"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        help = "Print the report to standard output instead of saving it.",
        help_heading = "Output Control"
    )]
    pub stdout: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,

    #[arg(
        long,
        value_name = "FILE",
        help = "Save the resulting selection as JSON for later `--selection` use."
    )]
    pub save_selection: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,

    #[arg(required = true, value_name = "REPORT", help = "Merge report to restore from.")]
    pub artifact: PathBuf,

    #[arg(
        short = 'd',
        long,
        value_name = "DIR",
        help = "Directory to recreate files in (default: <project root>/restored)."
    )]
    pub dest: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(
        long,
        value_enum,
        value_name = "SHELL",
        help = "Shell to generate completions for [default: $SHELL, else fish]"
    )]
    pub shell: Option<Shell>,
    #[arg(
        long,
        help = "Install the script under ~/.xtools/xmerge/completions (prompts overwrite)."
    )]
    pub save: bool,
    #[arg(
        long,
        value_name = "DIR",
        requires = "save",
        help = "Install into DIR instead of ~/.xtools/xmerge/completions."
    )]
    pub dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[arg(
        long,
        help = "Save default config structure to default path (prompts overwrite)."
    )]
    pub save: bool,
}
