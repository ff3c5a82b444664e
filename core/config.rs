use crate::error::{AppError, Result};
use crate::ignore_rules::IgnoreRules;
use crate::merge::MergeOptions;
use crate::output_formats::OutputFormat;
use byte_unit::Byte;
use log;
use serde::{Deserialize, Serialize};
use std::convert::TryInto;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_DIR: &str = ".xtools/xmerge";
pub const DEFAULT_CONFIG_FILENAME: &str = "xmerge.toml";
pub const DEFAULT_IGNORE_FILENAME: &str = "ignore.txt";
pub const DEFAULT_OUTPUT_DIR: &str = "outputFolder";
pub const DEFAULT_OUTPUT_FILENAME: &str = "mergeOutput";
pub const DEFAULT_RESTORE_DIR: &str = "restored";
pub const DEFAULT_MAX_FILE_SIZE: &str = "1MB";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub restore: RestoreConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default = "default_false")]
    pub include_hidden: bool,
    #[serde(default = "default_true")]
    pub use_builtin_ignores: bool,
    /// Relative paths resolve against the project root. When unset,
    /// `ignore.txt` is looked up in the config directory, then the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: String,
    #[serde(default = "default_true")]
    pub detect_encoding: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RestoreConfig {
    #[serde(default = "default_restore_dir")]
    pub output_dir: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_max_file_size() -> String {
    DEFAULT_MAX_FILE_SIZE.to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}
fn default_restore_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RESTORE_DIR)
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            include_hidden: default_false(),
            use_builtin_ignores: default_true(),
            ignore_file: None,
        }
    }
}
impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            max_file_size: default_max_file_size(),
            detect_encoding: default_true(),
            output_dir: default_output_dir(),
            filename: None,
        }
    }
}
impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            output_dir: default_restore_dir(),
        }
    }
}

/// Parses a human size such as `512KB`, `1MB` or `2 MiB` into bytes.
pub fn parse_byte_size(size: &str) -> Result<u64> {
    let byte_value = Byte::from_str(size).map_err(|e| {
        AppError::InvalidArgument(format!(
            "Invalid size '{}': {}. Use B, KB, MB, etc.",
            size, e
        ))
    })?;
    let bytes: u128 = byte_value.into();
    bytes.try_into().map_err(|_| {
        AppError::InvalidArgument(format!("Size '{}' exceeds the supported maximum.", size))
    })
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

impl Config {
    pub fn determine_project_root(cli_project_root: Option<&PathBuf>) -> Result<PathBuf> {
        let path_str_opt = cli_project_root
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| env::var("PROJECT_ROOT").ok().filter(|s| !s.is_empty()));

        let path_to_resolve = match path_str_opt {
            Some(p_str) => PathBuf::from(shellexpand::tilde(&p_str).as_ref()),
            None => env::current_dir().map_err(AppError::Io)?,
        };

        path_to_resolve.canonicalize().map_err(|e| {
            AppError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to canonicalize project root '{}': {}",
                    path_to_resolve.display(),
                    e
                ),
            ))
        })
    }

    pub fn resolve_config_path(
        project_root: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Option<PathBuf>> {
        if cli_disable_config {
            log::debug!("Config file loading disabled via CLI flag.");
            return Ok(None);
        }

        let Some(p_str) = cli_config_file else {
            let default_path = project_root
                .join(DEFAULT_CONFIG_DIR)
                .join(DEFAULT_CONFIG_FILENAME);
            if default_path.exists() {
                log::debug!("Using default config file path: {}", default_path.display());
                return Ok(Some(default_path));
            }
            log::debug!(
                "No config file specified and default not found at: {}",
                default_path.display()
            );
            return Ok(None);
        };

        let mut path = PathBuf::from(shellexpand::tilde(p_str).as_ref());
        let looks_like_path =
            path.is_absolute() || path.components().count() > 1 || p_str.contains(['/', '\\']);

        if looks_like_path {
            if !path.exists() && path.extension().is_none() {
                path.set_extension("toml");
            }
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "Specified config file not found at path: {}",
                    path.display()
                )));
            }
            log::debug!("Using specified config file path: {}", path.display());
            return Ok(Some(path));
        }

        let filename = if path.extension().is_none_or(|e| e != "toml") {
            format!("{}.toml", path.to_string_lossy())
        } else {
            path.to_string_lossy().to_string()
        };
        let config_dir = project_root.join(DEFAULT_CONFIG_DIR);
        let full_path = config_dir.join(filename);
        if !full_path.exists() {
            return Err(AppError::Config(format!(
                "Specified config file '{}' not found in default directory: {}",
                path.display(),
                config_dir.display()
            )));
        }
        log::debug!(
            "Using specified config filename in default directory: {}",
            full_path.display()
        );
        Ok(Some(full_path))
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let toml_content = fs::read_to_string(config_path).map_err(|e| AppError::FileRead {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        toml::from_str::<Config>(&toml_content).map_err(|e| {
            AppError::TomlParse(format!(
                "Error parsing config file '{}': {}. Check TOML syntax and structure.",
                config_path.display(),
                e
            ))
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn max_file_size_bytes(&self) -> Result<u64> {
        parse_byte_size(&self.merge.max_file_size)
    }

    pub fn merge_options(&self) -> Result<MergeOptions> {
        Ok(MergeOptions {
            format: self.merge.format,
            max_file_size: self.max_file_size_bytes()?,
            detect_encoding: self.merge.detect_encoding,
        })
    }

    /// The configured ignore file, or the first default location that exists.
    pub fn resolve_ignore_file(&self, project_root: &Path) -> Option<PathBuf> {
        if let Some(configured) = &self.general.ignore_file {
            let path = expand_path(configured);
            return Some(if path.is_absolute() {
                path
            } else {
                project_root.join(path)
            });
        }
        [
            project_root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_IGNORE_FILENAME),
            project_root.join(DEFAULT_IGNORE_FILENAME),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    /// Patterns from the ignore file, the built-in list when enabled, and
    /// the merge output folder so artifacts never merge themselves.
    pub fn build_ignore_rules(&self, project_root: &Path) -> IgnoreRules {
        let include_hidden = self.general.include_hidden;
        let mut rules = match self.resolve_ignore_file(project_root) {
            Some(path) => IgnoreRules::load(&path, include_hidden),
            None => {
                log::debug!("No ignore file found; using built-in patterns only");
                IgnoreRules::empty(include_hidden)
            }
        };
        if self.general.use_builtin_ignores {
            rules = rules.with_builtin();
        }
        if self.merge.output_dir.is_relative() {
            if let Some(name) = self.merge.output_dir.file_name() {
                rules.extend([name.to_string_lossy()]);
            }
        }
        log::debug!("Effective ignore patterns: {:?}", rules.patterns());
        rules
    }

    pub fn default_output_path(&self, project_root: &Path) -> PathBuf {
        let base = self
            .merge
            .filename
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_OUTPUT_FILENAME);
        let dir = expand_path(&self.merge.output_dir);
        project_root
            .join(dir)
            .join(format!("{}.{}", base, self.merge.format.extension()))
    }

    pub fn restore_destination(&self, project_root: &Path) -> PathBuf {
        project_root.join(expand_path(&self.restore.output_dir))
    }
}
