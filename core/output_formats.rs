use crate::error::{AppError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Styling applied to a merge artifact. The logical layout
/// (header, manifest, contents) is the same for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Markdown => "md",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Markdown => "markdown",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" | "plain" | "plain-text" => Ok(OutputFormat::Text),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown output format '{}'. Use 'text' or 'markdown'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BuiltinIgnores {
    #[serde(default)]
    pub names: Vec<String>,
}

static BUILTIN_IGNORE_PATTERNS: Lazy<BuiltinIgnores> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../data/builtin_ignores.yaml"
    ));
    serde_yml::from_str(yaml_content).expect("Failed to parse embedded data/builtin_ignores.yaml")
});

static LANGUAGE_TAGS: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../data/languages.yaml"));
    serde_yml::from_str(yaml_content).expect("Failed to parse embedded data/languages.yaml")
});

pub fn get_builtin_ignore_patterns() -> &'static BuiltinIgnores {
    &BUILTIN_IGNORE_PATTERNS
}

/// Fenced-code language tag for a file, inferred from its extension.
/// Files named `Dockerfile` or `Makefile` are matched by name.
pub fn language_tag_for(path: &Path) -> &'static str {
    let by_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase());
    match by_name.as_deref() {
        Some("dockerfile") => return "dockerfile",
        Some("makefile") => return "makefile",
        _ => {}
    }
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| LANGUAGE_TAGS.get(&ext.to_lowercase()))
        .map(String::as_str)
        .unwrap_or("")
}
