pub mod artifact;
pub mod config;
pub mod encoding;
pub mod error;
pub mod ignore_rules;
pub mod merge;
pub mod output_formats;
pub mod project;
pub mod restore;
pub mod selection;
pub mod task;

pub use artifact::{ArtifactHeader, FileBlock};
pub use config::{Config, GeneralConfig, MergeConfig, RestoreConfig, parse_byte_size};
pub use error::{AppError, Result};
pub use ignore_rules::IgnoreRules;
pub use merge::{FileStatus, MergeOptions, MergeSummary, render_manifest};
pub use output_formats::{BuiltinIgnores, OutputFormat, get_builtin_ignore_patterns};
pub use project::SelectionProject;
pub use restore::RestoreSummary;
pub use selection::{Entry, NodeId, SelectionNode, SelectionState, SelectionTree};
pub use task::{
    CancelToken, Progress, ProgressSink, SharedSelection, Stage, TaskHandle, spawn_merge,
    spawn_restore, spawn_scan,
};
