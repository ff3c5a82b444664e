use crate::artifact::{self, ArtifactHeader, FileBlock};
use crate::encoding;
use crate::error::{AppError, Result};
use crate::output_formats::{OutputFormat, language_tag_for};
use crate::selection::{Entry, NodeId, SelectionState, SelectionTree};
use crate::task::{CancelToken, Progress, ProgressSink, Stage};
use chrono::Local;
use log;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub format: OutputFormat,
    /// Files strictly larger than this are recorded without content.
    pub max_file_size: u64,
    pub detect_encoding: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            detect_encoding: true,
        }
    }
}

impl MergeOptions {
    pub fn settings_summary(&self) -> String {
        format!(
            "format={}, max file size={} bytes, encoding detection={}",
            self.format,
            self.max_file_size,
            if self.detect_encoding { "on" } else { "off" }
        )
    }
}

/// Why an included file was recorded without its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    TooLarge { size: u64, limit: u64 },
    Binary,
    Error(String),
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::TooLarge { size, limit } => {
                write!(f, "too large ({} bytes, limit {} bytes)", size, limit)
            }
            FileStatus::Binary => write!(f, "binary"),
            FileStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub embedded: usize,
    pub too_large: usize,
    pub binary: usize,
    pub errors: usize,
    /// Relative path and status of every file recorded without content.
    pub skipped: Vec<(String, FileStatus)>,
    pub output_path: Option<PathBuf>,
    pub bytes_written: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.embedded + self.too_large + self.binary + self.errors
    }

    fn record(&mut self, relative_path: &str, status: FileStatus) {
        match status {
            FileStatus::TooLarge { .. } => self.too_large += 1,
            FileStatus::Binary => self.binary += 1,
            FileStatus::Error(_) => self.errors += 1,
        }
        self.skipped.push((relative_path.to_string(), status));
    }
}

const NOT_INCLUDED: &str = " (not included)";

/// Box-drawing rendering of the tree, one line per entry with its state
/// glyph. Excluded directories are shown but not expanded.
pub fn render_manifest(tree: &SelectionTree) -> String {
    let root = tree.node(tree.root());
    let excluded = root.state() == SelectionState::Excluded;
    let mut out = format!(
        "{} {}/{}\n",
        root.state().glyph(),
        root.entry.name,
        if excluded { NOT_INCLUDED } else { "" }
    );
    if !excluded {
        render_children(tree, tree.root(), "", &mut out);
    }
    out
}

fn render_children(tree: &SelectionTree, id: NodeId, prefix: &str, out: &mut String) {
    let children = tree.children(id);
    for (i, &child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let node = tree.node(child);
        let connector = if last { "└── " } else { "├── " };
        let dir_suffix = if node.is_dir() { "/" } else { "" };
        let excluded = node.state() == SelectionState::Excluded;
        out.push_str(&format!(
            "{}{}{} {}{}{}\n",
            prefix,
            connector,
            node.state().glyph(),
            node.entry.name,
            dir_suffix,
            if excluded { NOT_INCLUDED } else { "" }
        ));
        if node.is_dir() && !excluded {
            let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
            render_children(tree, child, &child_prefix, out);
        }
    }
}

/// Included files in content order, skipping excluded directories entirely.
fn included_files(tree: &SelectionTree) -> Vec<&Entry> {
    let mut files = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        if node.state() == SelectionState::Excluded {
            continue;
        }
        if node.is_dir() {
            stack.extend(node.children().iter().rev());
        } else {
            files.push(&node.entry);
        }
    }
    files
}

/// The size ceiling is checked on metadata before the file is opened.
fn read_for_embedding(entry: &Entry, options: &MergeOptions) -> std::result::Result<String, FileStatus> {
    let metadata =
        fs::metadata(&entry.absolute_path).map_err(|e| FileStatus::Error(e.to_string()))?;
    let size = metadata.len();
    if size > options.max_file_size {
        return Err(FileStatus::TooLarge {
            size,
            limit: options.max_file_size,
        });
    }
    let bytes = fs::read(&entry.absolute_path).map_err(|e| FileStatus::Error(e.to_string()))?;
    let decoded = encoding::decode_bytes(&bytes, options.detect_encoding);
    if decoded.lossy {
        log::debug!(
            "Replaced undecodable bytes in {} ({})",
            entry.relative_path,
            decoded.encoding
        );
    }
    if encoding::looks_binary(&decoded.text) {
        return Err(FileStatus::Binary);
    }
    Ok(decoded.text)
}

pub fn serialize(tree: &SelectionTree, options: &MergeOptions) -> Result<String> {
    serialize_with(tree, options, &CancelToken::new(), &ProgressSink::noop()).map(|(text, _)| text)
}

/// Builds the whole artifact in memory. Per-file problems become status
/// blocks; only cancellation aborts the pass.
pub fn serialize_with(
    tree: &SelectionTree,
    options: &MergeOptions,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<(String, MergeSummary)> {
    let format = options.format;
    let mut out = String::new();
    artifact::write_header(
        &mut out,
        format,
        &ArtifactHeader {
            generated: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            source: tree.root_path().display().to_string(),
            settings: options.settings_summary(),
        },
    );
    artifact::write_manifest(&mut out, format, &render_manifest(tree));
    artifact::write_contents_heading(&mut out, format);

    let files = included_files(tree);
    let total = files.len();
    log::info!("Merging {} selected file(s) as {}", total, format);

    let mut summary = MergeSummary::default();
    for (done, entry) in files.into_iter().enumerate() {
        cancel.check("merge")?;
        progress.report(Progress::new(
            Stage::Merge,
            done,
            Some(total),
            Some(entry.relative_path.clone()),
        ));

        let mut block = FileBlock {
            name: entry.name.clone(),
            path: entry.relative_path.clone(),
            status: None,
            content: None,
        };
        match read_for_embedding(entry, options) {
            Ok(text) => {
                log::trace!("Embedding {}", entry.relative_path);
                block.content = Some(text);
                summary.embedded += 1;
            }
            Err(status) => {
                match &status {
                    FileStatus::Error(message) => {
                        log::warn!("Could not read {}: {}", entry.relative_path, message)
                    }
                    other => log::info!("Not embedding {}: {}", entry.relative_path, other),
                }
                block.status = Some(status.to_string());
                summary.record(&entry.relative_path, status);
            }
        }
        artifact::write_block(&mut out, format, &block, language_tag_for(&entry.absolute_path));
    }
    progress.report(Progress::new(Stage::Merge, total, Some(total), None));
    summary.bytes_written = out.len();
    Ok((out, summary))
}

/// Serializes `tree` and writes the artifact to `output_path`, creating its
/// parent directory when needed.
pub fn merge_to_file(
    tree: &SelectionTree,
    options: &MergeOptions,
    output_path: &Path,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<MergeSummary> {
    let (text, mut summary) = serialize_with(tree, options, cancel, progress)?;
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AppError::DirCreation {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(output_path, &text).map_err(|e| AppError::FileWrite {
        path: output_path.to_path_buf(),
        source: e,
    })?;
    log::info!(
        "Wrote {} bytes to {}",
        text.len(),
        output_path.display()
    );
    summary.output_path = Some(output_path.to_path_buf());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{content_section, manifest_section, parse_blocks};
    use crate::ignore_rules::IgnoreRules;

    /// `sub` keeps an included empty directory next to the excluded
    /// `b.txt`, so it stays partially included without adding a file.
    fn scenario() -> (tempfile::TempDir, SelectionTree) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::create_dir_all(dir.path().join("sub/keep")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "world").unwrap();
        let mut tree = SelectionTree::build(dir.path(), &IgnoreRules::default()).unwrap();
        tree.set_state_by_path("sub/b.txt", SelectionState::Excluded).unwrap();
        (dir, tree)
    }

    fn blocks_of(text: &str, format: OutputFormat) -> Vec<FileBlock> {
        parse_blocks(content_section(text, format).unwrap(), format)
    }

    #[test]
    fn manifest_marks_partial_and_excluded_entries() {
        let (_dir, tree) = scenario();
        let manifest = render_manifest(&tree);
        let lines: Vec<&str> = manifest.lines().collect();
        assert!(lines[0].starts_with("◐ "));
        assert_eq!(
            &lines[1..],
            &[
                "├── ◐ sub/",
                "│   ├── ✓ keep/",
                "│   └── ✗ b.txt (not included)",
                "└── ✓ a.txt"
            ]
        );
    }

    #[test]
    fn excluded_directory_is_not_expanded() {
        let (_dir, mut tree) = scenario();
        tree.set_state_by_path("sub", SelectionState::Excluded).unwrap();
        let manifest = render_manifest(&tree);
        assert!(manifest.contains("├── ✗ sub/ (not included)\n"));
        assert!(!manifest.contains("b.txt"));
    }

    #[test]
    fn excluded_root_is_marked_like_any_other_entry() {
        let (_dir, mut tree) = scenario();
        let root = tree.root();
        tree.set_state(root, SelectionState::Excluded).unwrap();
        let manifest = render_manifest(&tree);
        let root_name = &tree.node(root).entry.name;
        assert_eq!(manifest, format!("✗ {}/ (not included)\n", root_name));
    }

    #[test]
    fn only_included_files_get_blocks() {
        let (_dir, tree) = scenario();
        let text = serialize(&tree, &MergeOptions::default()).unwrap();
        let blocks = blocks_of(&text, OutputFormat::Text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "a.txt");
        assert_eq!(blocks[0].content.as_deref(), Some("hello"));
        assert!(!text.contains("world"));
    }

    #[test]
    fn oversized_file_is_never_embedded() {
        let (_dir, tree) = scenario();
        let options = MergeOptions {
            max_file_size: 4,
            ..MergeOptions::default()
        };
        let (text, summary) =
            serialize_with(&tree, &options, &CancelToken::new(), &ProgressSink::noop()).unwrap();
        assert_eq!(summary.too_large, 1);
        assert_eq!(summary.embedded, 0);
        let blocks = blocks_of(&text, OutputFormat::Text);
        assert_eq!(blocks[0].status.as_deref(), Some("too large (5 bytes, limit 4 bytes)"));
        assert!(blocks[0].content.is_none());
        assert!(!text.contains("hello"));
    }

    #[test]
    fn binary_file_is_referenced_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8, 1, 2, b'a', b'b']).unwrap();
        fs::write(dir.path().join("ok.txt"), "fine").unwrap();
        let tree = SelectionTree::build(dir.path(), &IgnoreRules::default()).unwrap();
        let (text, summary) =
            serialize_with(&tree, &MergeOptions::default(), &CancelToken::new(), &ProgressSink::noop())
                .unwrap();
        assert_eq!((summary.binary, summary.embedded), (1, 1));
        let blocks = blocks_of(&text, OutputFormat::Text);
        assert_eq!(blocks[0].path, "blob.bin");
        assert_eq!(blocks[0].status.as_deref(), Some("binary"));
        assert_eq!(blocks[1].content.as_deref(), Some("fine"));
    }

    #[test]
    fn vanished_file_is_recorded_as_error() {
        let (dir, tree) = scenario();
        fs::remove_file(dir.path().join("a.txt")).unwrap();
        let (text, summary) =
            serialize_with(&tree, &MergeOptions::default(), &CancelToken::new(), &ProgressSink::noop())
                .unwrap();
        assert_eq!(summary.errors, 1);
        let blocks = blocks_of(&text, OutputFormat::Text);
        assert!(blocks[0].status.as_deref().unwrap().starts_with("error: "));
    }

    #[test]
    fn manifest_is_deterministic() {
        let (_dir, tree) = scenario();
        let first = serialize(&tree, &MergeOptions::default()).unwrap();
        let second = serialize(&tree, &MergeOptions::default()).unwrap();
        assert_eq!(manifest_section(&first), manifest_section(&second));
        assert!(manifest_section(&first).is_some());
    }

    #[test]
    fn markdown_uses_fences_and_language_tags() {
        let (_dir, tree) = scenario();
        let options = MergeOptions {
            format: OutputFormat::Markdown,
            ..MergeOptions::default()
        };
        let text = serialize(&tree, &options).unwrap();
        assert!(text.starts_with("# File Merge Report\n"));
        assert!(text.contains("### a.txt\n\n**Path:** `a.txt`\n"));
        assert!(text.contains("```text\nhello\n```\n"));
        let blocks = blocks_of(&text, OutputFormat::Markdown);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content.as_deref(), Some("hello"));
    }

    #[test]
    fn merge_to_file_creates_the_output_directory() {
        let (_dir, tree) = scenario();
        let out = tempfile::tempdir().unwrap();
        let path = out.path().join("nested/deeper/merge.txt");
        let summary = merge_to_file(
            &tree,
            &MergeOptions::default(),
            &path,
            &CancelToken::new(),
            &ProgressSink::noop(),
        )
        .unwrap();
        assert_eq!(summary.output_path.as_deref(), Some(path.as_path()));
        assert_eq!(fs::read_to_string(&path).unwrap().len(), summary.bytes_written);
    }

    #[test]
    fn cancelled_merge_writes_nothing() {
        let (_dir, tree) = scenario();
        let out = tempfile::tempdir().unwrap();
        let path = out.path().join("merge.txt");
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = merge_to_file(&tree, &MergeOptions::default(), &path, &cancel, &ProgressSink::noop())
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!path.exists());
    }

    #[test]
    fn status_strings() {
        assert_eq!(FileStatus::Binary.to_string(), "binary");
        assert_eq!(FileStatus::Error("denied".into()).to_string(), "error: denied");
    }
}
