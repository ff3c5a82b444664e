use crate::artifact::{self, FileBlock};
use crate::error::{AppError, Result};
use crate::output_formats::OutputFormat;
use crate::task::{CancelToken, Progress, ProgressSink, Stage};
use log;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub format: Option<OutputFormat>,
    /// Files written successfully.
    pub restored: usize,
    /// Restorable blocks found, whether or not writing them succeeded.
    pub attempted: usize,
    /// Status-only blocks (too large, binary, read error) that carry no content.
    pub skipped: usize,
    /// Relative path and reason for every block that could not be written.
    pub failures: Vec<(String, String)>,
    pub destination: PathBuf,
}

/// Detects the framing and splits the content section into file blocks.
pub fn parse_artifact(text: &str) -> Result<(OutputFormat, Vec<FileBlock>)> {
    let format = artifact::detect_format(text).ok_or_else(|| {
        let reason = if artifact::has_crlf_title(text) {
            "its line endings were converted to CRLF; merge artifacts are LF-only"
        } else {
            "neither the plain-text nor the markdown framing was found"
        };
        AppError::ArtifactFormat(format!("not a merge artifact: {}", reason))
    })?;
    let section = artifact::content_section(text, format).ok_or_else(|| {
        AppError::ArtifactFormat(format!(
            "the '{}' section marker is missing",
            artifact::CONTENTS_TITLE
        ))
    })?;
    let blocks = artifact::parse_blocks(section, format);
    log::debug!("Parsed {} file block(s) from {} artifact", blocks.len(), format);
    Ok((format, blocks))
}

pub fn restore(text: &str, destination: &Path) -> Result<RestoreSummary> {
    restore_with(text, destination, &CancelToken::new(), &ProgressSink::noop())
}

pub fn restore_with(
    text: &str,
    destination: &Path,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<RestoreSummary> {
    restore_text(text, "merge artifact", destination, cancel, progress)
}

pub fn restore_from_file(artifact_path: &Path, destination: &Path) -> Result<RestoreSummary> {
    restore_from_file_with(
        artifact_path,
        destination,
        &CancelToken::new(),
        &ProgressSink::noop(),
    )
}

pub fn restore_from_file_with(
    artifact_path: &Path,
    destination: &Path,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<RestoreSummary> {
    let bytes = fs::read(artifact_path).map_err(|e| AppError::FileRead {
        path: artifact_path.to_path_buf(),
        source: e,
    })?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            log::warn!(
                "Artifact {} is not valid UTF-8; undecodable bytes will be replaced",
                artifact_path.display()
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    restore_text(
        &text,
        &artifact_path.display().to_string(),
        destination,
        cancel,
        progress,
    )
}

fn restore_text(
    text: &str,
    source_label: &str,
    destination: &Path,
    cancel: &CancelToken,
    progress: &ProgressSink,
) -> Result<RestoreSummary> {
    let (format, blocks) = parse_artifact(text)?;
    let (restorable, status_only): (Vec<FileBlock>, Vec<FileBlock>) =
        blocks.into_iter().partition(FileBlock::is_restorable);
    if restorable.is_empty() {
        return Err(AppError::NoFilesToRestore(source_label.to_string()));
    }

    fs::create_dir_all(destination).map_err(|e| AppError::DirCreation {
        path: destination.to_path_buf(),
        source: e,
    })?;
    log::info!(
        "Restoring {} file(s) into {} ({} status-only block(s) skipped)",
        restorable.len(),
        destination.display(),
        status_only.len()
    );

    let mut summary = RestoreSummary {
        format: Some(format),
        skipped: status_only.len(),
        destination: destination.to_path_buf(),
        ..RestoreSummary::default()
    };
    let total = restorable.len();
    for (done, block) in restorable.iter().enumerate() {
        cancel.check("restore")?;
        progress.report(Progress::new(
            Stage::Restore,
            done,
            Some(total),
            Some(block.path.clone()),
        ));
        summary.attempted += 1;
        match write_block(block, destination) {
            Ok(path) => {
                log::trace!("Restored {}", path.display());
                summary.restored += 1;
            }
            Err(reason) => {
                log::warn!("Failed to restore {}: {}", block.path, reason);
                summary.failures.push((block.path.clone(), reason));
            }
        }
    }
    progress.report(Progress::new(Stage::Restore, total, Some(total), None));
    log::info!(
        "Restored {}/{} file(s)",
        summary.restored,
        summary.attempted
    );
    Ok(summary)
}

fn write_block(block: &FileBlock, destination: &Path) -> std::result::Result<PathBuf, String> {
    let relative = safe_relative_path(&block.path)
        .ok_or_else(|| format!("refusing to write outside the destination: '{}'", block.path))?;
    let target = destination.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let content = block.content.as_deref().unwrap_or_default();
    fs::write(&target, content.as_bytes()).map_err(|e| e.to_string())?;
    Ok(target)
}

/// Converts an artifact path into a relative path that stays below the
/// destination. Absolute paths, `..` segments and drive prefixes are rejected.
fn safe_relative_path(path: &str) -> Option<PathBuf> {
    if path.starts_with('/') || path.starts_with('\\') {
        return None;
    }
    let mut relative = PathBuf::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            _ => {}
        }
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => relative.push(part),
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}
