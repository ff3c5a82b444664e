//! Wire grammar of a merge artifact, shared by the serializer and the
//! restore parser.
//!
//! Plain text (format version 1):
//!
//! ```text
//! FILE MERGE REPORT
//! SEP
//!
//! Generated: <timestamp>
//! Source Directory: <path>
//! Output Settings: <summary>
//! Format: xmerge/1
//!
//! SEP / File Structure banner / SEP, blank line, manifest lines, blank line
//! SEP / File Contents banner / SEP, blank line, then per file:
//!
//! SEP
//! File: <name>
//! Path: <relative path>
//! [Status: <status>]
//! [Bytes: <content length>]
//! SEP
//!
//! [<content>\n\n]
//! ```
//!
//! Markdown uses `#`/`##`/`###` headings, `**Path:**`/`**Status:**`/
//! `**Bytes:**` lines and a fenced code block around the content. `Bytes`
//! is the UTF-8 length of the content and is sliced exactly; only blocks
//! without it are delimited by scanning for the next block or the closing
//! fence. A count that does not land on a block boundary, or text that is
//! not a block, makes the whole content section unreadable.
//!
//! Framing lines are LF-terminated. Content bytes, `\r` included, are
//! carried verbatim.

use crate::output_formats::OutputFormat;
use log;

pub const FORMAT_VERSION: u32 = 1;

pub const SEPARATOR: &str =
    "================================================================================";
const BANNER_INDENT: &str = "                                ";

pub const TEXT_TITLE: &str = "FILE MERGE REPORT";
pub const MARKDOWN_TITLE: &str = "# File Merge Report";
pub const STRUCTURE_TITLE: &str = "File Structure";
pub const CONTENTS_TITLE: &str = "File Contents";

const TEXT_FILE_FIELD: &str = "File: ";
const TEXT_PATH_FIELD: &str = "Path: ";
const TEXT_STATUS_FIELD: &str = "Status: ";
const TEXT_BYTES_FIELD: &str = "Bytes: ";

const MD_HEADING: &str = "### ";
const MD_PATH_FIELD: &str = "**Path:** ";
const MD_STATUS_FIELD: &str = "**Status:** ";
const MD_BYTES_FIELD: &str = "**Bytes:** ";

/// Metadata rendered in the artifact header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub generated: String,
    pub source: String,
    pub settings: String,
}

/// One framed file unit of the content section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub name: String,
    pub path: String,
    /// Present for blocks that carry no content (too large, binary, error).
    pub status: Option<String>,
    pub content: Option<String>,
}

impl FileBlock {
    pub fn is_restorable(&self) -> bool {
        self.status.is_none() && self.content.is_some()
    }
}

fn banner(out: &mut String, title: &str) {
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str(BANNER_INDENT);
    out.push_str(title);
    out.push('\n');
    out.push_str(SEPARATOR);
    out.push_str("\n\n");
}

fn text_contents_marker() -> String {
    format!("{SEPARATOR}\n{BANNER_INDENT}{CONTENTS_TITLE}\n{SEPARATOR}\n")
}

fn text_structure_marker() -> String {
    format!("{SEPARATOR}\n{BANNER_INDENT}{STRUCTURE_TITLE}\n{SEPARATOR}\n")
}

fn markdown_contents_marker() -> String {
    format!("\n## {CONTENTS_TITLE}\n")
}

fn markdown_structure_marker() -> String {
    format!("\n## {STRUCTURE_TITLE}\n")
}

fn text_block_start() -> String {
    format!("{SEPARATOR}\n{TEXT_FILE_FIELD}")
}

/// Backtick fence longer than any backtick run inside `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0usize;
    let mut run = 0usize;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

pub fn write_header(out: &mut String, format: OutputFormat, header: &ArtifactHeader) {
    match format {
        OutputFormat::Text => {
            out.push_str(TEXT_TITLE);
            out.push('\n');
            out.push_str(SEPARATOR);
            out.push_str("\n\n");
            out.push_str(&format!("Generated: {}\n", header.generated));
            out.push_str(&format!("Source Directory: {}\n", header.source));
            out.push_str(&format!("Output Settings: {}\n", header.settings));
            out.push_str(&format!("Format: xmerge/{}\n\n", FORMAT_VERSION));
        }
        OutputFormat::Markdown => {
            out.push_str(MARKDOWN_TITLE);
            out.push_str("\n\n");
            out.push_str(&format!("<!-- xmerge-format: {} -->\n\n", FORMAT_VERSION));
            out.push_str(&format!("- **Generated:** {}\n", header.generated));
            out.push_str(&format!("- **Source Directory:** `{}`\n", header.source));
            out.push_str(&format!("- **Output Settings:** {}\n\n", header.settings));
        }
    }
}

/// `manifest` holds newline-terminated lines.
pub fn write_manifest(out: &mut String, format: OutputFormat, manifest: &str) {
    match format {
        OutputFormat::Text => {
            banner(out, STRUCTURE_TITLE);
            out.push_str(manifest);
            out.push('\n');
        }
        OutputFormat::Markdown => {
            let fence = fence_for(manifest);
            out.push_str(&format!("## {}\n\n", STRUCTURE_TITLE));
            out.push_str(&format!("{}text\n", fence));
            out.push_str(manifest);
            out.push_str(&format!("{}\n\n", fence));
        }
    }
}

pub fn write_contents_heading(out: &mut String, format: OutputFormat) {
    match format {
        OutputFormat::Text => banner(out, CONTENTS_TITLE),
        OutputFormat::Markdown => out.push_str(&format!("## {}\n\n", CONTENTS_TITLE)),
    }
}

pub fn write_block(out: &mut String, format: OutputFormat, block: &FileBlock, language: &str) {
    let content = block.content.as_deref().filter(|_| block.status.is_none());
    match format {
        OutputFormat::Text => {
            out.push_str(SEPARATOR);
            out.push('\n');
            out.push_str(&format!("{}{}\n", TEXT_FILE_FIELD, block.name));
            out.push_str(&format!("{}{}\n", TEXT_PATH_FIELD, block.path));
            if let Some(status) = &block.status {
                out.push_str(&format!("{}{}\n", TEXT_STATUS_FIELD, status));
            }
            if let Some(content) = content {
                out.push_str(&format!("{}{}\n", TEXT_BYTES_FIELD, content.len()));
            }
            out.push_str(SEPARATOR);
            out.push_str("\n\n");
            if let Some(content) = content {
                out.push_str(content);
                out.push_str("\n\n");
            }
        }
        OutputFormat::Markdown => {
            out.push_str(&format!("{}{}\n\n", MD_HEADING, block.name));
            out.push_str(&format!("{}`{}`\n", MD_PATH_FIELD, block.path));
            if let Some(status) = &block.status {
                out.push_str(&format!("{}{}\n", MD_STATUS_FIELD, status));
            }
            if let Some(content) = content {
                out.push_str(&format!("{}{}\n", MD_BYTES_FIELD, content.len()));
            }
            out.push('\n');
            if let Some(content) = content {
                let fence = fence_for(content);
                out.push_str(&format!("{}{}\n", fence, language));
                out.push_str(content);
                if !content.is_empty() && !content.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&format!("{}\n\n", fence));
            }
        }
    }
}

/// Identifies the framing from the title line, then from the section
/// markers. `None` when neither framing is recognisable.
pub fn detect_format(text: &str) -> Option<OutputFormat> {
    match first_nonblank_line(text) {
        Some(TEXT_TITLE) => return Some(OutputFormat::Text),
        Some(MARKDOWN_TITLE) => return Some(OutputFormat::Markdown),
        _ => {}
    }
    if text.contains(&text_contents_marker()) {
        Some(OutputFormat::Text)
    } else if text.contains(&markdown_contents_marker()) {
        Some(OutputFormat::Markdown)
    } else {
        None
    }
}

fn first_nonblank_line(text: &str) -> Option<&str> {
    text.trim_start_matches('\u{feff}')
        .split('\n')
        .find(|l| !l.trim().is_empty())
}

/// True when the title line is intact but CRLF-terminated, i.e. the
/// report went through a line-ending conversion.
pub fn has_crlf_title(text: &str) -> bool {
    first_nonblank_line(text)
        .and_then(|l| l.strip_suffix('\r'))
        .is_some_and(|l| l == TEXT_TITLE || l == MARKDOWN_TITLE)
}

/// Text following the content-section marker.
pub fn content_section(text: &str, format: OutputFormat) -> Option<&str> {
    let marker = match format {
        OutputFormat::Text => text_contents_marker(),
        OutputFormat::Markdown => markdown_contents_marker(),
    };
    text.find(&marker).map(|i| &text[i + marker.len()..])
}

/// Text between the structure marker and the content-section marker.
pub fn manifest_section(text: &str) -> Option<&str> {
    let format = detect_format(text)?;
    let (start_marker, end_marker) = match format {
        OutputFormat::Text => (text_structure_marker(), text_contents_marker()),
        OutputFormat::Markdown => (markdown_structure_marker(), markdown_contents_marker()),
    };
    let start = text.find(&start_marker)? + start_marker.len();
    let end = start + text[start..].find(&end_marker)?;
    Some(&text[start..end])
}

/// Splits a content section into blocks. A section that mixes framings or
/// contradicts its own byte counts yields no blocks at all, so a foreign
/// block is never folded into the content of its neighbour.
pub fn parse_blocks(section: &str, format: OutputFormat) -> Vec<FileBlock> {
    let parsed = match format {
        OutputFormat::Text => parse_text_blocks(section),
        OutputFormat::Markdown => parse_markdown_blocks(section),
    };
    parsed.unwrap_or_else(|| {
        log::warn!(
            "The {} content section is inconsistent (mixed framing or wrong byte count); ignoring all of its blocks",
            format
        );
        Vec::new()
    })
}

/// The line starting at `pos` without its `\n`, and the offset of the
/// following line.
fn take_line(s: &str, pos: usize) -> Option<(&str, usize)> {
    if pos >= s.len() {
        return None;
    }
    match s[pos..].find('\n') {
        Some(i) => Some((&s[pos..pos + i], pos + i + 1)),
        None => Some((&s[pos..], s.len())),
    }
}

fn skip_blank_lines(s: &str, mut pos: usize) -> usize {
    while let Some((line, next)) = take_line(s, pos) {
        if !line.is_empty() {
            break;
        }
        pos = next;
    }
    pos
}

struct TextHeader<'a> {
    name: &'a str,
    path: &'a str,
    status: Option<&'a str>,
    bytes: Option<usize>,
    end: usize,
}

fn parse_text_header(s: &str, pos: usize) -> Option<TextHeader<'_>> {
    let (line, pos) = take_line(s, pos)?;
    if line != SEPARATOR {
        return None;
    }
    let (line, pos) = take_line(s, pos)?;
    let name = line.strip_prefix(TEXT_FILE_FIELD)?;
    let (line, mut pos) = take_line(s, pos)?;
    let path = line.strip_prefix(TEXT_PATH_FIELD)?;

    let mut status = None;
    let mut bytes = None;
    loop {
        let (line, next) = take_line(s, pos)?;
        if line == SEPARATOR {
            return Some(TextHeader {
                name,
                path,
                status,
                bytes,
                end: next,
            });
        }
        if let Some(value) = line.strip_prefix(TEXT_STATUS_FIELD) {
            status = Some(value);
        } else if let Some(value) = line.strip_prefix(TEXT_BYTES_FIELD) {
            bytes = Some(value.trim().parse().ok()?);
        } else if line.contains(": ") {
            log::trace!("Ignoring unknown header field: {}", line);
        } else {
            return None;
        }
        pos = next;
    }
}

fn strip_block_separator(region: &str) -> &str {
    region
        .strip_suffix("\n\n")
        .or_else(|| region.strip_suffix('\n'))
        .unwrap_or(region)
}

fn exact_text_content(section: &str, pos: usize, len: usize) -> Option<(String, usize)> {
    let end = pos.checked_add(len)?;
    if end > section.len() || !section.is_char_boundary(end) {
        return None;
    }
    let rest = &section[end..];
    let consumed = if rest.starts_with("\n\n") {
        2
    } else if rest == "\n" || rest.is_empty() {
        rest.len()
    } else {
        return None;
    };
    let tail = rest[consumed..].trim_start_matches('\n');
    if !tail.is_empty() && !tail.starts_with(&text_block_start()) {
        return None;
    }
    Some((section[pos..end].to_string(), end + consumed))
}

fn delimited_text_content(section: &str, pos: usize) -> (String, usize) {
    let needle = format!("\n{}", text_block_start());
    match section[pos..].find(&needle) {
        Some(i) => {
            let end = pos + i + 1;
            (strip_block_separator(&section[pos..end]).to_string(), end)
        }
        None => (
            strip_block_separator(&section[pos..]).to_string(),
            section.len(),
        ),
    }
}

fn parse_text_blocks(section: &str) -> Option<Vec<FileBlock>> {
    let mut blocks = Vec::new();
    let mut pos = 0usize;
    loop {
        pos = skip_blank_lines(section, pos);
        if pos >= section.len() {
            break;
        }
        let Some(header) = parse_text_header(section, pos) else {
            log::debug!("No plain-text file header at offset {}", pos);
            return None;
        };
        pos = header.end;
        if let Some(("", next)) = take_line(section, pos) {
            pos = next;
        }

        if let Some(status) = header.status {
            blocks.push(FileBlock {
                name: header.name.to_string(),
                path: header.path.to_string(),
                status: Some(status.to_string()),
                content: None,
            });
            continue;
        }

        let (content, next) = match header.bytes {
            Some(len) => exact_text_content(section, pos, len).or_else(|| {
                log::debug!("Byte count {} of '{}' does not end the block", len, header.path);
                None
            })?,
            None => delimited_text_content(section, pos),
        };
        blocks.push(FileBlock {
            name: header.name.to_string(),
            path: header.path.to_string(),
            status: None,
            content: Some(content),
        });
        pos = next;
    }
    Some(blocks)
}

fn strip_code_span(value: &str) -> &str {
    value
        .strip_prefix('`')
        .and_then(|v| v.strip_suffix('`'))
        .unwrap_or(value)
}

fn exact_markdown_content(
    section: &str,
    pos: usize,
    len: usize,
    fence: &str,
) -> Option<(String, usize)> {
    let end = pos.checked_add(len)?;
    if end > section.len() || !section.is_char_boundary(end) {
        return None;
    }
    let content = &section[pos..end];
    let mut cursor = end;
    if !content.is_empty() && !content.ends_with('\n') {
        if !section[cursor..].starts_with('\n') {
            return None;
        }
        cursor += 1;
    }
    let (line, next) = take_line(section, cursor)?;
    (line == fence).then(|| (content.to_string(), next))
}

fn delimited_markdown_content(section: &str, pos: usize, fence: &str) -> Option<(String, usize)> {
    let mut cursor = pos;
    while let Some((line, next)) = take_line(section, cursor) {
        if line == fence {
            return Some((section[pos..cursor].to_string(), next));
        }
        cursor = next;
    }
    None
}

fn parse_markdown_blocks(section: &str) -> Option<Vec<FileBlock>> {
    let mut blocks = Vec::new();
    let mut pos = 0usize;
    loop {
        pos = skip_blank_lines(section, pos);
        let Some((line, next)) = take_line(section, pos) else {
            break;
        };
        let Some(name) = line.strip_prefix(MD_HEADING) else {
            log::debug!("No markdown file heading at offset {}", pos);
            return None;
        };

        pos = skip_blank_lines(section, next);
        let Some((path, next)) = take_line(section, pos)
            .and_then(|(line, next)| Some((strip_code_span(line.strip_prefix(MD_PATH_FIELD)?), next)))
        else {
            log::debug!("File block '{}' has no path line", name);
            return None;
        };
        pos = next;

        let mut status = None;
        let mut bytes = None;
        while let Some((line, next)) = take_line(section, pos) {
            if let Some(value) = line.strip_prefix(MD_STATUS_FIELD) {
                status = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix(MD_BYTES_FIELD) {
                bytes = Some(value.trim().parse::<usize>().ok()?);
            } else {
                break;
            }
            pos = next;
        }
        pos = skip_blank_lines(section, pos);

        if status.is_some() {
            blocks.push(FileBlock {
                name: name.to_string(),
                path: path.to_string(),
                status,
                content: None,
            });
            continue;
        }

        let fence = match take_line(section, pos) {
            Some((line, next)) if line.starts_with("```") => {
                pos = next;
                let width = line.chars().take_while(|&c| c == '`').count();
                "`".repeat(width)
            }
            _ => {
                log::debug!("File block '{}' has no code fence", path);
                return None;
            }
        };

        let parsed = match bytes {
            Some(len) => exact_markdown_content(section, pos, len, &fence),
            None => delimited_markdown_content(section, pos, &fence),
        };
        let Some((content, next)) = parsed else {
            log::debug!("Content of '{}' does not end at its closing fence", path);
            return None;
        };
        blocks.push(FileBlock {
            name: name.to_string(),
            path: path.to_string(),
            status: None,
            content: Some(content),
        });
        pos = next;
    }
    Some(blocks)
}
