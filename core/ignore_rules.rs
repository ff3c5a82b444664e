use crate::output_formats::get_builtin_ignore_patterns;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Name-based exclusion rules consulted for every entry of a scan.
///
/// Each pattern is one of: an exact name, `*suffix`, `prefix*`, or a general
/// glob (`*` and `?` anywhere else). Rules are combined with logical OR, so
/// evaluation order never changes the outcome.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    include_hidden: bool,
    exact: HashSet<String>,
    suffixes: Vec<String>,
    prefixes: Vec<String>,
    glob_patterns: Vec<String>,
    globs: GlobSet,
    patterns: Vec<String>,
}

enum PatternKind<'a> {
    Exact,
    Suffix(&'a str),
    Prefix(&'a str),
    Glob,
}

fn classify(pattern: &str) -> PatternKind<'_> {
    let has_wildcard = |s: &str| s.contains(['*', '?']);
    if !has_wildcard(pattern) {
        return PatternKind::Exact;
    }
    if let Some(suffix) = pattern.strip_prefix('*').filter(|s| !has_wildcard(s)) {
        return PatternKind::Suffix(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*').filter(|p| !has_wildcard(p)) {
        return PatternKind::Prefix(prefix);
    }
    PatternKind::Glob
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::empty(false)
    }
}

impl IgnoreRules {
    pub fn empty(include_hidden: bool) -> Self {
        Self {
            include_hidden,
            exact: HashSet::new(),
            suffixes: Vec::new(),
            prefixes: Vec::new(),
            glob_patterns: Vec::new(),
            globs: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    pub fn new<I, S>(patterns: I, include_hidden: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Self::empty(include_hidden);
        rules.extend(patterns);
        rules
    }

    /// Reads one pattern per line. Blank lines and `#` comments are skipped.
    /// An unreadable source yields an empty rule set and a warning.
    pub fn load(path: &Path, include_hidden: bool) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => {
                let rules = Self::new(parse_pattern_lines(&content), include_hidden);
                log::debug!(
                    "Loaded {} ignore patterns from {}",
                    rules.patterns.len(),
                    path.display()
                );
                rules
            }
            Err(e) => {
                log::warn!(
                    "Could not read ignore patterns from '{}': {}. Continuing without them.",
                    path.display(),
                    e
                );
                Self::empty(include_hidden)
            }
        }
    }

    pub fn with_builtin(mut self) -> Self {
        self.extend(&get_builtin_ignore_patterns().names);
        self
    }

    pub fn extend<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut globs_changed = false;
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() || self.patterns.iter().any(|p| p == pattern) {
                continue;
            }
            self.patterns.push(pattern.to_string());
            self.exact.insert(pattern.to_string());

            match classify(pattern) {
                PatternKind::Exact => {}
                PatternKind::Suffix(suffix) => self.suffixes.push(suffix.to_string()),
                PatternKind::Prefix(prefix) => self.prefixes.push(prefix.to_string()),
                PatternKind::Glob => {
                    self.glob_patterns.push(pattern.to_string());
                    globs_changed = true;
                }
            }
        }
        if globs_changed {
            self.rebuild_globs();
        }
    }

    fn rebuild_globs(&mut self) {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.glob_patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    log::warn!(
                        "Invalid ignore glob \"{}\": {}. Only exact name matches will apply.",
                        pattern,
                        e
                    );
                }
            }
        }
        self.globs = builder.build().unwrap_or_else(|e| {
            log::error!("Error building ignore glob set: {}", e);
            GlobSet::empty()
        });
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    pub fn set_include_hidden(&mut self, include_hidden: bool) {
        self.include_hidden = include_hidden;
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// `is_hidden` lets callers pass a platform hidden attribute; a leading
    /// dot always counts as hidden.
    pub fn should_ignore(&self, name: &str, is_hidden: bool) -> bool {
        if !self.include_hidden && (is_hidden || name.starts_with('.')) {
            log::trace!("Ignoring hidden entry: {}", name);
            return true;
        }
        let matched = self.exact.contains(name)
            || self.suffixes.iter().any(|s| name.ends_with(s.as_str()))
            || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self.globs.is_match(name);
        if matched {
            log::trace!("Ignoring entry by pattern: {}", name);
        }
        matched
    }
}

fn parse_pattern_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_rules() -> IgnoreRules {
        IgnoreRules::new(["*.pyc", "node_modules", "build*"], false)
    }

    #[test]
    fn matches_each_pattern_kind() {
        let rules = sample_rules();
        assert!(rules.should_ignore("app.pyc", false));
        assert!(rules.should_ignore("node_modules", false));
        assert!(rules.should_ignore("build_output", false));
        assert!(rules.should_ignore(".env", false));
        assert!(!rules.should_ignore("main.go", false));
    }

    #[test]
    fn general_glob_uses_wildcards() {
        let rules = IgnoreRules::new(["test_*.log", "data?.csv"], true);
        assert!(rules.should_ignore("test_42.log", false));
        assert!(!rules.should_ignore("test_42.txt", false));
        assert!(rules.should_ignore("data1.csv", false));
        assert!(!rules.should_ignore("data12.csv", false));
    }

    #[test]
    fn hidden_policy() {
        let hidden_ok = IgnoreRules::new(Vec::<String>::new(), true);
        assert!(!hidden_ok.should_ignore(".env", false));
        let hidden_off = IgnoreRules::new(Vec::<String>::new(), false);
        assert!(hidden_off.should_ignore(".env", false));
        assert!(hidden_off.should_ignore("desktop.ini", true));
    }

    #[test]
    fn order_does_not_matter() {
        let names = ["app.pyc", "build", "node_modules", "x.rs", "buildx", "a.pyc.bak"];
        let forward = IgnoreRules::new(["*.pyc", "node_modules", "build*"], false);
        let reverse = IgnoreRules::new(["build*", "node_modules", "*.pyc"], false);
        for name in names {
            assert_eq!(forward.should_ignore(name, false), reverse.should_ignore(name, false));
        }
    }

    #[test]
    fn load_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\n\n  dist  \n*.tmp").unwrap();
        let rules = IgnoreRules::load(file.path(), false);
        assert_eq!(rules.patterns(), &["dist".to_string(), "*.tmp".to_string()]);
        assert!(rules.should_ignore("dist", false));
        assert!(rules.should_ignore("x.tmp", false));
    }

    #[test]
    fn unreadable_source_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rules = IgnoreRules::load(&dir.path().join("missing.txt"), true);
        assert!(rules.patterns().is_empty());
        assert!(!rules.should_ignore("anything", false));
    }

    #[test]
    fn builtin_patterns_apply() {
        let rules = IgnoreRules::empty(true).with_builtin();
        assert!(rules.should_ignore("__pycache__", false));
        assert!(rules.should_ignore("module.pyc", false));
    }
}
