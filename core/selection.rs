use crate::error::{AppError, Result};
use crate::ignore_rules::IgnoreRules;
use crate::task::{CancelToken, Progress, ProgressSink, Stage};
use chrono::{DateTime, Utc};
use log;
use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, FilterEntry, WalkDir};

/// Selection flag carried by every node. Files are only ever `Included` or
/// `Excluded`; `PartiallyIncluded` is derived for directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionState {
    Included,
    Excluded,
    PartiallyIncluded,
}

impl SelectionState {
    pub fn glyph(self) -> char {
        match self {
            SelectionState::Included => '✓',
            SelectionState::PartiallyIncluded => '◐',
            SelectionState::Excluded => '✗',
        }
    }

    /// Derived state of a directory from its children's states.
    /// `None` for a directory without children.
    pub fn derive<I>(children: I) -> Option<SelectionState>
    where
        I: IntoIterator<Item = SelectionState>,
    {
        let mut any_included = false;
        let mut any_excluded = false;
        let mut any_child = false;
        for state in children {
            any_child = true;
            match state {
                SelectionState::Included => any_included = true,
                SelectionState::Excluded => any_excluded = true,
                SelectionState::PartiallyIncluded => return Some(SelectionState::PartiallyIncluded),
            }
            if any_included && any_excluded {
                return Some(SelectionState::PartiallyIncluded);
            }
        }
        match (any_child, any_included) {
            (false, _) => None,
            (true, true) => Some(SelectionState::Included),
            (true, false) => Some(SelectionState::Excluded),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One filesystem object seen during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub absolute_path: PathBuf,
    /// `/`-separated, empty for the scan root.
    pub relative_path: String,
    pub is_dir: bool,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SelectionNode {
    pub entry: Entry,
    state: SelectionState,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SelectionNode {
    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_dir(&self) -> bool {
        self.entry.is_dir
    }
}

/// Arena-backed mirror of a directory subtree with tri-state selection.
///
/// Nodes never hold references to each other; parents and children are
/// linked through [`NodeId`] indices into the arena, and the root is always
/// the first slot.
#[derive(Debug, Clone)]
pub struct SelectionTree {
    root_path: PathBuf,
    nodes: Vec<SelectionNode>,
}

impl SelectionTree {
    pub fn build(root_path: &Path, rules: &IgnoreRules) -> Result<Self> {
        Self::build_with(root_path, rules, &CancelToken::new(), &ProgressSink::noop())
    }

    /// Walks `root_path` in display order (directories first, then names
    /// compared case-insensitively). Ignored entries are pruned together
    /// with their subtrees; unreadable entries are logged and left out.
    pub fn build_with(
        root_path: &Path,
        rules: &IgnoreRules,
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<Self> {
        let root_meta = std::fs::metadata(root_path).map_err(|e| AppError::FileRead {
            path: root_path.to_path_buf(),
            source: e,
        })?;
        if !root_meta.is_dir() {
            return Err(AppError::InvalidArgument(format!(
                "'{}' is not a directory",
                root_path.display()
            )));
        }

        log::info!("Scanning directory: {}", root_path.display());
        let root_name = root_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.to_string_lossy().into_owned());
        let mut tree = SelectionTree {
            root_path: root_path.to_path_buf(),
            nodes: vec![SelectionNode {
                entry: Entry {
                    name: root_name,
                    absolute_path: root_path.to_path_buf(),
                    relative_path: String::new(),
                    is_dir: true,
                    size_bytes: 0,
                    modified: modified_time(&root_meta),
                },
                state: SelectionState::Included,
                parent: None,
                children: Vec::new(),
            }],
        };

        let mut walker = WalkDir::new(root_path)
            .follow_links(false)
            .sort_by(compare_entries)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !rules.should_ignore(&e.file_name().to_string_lossy(), false)
            });

        // Directory stack: `dirs[d]` is the node of the open directory at depth d.
        let mut dirs: Vec<NodeId> = vec![tree.root()];
        let mut scanned = 0usize;

        while let Some(entry_result) = walker.next() {
            cancel.check("directory scan")?;
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 && e.path().is_none_or(|p| p == root_path) {
                        return Err(AppError::from(e));
                    }
                    log::warn!("Skipping unreadable entry: {}", e);
                    tree.detach_failed_dir(&mut dirs, e.path());
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let is_dir = entry.file_type().is_dir();

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Skipping entry without metadata {}: {}", entry.path().display(), e);
                    leave_out(&mut walker, &entry);
                    continue;
                }
            };
            let Some(relative_path) = relative_string(entry.path(), root_path) else {
                log::warn!("Could not get relative path for: {}", entry.path().display());
                leave_out(&mut walker, &entry);
                continue;
            };

            dirs.truncate(entry.depth());
            let Some(&parent) = dirs.last() else {
                log::warn!("No parent directory recorded for: {}", entry.path().display());
                leave_out(&mut walker, &entry);
                continue;
            };
            log::trace!("Scanned: {}", relative_path);
            progress.report(Progress::new(Stage::Scan, scanned, None, Some(relative_path.clone())));
            scanned += 1;

            let id = tree.push_child(
                parent,
                Entry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    absolute_path: entry.path().to_path_buf(),
                    relative_path,
                    is_dir,
                    size_bytes: if is_dir { 0 } else { metadata.len() },
                    modified: modified_time(&metadata),
                },
            );
            if is_dir {
                dirs.push(id);
            }
        }

        log::info!(
            "Scan complete: {} entries, {} files.",
            scanned,
            tree.count_files(tree.root())
        );
        Ok(tree)
    }

    fn push_child(&mut self, parent: NodeId, entry: Entry) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SelectionNode {
            entry,
            state: SelectionState::Included,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// A directory whose listing failed is unlinked from its parent so the
    /// selection logic never observes it. Its arena slot stays unreachable.
    fn detach_failed_dir(&mut self, dirs: &mut Vec<NodeId>, failed: Option<&Path>) {
        let Some(failed) = failed else { return };
        let Some(&open) = dirs.last() else { return };
        if open == self.root() || self.nodes[open.0].entry.absolute_path != failed {
            return;
        }
        dirs.pop();
        if let Some(parent) = self.nodes[open.0].parent {
            self.nodes[parent.0].children.retain(|&c| c != open);
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn node(&self, id: NodeId) -> &SelectionNode {
        &self.nodes[id.0]
    }

    pub fn state(&self, id: NodeId) -> SelectionState {
        self.nodes[id.0].state
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Pre-order ids of every node reachable from `start`, `start` included.
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        order
    }

    pub fn find(&self, relative_path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for part in relative_path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            current = *self.nodes[current.0]
                .children
                .iter()
                .find(|&&c| self.nodes[c.0].entry.name == part)?;
        }
        Some(current)
    }

    /// Sets `id` and its whole subtree to `new_state`, then recomputes every
    /// ancestor. Returns the ids whose state actually changed, in no
    /// particular order; callers use it as the change notification.
    pub fn set_state(&mut self, id: NodeId, new_state: SelectionState) -> Result<Vec<NodeId>> {
        if new_state == SelectionState::PartiallyIncluded {
            return Err(AppError::InvalidState(
                "PartiallyIncluded is derived from children and cannot be set directly".to_string(),
            ));
        }
        if id.0 >= self.nodes.len() {
            return Err(AppError::InvalidArgument(format!("Unknown node id {}", id.0)));
        }

        let mut changed = Vec::new();
        for node_id in self.descendants(id) {
            let node = &mut self.nodes[node_id.0];
            if node.state != new_state {
                node.state = new_state;
                changed.push(node_id);
            }
        }

        let mut cursor = self.nodes[id.0].parent;
        while let Some(parent) = cursor {
            let derived = SelectionState::derive(
                self.nodes[parent.0].children.iter().map(|c| self.nodes[c.0].state),
            );
            let node = &mut self.nodes[parent.0];
            match derived {
                Some(state) if state != node.state => {
                    node.state = state;
                    changed.push(parent);
                }
                // Unchanged here means unchanged all the way up.
                _ => break,
            }
            cursor = node.parent;
        }

        log::trace!(
            "Set '{}' to {:?}; {} node(s) changed",
            self.nodes[id.0].entry.relative_path,
            new_state,
            changed.len()
        );
        Ok(changed)
    }

    pub fn set_state_by_path(&mut self, relative_path: &str, new_state: SelectionState) -> Result<Vec<NodeId>> {
        let id = self.find(relative_path).ok_or_else(|| {
            AppError::InvalidArgument(format!("'{}' is not part of the scanned tree", relative_path))
        })?;
        self.set_state(id, new_state)
    }

    /// Included files reachable from `id`, without descending into excluded
    /// directories.
    pub fn count_selected_files(&self, id: NodeId) -> usize {
        let node = &self.nodes[id.0];
        if !node.entry.is_dir {
            return usize::from(node.state == SelectionState::Included);
        }
        if node.state == SelectionState::Excluded {
            return 0;
        }
        node.children.iter().map(|&c| self.count_selected_files(c)).sum()
    }

    pub fn count_files(&self, id: NodeId) -> usize {
        self.descendants(id)
            .into_iter()
            .filter(|c| !self.nodes[c.0].entry.is_dir)
            .count()
    }

    /// Relative paths of every included file, in tree order.
    pub fn selected_files(&self) -> Vec<String> {
        let mut selected = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.state == SelectionState::Excluded {
                continue;
            }
            if node.entry.is_dir {
                stack.extend(node.children.iter().rev());
            } else {
                selected.push(node.entry.relative_path.clone());
            }
        }
        selected
    }

    /// Excludes everything, then includes each listed path. Paths missing
    /// from the tree are returned so the caller can report them.
    pub fn apply_selection<S: AsRef<str>>(&mut self, relative_paths: &[S]) -> Result<Vec<String>> {
        let root = self.root();
        self.set_state(root, SelectionState::Excluded)?;
        let mut missing = Vec::new();
        for path in relative_paths {
            let path = path.as_ref();
            match self.find(path) {
                Some(id) => {
                    self.set_state(id, SelectionState::Included)?;
                }
                None => {
                    log::warn!("Selected path no longer exists in tree: {}", path);
                    missing.push(path.to_string());
                }
            }
        }
        Ok(missing)
    }
}

/// Drops `entry` from the scan. A directory's contents are dropped with it;
/// otherwise they would attach to whichever directory is still open.
fn leave_out<P>(walker: &mut FilterEntry<walkdir::IntoIter, P>, entry: &DirEntry)
where
    P: FnMut(&DirEntry) -> bool,
{
    if entry.file_type().is_dir() {
        walker.skip_current_dir();
    }
}

fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    let a_dir = a.file_type().is_dir();
    let b_dir = b.file_type().is_dir();
    b_dir
        .cmp(&a_dir)
        .then_with(|| {
            let a_name = a.file_name().to_string_lossy().to_lowercase();
            let b_name = b.file_name().to_string_lossy().to_lowercase();
            a_name.cmp(&b_name)
        })
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn modified_time(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// `path` relative to `root`, joined with `/` regardless of platform.
pub fn relative_string(path: &Path, root: &Path) -> Option<String> {
    let relative = pathdiff::diff_paths(path, root)?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(p, body).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.txt", "b");
        write(dir.path(), "A.txt", "a");
        write(dir.path(), "src/lib.rs", "lib");
        write(dir.path(), "src/util/mod.rs", "mod");
        write(dir.path(), "src/util/io.rs", "io");
        write(dir.path(), "docs/guide.md", "guide");
        write(dir.path(), "node_modules/pkg/index.js", "js");
        write(dir.path(), ".env", "secret");
        dir
    }

    fn rules() -> IgnoreRules {
        IgnoreRules::new(["node_modules"], false)
    }

    fn assert_invariants(tree: &SelectionTree) {
        for id in tree.descendants(tree.root()) {
            let node = tree.node(id);
            if !node.is_dir() {
                assert_ne!(node.state(), SelectionState::PartiallyIncluded);
                continue;
            }
            if let Some(expected) =
                SelectionState::derive(node.children().iter().map(|&c| tree.state(c)))
            {
                assert_eq!(node.state(), expected, "bad state at '{}'", node.entry.relative_path);
            }
        }
    }

    #[test]
    fn build_orders_dirs_first_case_insensitive() {
        let dir = fixture();
        let tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let names: Vec<&str> = tree
            .children(tree.root())
            .iter()
            .map(|&c| tree.node(c).entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["docs", "src", "A.txt", "b.txt"]);
        let src = tree.find("src").unwrap();
        let src_names: Vec<&str> = tree
            .children(src)
            .iter()
            .map(|&c| tree.node(c).entry.name.as_str())
            .collect();
        assert_eq!(src_names, vec!["util", "lib.rs"]);
    }

    #[test]
    fn build_prunes_ignored_and_hidden() {
        let dir = fixture();
        let tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        assert!(tree.find("node_modules").is_none());
        assert!(tree.find(".env").is_none());
        assert_eq!(tree.count_files(tree.root()), 6);
        assert!(tree
            .descendants(tree.root())
            .iter()
            .all(|&id| tree.state(id) == SelectionState::Included));
    }

    #[test]
    fn entries_carry_metadata() {
        let dir = fixture();
        let tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let lib = tree.node(tree.find("src/lib.rs").unwrap());
        assert_eq!(lib.entry.relative_path, "src/lib.rs");
        assert_eq!(lib.entry.size_bytes, 3);
        assert!(!lib.entry.is_dir);
        assert!(lib.entry.modified.is_some());
        assert_eq!(tree.node(tree.find("src").unwrap()).entry.size_bytes, 0);
    }

    #[test]
    fn build_rejects_non_directory_root() {
        let dir = fixture();
        let err = SelectionTree::build(&dir.path().join("b.txt"), &rules()).unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn cancelled_scan_stops() {
        let dir = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = SelectionTree::build_with(dir.path(), &rules(), &cancel, &ProgressSink::noop())
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    fn root_child_names(tree: &SelectionTree) -> Vec<&str> {
        tree.children(tree.root())
            .iter()
            .map(|&c| tree.node(c).entry.name.as_str())
            .collect()
    }

    #[test]
    fn failed_directory_is_detached_from_the_tree() {
        let dir = fixture();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let docs = tree.find("docs").unwrap();
        let mut open = vec![tree.root(), docs];

        tree.detach_failed_dir(&mut open, Some(&dir.path().join("src")));
        assert_eq!(open, vec![tree.root(), docs], "only the open directory can fail");

        tree.detach_failed_dir(&mut open, Some(&dir.path().join("docs")));
        assert_eq!(open, vec![tree.root()]);
        assert_eq!(tree.find("docs"), None);
        assert_eq!(tree.find("docs/guide.md"), None);
        assert_eq!(root_child_names(&tree), vec!["src", "A.txt", "b.txt"]);
        assert!(!crate::merge::render_manifest(&tree).contains("docs"));
        assert!(!tree.selected_files().iter().any(|p| p.starts_with("docs")));

        tree.detach_failed_dir(&mut open, Some(dir.path()));
        assert_eq!(open, vec![tree.root()], "the root is never detached");
    }

    #[test]
    fn left_out_directory_takes_its_contents_along() {
        let dir = fixture();
        let mut walker = WalkDir::new(dir.path())
            .sort_by(compare_entries)
            .into_iter()
            .filter_entry(|_| true);
        let mut seen = Vec::new();
        while let Some(entry) = walker.next() {
            let entry = entry.unwrap();
            let Some(rel) = relative_string(entry.path(), dir.path()) else {
                continue;
            };
            if rel == "src" || rel == "A.txt" {
                leave_out(&mut walker, &entry);
            }
            seen.push(rel);
        }
        assert!(seen.contains(&"src".to_string()));
        assert!(!seen.iter().any(|p| p.starts_with("src/")));
        assert!(seen.contains(&"docs/guide.md".to_string()));
        assert!(seen.contains(&"b.txt".to_string()), "leaving out a file keeps its siblings");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_left_out_of_the_scan() {
        use std::os::unix::fs::PermissionsExt;

        let dir = fixture();
        let docs = dir.path().join("docs");
        fs::set_permissions(&docs, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&docs).is_ok() {
            // Permission bits do not bind a privileged user.
            fs::set_permissions(&docs, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let tree = SelectionTree::build(dir.path(), &rules());
        fs::set_permissions(&docs, fs::Permissions::from_mode(0o755)).unwrap();
        let tree = tree.unwrap();
        assert_eq!(tree.find("docs"), None);
        assert_eq!(root_child_names(&tree), vec!["src", "A.txt", "b.txt"]);
        assert!(!crate::merge::render_manifest(&tree).contains("docs"));
        assert_eq!(tree.count_files(tree.root()), 5);
        assert_invariants(&tree);
    }

    #[test]
    fn excluding_a_leaf_makes_parents_partial() {
        let dir = fixture();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        tree.set_state_by_path("src/util/io.rs", SelectionState::Excluded).unwrap();
        assert_eq!(tree.state(tree.find("src/util").unwrap()), SelectionState::PartiallyIncluded);
        assert_eq!(tree.state(tree.find("src").unwrap()), SelectionState::PartiallyIncluded);
        assert_eq!(tree.state(tree.root()), SelectionState::PartiallyIncluded);
        assert_eq!(tree.state(tree.find("docs").unwrap()), SelectionState::Included);

        tree.set_state_by_path("src/util/mod.rs", SelectionState::Excluded).unwrap();
        assert_eq!(tree.state(tree.find("src/util").unwrap()), SelectionState::Excluded);
        assert_eq!(tree.state(tree.find("src").unwrap()), SelectionState::PartiallyIncluded);
        assert_invariants(&tree);
    }

    #[test]
    fn directory_state_propagates_down() {
        let dir = fixture();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let src = tree.find("src").unwrap();
        tree.set_state(src, SelectionState::Excluded).unwrap();
        for id in tree.descendants(src) {
            assert_eq!(tree.state(id), SelectionState::Excluded);
        }
        tree.set_state(src, SelectionState::Included).unwrap();
        for id in tree.descendants(src) {
            assert_eq!(tree.state(id), SelectionState::Included);
        }
        assert_eq!(tree.state(tree.root()), SelectionState::Included);
    }

    #[test]
    fn partial_state_cannot_be_set() {
        let dir = fixture();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let err = tree
            .set_state(tree.root(), SelectionState::PartiallyIncluded)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn set_state_reports_changes() {
        let dir = fixture();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let changed = tree.set_state_by_path("docs/guide.md", SelectionState::Excluded).unwrap();
        let docs = tree.find("docs").unwrap();
        let guide = tree.find("docs/guide.md").unwrap();
        assert!(changed.contains(&guide));
        assert!(changed.contains(&docs));
        assert!(changed.contains(&tree.root()));
        let again = tree.set_state(guide, SelectionState::Excluded).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn counts_and_lists_selected_files() {
        let dir = fixture();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        assert_eq!(tree.count_selected_files(tree.root()), 6);
        tree.set_state_by_path("src/util", SelectionState::Excluded).unwrap();
        tree.set_state_by_path("b.txt", SelectionState::Excluded).unwrap();
        assert_eq!(tree.count_selected_files(tree.root()), 3);
        assert_eq!(
            tree.selected_files(),
            vec!["docs/guide.md".to_string(), "src/lib.rs".to_string(), "A.txt".to_string()]
        );
    }

    #[test]
    fn apply_selection_restores_saved_choice() {
        let dir = fixture();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let missing = tree
            .apply_selection(&["src/util/io.rs", "A.txt", "gone.txt"])
            .unwrap();
        assert_eq!(missing, vec!["gone.txt".to_string()]);
        assert_eq!(
            tree.selected_files(),
            vec!["src/util/io.rs".to_string(), "A.txt".to_string()]
        );
        assert_eq!(tree.state(tree.find("docs").unwrap()), SelectionState::Excluded);
        assert_invariants(&tree);
    }

    #[test]
    fn empty_directory_keeps_explicit_state() {
        let dir = fixture();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
        let empty = tree.find("empty").unwrap();
        assert_eq!(tree.state(empty), SelectionState::Included);
        tree.set_state(empty, SelectionState::Excluded).unwrap();
        assert_eq!(tree.state(empty), SelectionState::Excluded);
        assert_eq!(tree.state(tree.root()), SelectionState::PartiallyIncluded);
    }

    #[test]
    fn derive_rules() {
        use SelectionState::*;
        assert_eq!(SelectionState::derive([Included, Included]), Some(Included));
        assert_eq!(SelectionState::derive([Excluded, Excluded]), Some(Excluded));
        assert_eq!(SelectionState::derive([Included, Excluded]), Some(PartiallyIncluded));
        assert_eq!(SelectionState::derive([Included, PartiallyIncluded]), Some(PartiallyIncluded));
        assert_eq!(SelectionState::derive(Vec::new()), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn toggles_preserve_tri_state_invariant(
            toggles in proptest::collection::vec((any::<prop::sample::Index>(), any::<bool>()), 1..40)
        ) {
            let dir = fixture();
            let mut tree = SelectionTree::build(dir.path(), &rules()).unwrap();
            let ids = tree.descendants(tree.root());
            for (index, include) in toggles {
                let id = ids[index.index(ids.len())];
                let state = if include { SelectionState::Included } else { SelectionState::Excluded };
                tree.set_state(id, state).unwrap();
                assert_invariants(&tree);
                for d in tree.descendants(id) {
                    prop_assert_eq!(tree.state(d), state);
                }
            }
        }
    }
}
