use crate::error::{AppError, Result};
use crate::selection::SelectionTree;
use log;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_FORMAT_VERSION: u32 = 1;

/// A saved selection: the scan root and the relative paths of every
/// included file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionProject {
    pub version: u32,
    pub root: PathBuf,
    pub selected: Vec<String>,
}

impl SelectionProject {
    pub fn from_tree(tree: &SelectionTree) -> Self {
        Self {
            version: PROJECT_FORMAT_VERSION,
            root: tree.root_path().to_path_buf(),
            selected: tree.selected_files(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AppError::DirCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| AppError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::info!(
            "Saved selection of {} file(s) to {}",
            self.selected.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| AppError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let project: SelectionProject = serde_json::from_str(&content)?;
        if project.version > PROJECT_FORMAT_VERSION {
            return Err(AppError::InvalidArgument(format!(
                "Selection file '{}' has version {}, newest supported is {}",
                path.display(),
                project.version,
                PROJECT_FORMAT_VERSION
            )));
        }
        Ok(project)
    }

    /// Replaces the tree's selection with the saved one. Returns the saved
    /// paths that no longer exist in the tree.
    pub fn apply(&self, tree: &mut SelectionTree) -> Result<Vec<String>> {
        if self.root != tree.root_path() {
            log::warn!(
                "Selection was saved for {} but is applied to {}",
                self.root.display(),
                tree.root_path().display()
            );
        }
        tree.apply_selection(&self.selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore_rules::IgnoreRules;
    use crate::selection::SelectionState;

    fn project_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "lib").unwrap();
        fs::write(dir.path().join("src/main.rs"), "main").unwrap();
        dir
    }

    #[test]
    fn saved_selection_is_reapplied_to_a_fresh_scan() {
        let dir = project_dir();
        let mut tree = SelectionTree::build(dir.path(), &IgnoreRules::default()).unwrap();
        tree.set_state_by_path("src/main.rs", SelectionState::Excluded).unwrap();

        let file = dir.path().join(".xtools/xmerge/selection.json");
        SelectionProject::from_tree(&tree).save(&file).unwrap();

        let loaded = SelectionProject::load(&file).unwrap();
        assert_eq!(loaded.selected, vec!["src/lib.rs".to_string(), "a.txt".to_string()]);

        let mut fresh = SelectionTree::build(dir.path(), &IgnoreRules::default()).unwrap();
        let missing = loaded.apply(&mut fresh).unwrap();
        assert!(missing.is_empty());
        assert_eq!(fresh.selected_files(), tree.selected_files());
        assert_eq!(
            fresh.state(fresh.find("src").unwrap()),
            SelectionState::PartiallyIncluded
        );
    }

    #[test]
    fn json_layout_is_stable() {
        let project = SelectionProject {
            version: 1,
            root: PathBuf::from("/proj"),
            selected: vec!["a.txt".to_string()],
        };
        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "version": 1, "root": "/proj", "selected": ["a.txt"] })
        );
    }

    #[test]
    fn newer_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sel.json");
        fs::write(&file, r#"{ "version": 9, "root": "/x", "selected": [] }"#).unwrap();
        assert!(matches!(
            SelectionProject::load(&file),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sel.json");
        fs::write(&file, "not json").unwrap();
        assert!(matches!(SelectionProject::load(&file), Err(AppError::Json(_))));
    }
}
