use crate::error::{AppError, Result};
use crate::ignore_rules::IgnoreRules;
use crate::merge::{self, MergeOptions, MergeSummary};
use crate::restore::{self, RestoreSummary};
use crate::selection::{NodeId, SelectionState, SelectionTree};
use log;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Polled at every iteration boundary of a long-running pass.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            log::info!("{} cancelled", operation);
            Err(AppError::Cancelled(operation.to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Merge,
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub completed: usize,
    /// Unknown while scanning.
    pub total: Option<usize>,
    pub current: Option<String>,
}

impl Progress {
    pub fn new(stage: Stage, completed: usize, total: Option<usize>, current: Option<String>) -> Self {
        Self {
            stage,
            completed,
            total,
            current,
        }
    }

    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => Some(((self.completed.min(total) * 100) / total) as u8),
            None => None,
        }
    }
}

/// Sending half of a progress channel. Reports are observational: a
/// dropped receiver never affects the work being reported on.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<Sender<Progress>>,
}

impl ProgressSink {
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, Receiver<Progress>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn report(&self, progress: Progress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(progress);
        }
    }
}

/// A background worker with a cancellation token, a progress stream and a
/// typed completion result.
pub struct TaskHandle<T> {
    name: String,
    cancel: CancelToken,
    progress: Receiver<Progress>,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn spawn<F>(name: &str, work: F) -> Result<Self>
    where
        F: FnOnce(CancelToken, ProgressSink) -> Result<T> + Send + 'static,
    {
        let cancel = CancelToken::new();
        let (sink, progress) = ProgressSink::channel();
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("xmerge-{}", name))
            .spawn(move || work(worker_cancel, sink))?;
        log::debug!("Spawned {} worker", name);
        Ok(Self {
            name: name.to_string(),
            cancel,
            progress,
            handle,
        })
    }

    pub fn cancel(&self) {
        log::debug!("Cancellation requested for {} worker", self.name);
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    /// Progress reports received so far, without blocking.
    pub fn drain_progress(&self) -> Vec<Progress> {
        self.progress.try_iter().collect()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<T> {
        self.handle
            .join()
            .map_err(|_| AppError::Worker(format!("{} worker panicked", self.name)))?
    }
}

/// The selection tree shared between the coordinating layer and workers.
///
/// Merges hold the read lock for their whole pass and rescans swap the
/// tree in under the write lock, so a tree is never replaced while a merge
/// is reading it. Toggles take the write lock and are applied one at a time.
#[derive(Debug, Clone, Default)]
pub struct SharedSelection {
    inner: Arc<RwLock<Option<SelectionTree>>>,
}

impl SharedSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tree(tree: SelectionTree) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(tree))),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, Option<SelectionTree>>> {
        self.inner
            .read()
            .map_err(|_| AppError::Worker("selection tree lock poisoned".to_string()))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Option<SelectionTree>>> {
        self.inner
            .write()
            .map_err(|_| AppError::Worker("selection tree lock poisoned".to_string()))
    }

    pub fn replace(&self, tree: SelectionTree) -> Result<()> {
        *self.write()? = Some(tree);
        Ok(())
    }

    pub fn toggle(&self, relative_path: &str, state: SelectionState) -> Result<Vec<NodeId>> {
        let mut guard = self.write()?;
        let tree = guard.as_mut().ok_or_else(no_tree)?;
        tree.set_state_by_path(relative_path, state)
    }

    pub fn selected_files(&self) -> Result<Vec<String>> {
        let guard = self.read()?;
        Ok(guard.as_ref().ok_or_else(no_tree)?.selected_files())
    }
}

fn no_tree() -> AppError {
    AppError::InvalidState("no directory has been scanned yet".to_string())
}

/// Scans `root` on a worker thread and installs the new tree. Returns the
/// number of files found.
pub fn spawn_scan(
    shared: SharedSelection,
    root: PathBuf,
    rules: IgnoreRules,
) -> Result<TaskHandle<usize>> {
    TaskHandle::spawn("scan", move |cancel, progress| {
        let tree = SelectionTree::build_with(&root, &rules, &cancel, &progress)?;
        let files = tree.count_files(tree.root());
        shared.replace(tree)?;
        Ok(files)
    })
}

pub fn spawn_merge(
    shared: SharedSelection,
    options: MergeOptions,
    output_path: PathBuf,
) -> Result<TaskHandle<MergeSummary>> {
    TaskHandle::spawn("merge", move |cancel, progress| {
        let guard = shared.read()?;
        let tree = guard.as_ref().ok_or_else(no_tree)?;
        merge::merge_to_file(tree, &options, &output_path, &cancel, &progress)
    })
}

pub fn spawn_restore(artifact_path: PathBuf, destination: PathBuf) -> Result<TaskHandle<RestoreSummary>> {
    TaskHandle::spawn("restore", move |cancel, progress| {
        restore::restore_from_file_with(&artifact_path, &destination, &cancel, &progress)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "world").unwrap();
        dir
    }

    #[test]
    fn percent_handles_unknown_and_empty_totals() {
        assert_eq!(Progress::new(Stage::Scan, 3, None, None).percent(), None);
        assert_eq!(Progress::new(Stage::Merge, 0, Some(0), None).percent(), Some(100));
        assert_eq!(Progress::new(Stage::Merge, 1, Some(4), None).percent(), Some(25));
    }

    #[test]
    fn scan_then_merge_then_restore_on_workers() {
        let src = project();
        let out = tempfile::tempdir().unwrap();
        let shared = SharedSelection::new();

        let scan = spawn_scan(shared.clone(), src.path().to_path_buf(), IgnoreRules::default()).unwrap();
        assert_eq!(scan.join().unwrap(), 2);

        shared.toggle("sub/b.txt", SelectionState::Excluded).unwrap();
        assert_eq!(shared.selected_files().unwrap(), vec!["a.txt".to_string()]);

        let artifact = out.path().join("merge/out.txt");
        let merge = spawn_merge(shared.clone(), MergeOptions::default(), artifact.clone()).unwrap();
        let summary = merge.join().unwrap();
        assert_eq!(summary.embedded, 1);
        assert!(artifact.exists());

        let dest = out.path().join("restored");
        let restore = spawn_restore(artifact, dest.clone()).unwrap();
        let restored = restore.join().unwrap();
        assert_eq!((restored.restored, restored.attempted), (1, 1));
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "hello");
        assert!(!dest.join("sub/b.txt").exists());
    }

    #[test]
    fn merge_without_scan_is_rejected() {
        let out = tempfile::tempdir().unwrap();
        let merge = spawn_merge(
            SharedSelection::new(),
            MergeOptions::default(),
            out.path().join("x.txt"),
        )
        .unwrap();
        assert!(matches!(merge.join(), Err(AppError::InvalidState(_))));
    }

    #[test]
    fn cancelled_worker_reports_cancellation() {
        let handle = TaskHandle::spawn("wait", |cancel: CancelToken, _progress| {
            while !cancel.is_cancelled() {
                thread::yield_now();
            }
            cancel.check("wait")?;
            Ok(())
        })
        .unwrap();
        handle.cancel();
        let err = handle.join().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn progress_is_streamed() {
        let src = project();
        let shared = SharedSelection::new();
        let scan = spawn_scan(shared, src.path().to_path_buf(), IgnoreRules::default()).unwrap();
        let reports: Vec<Progress> = scan.progress().iter().collect();
        assert!(reports.iter().all(|p| p.stage == Stage::Scan));
        assert_eq!(reports.len(), 3);
        scan.join().unwrap();
    }
}
