//! Protected File Writer
//!
//! The only path from generators to disk. A write:
//! 1. refuses protected paths before any I/O,
//! 2. creates missing parent directories,
//! 3. writes the new content to a sibling temp file,
//! 4. copies the existing file to a fresh backup,
//! 5. renames the temp file over the target.
//!
//! Steps 2-5 run as one blocking job that owns the path lock. Dropping the
//! caller's future raises a cancel flag; the job checks it before touching
//! disk and again just before the rename, and its drop guards remove the
//! temp file and backup when it stops early. A cancelled write therefore
//! leaves the previous content and no new files, and the next writer of the
//! same path cannot start until the job is gone.

use super::protection::ensure_writable;
use crate::error::{invalid_argument, not_found_error, AppError, AppResult};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};
use uuid::Uuid;

const BACKUP_EXTENSION: &str = "bak";

type LockRegistry = Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>;

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub path: PathBuf,
    /// Where the previous content went, if the file existed
    pub backup: Option<PathBuf>,
    pub bytes: usize,
}

#[derive(Default)]
pub struct ProtectedFileWriter {
    locks: LockRegistry,
}

impl ProtectedFileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `content` to `path`, backing up any existing file first
    pub async fn write_file(&self, path: impl AsRef<Path>, content: &str) -> AppResult<WriteOutcome> {
        let path = path.as_ref();
        check_path(path)?;

        let lease = self.acquire(path).await;
        let path = path.to_path_buf();
        let content = content.to_string();
        run_locked(lease, move |cancel| write_blocking(&path, &content, cancel)).await
    }

    /// Replace the single occurrence of `anchor` in an existing file.
    ///
    /// Fails with `NotFound` when the file or the anchor is missing and with
    /// `Ambiguous` when the anchor occurs more than once.
    pub async fn update_file(
        &self,
        path: impl AsRef<Path>,
        anchor: &str,
        replacement: &str,
    ) -> AppResult<WriteOutcome> {
        let path = path.as_ref();
        check_path(path)?;
        if anchor.is_empty() {
            return Err(invalid_argument("Anchor text must not be empty"));
        }

        let lease = self.acquire(path).await;
        let path = path.to_path_buf();
        let anchor = anchor.to_string();
        let replacement = replacement.to_string();
        run_locked(lease, move |cancel| {
            update_blocking(&path, &anchor, &replacement, cancel)
        })
        .await
    }

    pub async fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false)
    }

    pub async fn ensure_directory(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(invalid_argument("Directory path must not be empty"));
        }
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    /// Wait for exclusive use of `path`
    async fn acquire(&self, path: &Path) -> PathLease {
        let key = lock_key(path);
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };
        let mut lease = PathLease {
            registry: self.locks.clone(),
            key,
            lock: Some(lock.clone()),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }
}

/// Exclusive hold on one path. Dropping it, whether the write finished or
/// was abandoned while waiting, forgets the registry entry once no other
/// writer holds or waits on it.
struct PathLease {
    registry: LockRegistry,
    key: PathBuf,
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathLease {
    fn drop(&mut self) {
        let mut locks = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        drop(self.guard.take());
        drop(self.lock.take());
        if locks.get(&self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Raised when the awaiting future goes away
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Run `job` on the blocking pool while holding `lease`
async fn run_locked<F>(lease: PathLease, job: F) -> AppResult<WriteOutcome>
where
    F: FnOnce(&AtomicBool) -> AppResult<WriteOutcome> + Send + 'static,
{
    let cancel = CancelOnDrop(Arc::new(AtomicBool::new(false)));
    let flag = cancel.0.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let _lease = lease;
        job(&flag)
    });

    handle
        .await
        .map_err(|e| AppError::Internal(format!("File write task failed: {}", e)))?
}

fn check_path(path: &Path) -> AppResult<()> {
    if path.as_os_str().is_empty() {
        return Err(invalid_argument("File path must not be empty"));
    }
    ensure_writable(path)
}

fn lock_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn check_cancelled(path: &Path, cancel: &AtomicBool) -> AppResult<()> {
    if cancel.load(Ordering::SeqCst) {
        debug!("Write to {} abandoned", path.display());
        return Err(AppError::Internal(format!(
            "Write to {} was cancelled",
            path.display()
        )));
    }
    Ok(())
}

fn write_blocking(path: &Path, content: &str, cancel: &AtomicBool) -> AppResult<WriteOutcome> {
    check_cancelled(path, cancel)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let temp = RemoveOnDrop::new(temp_path(path));
    std::fs::write(temp.path(), content.as_bytes())?;

    let mut backup = None;
    if path.try_exists()? {
        let guard = RemoveOnDrop::new(next_backup_path(path)?);
        std::fs::copy(path, guard.path())?;
        debug!("Backed up {} to {}", path.display(), guard.path().display());
        backup = Some(guard);
    }

    check_cancelled(path, cancel)?;
    std::fs::rename(temp.path(), path)?;
    temp.disarm();
    let backup = backup.map(RemoveOnDrop::disarm);

    info!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(WriteOutcome {
        path: path.to_path_buf(),
        backup,
        bytes: content.len(),
    })
}

fn update_blocking(
    path: &Path,
    anchor: &str,
    replacement: &str,
    cancel: &AtomicBool,
) -> AppResult<WriteOutcome> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_found_error(format!("File {}", path.display())));
        }
        Err(e) => return Err(e.into()),
    };

    let subject = format!("Anchor text '{}' in {}", anchor, path.display());
    match content.matches(anchor).count() {
        0 => Err(not_found_error(subject)),
        1 => write_blocking(path, &content.replacen(anchor, replacement, 1), cancel),
        count => Err(AppError::Ambiguous {
            message: subject,
            count,
        }),
    }
}

/// `<file>.bak`, else `<file>.<timestamp>.bak`, else the timestamped name
/// with a counter; never an existing file
fn next_backup_path(path: &Path) -> AppResult<PathBuf> {
    let plain = append_suffix(path, BACKUP_EXTENSION);
    if !plain.try_exists()? {
        return Ok(plain);
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    let stamped = append_suffix(path, &format!("{}.{}", stamp, BACKUP_EXTENSION));
    if !stamped.try_exists()? {
        return Ok(stamped);
    }

    for n in 1u32.. {
        let candidate = append_suffix(path, &format!("{}_{}.{}", stamp, n, BACKUP_EXTENSION));
        if !candidate.try_exists()? {
            return Ok(candidate);
        }
    }
    Err(AppError::Internal(format!(
        "No free backup name for {}",
        path.display()
    )))
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// Removes its file when dropped unless disarmed
struct RemoveOnDrop {
    path: Option<PathBuf>,
}

impl RemoveOnDrop {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    fn disarm(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_protected_file_is_never_created() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("nested/Report.prt.cs");

        let err = writer.write_file(&target, "anything").await.unwrap_err();

        assert!(matches!(err, AppError::ProtectedFile { ref path } if path == &target));
        assert!(!target.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_protected_file_untouched_by_update() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Report.PRT.cs");
        std::fs::write(&target, "Name").unwrap();

        let writer = ProtectedFileWriter::new();
        let err = writer.update_file(&target, "Name", "FullName").await.unwrap_err();

        assert!(err.is_protected());
        assert_eq!(read(&target), "Name");
        assert_eq!(listing(dir.path()), vec!["Report.PRT.cs".to_string()]);
    }

    #[tokio::test]
    async fn test_new_file_has_no_backup_and_dirs_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("a/b/c/Customer.cs");

        let outcome = assert_ok!(writer.write_file(&target, "class Customer {}").await);

        assert_eq!(read(&target), "class Customer {}");
        assert_eq!(outcome.backup, None);
        assert_eq!(outcome.bytes, 17);
        assert_eq!(listing(&dir.path().join("a/b/c")), vec!["Customer.cs".to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite_backs_up_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("A.cs");

        writer.write_file(&target, "v1").await.unwrap();
        let outcome = writer.write_file(&target, "v2").await.unwrap();

        assert_eq!(read(&target), "v2");
        let backup = outcome.backup.expect("existing file is backed up");
        assert_eq!(backup, dir.path().join("A.cs.bak"));
        assert_eq!(read(&backup), "v1");
    }

    #[tokio::test]
    async fn test_existing_backup_is_never_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("A.cs");

        writer.write_file(&target, "v1").await.unwrap();
        let first = writer.write_file(&target, "v2").await.unwrap().backup.unwrap();
        let second = writer.write_file(&target, "v3").await.unwrap().backup.unwrap();
        let third = writer.write_file(&target, "v4").await.unwrap().backup.unwrap();

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(read(&first), "v1");
        assert_eq!(read(&second), "v2");
        assert_eq!(read(&third), "v3");
        assert_eq!(read(&target), "v4");
        assert!(second.to_string_lossy().ends_with(".bak"));
        assert_eq!(listing(dir.path()).len(), 4);
    }

    #[tokio::test]
    async fn test_update_ambiguous_anchor_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("A.cs");
        std::fs::write(&target, "Name Name").unwrap();

        let err = assert_err!(writer.update_file(&target, "Name", "FullName").await);

        assert!(matches!(err, AppError::Ambiguous { count: 2, .. }));
        assert!(err.to_string().contains("appears 2 times"));
        assert_eq!(read(&target), "Name Name");
        assert_eq!(listing(dir.path()), vec!["A.cs".to_string()]);
    }

    #[tokio::test]
    async fn test_update_unique_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("A.cs");
        std::fs::write(&target, "Name").unwrap();

        let outcome = writer.update_file(&target, "Name", "FullName").await.unwrap();

        let content = read(&target);
        assert_eq!(content, "FullName");
        assert_eq!(content.matches("Name").count(), 1);
        assert_eq!(read(&outcome.backup.unwrap()), "Name");
    }

    #[tokio::test]
    async fn test_update_missing_anchor_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("A.cs");

        let err = writer.update_file(&target, "Name", "X").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        std::fs::write(&target, "Other").unwrap();
        let err = writer.update_file(&target, "Name", "X").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("Anchor text")));

        let err = writer.update_file(&target, "", "X").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_empty_path_rejected() {
        let writer = ProtectedFileWriter::new();
        assert!(matches!(
            writer.write_file("", "x").await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            writer.ensure_directory("").await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_same_path_keep_every_version() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(ProtectedFileWriter::new());
        let target = dir.path().join("A.cs");
        writer.write_file(&target, "v0").await.unwrap();

        let tasks: Vec<_> = (1..=5)
            .map(|i| {
                let writer = writer.clone();
                let target = target.clone();
                tokio::spawn(async move { writer.write_file(&target, &format!("v{}", i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Current content plus one backup per overwrite; every version survives
        let mut versions: Vec<_> = listing(dir.path())
            .iter()
            .map(|name| read(&dir.path().join(name)))
            .collect();
        versions.sort();
        assert_eq!(versions, vec!["v0", "v1", "v2", "v3", "v4", "v5"]);
        assert!(writer.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let nested = dir.path().join("x/y");

        writer.ensure_directory(&nested).await.unwrap();
        writer.ensure_directory(&nested).await.unwrap();
        assert!(writer.file_exists(&nested).await);
        assert!(!writer.file_exists(nested.join("missing.cs")).await);
    }

    #[test]
    fn test_drop_guard_removes_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("dropped.tmp");
        let kept = dir.path().join("kept.tmp");
        std::fs::write(&dropped, "x").unwrap();
        std::fs::write(&kept, "x").unwrap();

        drop(RemoveOnDrop::new(dropped.clone()));
        let path = RemoveOnDrop::new(kept.clone()).disarm();

        assert!(!dropped.exists());
        assert!(kept.exists());
        assert_eq!(path, kept);
    }

    #[tokio::test]
    async fn test_cancelled_write_leaves_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProtectedFileWriter::new();
        let target = dir.path().join("A.cs");
        writer.write_file(&target, "v1").await.unwrap();

        // Hold the path so the second write parks before touching disk
        let held = writer.acquire(&target).await;
        let mut pending = tokio_test::task::spawn(writer.write_file(&target, "v2"));
        assert!(pending.poll().is_pending());
        drop(pending);
        drop(held);

        assert_eq!(read(&target), "v1");
        assert_eq!(listing(dir.path()), vec!["A.cs".to_string()]);
        assert!(writer.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_write_cancelled_while_io_is_queued_leaves_nothing_behind() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let writer = ProtectedFileWriter::new();
            let target = dir.path().join("A.cs");
            writer.write_file(&target, "v1").await.unwrap();

            // Occupy the only blocking thread
            let (started_tx, started_rx) = tokio::sync::oneshot::channel();
            let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
            let blocker = tokio::task::spawn_blocking(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            });
            started_rx.await.unwrap();

            let mut pending = tokio_test::task::spawn(writer.write_file(&target, "v2"));
            assert!(pending.poll().is_pending());
            drop(pending);

            release_tx.send(()).unwrap();
            blocker.await.unwrap();
            // Queued behind the abandoned write on the single thread
            tokio::task::spawn_blocking(|| ()).await.unwrap();

            assert_eq!(read(&target), "v1");
            assert_eq!(listing(dir.path()), vec!["A.cs".to_string()]);
            assert!(writer.locks.lock().unwrap().is_empty());

            // The path is free again
            writer.write_file(&target, "v3").await.unwrap();
            assert_eq!(read(&target), "v3");
        });
    }
}
