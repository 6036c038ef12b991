// reloader.rs — Pushes policy file edits to the remote policy service.
//
//   notify callback ──try_send──▶ [bounded queue] ──▶ reload task ──PUT──▶ remote
//                                                           │
//                                                           └─ publish to PolicySnapshot
//
// The watcher observes the parent directory and filters by file name, so an
// editor that replaces the file by rename is still seen. The callback never
// blocks: a full queue drops the event, since the pending reload will read
// the newest bytes anyway. The task uploads once at start, then once per
// queued event, in order. A failed upload is logged and the loop goes on;
// the remote keeps whatever policy it had.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use authz_policy::RemoteHttp;

use crate::error::DaemonError;

/// How many change events may wait for the reload task.
const QUEUE_DEPTH: usize = 16;

/// Watches one policy file and uploads it on change.
#[derive(Debug, Clone)]
pub struct PolicyReloader {
    path: PathBuf,
    policy_id: String,
    backend: RemoteHttp,
}

/// Keeps the watcher and reload task alive. Dropping it stops both.
pub struct ReloaderHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for ReloaderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl PolicyReloader {
    pub fn new(path: impl Into<PathBuf>, policy_id: impl Into<String>, backend: RemoteHttp) -> Self {
        Self {
            path: path.into(),
            policy_id: policy_id.into(),
            backend,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the policy file and upload it. On success the uploaded bytes
    /// become the backend's current policy snapshot.
    pub async fn reload(&self) -> Result<(), DaemonError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| authz_policy::PolicyError::ReadFailed {
                path: self.path.clone(),
                source,
            })?;

        self.backend.upload_policy(&self.policy_id, text.clone()).await?;
        self.backend.snapshot().publish(text.into_bytes());

        tracing::info!(
            path = %self.path.display(),
            policy_id = %self.policy_id,
            "uploaded policy to remote service"
        );
        Ok(())
    }

    /// Start watching. Must be called inside a tokio runtime.
    pub fn spawn(self) -> Result<ReloaderHandle, DaemonError> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let watched_dir = watched_dir(&self.path);
        let file_name = self.path.file_name().map(OsString::from);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if touches(&event, file_name.as_deref()) => {
                    // Full means a reload is already pending; closed means shutdown.
                    let _ = tx.try_send(());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "policy file watch error"),
            }
        })
        .map_err(|source| DaemonError::Watch {
            path: self.path.clone(),
            source,
        })?;

        watcher
            .watch(&watched_dir, RecursiveMode::NonRecursive)
            .map_err(|source| DaemonError::Watch {
                path: watched_dir.clone(),
                source,
            })?;

        tracing::info!(path = %self.path.display(), "watching policy file for changes");
        let task = tokio::spawn(self.run(rx));

        Ok(ReloaderHandle {
            _watcher: watcher,
            task,
        })
    }

    async fn run(self, mut events: mpsc::Receiver<()>) {
        self.reload_logged().await;
        while events.recv().await.is_some() {
            self.reload_logged().await;
        }
    }

    async fn reload_logged(&self) {
        if let Err(e) = self.reload().await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "policy upload failed, remote keeps its previous policy"
            );
        }
    }
}

fn watched_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// A write, create or rename that involves the policy file.
fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    let relevant = event.kind.is_modify() || event.kind.is_create();
    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == file_name)
}
