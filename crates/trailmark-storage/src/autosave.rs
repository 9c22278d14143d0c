//! Background saving off the main thread.

use crate::{PathStorage, SaveBatch, SaveReport};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

enum AutosaveCommand {
    Save(SaveBatch),
    Shutdown,
}

/// Writes [`SaveBatch`]es on a dedicated thread.
///
/// Batches are written in submission order. The storage's own lock keeps
/// these writes from overlapping with any save made directly on it.
pub struct AutosaveWorker {
    tx: mpsc::Sender<AutosaveCommand>,
    reports: mpsc::Receiver<SaveReport>,
    handle: Option<JoinHandle<()>>,
}

impl AutosaveWorker {
    pub fn spawn(storage: Arc<PathStorage>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let (report_tx, reports) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("trailmark_autosave".to_string())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        AutosaveCommand::Save(batch) => {
                            let report = storage.write_batch(batch);
                            if !report.is_clean() {
                                tracing::warn!(
                                    failed = report.failed.len(),
                                    "autosave left paths dirty"
                                );
                            }
                            let _ = report_tx.send(report);
                        }
                        AutosaveCommand::Shutdown => break,
                    }
                }
            })?;
        Ok(Self {
            tx,
            reports,
            handle: Some(handle),
        })
    }

    /// Queue a batch. Returns false if the worker has already stopped.
    pub fn submit(&self, batch: SaveBatch) -> bool {
        if batch.is_empty() {
            return true;
        }
        self.tx.send(AutosaveCommand::Save(batch)).is_ok()
    }

    /// Reports for batches finished since the last call.
    pub fn drain_reports(&self) -> Vec<SaveReport> {
        self.reports.try_iter().collect()
    }

    /// Finish queued batches and stop the thread.
    pub fn shutdown(mut self) -> Vec<SaveReport> {
        self.stop();
        self.drain_reports()
    }

    fn stop(&mut self) {
        let _ = self.tx.send(AutosaveCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("autosave thread panicked");
            }
        }
    }
}

impl Drop for AutosaveWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_storage;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use trailmark_model::{ActorId, Path, Point};

    #[test]
    fn test_worker_writes_batches_in_order() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(open_storage(dir.path()).unwrap());
        let worker = AutosaveWorker::spawn(Arc::clone(&storage)).unwrap();

        let mut path = Path::new(Some("walk"), ActorId::new(), "alex", "overworld")
            .with_points(vec![Point::new(0.0, 0.0, 0.0), Point::new(1.0, 0.0, 0.0)]);
        let id = path.id();

        storage.mark_dirty(id);
        let first = storage.collect_dirty(|_| Some(path.clone()));
        assert!(worker.submit(first));

        path.set_name("walk home").unwrap();
        storage.mark_dirty(id);
        let paths = HashMap::from([(id, path.clone())]);
        let second = storage.collect_dirty(|id| paths.get(id).cloned());
        assert!(worker.submit(second));

        let reports = worker.shutdown();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.is_clean()));
        assert!(!storage.is_dirty(&id));

        let loaded = open_storage(dir.path()).unwrap().load().unwrap();
        assert_eq!(loaded.paths.len(), 1);
        assert_eq!(loaded.paths[0].name(), "walk home");
    }

    #[test]
    fn test_empty_batch_is_accepted() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(open_storage(dir.path()).unwrap());
        let worker = AutosaveWorker::spawn(storage).unwrap();
        assert!(worker.submit(SaveBatch::default()));
        assert!(worker.shutdown().is_empty());
    }
}
