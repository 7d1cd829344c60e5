//! Per-path async serialization. Writers to the same file queue up in
//! arrival order; writers to distinct files run fully in parallel.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct PathLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `critical` while holding the lock for `path`. tokio's mutex is
    /// fair, so same-path sections run in FIFO arrival order, and the guard
    /// drops on both success and error. `critical` must not re-acquire the
    /// same path.
    pub async fn acquire<F, Fut, T>(&self, path: &Path, critical: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(&path.to_string_lossy());
        let _guard = lock.lock().await;
        critical().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_same_path() {
        let locks = Arc::new(PathLocks::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let path = PathBuf::from("a.json");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let concurrent = concurrent.clone();
                let peak = peak.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    locks
                        .acquire(&path, || async {
                            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            concurrent.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("task panicked");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_paths_run_in_parallel() {
        let locks = Arc::new(PathLocks::new());
        let peak = Arc::new(AtomicUsize::new(0));
        let concurrent = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let locks = locks.clone();
                let concurrent = concurrent.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let path = PathBuf::from(format!("{i}.json"));
                    locks
                        .acquire(&path, || async {
                            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            concurrent.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("task panicked");
        }
        assert!(peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn released_after_error() {
        let locks = PathLocks::new();
        let path = PathBuf::from("err.json");

        let failed: Result<(), &str> = locks.acquire(&path, || async { Err("boom") }).await;
        assert!(failed.is_err());

        // The next waiter proceeds.
        let ok: Result<(), &str> = locks.acquire(&path, || async { Ok(()) }).await;
        assert!(ok.is_ok());
    }
}
