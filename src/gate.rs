//! Per-repository execution locks.
//!
//! At most one agent runs against a repository at a time; different
//! repositories never wait on each other. Locks are created lazily on first
//! use, exactly once per repository id, and are never removed, so the
//! registry grows with the number of distinct repositories ever touched.
//!
//! Acquisition has no timeout. A holder that never finishes starves later
//! callers for that repository; this shows up as a periodic warning while
//! they wait, not as an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Default interval between "still waiting" warnings.
pub const DEFAULT_STALL_WARNING: Duration = Duration::from_secs(60);

/// The lock for one repository.
#[derive(Debug)]
pub struct RepoLock {
    repo_id: String,
    // tokio's mutex hands the lock to waiters in FIFO order.
    mutex: Arc<Mutex<()>>,
    waiters: AtomicUsize,
}

impl RepoLock {
    fn new(repo_id: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            mutex: Arc::new(Mutex::new(())),
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Number of callers currently blocked in `acquire`.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.mutex.try_lock().is_err()
    }
}

/// Exclusive execution rights for one repository. Released on drop.
#[derive(Debug)]
pub struct RepoGuard {
    lock: Arc<RepoLock>,
    acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
}

impl RepoGuard {
    pub fn repo_id(&self) -> &str {
        self.lock.repo_id()
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for RepoGuard {
    fn drop(&mut self) {
        tracing::debug!(
            repo = %self.lock.repo_id,
            held_ms = self.held_for().as_millis() as u64,
            "repository lock released"
        );
    }
}

/// Decrements the waiter count even if the acquiring future is dropped.
struct WaiterTicket<'a>(&'a AtomicUsize);

impl Drop for WaiterTicket<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registry of repository locks. Pass it around behind an `Arc`; each
/// instance is independent.
#[derive(Debug)]
pub struct ExecutionGate {
    locks: DashMap<String, Arc<RepoLock>>,
    stall_warning: Duration,
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::new(DEFAULT_STALL_WARNING)
    }
}

impl ExecutionGate {
    pub fn new(stall_warning: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            stall_warning,
        }
    }

    /// The lock for `repo_id`, created on first use.
    pub fn lock(&self, repo_id: &str) -> Arc<RepoLock> {
        if let Some(existing) = self.locks.get(repo_id) {
            return Arc::clone(existing.value());
        }
        // The entry API holds the shard write lock, so racing first callers
        // observe the same instance.
        let entry = self.locks.entry(repo_id.to_string()).or_insert_with(|| {
            tracing::debug!(repo = %repo_id, "creating repository lock");
            Arc::new(RepoLock::new(repo_id))
        });
        Arc::clone(entry.value())
    }

    /// Wait until no other execution holds `repo_id`, then take it.
    pub async fn acquire(&self, repo_id: &str) -> RepoGuard {
        let lock = self.lock(repo_id);

        if let Ok(guard) = Arc::clone(&lock.mutex).try_lock_owned() {
            tracing::debug!(repo = %repo_id, "repository lock acquired");
            return RepoGuard {
                lock,
                acquired_at: Instant::now(),
                _guard: guard,
            };
        }

        let waiting = lock.waiters.fetch_add(1, Ordering::SeqCst) + 1;
        let _ticket = WaiterTicket(&lock.waiters);
        tracing::info!(repo = %repo_id, waiting, "waiting for repository lock");

        let started = Instant::now();
        let acquire = Arc::clone(&lock.mutex).lock_owned();
        tokio::pin!(acquire);
        let guard = loop {
            match tokio::time::timeout(self.stall_warning, &mut acquire).await {
                Ok(guard) => break guard,
                Err(_) => tracing::warn!(
                    repo = %repo_id,
                    waited_secs = started.elapsed().as_secs(),
                    "still waiting for repository lock; the current holder may be stuck"
                ),
            }
        };

        tracing::debug!(
            repo = %repo_id,
            waited_ms = started.elapsed().as_millis() as u64,
            "repository lock acquired"
        );
        RepoGuard {
            lock: Arc::clone(&lock),
            acquired_at: Instant::now(),
            _guard: guard,
        }
    }

    pub fn release(&self, guard: RepoGuard) {
        drop(guard);
    }

    /// Number of repositories that have ever been locked.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub fn waiters(&self, repo_id: &str) -> usize {
        self.locks.get(repo_id).map(|l| l.waiters()).unwrap_or(0)
    }

    pub fn is_busy(&self, repo_id: &str) -> bool {
        self.locks.get(repo_id).map(|l| l.is_held()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    async fn wait_for_waiters(gate: &ExecutionGate, repo: &str, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while gate.waiters(repo) < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("waiters never queued");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_repo_is_mutually_exclusive() {
        let gate = Arc::new(ExecutionGate::default());
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            let active = Arc::clone(&active);
            let overlap = Arc::clone(&overlap);
            handles.push(tokio::spawn(async move {
                let guard = gate.acquire("widgets").await;
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlap.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                gate.release(guard);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!overlap.load(Ordering::SeqCst), "two holders overlapped");
        assert_eq!(gate.lock_count(), 1);
        assert!(!gate.is_busy("widgets"));
    }

    #[tokio::test]
    async fn test_distinct_repos_do_not_block() {
        let gate = ExecutionGate::default();
        let _held = gate.acquire("alpha").await;

        let other = tokio::time::timeout(Duration::from_secs(1), gate.acquire("beta")).await;
        assert!(other.is_ok(), "acquiring a different repo blocked");
        assert!(gate.is_busy("alpha"));
    }

    #[tokio::test]
    async fn test_guard_measures_hold_time_from_acquisition() {
        let gate = ExecutionGate::default();
        let guard = gate.acquire("widgets").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(guard.held_for() >= Duration::from_millis(20));
        gate.release(guard);
    }

    #[tokio::test]
    async fn test_same_repo_waits_for_release() {
        let gate = Arc::new(ExecutionGate::default());
        let first = gate.acquire("widgets").await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire("widgets").await.repo_id().to_string() })
        };
        wait_for_waiters(&gate, "widgets", 1).await;
        assert!(!waiter.is_finished());

        gate.release(first);
        let repo = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
        assert_eq!(repo, "widgets");
        assert_eq!(gate.waiters("widgets"), 0);
    }

    #[tokio::test]
    async fn test_waiters_served_in_acquisition_order() {
        let gate = Arc::new(ExecutionGate::default());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = gate.acquire("widgets").await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let gate_c = Arc::clone(&gate);
            let order_c = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _guard = gate_c.acquire("widgets").await;
                order_c.lock().unwrap().push(i);
            }));
            wait_for_waiters(&gate, "widgets", i + 1).await;
        }

        gate.release(first);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_first_use_creates_one_lock() {
        let gate = Arc::new(ExecutionGate::default());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                gate.lock("brand-new")
            }));
        }

        let mut locks = Vec::new();
        for handle in handles {
            locks.push(handle.await.unwrap());
        }
        assert!(locks.iter().all(|l| Arc::ptr_eq(l, &locks[0])));
        assert_eq!(gate.lock_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_not_counted() {
        let gate = Arc::new(ExecutionGate::default());
        let _held = gate.acquire("widgets").await;

        let result = tokio::time::timeout(Duration::from_millis(50), gate.acquire("widgets")).await;
        assert!(result.is_err());
        assert_eq!(gate.waiters("widgets"), 0);
    }

    #[tokio::test]
    async fn test_long_wait_warns_but_still_acquires() {
        let gate = Arc::new(ExecutionGate::new(Duration::from_millis(20)));
        let first = gate.acquire("widgets").await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _guard = gate.acquire("widgets").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(first);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stalled waiter never acquired")
            .unwrap();
    }

    #[test]
    fn test_unknown_repo_diagnostics() {
        let gate = ExecutionGate::default();
        assert_eq!(gate.waiters("nope"), 0);
        assert!(!gate.is_busy("nope"));
        assert_eq!(gate.lock_count(), 0);
    }
}
