use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::executor::LoadTestRunner;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<LoadTestRunner>,
    pub stats: Arc<RwLock<ServiceStats>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(runner: LoadTestRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            stats: Arc::new(RwLock::new(ServiceStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Counts a run as active until the returned guard is finished or dropped.
    pub async fn begin_run(&self) -> RunGuard {
        let mut stats = self.stats.write().await;
        stats.total_runs += 1;
        stats.active_runs += 1;

        RunGuard {
            stats: self.stats.clone(),
            success: false,
        }
    }

    pub async fn get_stats(&self) -> ServiceStats {
        self.stats.read().await.clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub total_runs: u64,
    pub active_runs: usize,
    pub successful_runs: u64,
    pub failed_runs: u64,
}

impl ServiceStats {
    fn record_finished(&mut self, success: bool) {
        if self.active_runs > 0 {
            self.active_runs -= 1;
        }
        if success {
            self.successful_runs += 1;
        } else {
            self.failed_runs += 1;
        }
    }
}

/// Active-run slot. A guard dropped without `finish` (the request future was
/// abandoned) is recorded as a failed run.
pub struct RunGuard {
    stats: Arc<RwLock<ServiceStats>>,
    success: bool,
}

impl RunGuard {
    pub fn finish(mut self, success: bool) {
        self.success = success;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let success = self.success;

        if let Ok(mut stats) = self.stats.try_write() {
            stats.record_finished(success);
            return;
        }

        // Lock is busy; settle on the runtime instead of blocking in drop.
        let stats = self.stats.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                stats.write().await.record_finished(success);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters() -> Arc<RwLock<ServiceStats>> {
        Arc::new(RwLock::new(ServiceStats {
            total_runs: 1,
            active_runs: 1,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_finished_guard_records_outcome() {
        let stats = counters();
        let guard = RunGuard {
            stats: stats.clone(),
            success: false,
        };

        guard.finish(true);

        let snapshot = stats.read().await.clone();
        assert_eq!(snapshot.active_runs, 0);
        assert_eq!(snapshot.successful_runs, 1);
        assert_eq!(snapshot.failed_runs, 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_releases_active_slot() {
        let stats = counters();
        let guard = RunGuard {
            stats: stats.clone(),
            success: false,
        };

        // Stand-in for actix dropping the handler future mid-run.
        let abandoned = async move {
            let _guard = guard;
            futures::future::pending::<()>().await;
        };
        let _ = tokio::time::timeout(std::time::Duration::from_millis(20), abandoned).await;

        let snapshot = stats.read().await.clone();
        assert_eq!(snapshot.active_runs, 0);
        assert_eq!(snapshot.failed_runs, 1);
        assert_eq!(snapshot.total_runs, 1);
    }

    #[tokio::test]
    async fn test_guard_settles_when_lock_is_busy() {
        let stats = counters();
        let guard = RunGuard {
            stats: stats.clone(),
            success: true,
        };

        {
            let _reader = stats.read().await;
            drop(guard);
        }

        // The deferred update runs on the next scheduler turn.
        for _ in 0..10 {
            tokio::task::yield_now().await;
            if stats.read().await.active_runs == 0 {
                break;
            }
        }

        let snapshot = stats.read().await.clone();
        assert_eq!(snapshot.active_runs, 0);
        assert_eq!(snapshot.successful_runs, 1);
    }
}
