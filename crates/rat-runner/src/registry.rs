//! In-memory run registry: admission control, TTL eviction, and
//! crash-marker reconciliation at startup.
//!
//! One `Registry` per process, shared behind an `Arc` with the RPC layer.
//! The registry owns every `Arc<RunState>` for the process lifetime — a
//! run's memory isn't reclaimed until it's both terminal and past
//! `run_ttl_seconds`, giving callers time to poll `GetRunStatus`/`StreamLogs`
//! after completion before the state disappears.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use rat_core::{CrashMarker, RunState, RunStatus, RunnerConfig};

use crate::callback::notify_run_complete;
use crate::error::RunnerError;
use crate::marker;

const EVICTION_INTERVAL_SECS: u64 = 60;

pub struct Registry {
    config: RunnerConfig,
    runs: Mutex<HashMap<String, Arc<RunState>>>,
    cleanup_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Registry {
    pub fn new(config: RunnerConfig) -> Arc<Self> {
        let registry = Arc::new(Self {
            config,
            runs: Mutex::new(HashMap::new()),
            cleanup_handle: Mutex::new(None),
        });
        registry.clone().spawn_cleanup_task();
        registry
    }

    /// Create terminal `Failed` runs for any crash marker left over from a
    /// previous process, and insert them into the registry so they show up
    /// in status queries. Call once at startup, before serving traffic.
    pub async fn reconcile_crashed_runs(&self) {
        let crashed = marker::collect_crashed_runs(&self.config.state_dir);
        if crashed.is_empty() {
            return;
        }
        tracing::warn!(count = crashed.len(), "reconciling runs orphaned by a previous crash");

        let mut runs = self.runs.lock().await;
        for CrashMarker { run_id, namespace, layer, pipeline_name, trigger } in crashed {
            let run = Arc::new(RunState::new(run_id.clone(), namespace, layer, pipeline_name, trigger));
            run.set_status(RunStatus::Failed);
            run.set_error("Runner process restarted — run was in-flight when the previous process crashed");
            runs.insert(run_id, run);
        }
    }

    /// Count of runs that haven't reached a terminal status.
    async fn active_count(&self, runs: &HashMap<String, Arc<RunState>>) -> usize {
        let _ = self;
        runs.values().filter(|r| !r.is_terminal()).count()
    }

    /// Register a newly created run, rejecting it if the process is already
    /// at `max_concurrent_runs`. Admission check and insertion happen under
    /// the same lock so two concurrent submissions can't both slip through.
    pub async fn admit(&self, run: Arc<RunState>) -> Result<(), RunnerError> {
        let mut runs = self.runs.lock().await;
        let active = self.active_count(&runs).await;
        if active >= self.config.max_concurrent_runs {
            return Err(RunnerError::AtCapacity { active, max: self.config.max_concurrent_runs });
        }
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    pub async fn get(&self, run_id: &str) -> Option<Arc<RunState>> {
        self.runs.lock().await.get(run_id).cloned()
    }

    pub async fn active_run_count(&self) -> usize {
        let runs = self.runs.lock().await;
        self.active_count(&runs).await
    }

    pub fn state_dir(&self) -> &str {
        &self.config.state_dir
    }

    pub fn callback_base_url(&self) -> Option<&str> {
        self.config.callback_base_url.as_deref()
    }

    /// Notify the callback endpoint (if configured) and remove the run's
    /// crash marker. Call once a run reaches a terminal status, regardless
    /// of whether it's about to be retried by the caller.
    pub async fn on_terminal(&self, run: &Arc<RunState>) {
        marker::remove_marker(&self.config.state_dir, &run.run_id);
        notify_run_complete(run, self.callback_base_url()).await;
    }

    fn spawn_cleanup_task(self: Arc<Self>) {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(EVICTION_INTERVAL_SECS));
            loop {
                interval.tick().await;
                self.evict_expired_runs().await;
            }
        });
        if let Ok(mut guard) = self.cleanup_handle.try_lock() {
            *guard = Some(handle);
        }
    }

    async fn evict_expired_runs(&self) {
        let ttl = std::time::Duration::from_secs(self.config.run_ttl_seconds);
        let now = chrono::Utc::now();
        let mut runs = self.runs.lock().await;
        let before = runs.len();
        runs.retain(|_, run| {
            if !run.is_terminal() {
                return true;
            }
            let age = now.signed_duration_since(run.created_at);
            age.to_std().map(|age| age < ttl).unwrap_or(true)
        });
        let evicted = before - runs.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = runs.len(), "evicted expired runs");
        }
    }

    /// Cancel every active run and stop the background eviction task. Call
    /// during graceful shutdown.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.cleanup_handle.lock().await.take() {
            handle.abort();
        }
        let runs = self.runs.lock().await;
        for run in runs.values() {
            if !run.is_terminal() {
                run.cancel.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RunnerConfig {
        RunnerConfig {
            state_dir: std::env::temp_dir().join(format!("rat-registry-test-{}", std::process::id())).to_string_lossy().to_string(),
            max_concurrent_runs: 2,
            worker_pool_size: 2,
            run_ttl_seconds: 3600,
            callback_base_url: None,
            grpc_port: 0,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    #[tokio::test]
    async fn admits_until_at_capacity() {
        let registry = Registry::new(test_config());
        let r1 = Arc::new(RunState::new("r1", "ns", "silver", "a", "manual"));
        let r2 = Arc::new(RunState::new("r2", "ns", "silver", "b", "manual"));
        let r3 = Arc::new(RunState::new("r3", "ns", "silver", "c", "manual"));

        registry.admit(r1).await.unwrap();
        registry.admit(r2).await.unwrap();
        let err = registry.admit(r3).await.unwrap_err();
        assert!(matches!(err, RunnerError::AtCapacity { active: 2, max: 2 }));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn terminal_runs_dont_count_toward_capacity() {
        let registry = Registry::new(test_config());
        let r1 = Arc::new(RunState::new("r1", "ns", "silver", "a", "manual"));
        r1.set_status(RunStatus::Success);
        let r2 = Arc::new(RunState::new("r2", "ns", "silver", "b", "manual"));
        let r3 = Arc::new(RunState::new("r3", "ns", "silver", "c", "manual"));

        registry.admit(r1).await.unwrap();
        registry.admit(r2).await.unwrap();
        registry.admit(r3).await.unwrap();
        assert_eq!(registry.active_run_count().await, 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn get_returns_registered_run() {
        let registry = Registry::new(test_config());
        let run = Arc::new(RunState::new("r1", "ns", "silver", "a", "manual"));
        registry.admit(run.clone()).await.unwrap();
        assert!(registry.get("r1").await.is_some());
        assert!(registry.get("missing").await.is_none());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_active_runs() {
        let registry = Registry::new(test_config());
        let run = Arc::new(RunState::new("r1", "ns", "silver", "a", "manual"));
        registry.admit(run.clone()).await.unwrap();
        registry.shutdown().await;
        assert!(run.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn reconcile_crashed_runs_creates_failed_runs() {
        let mut config = test_config();
        let dir = config.state_dir.clone();
        let marker = CrashMarker {
            run_id: "orphan-1".to_string(),
            namespace: "ns".to_string(),
            layer: "silver".to_string(),
            pipeline_name: "orders".to_string(),
            trigger: "scheduled".to_string(),
        };
        marker::write_marker(&dir, &marker).unwrap();
        config.state_dir = dir.clone();

        let registry = Registry::new(config);
        registry.reconcile_crashed_runs().await;

        let run = registry.get("orphan-1").await.expect("reconciled run present");
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error().contains("previous process crashed"));

        registry.shutdown().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
