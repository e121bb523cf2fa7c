// Collection engine: the job registry, the per-job worker loop, and the
// sample buffer that sits between polling and flushing.

pub mod buffer;
pub mod job;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::device::DeviceReader;
use crate::engine::job::{JobContext, JobOutcome};
use crate::errors::TrendError;
use crate::models::{validate_params, JobSnapshot, SampleEvent, TrendParams, TrendState};
use crate::storage::trendlog::log_relative_path;
use crate::storage::TrendLogStore;

// ---------------------------------------------------------------------------
// SampleTap — bounded live view over recent samples, shared by all jobs
// ---------------------------------------------------------------------------

/// Ring of the most recent samples across every running job. Workers push
/// copies; readers get snapshots. Dropping the oldest entry on overflow keeps
/// the tap from ever applying backpressure to collection.
pub struct SampleTap {
    capacity: usize,
    events: std::sync::Mutex<VecDeque<SampleEvent>>,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: std::sync::Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, event: SampleEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The most recent events, oldest first, at most `limit`.
    pub fn recent(&self, limit: usize) -> Vec<SampleEvent> {
        let events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

struct ActiveJob {
    params: TrendParams,
    started_at: DateTime<Utc>,
    rel_path: std::path::PathBuf,
    stop_tx: watch::Sender<bool>,
    join_handle: Option<JoinHandle<()>>,
}

impl ActiveJob {
    fn snapshot(&self, id: Uuid) -> JobSnapshot {
        JobSnapshot {
            id,
            device_identifier: self.params.device_identifier.clone(),
            description: self.params.description.clone(),
            state: TrendState::Running,
            cycle_count: self.params.cycle_count,
            started_at: self.started_at,
            finished_at: None,
            failure: None,
            log_path: self.rel_path.to_string_lossy().to_string(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    active: HashMap<Uuid, ActiveJob>,
    finished: HashMap<Uuid, JobSnapshot>,
}

/// Owner of every collection job. Start, stop, and listing all go through
/// here; dedup and registration happen under one lock so two concurrent
/// starts for the same (device, description) pair can never both win.
pub struct JobRegistry {
    state: Arc<Mutex<RegistryState>>,
    tap: Arc<SampleTap>,
    reader: Arc<dyn DeviceReader>,
    log_store: Arc<dyn TrendLogStore>,
    read_retry_limit: u32,
}

/// Move a job from the active table to the finished table, recording its
/// terminal state. Runs in the worker task after the collection loop exits.
async fn finish(state: &Mutex<RegistryState>, job_id: Uuid, outcome: JobOutcome) {
    let mut state = state.lock().await;
    let Some(active) = state.active.remove(&job_id) else {
        tracing::error!("Trend {} finished but was not registered", job_id);
        return;
    };

    let mut snapshot = active.snapshot(job_id);
    snapshot.state = outcome.state;
    snapshot.failure = outcome.failure;
    snapshot.finished_at = Some(Utc::now());
    tracing::info!("Trend {} finished: {:?}", job_id, snapshot.state);
    state.finished.insert(job_id, snapshot);
}

impl JobRegistry {
    pub fn new(
        reader: Arc<dyn DeviceReader>,
        log_store: Arc<dyn TrendLogStore>,
        read_retry_limit: u32,
        recent_samples_capacity: usize,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            tap: Arc::new(SampleTap::new(recent_samples_capacity)),
            reader,
            log_store,
            read_retry_limit,
        }
    }

    /// Validate, dedup, and launch a collection job. Returns the running
    /// job's snapshot.
    ///
    /// The dedup check covers active jobs only: once a run reaches a
    /// terminal state, the same (device, description) pair may start again.
    pub async fn start_job(&self, params: TrendParams) -> Result<JobSnapshot, TrendError> {
        validate_params(&params)?;

        let mut state = self.state.lock().await;

        let key = params.dedup_key();
        if state.active.values().any(|j| j.params.dedup_key() == key) {
            return Err(TrendError::Duplicate(format!(
                "{} / {} is already being collected",
                key.0, key.1
            )));
        }

        let job_id = Uuid::now_v7();
        let started_at = Utc::now();
        let rel_path = log_relative_path(started_at, &params.device_identifier, &params.description);
        let (stop_tx, stop_rx) = watch::channel(false);

        let ctx = JobContext {
            job_id,
            params: params.clone(),
            rel_path: rel_path.clone(),
            reader: Arc::clone(&self.reader),
            log_store: Arc::clone(&self.log_store),
            tap: Arc::clone(&self.tap),
            read_retry_limit: self.read_retry_limit,
        };

        // The worker reports its own terminal outcome; finish() blocks on
        // this lock, so registration always lands before deregistration.
        let worker_state = Arc::clone(&self.state);
        let join_handle = tokio::spawn(async move {
            let outcome = job::run_collection(ctx, stop_rx).await;
            finish(&worker_state, job_id, outcome).await;
        });

        let active = ActiveJob {
            params,
            started_at,
            rel_path,
            stop_tx,
            join_handle: Some(join_handle),
        };
        let snapshot = active.snapshot(job_id);
        tracing::info!(
            "Trend {} started: {} / {} ({} cycles)",
            job_id,
            snapshot.device_identifier,
            snapshot.description,
            snapshot.cycle_count
        );
        state.active.insert(job_id, active);

        Ok(snapshot)
    }

    /// Request a stop. Returns as soon as the signal is delivered; the job
    /// winds down on its own and reports a terminal state later.
    pub async fn stop_job(&self, job_id: Uuid) -> Result<(), TrendError> {
        let state = self.state.lock().await;
        match state.active.get(&job_id) {
            Some(active) => {
                let _ = active.stop_tx.send(true);
                tracing::info!("Trend {}: stop requested", job_id);
                Ok(())
            }
            None => Err(TrendError::NotFound(format!(
                "No running trend with id '{}'",
                job_id
            ))),
        }
    }

    /// Snapshot every known job, running and terminal, newest first.
    pub async fn list_jobs(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().await;
        let mut jobs: Vec<JobSnapshot> = state
            .active
            .iter()
            .map(|(id, active)| active.snapshot(*id))
            .chain(state.finished.values().cloned())
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    pub async fn get_job(&self, job_id: Uuid) -> Option<JobSnapshot> {
        let state = self.state.lock().await;
        state
            .active
            .get(&job_id)
            .map(|active| active.snapshot(job_id))
            .or_else(|| state.finished.get(&job_id).cloned())
    }

    /// Remove a terminal job's record. Running jobs must be stopped first.
    pub async fn clear_finished(&self, job_id: Uuid) -> Result<(), TrendError> {
        let mut state = self.state.lock().await;
        if state.active.contains_key(&job_id) {
            return Err(TrendError::Conflict(format!(
                "Trend '{}' is still running; stop it first",
                job_id
            )));
        }
        if state.finished.remove(&job_id).is_none() {
            return Err(TrendError::NotFound(format!(
                "No trend with id '{}'",
                job_id
            )));
        }
        Ok(())
    }

    /// The most recent samples across all jobs, oldest first.
    pub fn recent_samples(&self, limit: usize) -> Vec<SampleEvent> {
        self.tap.recent(limit)
    }

    /// Signal every running job to stop and wait up to `grace` for each to
    /// reach a terminal state.
    pub async fn shutdown(&self, grace: Duration) {
        // Take the join handles but leave the jobs registered, so each
        // worker's own finish() still records its terminal snapshot.
        let handles: Vec<(Uuid, JoinHandle<()>)> = {
            let mut state = self.state.lock().await;
            state
                .active
                .iter_mut()
                .filter_map(|(id, active)| {
                    let _ = active.stop_tx.send(true);
                    active.join_handle.take().map(|handle| (*id, handle))
                })
                .collect()
        };

        for (job_id, handle) in handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => tracing::info!("Trend {} shut down", job_id),
                Ok(Err(e)) => tracing::warn!("Trend {} worker panicked: {}", job_id, e),
                Err(_) => tracing::warn!(
                    "Trend {} did not stop within {:?} grace period",
                    job_id,
                    grace
                ),
            }
        }
    }
}
