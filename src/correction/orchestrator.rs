//! Polling orchestrator for outstanding correction jobs.
//!
//! One fixed-interval scheduler iterates every outstanding job per tick.
//! Passes never overlap (the next tick is delayed until the previous
//! pass returns). A job leaves the outstanding set the instant its first
//! terminal status arrives, so later passes never recheck it; the
//! registered refresh listeners fire instead of patching state locally.
//! Transport errors are logged and swallowed for that pass only.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{CorrectionError, CorrectionJobApi, CorrectionTuning, JobId, JobStatus};

/// One tracked correction job. Status transitions only via poll responses.
#[derive(Debug, Clone)]
pub struct CorrectionJob {
    pub id: JobId,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
}

pub type RefreshListener = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct JobTable {
    outstanding: HashSet<JobId>,
    all: HashMap<JobId, CorrectionJob>,
}

pub struct JobOrchestrator {
    api: Arc<dyn CorrectionJobApi>,
    poll_interval: Duration,
    jobs: Arc<Mutex<JobTable>>,
    refresh: Arc<Mutex<Vec<RefreshListener>>>,
    cancel: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl JobOrchestrator {
    pub fn new(api: Arc<dyn CorrectionJobApi>, poll_interval: Duration) -> Self {
        Self {
            api,
            poll_interval,
            jobs: Arc::new(Mutex::new(JobTable::default())),
            refresh: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
            ticker: Mutex::new(None),
        }
    }

    /// Register a listener fired after each terminal result. Listeners
    /// re-query the source of truth rather than receiving a patch.
    pub fn on_refresh(&self, listener: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.refresh.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Submit a new correction job and start tracking it.
    pub async fn submit(
        &self,
        video_url: &str,
        tuning: &CorrectionTuning,
    ) -> Result<JobId, CorrectionError> {
        let id = self.api.submit(video_url, tuning).await?;
        self.track(id.clone());
        Ok(id)
    }

    /// Adopt an already-submitted job id into the outstanding set.
    pub fn track(&self, id: JobId) {
        {
            let mut table = match self.jobs.lock() {
                Ok(table) => table,
                Err(_) => return,
            };
            table.outstanding.insert(id.clone());
            table.all.entry(id.clone()).or_insert(CorrectionJob {
                id: id.clone(),
                status: JobStatus::Processing,
                submitted_at: Utc::now(),
            });
        }
        info!("Tracking correction job {id}");
        self.ensure_polling();
    }

    /// Snapshot of every known job, oldest first.
    pub fn jobs(&self) -> Vec<CorrectionJob> {
        let mut jobs: Vec<CorrectionJob> = self
            .jobs
            .lock()
            .map(|table| table.all.values().cloned().collect())
            .unwrap_or_default();
        jobs.sort_by_key(|job| job.submitted_at);
        jobs
    }

    pub fn outstanding(&self) -> usize {
        self.jobs
            .lock()
            .map(|table| table.outstanding.len())
            .unwrap_or(0)
    }

    /// Cancel all future scheduling. Safe to call before, during or
    /// after a pass, and more than once.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Ok(mut slot) = self.ticker.lock() {
            slot.take();
        }
        debug!("Job orchestrator shut down");
    }

    fn ensure_polling(&self) {
        let mut slot = match self.ticker.lock() {
            Ok(slot) => slot,
            Err(_) => return,
        };
        if slot.is_some() || self.cancel.is_cancelled() {
            return;
        }
        *slot = Some(tokio::spawn(run_ticker(
            Arc::clone(&self.api),
            Arc::clone(&self.jobs),
            Arc::clone(&self.refresh),
            self.cancel.clone(),
            self.poll_interval,
        )));
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_ticker(
    api: Arc<dyn CorrectionJobApi>,
    jobs: Arc<Mutex<JobTable>>,
    refresh: Arc<Mutex<Vec<RefreshListener>>>,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    // The next pass is scheduled only after the previous one returns.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Consume the immediate first tick; the first pass runs one period in.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                poll_pass(&api, &jobs, &refresh).await;
            }
        }
    }

    debug!("Polling ticker exited");
}

async fn poll_pass(
    api: &Arc<dyn CorrectionJobApi>,
    jobs: &Arc<Mutex<JobTable>>,
    refresh: &Arc<Mutex<Vec<RefreshListener>>>,
) {
    let ids: Vec<JobId> = jobs
        .lock()
        .map(|table| table.outstanding.iter().cloned().collect())
        .unwrap_or_default();

    for id in ids {
        match api.poll(&id).await {
            Ok(status) if status.is_terminal() => {
                info!("Correction job {id} reached terminal status: {}", status.as_str());
                if let Ok(mut table) = jobs.lock() {
                    table.outstanding.remove(&id);
                    if let Some(job) = table.all.get_mut(&id) {
                        job.status = status;
                    }
                }
                notify(refresh);
            }
            Ok(_) => {
                // Still processing; the fixed interval reschedules us.
            }
            Err(e) => {
                // Transient for this pass only. Never a Failed transition.
                warn!("Correction poll for {id} failed, retrying next pass: {e}");
            }
        }
    }
}

fn notify(refresh: &Arc<Mutex<Vec<RefreshListener>>>) {
    if let Ok(listeners) = refresh.lock() {
        for listener in listeners.iter() {
            listener();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted API: returns the scripted statuses per job in order,
    /// repeating the last entry forever, and counts every poll.
    struct ScriptedApi {
        scripts: Mutex<HashMap<JobId, Vec<Result<JobStatus, CorrectionError>>>>,
        counts: Mutex<HashMap<JobId, usize>>,
        submissions: AtomicUsize,
    }

    impl ScriptedApi {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                counts: Mutex::new(HashMap::new()),
                submissions: AtomicUsize::new(0),
            }
        }

        fn script(&self, id: &str, statuses: Vec<Result<JobStatus, CorrectionError>>) {
            self.scripts
                .lock()
                .unwrap()
                .insert(JobId(id.to_string()), statuses);
        }

        fn polls(&self, id: &str) -> usize {
            self.counts
                .lock()
                .unwrap()
                .get(&JobId(id.to_string()))
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl CorrectionJobApi for ScriptedApi {
        async fn submit(
            &self,
            _video_url: &str,
            _tuning: &CorrectionTuning,
        ) -> Result<JobId, CorrectionError> {
            let n = self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(JobId(format!("job-{n}")))
        }

        async fn poll(&self, job: &JobId) -> Result<JobStatus, CorrectionError> {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(job.clone()).or_insert(0);
            let index = *count;
            *count += 1;
            drop(counts);

            let scripts = self.scripts.lock().unwrap();
            let script = scripts.get(job).expect("unscripted job polled");
            let entry = script.get(index).or_else(|| script.last()).unwrap();
            match entry {
                Ok(status) => Ok(status.clone()),
                Err(_) => Err(CorrectionError::Transport("scripted outage".to_string())),
            }
        }
    }

    fn finished() -> Result<JobStatus, CorrectionError> {
        Ok(JobStatus::Finished {
            output_locator: Some("https://cdn.example.com/out.mp4".to_string()),
        })
    }

    fn processing() -> Result<JobStatus, CorrectionError> {
        Ok(JobStatus::Processing)
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_job_is_never_polled_again() {
        let api = Arc::new(ScriptedApi::new());
        api.script("job-0", vec![processing(), finished()]);

        let orchestrator = JobOrchestrator::new(api.clone(), Duration::from_secs(10));
        orchestrator
            .submit("https://example.com/v.mp4", &CorrectionTuning::default())
            .await
            .unwrap();

        // Two passes reach the terminal status.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(api.polls("job-0"), 2);
        assert_eq!(orchestrator.outstanding(), 0);

        // Many more intervals: the job id is never targeted again.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.polls("job-0"), 2);

        let jobs = orchestrator.jobs();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].status.is_terminal());
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_does_not_fail_job() {
        let api = Arc::new(ScriptedApi::new());
        api.script(
            "job-0",
            vec![
                Err(CorrectionError::Transport("outage".to_string())),
                processing(),
                finished(),
            ],
        );

        let orchestrator = JobOrchestrator::new(api.clone(), Duration::from_secs(10));
        orchestrator
            .submit("https://example.com/v.mp4", &CorrectionTuning::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        // One failed pass: still outstanding, still Processing.
        let jobs = orchestrator.jobs();
        assert_eq!(jobs[0].status, JobStatus::Processing);
        assert_eq!(orchestrator.outstanding(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(orchestrator.outstanding(), 0);
        assert!(orchestrator.jobs()[0].status.is_terminal());
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fires_on_first_terminal_result() {
        let api = Arc::new(ScriptedApi::new());
        api.script("job-0", vec![finished()]);

        let orchestrator = JobOrchestrator::new(api.clone(), Duration::from_secs(10));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&refreshes);
        orchestrator.on_refresh(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        orchestrator
            .submit("https://example.com/v.mp4", &CorrectionTuning::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_future_passes() {
        let api = Arc::new(ScriptedApi::new());
        api.script("job-0", vec![processing()]);

        let orchestrator = JobOrchestrator::new(api.clone(), Duration::from_secs(10));
        orchestrator
            .submit("https://example.com/v.mp4", &CorrectionTuning::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        let polled = api.polls("job-0");
        assert!(polled >= 1);

        orchestrator.shutdown();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.polls("job-0"), polled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_any_pass_is_safe() {
        let api = Arc::new(ScriptedApi::new());
        let orchestrator = JobOrchestrator::new(api, Duration::from_secs(10));
        orchestrator.shutdown();
        orchestrator.shutdown();
        assert_eq!(orchestrator.outstanding(), 0);
    }
}
