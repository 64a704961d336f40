// src/refresh_scheduler.rs
use crate::dept_translate::DeptTranslate;
use crate::erp_client::{fetch_inputs, LaborSource};
use crate::labor_model::{ClockTime, Snapshot};
use crate::labor_pipeline::{compute_labor, LaborOutcome, PipelineConfig};
use crate::settings::resolve_labor_date;
use crate::snapshot_store::SnapshotStore;
use crate::stats::{StatsManager, PROCESS_LIVE_LABOR};
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub const JOB_ID: &str = "labor_refresh";
pub const JOB_NAME: &str = "process_live_labor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassOutcome {
    Processed,
    NoData,
    Skipped,
    Failed,
}

impl PassOutcome {
    pub fn message(self) -> &'static str {
        match self {
            PassOutcome::Processed => "Data Processed.",
            PassOutcome::NoData => "No Data Found.",
            PassOutcome::Skipped => "Refresh already running.",
            PassOutcome::Failed => "Refresh failed.",
        }
    }
}

/// Local wall clock for passes. Tests pin it to a fixed instant.
#[derive(Debug, Clone)]
pub struct PassClock {
    tz: Tz,
    fixed: Option<NaiveDateTime>,
}

impl PassClock {
    pub fn system(tz: Tz) -> Self {
        Self { tz, fixed: None }
    }

    pub fn fixed(at: NaiveDateTime, tz: Tz) -> Self {
        Self { tz, fixed: Some(at) }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.fixed
            .unwrap_or_else(|| Utc::now().with_timezone(&self.tz).naive_local())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    pub id: &'static str,
    pub name: &'static str,
    pub next_run_time: Option<NaiveDateTime>,
    pub last_run_start: Option<NaiveDateTime>,
    pub last_run_finish: Option<NaiveDateTime>,
    pub last_outcome: Option<PassOutcome>,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub status: &'static str,
    pub jobs: Vec<JobStatus>,
}

pub struct RefreshDriver {
    source: Arc<dyn LaborSource>,
    store: Arc<SnapshotStore>,
    stats: Arc<StatsManager>,
    depts: DeptTranslate,
    clock: PassClock,
    labor_date: Option<String>,
    slice_minutes: u32,
    interval: Duration,
    pass_lock: Mutex<()>,
    job: RwLock<JobStatus>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl RefreshDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn LaborSource>,
        store: Arc<SnapshotStore>,
        stats: Arc<StatsManager>,
        depts: DeptTranslate,
        clock: PassClock,
        labor_date: Option<String>,
        slice_minutes: u32,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            stats,
            depts,
            clock,
            labor_date,
            slice_minutes,
            interval,
            pass_lock: Mutex::new(()),
            job: RwLock::new(JobStatus {
                id: JOB_ID,
                name: JOB_NAME,
                ..JobStatus::default()
            }),
            task: StdMutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn depts(&self) -> &DeptTranslate {
        &self.depts
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Runs one refresh pass unless another one holds the pass lock.
    pub async fn run_pass(&self) -> PassOutcome {
        let _guard = match self.pass_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Labor refresh already running, skipping this trigger");
                return PassOutcome::Skipped;
            }
        };

        let started = Instant::now();
        let started_at = self.clock.now();
        {
            let mut job = self.job.write().await;
            job.running = true;
            job.last_run_start = Some(started_at);
        }

        let labor_date = resolve_labor_date(self.labor_date.as_deref(), started_at.date());
        info!(
            "Starting labor refresh for {} from {}",
            labor_date,
            self.source.describe()
        );

        let outcome = match fetch_inputs(self.source.as_ref(), labor_date).await {
            Err(e) => {
                error!("Labor refresh failed, keeping previous snapshot: {}", e);
                PassOutcome::Failed
            }
            Ok(inputs) => {
                let config = PipelineConfig {
                    slice_minutes: self.slice_minutes,
                    now: ClockTime::from_naive_time(started_at.time()),
                };
                let result = compute_labor(&inputs, &self.depts, &config);
                self.store
                    .publish_not_clocked_in(result.not_clocked_in().to_vec())
                    .await;

                let (snapshot, outcome) = match result {
                    LaborOutcome::Computed(report) => (
                        Snapshot {
                            active_labor: Some(report.active_labor),
                            not_clocked_in: Some(report.not_clocked_in),
                            timestamp: self.clock.now(),
                            execution_time_secs: started.elapsed().as_secs_f64(),
                        },
                        PassOutcome::Processed,
                    ),
                    LaborOutcome::NoData { reason, .. } => {
                        info!("No labor data: {}", reason);
                        (
                            Snapshot {
                                active_labor: None,
                                not_clocked_in: None,
                                timestamp: self.clock.now(),
                                execution_time_secs: started.elapsed().as_secs_f64(),
                            },
                            PassOutcome::NoData,
                        )
                    }
                };

                if let Err(e) = self.store.publish(snapshot).await {
                    warn!("Labor snapshot published but not persisted: {}", e);
                }
                outcome
            }
        };

        let elapsed = started.elapsed();
        self.stats.update_stats(PROCESS_LIVE_LABOR, elapsed);
        {
            let mut job = self.job.write().await;
            job.running = false;
            job.last_run_finish = Some(self.clock.now());
            job.last_outcome = Some(outcome);
        }
        info!(
            "Labor refresh finished in {:.2}s: {}",
            elapsed.as_secs_f64(),
            outcome.message()
        );
        outcome
    }

    /// Runs passes on a fixed interval. The first pass starts immediately and
    /// missed ticks are skipped rather than queued.
    pub async fn run_forever(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let next = chrono::Duration::from_std(self.interval)
                .ok()
                .and_then(|step| self.clock.now().checked_add_signed(step));
            self.job.write().await.next_run_time = next;
            self.run_pass().await;
        }
    }

    /// Spawns [`run_forever`](Self::run_forever) and keeps the handle for health checks.
    pub fn spawn(self: &Arc<Self>) {
        let driver = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!("Labor refresh task started, interval {:?}", driver.interval);
            driver.run_forever().await;
        });
        match self.task.lock() {
            Ok(mut task) => *task = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    pub fn is_task_alive(&self) -> bool {
        let task = match self.task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        task.as_ref().map(|handle| !handle.is_finished()).unwrap_or(false)
    }

    pub async fn scheduler_status(&self) -> SchedulerStatus {
        let job = self.job.read().await.clone();
        let horizon = chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|step| self.clock.now().checked_add_signed(step));
        let healthy = match (job.next_run_time, horizon) {
            (Some(next), Some(horizon)) => next <= horizon,
            _ => false,
        };
        SchedulerStatus {
            status: if healthy { "OK" } else { "ERROR" },
            jobs: vec![job],
        }
    }
}
