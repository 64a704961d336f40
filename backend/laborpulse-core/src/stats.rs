// src/stats.rs
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const GET_LABOR_EFFICIENCY: &str = "Get_Labor_Efficiency";
pub const GET_EMPS_NOT_CLOCKED: &str = "Get_Emps_Not_Clocked";
pub const GET_SETTINGS: &str = "Get_Settings";
pub const GET_STATS: &str = "Get_Stats";
pub const PROCESS_LIVE_LABOR: &str = "Process_Live_Labor";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub count: u64,
    pub min_time: f64,
    pub max_time: f64,
    pub last_time: f64,
}

impl EndpointStats {
    fn first(seconds: f64) -> Self {
        Self {
            count: 1,
            min_time: seconds,
            max_time: seconds,
            last_time: seconds,
        }
    }

    fn record(&mut self, seconds: f64) {
        self.count += 1;
        self.last_time = seconds;
        self.min_time = self.min_time.min(seconds);
        self.max_time = self.max_time.max(seconds);
    }

    fn rounded(&self) -> Self {
        Self {
            count: self.count,
            min_time: round3(self.min_time),
            max_time: round3(self.max_time),
            last_time: round3(self.last_time),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub start_date: NaiveDateTime,
    pub stats: BTreeMap<String, EndpointStats>,
}

/// Refresh pass durations in the legacy execution-times shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionTimes {
    #[serde(rename = "Last_Exec_Time")]
    pub last: f64,
    #[serde(rename = "Max_Exec_Time")]
    pub max: f64,
    // consumer field name
    #[serde(rename = "Min_Exect_Time")]
    pub min: f64,
}

/// Hit counts and durations per named operation, persisted best-effort.
#[derive(Debug)]
pub struct StatsManager {
    stats: Mutex<BTreeMap<String, EndpointStats>>,
    start_date: NaiveDateTime,
    file: Option<PathBuf>,
    version: AtomicU64,
    written: Arc<Mutex<u64>>,
}

impl StatsManager {
    pub fn new(file: Option<PathBuf>, start_date: NaiveDateTime) -> Self {
        let stats = file.as_ref().map(load_stats).unwrap_or_default();
        Self {
            stats: Mutex::new(stats),
            start_date,
            file,
            version: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, EndpointStats>> {
        match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records one timing. The file write happens after the lock is released,
    /// on the blocking pool when called from inside a tokio runtime.
    pub fn update_stats(&self, name: &str, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        let pending = {
            let mut stats = self.lock();
            match stats.get_mut(name) {
                Some(entry) => entry.record(seconds),
                None => {
                    stats.insert(name.to_string(), EndpointStats::first(seconds));
                }
            }
            self.file.as_ref().map(|path| {
                let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
                (path.clone(), stats.clone(), version)
            })
        };
        debug!("{} took {:.3}s", name, seconds);

        if let Some((path, snapshot, version)) = pending {
            let written = self.written.clone();
            let persist = move || save_if_newer(&path, &snapshot, version, &written);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(persist);
                }
                Err(_) => persist(),
            }
        }
    }

    pub fn get_stats(&self) -> StatsReport {
        let stats = self.lock();
        StatsReport {
            start_date: self.start_date,
            stats: stats
                .iter()
                .map(|(name, entry)| (name.clone(), entry.rounded()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<EndpointStats> {
        self.lock().get(name).cloned()
    }

    pub fn execution_times(&self) -> ExecutionTimes {
        match self.get(PROCESS_LIVE_LABOR) {
            Some(entry) => ExecutionTimes {
                last: entry.last_time,
                max: entry.max_time,
                min: entry.min_time,
            },
            None => ExecutionTimes {
                last: 0.0,
                max: 0.0,
                min: 0.0,
            },
        }
    }
}

fn load_stats(path: &PathBuf) -> BTreeMap<String, EndpointStats> {
    if !path.exists() {
        return BTreeMap::new();
    }
    match fs::read_to_string(path).map(|raw| serde_json::from_str(&raw)) {
        Ok(Ok(stats)) => stats,
        Ok(Err(e)) => {
            warn!("Stats file {:?} is unreadable: {}. Starting fresh.", path, e);
            BTreeMap::new()
        }
        Err(e) => {
            warn!("Failed to read stats file {:?}: {}", path, e);
            BTreeMap::new()
        }
    }
}

// Blocking writes may finish out of order; an older snapshot never replaces a newer one.
fn save_if_newer(
    path: &PathBuf,
    stats: &BTreeMap<String, EndpointStats>,
    version: u64,
    written: &Mutex<u64>,
) {
    let mut last = match written.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *last >= version {
        return;
    }
    save_stats(path, stats);
    *last = version;
}

fn save_stats(path: &PathBuf, stats: &BTreeMap<String, EndpointStats>) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create stats directory {:?}: {}", parent, e);
            return;
        }
    }
    let result = serde_json::to_string(stats)
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
    if let Err(e) = result {
        warn!("Failed to save stats to {:?}: {}", path, e);
    }
}

// --- axum middleware ---

/// Per-route state for [`track_stats`].
#[derive(Clone)]
pub struct StatsTracker {
    pub stats: Arc<StatsManager>,
    pub name: &'static str,
}

impl StatsTracker {
    pub fn new(stats: Arc<StatsManager>, name: &'static str) -> Self {
        Self { stats, name }
    }
}

pub async fn track_stats(
    State(tracker): State<StatsTracker>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    tracker.stats.update_stats(tracker.name, started.elapsed());
    response
}
