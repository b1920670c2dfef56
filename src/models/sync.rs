use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Inclusive creation-time range for a harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    StoppedEarly,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::StoppedEarly => write!(f, "stopped early"),
        }
    }
}

/// Counters for phase 1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub pages: u32,
    pub seen: u64,
    pub inserted: u64,
    pub total_estimate: Option<u64>,
    pub rate_limited_retries: u32,
    pub error: Option<String>,
}

/// Run-level progress for phase 2.
///
/// Only the coordinator mutates this, after a batch has fully settled.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub total: usize,
    pub processed: usize,
    pub enriched: usize,
    pub errors: usize,
    pub last_error: Option<String>,
    started: Instant,
}

impl SyncProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            enriched: 0,
            errors: 0,
            last_error: None,
            started: Instant::now(),
        }
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
        self.enriched += 1;
    }

    pub fn record_error(&mut self, id: &str, message: impl Into<String>) {
        self.processed += 1;
        self.errors += 1;
        self.last_error = Some(format!("{id}: {}", message.into()));
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Items per second since the run started.
    pub fn throughput(&self) -> f64 {
        throughput(self.processed, self.elapsed())
    }

    pub fn eta(&self) -> Option<Duration> {
        eta(self.remaining(), self.processed, self.elapsed())
    }

    pub fn status_line(&self) -> String {
        let eta = self
            .eta()
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{}/{} processed, {} enriched, {} errors, {:.2} items/s, ETA {}",
            self.processed,
            self.total,
            self.enriched,
            self.errors,
            self.throughput(),
            eta
        )
    }
}

/// Items per second for `processed` items over `elapsed`
pub fn throughput(processed: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return 0.0;
    }
    processed as f64 / secs
}

/// Remaining time extrapolated from the observed rate
pub fn eta(remaining: usize, processed: usize, elapsed: Duration) -> Option<Duration> {
    if remaining == 0 {
        return Some(Duration::ZERO);
    }
    let rate = throughput(processed, elapsed);
    if rate <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(remaining as f64 / rate))
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Terminal report of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub harvest: Option<HarvestStats>,
    pub total: usize,
    pub processed: usize,
    pub enriched: usize,
    pub errors: usize,
    pub rate_limited_retries: u32,
    pub last_error: Option<String>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn from_progress(
        run_id: impl Into<String>,
        status: RunStatus,
        harvest: Option<HarvestStats>,
        progress: &SyncProgress,
        rate_limited_retries: u32,
    ) -> Self {
        let last_error = progress
            .last_error
            .clone()
            .or_else(|| harvest.as_ref().and_then(|h| h.error.clone()));

        Self {
            run_id: run_id.into(),
            status,
            harvest,
            total: progress.total,
            processed: progress.processed,
            enriched: progress.enriched,
            errors: progress.errors,
            rate_limited_retries,
            last_error,
            elapsed_secs: progress.elapsed().as_secs_f64(),
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Run {}", self.status)?;
        if let Some(h) = &self.harvest {
            write!(f, " | harvested {} ids ({} new, {} pages)", h.seen, h.inserted, h.pages)?;
        }
        write!(
            f,
            " | total {}, processed {}, succeeded {}, errored {}",
            self.total, self.processed, self.enriched, self.errors
        )?;
        if self.rate_limited_retries > 0 {
            write!(f, ", rate-limit retries {}", self.rate_limited_retries)?;
        }
        write!(f, " | {:.1}s", self.elapsed_secs)?;
        if let Some(err) = &self.last_error {
            write!(f, " | last error: {err}")?;
        }
        Ok(())
    }
}
