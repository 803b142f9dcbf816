use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::RequestError;

#[derive(Debug, Clone)]
pub enum RequestOutcome {
    Success { latency: Duration },
    Failure { reason: String },
}

impl From<&Result<Duration, RequestError>> for RequestOutcome {
    fn from(result: &Result<Duration, RequestError>) -> Self {
        match result {
            Ok(latency) => RequestOutcome::Success { latency: *latency },
            Err(e) => RequestOutcome::Failure { reason: e.reason() },
        }
    }
}

/// Thread-safe aggregate counters shared by all sessions
#[derive(Clone)]
pub struct Stats {
    inner: Arc<Mutex<StatsInner>>,
}

struct StatsInner {
    start_time: Instant,
    successful: u64,
    failed: u64,
    total_latency: Duration,

    // Successful request latencies, for percentiles
    latencies_us: Vec<u64>,

    // Failure reasons histogram
    failure_reasons: HashMap<String, u64>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                start_time: Instant::now(),
                successful: 0,
                failed: 0,
                total_latency: Duration::ZERO,
                latencies_us: Vec::new(),
                failure_reasons: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        // Counters stay consistent even if a session panicked mid-update
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a completed request
    pub fn record(&self, outcome: RequestOutcome) {
        let mut inner = self.lock();

        match outcome {
            RequestOutcome::Success { latency } => {
                inner.successful += 1;
                inner.total_latency += latency;
                inner
                    .latencies_us
                    .push(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
            }
            RequestOutcome::Failure { reason } => {
                inner.failed += 1;
                *inner.failure_reasons.entry(reason).or_insert(0) += 1;
            }
        }
    }

    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.lock();

        let mut latencies = inner.latencies_us.clone();
        latencies.sort_unstable();

        StatsSnapshot {
            elapsed: inner.start_time.elapsed(),
            successful: inner.successful,
            failed: inner.failed,
            total_latency: inner.total_latency,
            latency_p50: percentile(&latencies, 0.5),
            latency_p95: percentile(&latencies, 0.95),
            latency_p99: percentile(&latencies, 0.99),
            failure_reasons: inner.failure_reasons.clone(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted_us: &[u64], p: f64) -> Option<Duration> {
    if sorted_us.is_empty() {
        return None;
    }
    let idx = ((sorted_us.len() as f64) * p).floor() as usize;
    Some(Duration::from_micros(sorted_us[idx.min(sorted_us.len() - 1)]))
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub elapsed: Duration,
    pub successful: u64,
    pub failed: u64,
    pub total_latency: Duration,
    pub latency_p50: Option<Duration>,
    pub latency_p95: Option<Duration>,
    pub latency_p99: Option<Duration>,
    pub failure_reasons: HashMap<String, u64>,
}

impl StatsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.successful + self.failed
    }

    /// Mean latency of successful requests; `None` until one succeeds.
    pub fn average_latency(&self) -> Option<Duration> {
        if self.successful == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.total_latency.as_secs_f64() / self.successful as f64,
        ))
    }

    /// Successful requests per second of wall-clock time.
    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.successful as f64 / secs
        } else {
            0.0
        }
    }

    /// Failed share of all requests, in percent.
    pub fn failure_rate(&self) -> Option<f64> {
        match self.total_requests() {
            0 => None,
            total => Some(self.failed as f64 / total as f64 * 100.0),
        }
    }

    /// Failure reasons, most frequent first.
    pub fn failure_breakdown(&self) -> Vec<(&str, u64)> {
        let mut reasons: Vec<_> = self
            .failure_reasons
            .iter()
            .map(|(reason, count)| (reason.as_str(), *count))
            .collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        reasons
    }

    pub fn log_progress(&self) {
        tracing::info!(
            successful = self.successful,
            failed = self.failed,
            "Progress: {} ok, {} failed, {:.2} req/s",
            self.successful,
            self.failed,
            self.requests_per_second()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_stats_recording() {
        let stats = Stats::new();

        stats.record(RequestOutcome::Success {
            latency: Duration::from_millis(100),
        });
        stats.record(RequestOutcome::Success {
            latency: Duration::from_millis(300),
        });
        stats.record(RequestOutcome::Failure {
            reason: "timeout".to_string(),
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests(), 3);
        assert_eq!(snapshot.successful, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.average_latency(), Some(Duration::from_millis(200)));
        assert_eq!(snapshot.latency_p50, Some(Duration::from_millis(300)));
        assert_eq!(snapshot.failure_breakdown(), vec![("timeout", 1)]);
    }

    #[test]
    fn test_empty_snapshot_has_no_average() {
        let snapshot = Stats::new().snapshot();
        assert_eq!(snapshot.total_requests(), 0);
        assert_eq!(snapshot.average_latency(), None);
        assert_eq!(snapshot.latency_p99, None);
        assert_eq!(snapshot.failure_rate(), None);
    }

    #[test]
    fn test_only_failures_has_no_average() {
        let stats = Stats::new();
        let err: Result<Duration, RequestError> =
            Err(RequestError::Status(StatusCode::BAD_GATEWAY));
        stats.record(RequestOutcome::from(&err));
        stats.record(RequestOutcome::from(&err));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.average_latency(), None);
        assert_eq!(snapshot.failure_rate(), Some(100.0));
        assert_eq!(snapshot.failure_breakdown(), vec![("HTTP 502", 2)]);
    }

    #[test]
    fn test_concurrent_recording_is_exact() {
        let stats = Stats::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if i % 2 == 0 {
                            stats.record(RequestOutcome::Success {
                                latency: Duration::from_millis(1),
                            });
                        } else {
                            stats.record(RequestOutcome::Failure {
                                reason: "connection failed".to_string(),
                            });
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.successful, 4000);
        assert_eq!(snapshot.failed, 4000);
        assert_eq!(snapshot.total_requests(), 8000);
        assert_eq!(snapshot.total_latency, Duration::from_secs(4));
    }

    #[test]
    fn test_percentiles() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 0.5), Some(Duration::from_micros(51)));
        assert_eq!(percentile(&sorted, 0.99), Some(Duration::from_micros(100)));
        assert_eq!(percentile(&[], 0.5), None);
    }
}
