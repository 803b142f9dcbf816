//! Human-readable banner and final results.

use chrono::{DateTime, Local};
use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::RunConfig;
use crate::session::{SessionEnd, SessionResult};
use crate::stats::StatsSnapshot;

const RULE_WIDTH: usize = 80;

/// Average latency (seconds) above which the system is reported as under heavy load.
const HIGH_LATENCY_SECS: f64 = 1.0;
/// Average latency (seconds) below which latency is reported as good.
const GOOD_LATENCY_SECS: f64 = 0.5;
/// Failure rate (percent) above which cluster health should be checked.
const HIGH_FAILURE_RATE_PERCENT: f64 = 10.0;

fn rule(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", "=".repeat(RULE_WIDTH))
}

/// Configuration echo printed before the run starts.
pub struct Banner<'a>(pub &'a RunConfig);

impl fmt::Display for Banner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        let users = config.concurrent_users;

        writeln!(f)?;
        rule(f)?;
        writeln!(f, "       {}", config.report.title)?;
        rule(f)?;
        writeln!(f, "\nConfiguration:")?;
        writeln!(f, "  Target: {}", config.target_url)?;
        writeln!(f, "  Concurrent Users: {}", users)?;
        writeln!(f, "  Requests per User: {}", config.requests_per_user)?;
        writeln!(
            f,
            "  Delay Between Requests: {:.1}s (jitter {:.1}s-{:.1}s)",
            config.delay.nominal().as_secs_f64(),
            config.delay.min().as_secs_f64(),
            config.delay.max().as_secs_f64()
        )?;
        writeln!(f, "  Request Timeout: {}s", config.request_timeout.as_secs())?;
        writeln!(f, "  Total Duration: {}s", config.total_duration.as_secs())?;
        writeln!(f, "\nThis load test will:")?;
        writeln!(f, "  1. Simulate {} concurrent users", users)?;
        writeln!(
            f,
            "  2. Each user will make {} requests after the initial page load",
            config.requests_per_user
        )?;
        writeln!(f, "  3. Monitor resource consumption via Grafana")?;
        writeln!(f, "  4. Trigger horizontal pod autoscaling if enabled")?;
        writeln!(f, "\nWatch metrics in Grafana:")?;
        writeln!(f, "  CPU usage: Should spike to 60%+ on current replicas")?;
        writeln!(f, "  Memory usage: Should increase as load increases")?;
        writeln!(f, "  Pod count: Should increase (if HPA enabled)")?;
        writeln!(f, "  Request rate: Should show {}x spike", users)?;
        writeln!(f)?;
        rule(f)
    }
}

/// Everything known about a finished (or abandoned) run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub config: Arc<RunConfig>,
    pub started_at: DateTime<Local>,
    pub stats: StatsSnapshot,
    pub sessions: Vec<SessionResult>,
    /// The run hit `total_duration` with sessions still running
    pub timed_out: bool,
    /// A stop signal was received during the run
    pub interrupted: bool,
    /// Sessions that panicked instead of returning a result
    pub session_faults: usize,
    /// Sessions whose tasks were aborted after ignoring cancellation
    pub aborted_sessions: usize,
}

impl RunReport {
    /// True when nothing failed and the run was not interrupted.
    pub fn succeeded(&self) -> bool {
        self.stats.failed == 0 && !self.interrupted
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    /// Sessions cut short by the deadline or a hard stop, aborted tasks included.
    pub fn cancelled_sessions(&self) -> usize {
        let returned = self
            .sessions
            .iter()
            .filter(|s| matches!(s.end, SessionEnd::Cancelled { .. }))
            .count();
        returned + self.aborted_sessions
    }

    fn write_latency(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(avg) = self.stats.average_latency() else {
            return Ok(());
        };
        let avg = avg.as_secs_f64();

        writeln!(f, "Average Latency: {:.3} seconds", avg)?;
        if let (Some(p50), Some(p95), Some(p99)) = (
            self.stats.latency_p50,
            self.stats.latency_p95,
            self.stats.latency_p99,
        ) {
            writeln!(
                f,
                "Latency p50/p95/p99: {:.3}s / {:.3}s / {:.3}s",
                p50.as_secs_f64(),
                p95.as_secs_f64(),
                p99.as_secs_f64()
            )?;
        }
        writeln!(f, "Requests/sec: {:.2}", self.stats.requests_per_second())?;

        if avg > HIGH_LATENCY_SECS {
            writeln!(f, "\n⚠️  WARNING: Average latency ({:.3}s) is high!", avg)?;
            writeln!(f, "   This indicates the system is under heavy load.")?;
            writeln!(f, "   Check Grafana dashboard to see if pods are scaling up.")?;
        } else if avg < GOOD_LATENCY_SECS {
            writeln!(f, "\n✅ Latency is good ({:.3}s)", avg)?;
            writeln!(f, "   System is handling load well.")?;
        }
        Ok(())
    }

    fn write_failures(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stats.failure_rate() {
            None => writeln!(f, "\n⚠️  No requests completed"),
            Some(_) if self.stats.failed == 0 => {
                writeln!(f, "\n✅ No failures - System is stable!")
            }
            Some(rate) => {
                writeln!(f, "\n❌ Failure Rate: {:.1}%", rate)?;
                if rate > HIGH_FAILURE_RATE_PERCENT {
                    writeln!(f, "   High failure rate! Check cluster health.")?;
                }
                writeln!(f, "   Failure breakdown:")?;
                for (reason, count) in self.stats.failure_breakdown() {
                    writeln!(f, "     {}: {}", reason, count)?;
                }
                Ok(())
            }
        }
    }

    fn write_sessions(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sessions.is_empty() {
            return Ok(());
        }
        writeln!(f, "\nPer-user sessions:")?;
        for session in &self.sessions {
            write!(
                f,
                "  User {}: {} ok, {} failed",
                session.user_id, session.successful, session.failed
            )?;
            if session.successful > 0 {
                let avg = session.total_latency.as_secs_f64() / session.successful as f64;
                write!(f, ", avg {:.3}s", avg)?;
            }
            writeln!(f, " ({})", session.end)?;
        }
        Ok(())
    }

    fn write_next_steps(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.config.report;
        let ns = &report.app_namespace;

        writeln!(f, "\nNext Steps:")?;
        writeln!(
            f,
            "  1. Check Grafana dashboard: kubectl port-forward -n {} svc/{} 3001:3000",
            report.monitoring_namespace, report.grafana_service
        )?;
        writeln!(f, "  2. Check pod scaling: kubectl get pods -n {} -w", ns)?;
        writeln!(f, "  3. Check HPA status: kubectl get hpa -n {}", ns)?;
        writeln!(
            f,
            "  4. View metrics: kubectl top nodes && kubectl top pods -n {}",
            ns
        )
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        rule(f)?;
        writeln!(f, "       LOAD TEST RESULTS")?;
        rule(f)?;
        writeln!(f, "\nStarted: {}", self.started_at.format("%Y/%m/%d %H:%M:%S"))?;
        writeln!(f, "Test Duration: {:.2} seconds", self.stats.elapsed.as_secs_f64())?;
        writeln!(f, "Total Requests: {}", self.stats.total_requests())?;
        writeln!(f, "Successful Requests: {}", self.stats.successful)?;
        writeln!(f, "Failed Requests: {}", self.stats.failed)?;

        let cancelled = self.cancelled_sessions();
        if self.timed_out {
            writeln!(
                f,
                "Sessions cancelled at the {}s limit: {}",
                self.config.total_duration.as_secs(),
                cancelled
            )?;
        } else if cancelled > 0 {
            writeln!(f, "Sessions cancelled by hard stop: {}", cancelled)?;
        }
        if self.session_faults > 0 {
            writeln!(f, "Sessions aborted by errors: {}", self.session_faults)?;
        }
        if self.interrupted {
            writeln!(f, "Run interrupted by user; results are partial")?;
        }

        self.write_latency(f)?;
        self.write_failures(f)?;
        self.write_sessions(f)?;

        writeln!(f)?;
        rule(f)?;
        self.write_next_steps(f)?;
        rule(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{RequestOutcome, Stats};
    use crate::test_support::run_config;
    use std::time::Duration;
    use url::Url;

    fn report_with(stats: &Stats) -> RunReport {
        let config = run_config(Url::parse("http://target.local/").unwrap(), 5, 10);
        RunReport {
            config: Arc::new(config),
            started_at: Local::now(),
            stats: stats.snapshot(),
            sessions: Vec::new(),
            timed_out: false,
            interrupted: false,
            session_faults: 0,
            aborted_sessions: 0,
        }
    }

    fn cancelled(user_id: usize, after: u32) -> SessionResult {
        SessionResult {
            user_id,
            successful: 1,
            failed: 0,
            total_latency: Duration::from_millis(10),
            end: SessionEnd::Cancelled { after },
        }
    }

    fn success(ms: u64) -> RequestOutcome {
        RequestOutcome::Success {
            latency: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_fast_clean_run() {
        let stats = Stats::new();
        for _ in 0..10 {
            stats.record(success(50));
        }
        let report = report_with(&stats);
        let text = report.to_string();

        assert!(report.succeeded());
        assert!(text.contains("Total Requests: 10"));
        assert!(text.contains("Average Latency: 0.050 seconds"));
        assert!(text.contains("Latency is good"));
        assert!(text.contains("No failures - System is stable!"));
        assert!(text.contains("kubectl get hpa -n default"));
    }

    #[test]
    fn test_slow_run_warns() {
        let stats = Stats::new();
        stats.record(success(1500));
        let text = report_with(&stats).to_string();

        assert!(text.contains("WARNING: Average latency (1.500s) is high!"));
        assert!(!text.contains("Latency is good"));
    }

    #[test]
    fn test_failures_are_reported_and_fail_the_run() {
        let stats = Stats::new();
        stats.record(success(100));
        for _ in 0..4 {
            stats.record(RequestOutcome::Failure {
                reason: "connection failed".to_string(),
            });
        }
        let report = report_with(&stats);
        let text = report.to_string();

        assert!(!report.succeeded());
        assert!(text.contains("Failure Rate: 80.0%"));
        assert!(text.contains("High failure rate!"));
        assert!(text.contains("connection failed: 4"));
    }

    #[test]
    fn test_no_successes_skips_latency() {
        let stats = Stats::new();
        stats.record(RequestOutcome::Failure {
            reason: "HTTP 503".to_string(),
        });
        let text = report_with(&stats).to_string();

        assert!(!text.contains("Average Latency"));
        assert!(!text.contains("Requests/sec"));
    }

    #[test]
    fn test_interrupted_run_fails_without_failures() {
        let stats = Stats::new();
        stats.record(success(10));
        let mut report = report_with(&stats);
        report.interrupted = true;

        assert!(!report.succeeded());
        assert!(report.to_string().contains("Run interrupted by user"));
    }

    #[test]
    fn test_hard_stop_reports_cancelled_sessions() {
        let stats = Stats::new();
        stats.record(success(10));
        let mut report = report_with(&stats);
        report.sessions = vec![cancelled(1, 0), cancelled(2, 3)];

        assert!(!report.timed_out);
        assert_eq!(report.cancelled_sessions(), 2);
        let text = report.to_string();
        assert!(text.contains("Sessions cancelled by hard stop: 2"));
        assert!(!text.contains("cancelled at the"));
    }

    #[test]
    fn test_aborted_sessions_count_as_cancelled() {
        let stats = Stats::new();
        let mut report = report_with(&stats);
        report.timed_out = true;
        report.sessions = vec![cancelled(1, 2)];
        report.aborted_sessions = 2;

        assert_eq!(report.cancelled_sessions(), 3);
        assert!(report.to_string().contains("Sessions cancelled at the 30s limit: 3"));
    }

    #[test]
    fn test_clean_run_has_no_cancelled_line() {
        let stats = Stats::new();
        stats.record(success(10));
        let text = report_with(&stats).to_string();

        assert!(!text.contains("Sessions cancelled"));
    }

    #[test]
    fn test_banner_echoes_configuration() {
        let config = run_config(Url::parse("http://target.local/").unwrap(), 7, 3);
        let text = Banner(&config).to_string();

        assert!(text.contains("Target: http://target.local/"));
        assert!(text.contains("Concurrent Users: 7"));
        assert!(text.contains("Requests per User: 3"));
        assert!(text.contains("Request rate: Should show 7x spike"));
    }
}
