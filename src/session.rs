//! A single simulated user.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::client::TargetClient;
use crate::config::DelayWindow;
use crate::error::RequestError;
use crate::sig_down::StopFlag;
use crate::stats::{RequestOutcome, Stats};

/// Everything a session needs, shared by all sessions of a run.
pub struct SessionContext {
    pub client: TargetClient,
    pub stats: Stats,
    pub stop_flag: StopFlag,
    /// Hard stop: aborts in-flight requests and pauses
    pub cancel: CancellationToken,
    pub requests_per_user: u32,
    pub delay: DelayWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Initial request plus every loop request were issued
    Completed,
    /// The initial request failed; nothing else was attempted
    InitialRequestFailed,
    /// Stop flag observed after `after` loop requests
    Stopped { after: u32 },
    /// Hard stop hit after `after` loop requests
    Cancelled { after: u32 },
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Completed => write!(f, "completed"),
            SessionEnd::InitialRequestFailed => write!(f, "initial request failed"),
            SessionEnd::Stopped { after } => write!(f, "stopped after {after} requests"),
            SessionEnd::Cancelled { after } => write!(f, "cancelled after {after} requests"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionResult {
    pub user_id: usize,
    pub successful: u64,
    pub failed: u64,
    pub total_latency: Duration,
    pub end: SessionEnd,
}

impl SessionResult {
    fn new(user_id: usize) -> Self {
        Self {
            user_id,
            successful: 0,
            failed: 0,
            total_latency: Duration::ZERO,
            end: SessionEnd::Completed,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.successful + self.failed
    }

    fn record(&mut self, stats: &Stats, result: &Result<Duration, RequestError>) {
        match result {
            Ok(latency) => {
                self.successful += 1;
                self.total_latency += *latency;
            }
            Err(_) => self.failed += 1,
        }
        stats.record(RequestOutcome::from(result));
    }
}

/// Run one user session: an initial page load, then up to `requests_per_user`
/// jittered follow-up requests.
///
/// A failed initial request ends the session, while failures later in the loop
/// are counted and the loop carries on.
// NOTE: the initial/loop asymmetry is long-standing behaviour and unresolved;
// change it only together with the session tests that pin it down.
pub async fn run_session(ctx: Arc<SessionContext>, user_id: usize) -> SessionResult {
    let mut result = SessionResult::new(user_id);
    tracing::info!(user_id, "User {}: Starting session", user_id);

    let initial = ctx.client.get(&ctx.cancel).await;
    match &initial {
        Err(RequestError::Cancelled) => {
            result.end = SessionEnd::Cancelled { after: 0 };
            return result;
        }
        Ok(latency) => {
            tracing::info!(
                user_id,
                latency_ms = latency.as_millis() as u64,
                "User {}: Loaded target ({:.2}s)",
                user_id,
                latency.as_secs_f64()
            );
        }
        Err(e) => {
            tracing::warn!(user_id, attempt = 0, "User {}: Load failed - {}", user_id, e);
        }
    }
    result.record(&ctx.stats, &initial);
    if initial.is_err() {
        result.end = SessionEnd::InitialRequestFailed;
        return result;
    }

    for request_num in 0..ctx.requests_per_user {
        if ctx.stop_flag.is_raised() {
            tracing::info!(
                user_id,
                "User {}: Received stop signal after {} requests",
                user_id,
                request_num
            );
            result.end = SessionEnd::Stopped { after: request_num };
            return result;
        }

        let pause = ctx.delay.sample(&mut rand::thread_rng());
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                result.end = SessionEnd::Cancelled { after: request_num };
                return result;
            }
            _ = sleep(pause) => {}
        }

        let attempt = request_num + 1;
        let outcome = ctx.client.get(&ctx.cancel).await;
        match &outcome {
            Err(RequestError::Cancelled) => {
                result.end = SessionEnd::Cancelled { after: request_num };
                return result;
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    attempt,
                    "User {}: Request {} failed - {}",
                    user_id,
                    attempt,
                    e
                );
            }
            Ok(latency) => {
                tracing::debug!(
                    user_id,
                    attempt,
                    latency_ms = latency.as_millis() as u64,
                    "User {}: Request {} ok",
                    user_id,
                    attempt
                );
            }
        }
        result.record(&ctx.stats, &outcome);
    }

    tracing::info!(
        user_id,
        "User {}: Session completed ({} requests)",
        user_id,
        result.total_requests()
    );
    result
}
