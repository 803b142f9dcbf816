use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::TargetClient;
use crate::config::RunConfig;
use crate::report::RunReport;
use crate::session::{run_session, SessionContext, SessionResult};
use crate::sig_down::StopFlag;
use crate::stats::Stats;

/// How long cancelled sessions get to return before their tasks are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub struct LoadRunner {
    config: Arc<RunConfig>,
    client: TargetClient,
    stop_flag: StopFlag,
    hard_stop: CancellationToken,
}

impl LoadRunner {
    /// `stop_flag` asks sessions to wind down cooperatively; cancelling
    /// `hard_stop` aborts their in-flight requests as well.
    pub fn new(
        config: RunConfig,
        stop_flag: StopFlag,
        hard_stop: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        let client = TargetClient::new(config.target_url.clone(), config.request_timeout)?;

        Ok(Self {
            config: Arc::new(config),
            client,
            stop_flag,
            hard_stop,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every simulated user to completion or until `total_duration` elapses.
    pub async fn run_all(&self) -> RunReport {
        let started_at = Local::now();
        let stats = Stats::new();
        // Cancelled on timeout, and once all sessions are done to stop the progress printer
        let deadline = self.hard_stop.child_token();

        tracing::info!(
            users = self.config.concurrent_users,
            "Starting load test with {} concurrent users...",
            self.config.concurrent_users
        );

        let ctx = Arc::new(SessionContext {
            client: self.client.clone(),
            stats: stats.clone(),
            stop_flag: self.stop_flag.clone(),
            cancel: deadline.clone(),
            requests_per_user: self.config.requests_per_user,
            delay: self.config.delay,
        });

        let progress = self
            .config
            .progress_interval
            .map(|period| spawn_progress_printer(period, stats.clone(), deadline.clone()));

        let mut sessions = JoinSet::new();
        for user_id in 1..=self.config.concurrent_users {
            sessions.spawn(run_session(ctx.clone(), user_id));
        }

        let mut collected = Collected::default();
        let limit = sleep(self.config.total_duration);
        tokio::pin!(limit);

        let timed_out = loop {
            tokio::select! {
                joined = sessions.join_next() => match joined {
                    Some(joined) => collected.push(joined),
                    None => break false,
                },
                _ = &mut limit => break true,
            }
        };

        if timed_out {
            tracing::warn!(
                "Cancelling {} pending sessions due to timeout...",
                sessions.len()
            );
            deadline.cancel();
            drain(&mut sessions, &mut collected).await;
        }

        deadline.cancel();
        if let Some(progress) = progress {
            progress.await.ok();
        }

        collected.results.sort_by_key(|r| r.user_id);

        RunReport {
            config: self.config.clone(),
            started_at,
            stats: stats.snapshot(),
            sessions: collected.results,
            timed_out,
            interrupted: self.stop_flag.is_raised(),
            session_faults: collected.faults,
            aborted_sessions: collected.aborted,
        }
    }
}

#[derive(Default)]
struct Collected {
    results: Vec<SessionResult>,
    faults: usize,
    aborted: usize,
}

impl Collected {
    fn push(&mut self, joined: Result<SessionResult, JoinError>) {
        match joined {
            Ok(result) => self.results.push(result),
            Err(e) if e.is_panic() => {
                tracing::error!("Session error - {}", e);
                self.faults += 1;
            }
            Err(e) => {
                tracing::debug!("Session task aborted - {}", e);
                self.aborted += 1;
            }
        }
    }
}

/// Wait briefly for cancelled sessions, then abort whatever is left.
async fn drain(sessions: &mut JoinSet<SessionResult>, collected: &mut Collected) {
    let graceful = timeout(SHUTDOWN_GRACE, async {
        while let Some(joined) = sessions.join_next().await {
            collected.push(joined);
        }
    })
    .await;

    if graceful.is_err() {
        tracing::warn!("Aborting {} unresponsive sessions", sessions.len());
        sessions.abort_all();
        while let Some(joined) = sessions.join_next().await {
            collected.push(joined);
        }
    }
}

fn spawn_progress_printer(
    period: Duration,
    stats: Stats,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => stats.snapshot().log_progress(),
            }
        }
    })
}
