//! In-process HTTP targets for tests.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::{DelayWindow, ReportConfig, RunConfig};

/// How the fake target answers.
#[derive(Clone, Copy)]
pub struct Behaviour {
    pub status: StatusCode,
    pub delay: Duration,
    /// Answer this 1-based hit with 500 instead of `status`
    pub fail_hit: Option<usize>,
}

impl Behaviour {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            delay: Duration::ZERO,
            fail_hit: None,
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok()
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::ok()
        }
    }

    pub fn failing_on_hit(hit: usize) -> Self {
        Self {
            fail_hit: Some(hit),
            ..Self::ok()
        }
    }
}

pub struct TestTarget {
    pub url: Url,
    hits: Arc<AtomicUsize>,
}

impl TestTarget {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_target(behaviour: Behaviour) -> TestTarget {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new().route(
        "/",
        get(move || {
            let counter = counter.clone();
            async move {
                let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(behaviour.delay).await;
                if behaviour.fail_hit == Some(hit) {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    behaviour.status
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestTarget {
        url: Url::parse(&format!("http://{addr}/")).unwrap(),
        hits,
    }
}

/// URL of a local port that nothing listens on.
pub async fn unreachable_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Fast config: no pauses, no progress output, generous deadline.
pub fn run_config(url: Url, users: usize, requests_per_user: u32) -> RunConfig {
    RunConfig {
        target_url: url,
        concurrent_users: users,
        requests_per_user,
        delay: DelayWindow::between(0.0, 0.0).unwrap(),
        total_duration: Duration::from_secs(30),
        request_timeout: Duration::from_secs(5),
        progress_interval: None,
        report: ReportConfig::default(),
    }
}
