//! Interrupt handling.
//!
//! The first Ctrl-C (or SIGTERM) raises the [`StopFlag`]: sessions finish the request
//! they are on and stop at the top of their next loop iteration. A second signal
//! cancels the hard-stop token, aborting in-flight requests and pauses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cooperative stop request shared by every session. Once raised it stays raised.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct SigDown {
    stop_flag: StopFlag,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Install signal listeners. Must be called from within a tokio runtime.
    pub fn try_new() -> std::io::Result<Self> {
        let mut signals = Signals::install()?;
        let stop_flag = StopFlag::new();
        let cancellation_token = CancellationToken::new();

        let stop = stop_flag.clone();
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            signals.recv().await;
            tracing::warn!("Stop signal received. Gracefully shutting down... (press Ctrl+C again to abort in-flight requests)");
            stop.raise();

            signals.recv().await;
            tracing::warn!("Second stop signal received, aborting in-flight requests");
            token.cancel();
        });

        Ok(Self {
            stop_flag,
            cancellation_token,
        })
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop_flag.clone()
    }

    /// Token cancelled on the second signal.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
