//! Run configuration.
//!
//! Settings are layered, later sources winning:
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`, `LOAD_RUNNER_CONFIG`, or `load-runner.toml`)
//! 3. `LOAD_RUNNER_*` environment variables (nested keys use `__`, e.g. `LOAD_RUNNER_REPORT__TITLE`)
//! 4. command line flags
//!
//! The merged [`Settings`] are then validated into an immutable [`RunConfig`].

use clap::Parser;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "load-runner.toml";
const ENV_PREFIX: &str = "LOAD_RUNNER";

/// Load runner: simulate concurrent users against a single HTTP endpoint
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "load-runner")]
#[command(about = "Simulate concurrent users issuing GET requests against one endpoint")]
pub struct CliArgs {
    /// Target URL to load (e.g., http://localhost:8080/)
    #[arg(long)]
    pub target_url: Option<String>,

    /// Number of simulated users running concurrently [default: 5]
    #[arg(long)]
    pub concurrent_users: Option<usize>,

    /// Requests each user sends after the initial page load [default: 10]
    #[arg(long)]
    pub requests_per_user: Option<u32>,

    /// Nominal delay between requests; jittered to 50%-150% [default: 2.0]
    #[arg(long)]
    pub delay_seconds: Option<f64>,

    /// Lower bound of the jitter window (overrides the nominal derivation)
    #[arg(long, requires = "delay_max_seconds")]
    pub delay_min_seconds: Option<f64>,

    /// Upper bound of the jitter window (overrides the nominal derivation)
    #[arg(long, requires = "delay_min_seconds")]
    pub delay_max_seconds: Option<f64>,

    /// Wall-clock budget for the whole run [default: 120]
    #[arg(long)]
    pub duration_seconds: Option<u64>,

    /// Timeout applied to each individual request [default: 10]
    #[arg(long)]
    pub request_timeout_seconds: Option<u64>,

    /// Log progress every N seconds, 0 disables [default: 10]
    #[arg(long)]
    pub progress_interval_seconds: Option<u64>,

    /// Path to a TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Raw, unvalidated settings as read from file and environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub target_url: Option<String>,
    pub concurrent_users: usize,
    pub requests_per_user: u32,
    pub delay_seconds: f64,
    pub delay_min_seconds: Option<f64>,
    pub delay_max_seconds: Option<f64>,
    pub duration_seconds: u64,
    pub request_timeout_seconds: u64,
    pub progress_interval_seconds: u64,
    pub report: ReportConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_url: None,
            concurrent_users: 5,
            requests_per_user: 10,
            delay_seconds: 2.0,
            delay_min_seconds: None,
            delay_max_seconds: None,
            duration_seconds: 120,
            request_timeout_seconds: 10,
            progress_interval_seconds: 10,
            report: ReportConfig::default(),
        }
    }
}

impl Settings {
    /// Read the config file (if any) and `LOAD_RUNNER_*` variables, then apply CLI flags.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let explicit_path = cli
            .config
            .clone()
            .or_else(|| env::var(format!("{ENV_PREFIX}_CONFIG")).ok().map(PathBuf::from));
        let required = explicit_path.is_some();
        let path = explicit_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() && !required {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }

        let mut settings: Settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.apply_cli(cli);
        Ok(settings)
    }

    /// Overlay any flags given on the command line.
    pub fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(url) = &cli.target_url {
            self.target_url = Some(url.clone());
        }
        if let Some(users) = cli.concurrent_users {
            self.concurrent_users = users;
        }
        if let Some(requests) = cli.requests_per_user {
            self.requests_per_user = requests;
        }
        if let Some(delay) = cli.delay_seconds {
            self.delay_seconds = delay;
        }
        if let Some(min) = cli.delay_min_seconds {
            self.delay_min_seconds = Some(min);
        }
        if let Some(max) = cli.delay_max_seconds {
            self.delay_max_seconds = Some(max);
        }
        if let Some(duration) = cli.duration_seconds {
            self.duration_seconds = duration;
        }
        if let Some(timeout) = cli.request_timeout_seconds {
            self.request_timeout_seconds = timeout;
        }
        if let Some(interval) = cli.progress_interval_seconds {
            self.progress_interval_seconds = interval;
        }
    }
}

/// Text used in the banner and the follow-up instructions of the report.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Heading printed above the configuration echo
    pub title: String,
    /// Kubernetes namespace the target application runs in
    pub app_namespace: String,
    /// Namespace hosting the Grafana service
    pub monitoring_namespace: String,
    /// Grafana service name, used in the port-forward hint
    pub grafana_service: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "HTTP LOAD TEST".to_string(),
            app_namespace: "default".to_string(),
            monitoring_namespace: "monitoring".to_string(),
            grafana_service: "grafana".to_string(),
        }
    }
}

/// Range the inter-request pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    min: Duration,
    max: Duration,
}

impl DelayWindow {
    /// Symmetric window of 50%..150% around `nominal_seconds`.
    pub fn around(nominal_seconds: f64) -> Result<Self, ConfigError> {
        Self::between(nominal_seconds * 0.5, nominal_seconds * 1.5)
    }

    pub fn between(min_seconds: f64, max_seconds: f64) -> Result<Self, ConfigError> {
        let min = non_negative_seconds("delay_min_seconds", min_seconds)?;
        let max = non_negative_seconds("delay_max_seconds", max_seconds)?;
        if min > max {
            return Err(ConfigError::invalid(
                "delay_min_seconds",
                format!("{min_seconds} is greater than delay_max_seconds ({max_seconds})"),
            ));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn nominal(&self) -> Duration {
        self.min + (self.max - self.min) / 2
    }

    /// Draw a pause uniformly from `min..=max`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        rng.gen_range(self.min..=self.max)
    }
}

fn non_negative_seconds(field: &'static str, seconds: f64) -> Result<Duration, ConfigError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("{seconds} is not a non-negative number of seconds"),
        ));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

/// Validated configuration, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target_url: Url,
    pub concurrent_users: usize,
    pub requests_per_user: u32,
    pub delay: DelayWindow,
    pub total_duration: Duration,
    pub request_timeout: Duration,
    /// `None` disables periodic progress lines
    pub progress_interval: Option<Duration>,
    pub report: ReportConfig,
}

impl TryFrom<Settings> for RunConfig {
    type Error = ConfigError;

    fn try_from(settings: Settings) -> Result<Self, Self::Error> {
        let raw_url = settings
            .target_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingTargetUrl)?;
        let target_url = parse_target(&raw_url)?;

        if settings.concurrent_users == 0 {
            return Err(ConfigError::invalid("concurrent_users", "must be at least 1"));
        }
        if settings.duration_seconds == 0 {
            return Err(ConfigError::invalid("duration_seconds", "must be at least 1"));
        }
        if settings.request_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_seconds",
                "must be at least 1",
            ));
        }

        let delay = match (settings.delay_min_seconds, settings.delay_max_seconds) {
            (Some(min), Some(max)) => DelayWindow::between(min, max)?,
            (None, None) => DelayWindow::around(settings.delay_seconds)?,
            _ => {
                return Err(ConfigError::invalid(
                    "delay_min_seconds",
                    "delay_min_seconds and delay_max_seconds must be set together",
                ))
            }
        };

        let progress_interval = match settings.progress_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            target_url,
            concurrent_users: settings.concurrent_users,
            requests_per_user: settings.requests_per_user,
            delay,
            total_duration: Duration::from_secs(settings.duration_seconds),
            request_timeout: Duration::from_secs(settings.request_timeout_seconds),
            progress_interval,
            report: settings.report,
        })
    }
}

fn parse_target(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidTargetUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidTargetUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}', expected http or https"),
        }),
    }
}
