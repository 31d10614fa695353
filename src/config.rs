//! Monitor settings and where they come from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::matcher::DEFAULT_KEYWORDS;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(5000);
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(2000);
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// What to watch and how often. Built once at startup and never changed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MonitorConfig {
    path: PathBuf,
    keywords: Vec<String>,
    poll_interval: Duration,
    retry_backoff: Duration,
    sink_timeout: Duration,
    shutdown_grace: Duration,
}

impl MonitorConfig {
    /// Watches `path` for the default keywords with default timings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MonitorConfig {
            path: path.into(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn keywords(&self) -> &[String] {
        self.keywords.as_slice()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn sink_timeout(&self) -> Duration {
        self.sink_timeout
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Rejects settings the monitor cannot run with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("LOG_FILE_PATH"));
        }
        if self.keywords.iter().all(|k| k.is_empty()) {
            return Err(ConfigError::Invalid {
                name: "EXCEPTION_KEYWORDS",
                reason: "at least one keyword is required".into(),
            });
        }
        for (name, value) in [
            ("POLL_INTERVAL_MS", self.poll_interval),
            ("RETRY_BACKOFF_MS", self.retry_backoff),
            ("SINK_TIMEOUT_MS", self.sink_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(self)
    }
}

/// SMTP relay and recipients for email alerts.
#[derive(Clone, Eq, PartialEq)]
pub struct EmailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("EmailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("recipients", &self.recipients)
            .finish()
    }
}

/// Source of the settings the monitor is started with.
pub trait ConfigProvider {
    fn monitor_config(&self) -> Result<MonitorConfig, ConfigError>;

    /// `None` when email alerts are not configured.
    fn email_config(&self) -> Result<Option<EmailConfig>, ConfigError>;

    fn popup_enabled(&self) -> bool {
        true
    }
}

/// Command line options, each of which can also be set from the environment
/// (or a `.env` file loaded before parsing).
#[derive(Clone, Debug, Parser)]
#[command(
    name = "logwatchdog",
    version,
    about = "Watches a log file for failure keywords and raises alerts"
)]
pub struct CliArgs {
    /// Log file to watch
    #[arg(short = 'f', long = "log-file", env = "LOG_FILE_PATH")]
    pub log_file: Option<PathBuf>,

    /// Comma-separated keywords, replacing the built-in list
    #[arg(short, long, env = "EXCEPTION_KEYWORDS")]
    pub keywords: Option<String>,

    /// How long to wait for new lines per cycle, in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Delay before retrying after a read failure, in milliseconds
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 5000)]
    pub retry_backoff_ms: u64,

    /// Upper bound on a single notification attempt, in milliseconds
    #[arg(long, env = "SINK_TIMEOUT_MS", default_value_t = 30_000)]
    pub sink_timeout_ms: u64,

    /// How long pending notifications may run after shutdown, in milliseconds
    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value_t = 2000)]
    pub shutdown_grace_ms: u64,

    /// SMTP relay host; email alerts are disabled when unset
    #[arg(long, env = "SMTP_SERVER")]
    pub smtp_server: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = DEFAULT_SMTP_PORT)]
    pub smtp_port: u16,

    #[arg(long, env = "EMAIL_USER")]
    pub email_user: Option<String>,

    #[arg(long, env = "EMAIL_PASSWORD", hide_env_values = true)]
    pub email_password: Option<String>,

    /// Comma-separated alert recipients
    #[arg(long, env = "RECEIVER_GROUP")]
    pub recipients: Option<String>,

    /// Don't show desktop popups
    #[arg(long, env = "NO_POPUP")]
    pub no_popup: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ConfigProvider for CliArgs {
    fn monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let path = self
            .log_file
            .clone()
            .ok_or(ConfigError::Missing("LOG_FILE_PATH"))?;

        let mut config = MonitorConfig::new(path)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
            .with_sink_timeout(Duration::from_millis(self.sink_timeout_ms))
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms));

        if let Some(raw) = &self.keywords {
            config = config.with_keywords(split_list(raw));
        }

        config.validate()
    }

    fn email_config(&self) -> Result<Option<EmailConfig>, ConfigError> {
        let server = match &self.smtp_server {
            Some(server) if !server.trim().is_empty() => server.trim().to_string(),
            _ => return Ok(None),
        };

        let username = self
            .email_user
            .clone()
            .ok_or(ConfigError::Missing("EMAIL_USER"))?;
        let password = self
            .email_password
            .clone()
            .ok_or(ConfigError::Missing("EMAIL_PASSWORD"))?;
        let recipients = self
            .recipients
            .as_deref()
            .map(split_list)
            .unwrap_or_default();
        if recipients.is_empty() {
            return Err(ConfigError::Missing("RECEIVER_GROUP"));
        }

        Ok(Some(EmailConfig {
            server,
            port: self.smtp_port,
            username,
            password,
            recipients,
        }))
    }

    fn popup_enabled(&self) -> bool {
        !self.no_popup
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
