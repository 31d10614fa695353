//! Watches a growing log file for failure keywords and raises alerts.
//!
//! A [`MonitorLoop`] tails one file with a [`TailReader`], checks every new
//! line against a keyword set, and hands each match to all registered
//! [`NotificationSink`]s at once, so one slow or failing channel never holds
//! up the others or the loop itself.
//!
//! ## Example
//!
//! ```no_run
//! use logwatchdog::{DesktopSink, MonitorConfig, MonitorLoop, SinkRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MonitorConfig::new("/var/log/app.log");
//!     let sinks = SinkRegistry::new().with_sink(DesktopSink::default());
//!
//!     let monitor = MonitorLoop::new(config, sinks);
//!     monitor
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//! }
//! ```
//!
//! ## Caveats
//!
//! Only content written after the file is opened is examined. When the file is
//! truncated or replaced, tailing resumes from the end of the new file, so
//! lines written between the rotation and its detection are not seen.

mod alert;
pub mod config;
mod error;
mod events;
pub mod logging;
mod matcher;
mod monitor;
mod reader;
pub mod sink;

pub use alert::AlertEvent;
pub use config::{CliArgs, ConfigError, ConfigProvider, EmailConfig, MonitorConfig};
pub use error::TailError;
pub use matcher::{matches, KeywordMatcher, DEFAULT_KEYWORDS};
pub use monitor::{DelayFn, MonitorHandle, MonitorLoop, MonitorState};
pub use reader::{NextLine, TailReader};
pub use sink::{DesktopSink, EmailSink, NotificationSink, SinkError, SinkRegistry};
