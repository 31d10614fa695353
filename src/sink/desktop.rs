//! Desktop popup notifications.
//!
//! Uses the notifier that ships with the platform: `notify-send` on Linux and
//! other freedesktop systems, `osascript` on macOS. Delivery is best-effort.

use async_trait::async_trait;
use tokio::process::Command;

use super::{NotificationSink, SinkError};
use crate::alert::AlertEvent;

const TITLE: &str = "🚨 Exception Alert";
const MAX_BODY_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct DesktopSink {
    app_name: String,
}

impl DesktopSink {
    pub fn new(app_name: impl Into<String>) -> Self {
        DesktopSink {
            app_name: app_name.into(),
        }
    }

    fn command(&self, body: &str) -> Result<Command, SinkError> {
        if cfg!(target_os = "macos") {
            let script = format!(
                r#"display notification "{}" with title "{}""#,
                escape_applescript(body),
                escape_applescript(TITLE)
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            Ok(cmd)
        } else if cfg!(unix) {
            let mut cmd = Command::new("notify-send");
            cmd.arg("--urgency=critical")
                .arg(format!("--app-name={}", self.app_name))
                .arg(TITLE)
                .arg(body);
            Ok(cmd)
        } else {
            Err(SinkError::Platform(format!(
                "desktop notifications are not supported on {}",
                std::env::consts::OS
            )))
        }
    }
}

impl Default for DesktopSink {
    fn default() -> Self {
        DesktopSink::new(env!("CARGO_PKG_NAME"))
    }
}

#[async_trait]
impl NotificationSink for DesktopSink {
    fn name(&self) -> &str {
        "desktop"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let body = truncate(event.line(), MAX_BODY_CHARS);
        let output = self
            .command(&body)?
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SinkError::Platform(format!("failed to launch notifier: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SinkError::Platform(format!(
                "notifier exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
