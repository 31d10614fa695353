use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// A detected failure line, handed to every registered sink.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlertEvent {
    line: String,
    keywords: Vec<String>,
    source: PathBuf,
    detected_at: DateTime<Utc>,
}

impl AlertEvent {
    /// Builds an event stamped with the current time. `line` is trimmed.
    pub fn new(line: &str, keywords: Vec<String>, source: impl Into<PathBuf>) -> Self {
        AlertEvent::at(line, keywords, source, Utc::now())
    }

    pub fn at(
        line: &str,
        keywords: Vec<String>,
        source: impl Into<PathBuf>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        AlertEvent {
            line: line.trim().to_string(),
            keywords,
            source: source.into(),
            detected_at,
        }
    }

    /// The matched line, trimmed of surrounding whitespace.
    pub fn line(&self) -> &str {
        self.line.as_str()
    }

    /// Keywords found in the line, in configuration order.
    pub fn keywords(&self) -> &[String] {
        self.keywords.as_slice()
    }

    /// The file the line was read from.
    pub fn source(&self) -> &Path {
        self.source.as_path()
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({})",
            self.detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.line,
            self.keywords.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_trimmed() {
        let event = AlertEvent::new("  ERROR: disk full \t", vec!["Error".into()], "/var/log/app.log");
        assert_eq!(event.line(), "ERROR: disk full");
        assert_eq!(event.keywords(), &["Error".to_string()]);
        assert_eq!(event.source(), Path::new("/var/log/app.log"));
    }

    #[test]
    fn test_display() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let event = AlertEvent::at(
            "fatal crash",
            vec!["Fatal".into(), "Crash".into()],
            "app.log",
            at,
        );
        assert_eq!(
            event.to_string(),
            "[2024-03-01 12:30:00 UTC] fatal crash (Fatal, Crash)"
        );
    }
}
