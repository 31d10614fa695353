//! Notification channels and the fan-out that feeds them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use crate::alert::AlertEvent;

mod desktop;
mod email;

pub use desktop::DesktopSink;
pub use email::EmailSink;

/// Why a sink could not deliver an alert.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A channel alerts are delivered through.
#[async_trait]
pub trait NotificationSink: Send + Sync + fmt::Debug {
    /// Short name used in logs, e.g. `"email"`.
    fn name(&self) -> &str;

    /// Delivers `event`. Must not assume any other sink has seen it.
    async fn notify(&self, event: &AlertEvent) -> Result<(), SinkError>;
}

/// The sinks every alert goes to, in registration order.
#[derive(Clone, Debug, Default)]
pub struct SinkRegistry {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        SinkRegistry::default()
    }

    pub fn with_sink(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn with_shared(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

/// Outcome of one sink handling one event.
#[derive(Debug)]
pub struct Delivery {
    pub sink: String,
    pub result: Result<(), SinkError>,
}

/// Issues each alert to every sink as its own task, each bounded by a
/// timeout, and keeps track of the tasks still in flight.
pub struct Dispatcher {
    registry: SinkRegistry,
    timeout: Duration,
    in_flight: JoinSet<Delivery>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.registry.names())
            .field("timeout", &self.timeout)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(registry: SinkRegistry, timeout: Duration) -> Self {
        Dispatcher {
            registry,
            timeout,
            in_flight: JoinSet::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Spawns one delivery task per sink and returns without waiting for any
    /// of them.
    pub fn dispatch(&mut self, event: &AlertEvent) {
        for sink in &self.registry.sinks {
            let sink = Arc::clone(sink);
            let event = event.clone();
            self.in_flight.spawn(deliver(sink, event, self.timeout));
        }
    }

    /// Releases deliveries that have already finished. Their outcome was
    /// logged by the task itself.
    pub fn reap(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            settle(joined);
        }
    }

    /// Waits up to `grace` for in-flight deliveries, then lets the rest run on
    /// unobserved.
    pub async fn drain(&mut self, grace: Duration) -> Vec<Delivery> {
        let mut done = Vec::new();
        let waited = tokio::time::timeout(grace, async {
            while let Some(joined) = self.in_flight.join_next().await {
                if let Some(delivery) = settle(joined) {
                    done.push(delivery);
                }
            }
        })
        .await;

        if waited.is_err() {
            tracing::warn!(
                abandoned = self.in_flight.len(),
                "alert deliveries still running after shutdown grace period"
            );
            self.in_flight.detach_all();
        }

        done
    }
}

async fn deliver(sink: Arc<dyn NotificationSink>, event: AlertEvent, timeout: Duration) -> Delivery {
    let result = match tokio::time::timeout(timeout, sink.notify(&event)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(timeout)),
    };

    match &result {
        Ok(()) => tracing::info!(sink = sink.name(), line = event.line(), "alert delivered"),
        Err(e) => tracing::error!(sink = sink.name(), error = %e, "alert delivery failed"),
    }

    Delivery {
        sink: sink.name().to_string(),
        result,
    }
}

fn settle(joined: Result<Delivery, JoinError>) -> Option<Delivery> {
    match joined {
        Ok(delivery) => Some(delivery),
        Err(e) => {
            tracing::error!(error = %e, "alert delivery task panicked");
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn event() -> AlertEvent {
        AlertEvent::new("ERROR: disk full", vec!["Error".into()], "app.log")
    }

    #[tokio::test]
    async fn test_failing_sink_isolated() {
        let recording = Arc::new(RecordingSink::default());
        let registry = SinkRegistry::new()
            .with_sink(FailingSink)
            .with_shared(recording.clone());
        let mut dispatcher = Dispatcher::new(registry, Duration::from_secs(1));

        dispatcher.dispatch(&event());
        let deliveries = dispatcher.drain(Duration::from_secs(1)).await;

        assert_eq!(deliveries.len(), 2);
        let received = recording.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].line(), "ERROR: disk full");
        let failed: Vec<_> = deliveries.iter().filter(|d| d.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].sink, "failing");
    }

    #[tokio::test]
    async fn test_stalled_sink_times_out() {
        let recording = Arc::new(RecordingSink::default());
        let registry = SinkRegistry::new()
            .with_sink(StalledSink)
            .with_shared(recording.clone());
        let mut dispatcher = Dispatcher::new(registry, Duration::from_millis(50));

        dispatcher.dispatch(&event());
        assert_eq!(dispatcher.in_flight(), 2);

        let deliveries = dispatcher.drain(Duration::from_secs(2)).await;
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries
            .iter()
            .any(|d| d.sink == "stalled" && matches!(d.result, Err(SinkError::Timeout(_)))));
        assert_eq!(recording.received().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_sink_isolated() {
        let recording = Arc::new(RecordingSink::default());
        let registry = SinkRegistry::new()
            .with_sink(PanickingSink)
            .with_shared(recording.clone());
        let mut dispatcher = Dispatcher::new(registry, Duration::from_secs(1));

        dispatcher.dispatch(&event());
        let deliveries = dispatcher.drain(Duration::from_secs(1)).await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].sink, "recording");
        assert_eq!(recording.received().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_abandons_after_grace() {
        let registry = SinkRegistry::new().with_sink(StalledSink);
        let mut dispatcher = Dispatcher::new(registry, Duration::from_secs(60));

        dispatcher.dispatch(&event());
        let deliveries = dispatcher.drain(Duration::from_millis(20)).await;

        assert!(deliveries.is_empty());
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_reap_releases_finished() {
        let registry = SinkRegistry::new()
            .with_sink(FailingSink)
            .with_sink(StalledSink);
        let mut dispatcher = Dispatcher::new(registry, Duration::from_secs(60));

        dispatcher.dispatch(&event());
        dispatcher.dispatch(&event());
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatcher.reap();

        assert_eq!(dispatcher.in_flight(), 2);
        dispatcher.drain(Duration::from_millis(10)).await;
    }

    #[test]
    fn test_registry_order() {
        let registry = SinkRegistry::new()
            .with_sink(FailingSink)
            .with_sink(RecordingSink::default());
        assert_eq!(registry.names(), vec!["failing", "recording"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
