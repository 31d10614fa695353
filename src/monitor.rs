//! The control loop tying the tail reader, keyword matching and sinks together.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::watch;

use crate::alert::AlertEvent;
use crate::config::MonitorConfig;
use crate::matcher::KeywordMatcher;
use crate::reader::{NextLine, TailReader, DEFAULT_RECHECK_INTERVAL};
use crate::sink::{Dispatcher, SinkRegistry};

/// Where the monitor is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MonitorState {
    /// Not yet opened the file.
    Idle,
    /// File open, waiting for lines.
    Watching,
    /// File unavailable, retrying after a backoff.
    Recovering,
    /// Cancelled. Terminal.
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MonitorState::Idle => "idle",
            MonitorState::Watching => "watching",
            MonitorState::Recovering => "recovering",
            MonitorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Suspends the loop for a backoff interval.
pub type DelayFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Default)]
struct Counters {
    lines_read: AtomicU64,
    alerts_raised: AtomicU64,
}

/// Read-only view of a running [`MonitorLoop`].
#[derive(Clone, Debug)]
pub struct MonitorHandle {
    state: watch::Receiver<MonitorState>,
    counters: Arc<Counters>,
}

impl MonitorHandle {
    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Waits until the monitor reaches `target`. Returns `false` if the
    /// monitor was dropped first.
    pub async fn wait_for(&mut self, target: MonitorState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    pub fn lines_read(&self) -> u64 {
        self.counters.lines_read.load(Ordering::Relaxed)
    }

    pub fn alerts_raised(&self) -> u64 {
        self.counters.alerts_raised.load(Ordering::Relaxed)
    }
}

/// Watches one file and raises an alert for every line containing a keyword.
///
/// ```text
/// Idle ──open──▶ Watching ◀──reopen── Recovering
///                   │  ▲                 ▲   │
///                   │  └─ line / match   │   └─ backoff
///                   └──transient error───┘
/// any ──shutdown──▶ Stopped
/// ```
///
/// Alerts are handed to every sink in the registry as independent tasks; the
/// loop moves on to the next line as soon as they are issued.
pub struct MonitorLoop {
    config: MonitorConfig,
    matcher: KeywordMatcher,
    dispatcher: Dispatcher,
    state: watch::Sender<MonitorState>,
    counters: Arc<Counters>,
    delay: DelayFn,
    recheck: Duration,
}

impl fmt::Debug for MonitorLoop {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("MonitorLoop")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl MonitorLoop {
    pub fn new(config: MonitorConfig, sinks: SinkRegistry) -> Self {
        let matcher = KeywordMatcher::new(config.keywords().iter().cloned());
        let dispatcher = Dispatcher::new(sinks, config.sink_timeout());
        let (state, _) = watch::channel(MonitorState::Idle);

        MonitorLoop {
            config,
            matcher,
            dispatcher,
            state,
            counters: Arc::default(),
            delay: Arc::new(|d| tokio::time::sleep(d).boxed()),
            recheck: DEFAULT_RECHECK_INTERVAL,
        }
    }

    /// Replaces how backoff delays are waited out.
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.delay = Arc::new(delay);
        self
    }

    /// Sets how often the file is re-checked between filesystem events.
    pub fn with_recheck_interval(mut self, recheck: Duration) -> Self {
        self.recheck = recheck;
        self
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            state: self.state.subscribe(),
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Runs until `shutdown` completes, then releases the file and gives
    /// in-flight notifications the configured grace period.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            path = %self.config.path().display(),
            keywords = %self.config.keywords().join(", "),
            "monitoring log file"
        );

        let mut reader: Option<TailReader> = None;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.cycle(&mut reader) => {}
            }
        }

        self.set_state(MonitorState::Stopped);
        drop(reader);

        let pending = self.dispatcher.in_flight();
        if pending > 0 {
            tracing::info!(pending, "waiting for alert deliveries to finish");
        }
        self.dispatcher.drain(self.config.shutdown_grace()).await;

        tracing::info!(
            lines = self.counters.lines_read.load(Ordering::Relaxed),
            alerts = self.counters.alerts_raised.load(Ordering::Relaxed),
            "monitoring stopped"
        );
    }

    async fn cycle(&mut self, reader: &mut Option<TailReader>) {
        self.dispatcher.reap();

        match self.state() {
            MonitorState::Idle | MonitorState::Recovering => self.reconnect(reader).await,
            MonitorState::Watching => self.poll(reader).await,
            MonitorState::Stopped => {}
        }
    }

    async fn reconnect(&mut self, reader: &mut Option<TailReader>) {
        let result = if let Some(tail) = reader.as_mut() {
            tail.reopen().await
        } else {
            match TailReader::open(self.config.path()).await {
                Ok(tail) => {
                    *reader = Some(tail.with_recheck_interval(self.recheck));
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(()) => {
                if self.state() == MonitorState::Recovering {
                    tracing::info!(path = %self.config.path().display(), "log file available again");
                }
                self.set_state(MonitorState::Watching);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in = ?self.config.retry_backoff(),
                    "cannot open log file"
                );
                self.set_state(MonitorState::Recovering);
                self.backoff().await;
            }
        }
    }

    async fn poll(&mut self, reader: &mut Option<TailReader>) {
        let tail = match reader.as_mut() {
            Some(tail) => tail,
            None => {
                self.set_state(MonitorState::Recovering);
                return;
            }
        };

        match tail.next_line(self.config.poll_interval()).await {
            Ok(NextLine::Line(line)) => self.handle_line(&line),
            Ok(NextLine::NoNewData) => {}
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    error = %e,
                    retry_in = ?self.config.retry_backoff(),
                    "log file became unavailable"
                );
                self.set_state(MonitorState::Recovering);
                self.backoff().await;
            }
            Err(e) => {
                // The handle itself may be broken (EIO, ESTALE), so it is
                // reopened rather than read again.
                tracing::error!(
                    error = %e,
                    retry_in = ?self.config.retry_backoff(),
                    "unexpected error while reading log file"
                );
                self.set_state(MonitorState::Recovering);
                self.backoff().await;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        self.counters.lines_read.fetch_add(1, Ordering::Relaxed);

        let keywords = self.matcher.matched_keywords(line);
        if keywords.is_empty() {
            return;
        }

        let event = AlertEvent::new(line, keywords, self.config.path());
        tracing::warn!(
            line = event.line(),
            keywords = %event.keywords().join(", "),
            "exception detected"
        );

        self.counters.alerts_raised.fetch_add(1, Ordering::Relaxed);
        self.dispatcher.dispatch(&event);
    }

    fn backoff(&self) -> BoxFuture<'static, ()> {
        (self.delay)(self.config.retry_backoff())
    }

    fn set_state(&self, next: MonitorState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "monitor state changed");
        }
    }
}
