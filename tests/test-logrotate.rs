use async_trait::async_trait;
use logwatchdog::{
    AlertEvent, MonitorConfig, MonitorLoop, MonitorState, NotificationSink, SinkError,
    SinkRegistry,
};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::oneshot;
use tokio::time;

const TIMEOUT_2_SEC: Duration = Duration::from_millis(2000);

#[derive(Debug, Default)]
struct Collect {
    lines: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSink for Collect {
    fn name(&self) -> &str {
        "collect"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), SinkError> {
        self.lines.lock().unwrap().push(event.line().to_string());
        Ok(())
    }
}

fn append(path: &Path, data: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(data).unwrap();
    file.sync_all().unwrap();
}

async fn wait_for_lines(sink: &Collect, n: usize) {
    time::timeout(TIMEOUT_2_SEC, async {
        while sink.lines.lock().unwrap().len() < n {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("alerts did not arrive in time");
}

#[tokio::test]
pub async fn test_logrotate() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("foo.log");
    append(&logfile, b"");

    let sink = Arc::new(Collect::default());
    let config = MonitorConfig::new(&logfile)
        .with_keywords(["error"])
        .with_poll_interval(Duration::from_millis(50))
        .with_retry_backoff(Duration::from_millis(50));
    let monitor = MonitorLoop::new(config, SinkRegistry::new().with_shared(sink.clone()))
        .with_recheck_interval(Duration::from_millis(10));
    let mut handle = monitor.handle();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(monitor.run(async move {
        let _ = stopped.await;
    }));
    assert!(handle.wait_for(MonitorState::Watching).await);

    append(&logfile, b"foo error\nbar ok\n");
    wait_for_lines(&sink, 1).await;

    // copytruncate-style rotation
    std::fs::copy(&logfile, logdir.path().join("foo.log.1")).unwrap();
    std::fs::File::create(&logfile).unwrap();
    time::sleep(Duration::from_millis(200)).await;
    append(&logfile, b"baz error\n");
    wait_for_lines(&sink, 2).await;

    // create-style rotation
    std::fs::rename(&logfile, logdir.path().join("foo.log.2")).unwrap();
    append(&logfile, b"");
    time::sleep(Duration::from_millis(200)).await;
    append(&logfile, b"qux error\n");
    wait_for_lines(&sink, 3).await;

    let _ = stop.send(());
    time::timeout(TIMEOUT_2_SEC, task).await.unwrap().unwrap();

    assert_eq!(handle.state(), MonitorState::Stopped);
    assert_eq!(
        *sink.lines.lock().unwrap(),
        vec!["foo error", "baz error", "qux error"]
    );
}
