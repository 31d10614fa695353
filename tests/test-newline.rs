use logwatchdog::{NextLine, TailReader};
use std::io::Write;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time;

const TIMEOUT_2_SEC: Duration = Duration::from_millis(2000);

fn append(path: &std::path::Path, data: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(data).unwrap();
    file.sync_all().unwrap();
}

#[tokio::test]
pub async fn test_newline() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("foo.log");
    append(&logfile, b"written before open\n");

    let mut reader = TailReader::open(&logfile).await.unwrap();

    // The writer flushes the first half of a line, then finishes it later.
    append(&logfile, b"foo");
    assert_eq!(
        reader.next_line(Duration::from_millis(100)).await.unwrap(),
        NextLine::NoNewData
    );

    append(&logfile, b" bar\n");
    let line = time::timeout(TIMEOUT_2_SEC, reader.next_line(TIMEOUT_2_SEC))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(line, NextLine::Line("foo bar".to_string()));
    assert_eq!(
        reader.next_line(Duration::from_millis(100)).await.unwrap(),
        NextLine::NoNewData
    );
}
