use std::sync::{Arc, Mutex};
use std::time::Duration;

use tally_client::{MetricWriter, WriteError};
use tally_config::ClientConfig;
use tally_test::MockCollector;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn build_writer(collector: &MockCollector, dir: &TempDir) -> MetricWriter {
    let config = ClientConfig::new(collector.url());
    MetricWriter::builder("app1", "1.0.0", &config)
        .store_dir(dir.path())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_write_metric() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    let dir = tempfile::tempdir().unwrap();
    let writer = build_writer(&collector, &dir);

    writer.write_metric("runs", 3).await.unwrap();

    let reports = collector.wait_for_reports(1, WAIT).await;
    let received = &reports[0];
    assert_eq!(received.report.app_id, "app1");
    assert_eq!(received.report.app_version, "1.0.0");
    assert_eq!(received.report.metrics.get("runs"), Some(&3));

    let MetricWriter::Enabled(reporter) = &writer else {
        panic!("writer should be enabled");
    };
    assert_eq!(received.report.install_id, reporter.install_id());

    let header = |name: &str| received.headers.get(name).unwrap().to_str().unwrap().to_owned();
    assert_eq!(header("content-type"), "application/json");
    assert_eq!(header("accept"), "application/json");
    assert!(header("user-agent").starts_with("tally-client/"));
}

#[tokio::test]
async fn test_status_error_truncates_body() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    collector.respond_with(500, "x".repeat(5000));
    let dir = tempfile::tempdir().unwrap();
    let writer = build_writer(&collector, &dir);

    let error = writer.write_metric("runs", 1).await.unwrap_err();
    match error {
        WriteError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body.len(), 2048);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_client_error_status() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    collector.respond_with(404, r#"{"detail":"unknown app"}"#);
    let dir = tempfile::tempdir().unwrap();
    let writer = build_writer(&collector, &dir);

    let error = writer.write_metric("runs", 1).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        r#"collector responded with 404 Not Found: {"detail":"unknown app"}"#
    );
}

#[tokio::test]
async fn test_write_metric_timeout() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    collector.delay(Duration::from_secs(3));
    let dir = tempfile::tempdir().unwrap();

    let mut config = ClientConfig::new(collector.url());
    config.timeout = 1;
    let writer = MetricWriter::builder("app1", "1.0.0", &config)
        .store_dir(dir.path())
        .build()
        .unwrap();

    let error = writer.write_metric("runs", 1).await.unwrap_err();
    assert!(
        matches!(&error, WriteError::Timeout)
            || matches!(&error, WriteError::Send(e) if e.is_timeout()),
        "unexpected error: {error}"
    );
}

#[tokio::test]
async fn test_caller_deadline_releases_write() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    collector.delay(Duration::from_secs(3));
    let dir = tempfile::tempdir().unwrap();
    let writer = build_writer(&collector, &dir);

    let result = tokio::time::timeout(
        Duration::from_millis(100),
        writer.write_metric("runs", 1),
    )
    .await;
    assert!(result.is_err(), "write should hit the caller's deadline");

    // The dropped write no longer holds up shutdown.
    tokio::time::timeout(Duration::from_secs(1), writer.close())
        .await
        .expect("close should not wait for the abandoned write");
}

#[tokio::test]
async fn test_close_waits_for_pending_writes() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    collector.delay(Duration::from_millis(300));
    let dir = tempfile::tempdir().unwrap();
    let writer = build_writer(&collector, &dir);

    for count in 0..3 {
        writer.write_metric_async("runs", count);
    }
    writer.close().await;

    assert_eq!(collector.reports().len(), 3);
}

#[tokio::test]
async fn test_no_writes_after_close() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    let dir = tempfile::tempdir().unwrap();
    let writer = build_writer(&collector, &dir);

    writer.close().await;
    writer.write_metric_async("runs", 1);
    writer.write_metric("runs", 1).await.unwrap();
    writer.clone().close().await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(collector.requests_started(), 0);
}

#[tokio::test]
async fn test_writes_during_close_are_dropped() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    collector.delay(Duration::from_millis(500));
    let dir = tempfile::tempdir().unwrap();
    let writer = build_writer(&collector, &dir);

    writer.write_metric_async("runs", 1);

    let closing = tokio::spawn({
        let writer = writer.clone();
        async move { writer.close().await }
    });

    // Give close a chance to take the exclusive lock while the first write is in flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!closing.is_finished());

    writer.write_metric_async("runs", 2);
    writer.write_metric("runs", 3).await.unwrap();

    closing.await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let reports = collector.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report.metrics.get("runs"), Some(&1));
    assert_eq!(collector.requests_started(), 1);
}

#[tokio::test]
async fn test_async_error_callback() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    collector.respond_with(500, "boom");
    let dir = tempfile::tempdir().unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let config = ClientConfig::new(collector.url());
    let writer = MetricWriter::builder("app1", "1.0.0", &config)
        .store_dir(dir.path())
        .on_async_error({
            let errors = Arc::clone(&errors);
            move |error: &WriteError| errors.lock().unwrap().push(error.to_string())
        })
        .build()
        .unwrap();

    writer.write_metric_async("runs", 1);
    writer.close().await;

    let errors = errors.lock().unwrap();
    assert_eq!(
        errors.as_slice(),
        ["collector responded with 500 Internal Server Error: boom"]
    );
}

#[tokio::test]
async fn test_opted_out_writer_sends_nothing() {
    tally_test::setup();
    let collector = MockCollector::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = ClientConfig::new(collector.url());
    config.no_metrics = true;
    let writer = MetricWriter::builder("app1", "1.0.0", &config)
        .store_dir(dir.path())
        .build()
        .unwrap();

    writer.write_metric("runs", 1).await.unwrap();
    writer.write_metric_async("runs", 1);
    writer.close().await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(collector.requests_started(), 0);
    assert!(!dir.path().join("id.json").exists());
}
