mod common;

use clipvault::config::DEFAULT_FALLBACK_FORMAT;
use clipvault::prelude::*;
use common::{event, eventually, FakeResolver, FetchBehavior};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Barrier, Notify};

async fn coordinator(dir: &Path, resolver: Arc<FakeResolver>) -> (DownloadCoordinator, Ledger) {
    let ledger = Ledger::open(&dir.join("downloads.db")).await.unwrap();
    let coordinator =
        DownloadCoordinator::new(resolver, ledger.clone(), dir, DEFAULT_FALLBACK_FORMAT);
    (coordinator, ledger)
}

fn request(url: &str, filename: Option<&str>, format_id: Option<&str>) -> DownloadRequest {
    DownloadRequest {
        url: url.to_string(),
        filename: filename.map(str::to_string),
        format_id: format_id.map(str::to_string),
    }
}

#[tokio::test]
async fn test_successful_download_records_once_and_resets() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::mp4(4096)));
    let (coordinator, ledger) = coordinator(dir.path(), resolver.clone()).await;

    coordinator
        .start_download(request("https://example.com/v/1", Some("My Clip!"), None))
        .unwrap();
    coordinator.drain().await;

    let status = coordinator.status();
    assert!(!status.is_downloading);
    assert_eq!(status.progress, 100.0);
    assert_eq!(status.status, "completed");
    let file = status.current_download.expect("completed file");
    assert_eq!(file.filesize, 4096);

    let records = ledger.list().await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.url, "https://example.com/v/1");
    assert_eq!(record.filename, file.filename);
    assert_eq!(record.filesize, 4096);
    assert_eq!(record.resolution, "1280x720");
    assert_eq!(record.duration, 12.5);
    assert_eq!(record.status, "completed");
    assert!(Path::new(&record.filepath).is_absolute());
    assert!(Path::new(&record.filepath).exists());

    // "My Clip_YYYYMMDD_HHMMSS.mp4"
    assert!(record.filename.starts_with("My Clip_"));
    assert!(record.filename.ends_with(".mp4"));
    assert_eq!(record.filename.len(), "My Clip_".len() + 15 + ".mp4".len());

    // the terminal snapshot is only handed out once
    let after = coordinator.status();
    assert_eq!(after.status, "idle");
    assert_eq!(after.progress, 0.0);
    assert!(after.current_download.is_none());
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn test_second_submission_conflicts_while_downloading() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::mp4(10)).with_gate(gate.clone()));
    let (coordinator, ledger) = coordinator(dir.path(), resolver.clone()).await;

    coordinator
        .start_download(request("https://example.com/v/1", Some("first"), None))
        .unwrap();

    for _ in 0..5 {
        let err = coordinator
            .start_download(request("https://example.com/v/2", Some("second"), None))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict));
    }
    let status = coordinator.status();
    assert!(status.is_downloading);
    assert_eq!(status.status, "downloading");

    gate.notify_one();
    coordinator.drain().await;

    assert_eq!(resolver.calls(), 1);
    let records = ledger.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].filename.starts_with("first_"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_admit_exactly_one() {
    const SUBMITTERS: usize = 16;
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::mp4(10)).with_gate(gate.clone()));
    let (coordinator, ledger) = coordinator(dir.path(), resolver.clone()).await;
    let coordinator = Arc::new(coordinator);
    let barrier = Arc::new(Barrier::new(SUBMITTERS));

    let handles: Vec<_> = (0..SUBMITTERS)
        .map(|i| {
            let coordinator = coordinator.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                let name = format!("racer{i}");
                let submission = request("https://example.com/v/1", Some(name.as_str()), None);
                coordinator.start_download(submission)
            })
        })
        .collect();

    let mut accepted = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => accepted += 1,
            Err(AppError::Conflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(conflicts, SUBMITTERS - 1);

    gate.notify_one();
    coordinator.drain().await;

    assert_eq!(resolver.calls(), 1);
    assert_eq!(ledger.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_progress_is_visible_while_downloading() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let resolver = Arc::new(
        FakeResolver::new(FetchBehavior::mp4(10))
            .with_gate(gate.clone())
            .with_events(vec![
                event(10, Some(100), None),
                event(90, None, None),
                event(1, None, Some(3)),
            ]),
    );
    let (coordinator, _ledger) = coordinator(dir.path(), resolver).await;

    coordinator
        .start_download(request("https://example.com/v/1", None, None))
        .unwrap();

    assert!(eventually(|| coordinator.status().progress == 33.33).await);
    assert!(coordinator.status().is_downloading);

    gate.notify_one();
    coordinator.drain().await;
    assert_eq!(coordinator.status().progress, 100.0);
}

#[tokio::test]
async fn test_failed_transfer_reports_error_without_record() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::Fail(
        "ERROR: Requested format is not available".to_string(),
    )));
    let (coordinator, ledger) = coordinator(dir.path(), resolver).await;

    coordinator
        .start_download(request("https://example.com/v/1", Some("clip"), Some("999")))
        .unwrap();
    coordinator.drain().await;

    let status = coordinator.status();
    assert!(!status.is_downloading);
    assert_eq!(status.progress, 100.0);
    assert_eq!(
        status.status,
        "error: ERROR: Requested format is not available"
    );
    assert!(status.current_download.is_none());
    assert!(ledger.list().await.unwrap().is_empty());

    // the slot is free again
    assert!(!coordinator.is_downloading());
}

#[tokio::test]
async fn test_output_found_under_sibling_extension() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::Write {
        written_ext: "mkv",
        declared_ext: "webm",
        bytes: 64,
    }));
    let (coordinator, ledger) = coordinator(dir.path(), resolver).await;

    coordinator
        .start_download(request("https://example.com/v/1", Some("merged"), None))
        .unwrap();
    coordinator.drain().await;

    assert_eq!(coordinator.status().status, "completed");
    let records = ledger.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].filename.ends_with(".mkv"));
    assert_eq!(records[0].filesize, 64);
}

#[tokio::test]
async fn test_missing_output_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::Write {
        written_ext: "flv",
        declared_ext: "avi",
        bytes: 8,
    }));
    let (coordinator, ledger) = coordinator(dir.path(), resolver).await;

    coordinator
        .start_download(request("https://example.com/v/1", Some("lost"), None))
        .unwrap();
    coordinator.drain().await;

    let status = coordinator.status();
    assert!(status.status.starts_with("error: downloaded file not found"));
    assert!(ledger.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_format_selection_passthrough_and_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::mp4(1)));
    let (coordinator, _ledger) = coordinator(dir.path(), resolver.clone()).await;

    coordinator
        .start_download(request("https://example.com/v/1", None, Some("137+140")))
        .unwrap();
    coordinator.drain().await;
    coordinator.status();
    assert_eq!(resolver.last_selector.lock().as_deref(), Some("137+140"));

    coordinator
        .start_download(request("https://example.com/v/1", Some("again"), None))
        .unwrap();
    coordinator.drain().await;
    assert_eq!(
        resolver.last_selector.lock().as_deref(),
        Some("best[ext=mp4]/best[ext=webm]/best[ext=mkv]/best")
    );
}

#[tokio::test]
async fn test_invalid_requests_leave_state_idle() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::mp4(1)));
    let (coordinator, _ledger) = coordinator(dir.path(), resolver.clone()).await;

    let cases = [
        request("", Some("clip"), None),
        request("not a url", Some("clip"), None),
        request("https://example.com/v/1", Some("?!*"), None),
    ];
    for case in cases {
        let err = coordinator.start_download(case).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
    }

    let status = coordinator.status();
    assert!(!status.is_downloading);
    assert_eq!(status.status, "idle");
    assert_eq!(resolver.calls(), 0);
}

#[tokio::test]
async fn test_missing_filename_defaults_to_video() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(FakeResolver::new(FetchBehavior::mp4(1)));
    let (coordinator, ledger) = coordinator(dir.path(), resolver).await;

    coordinator
        .start_download(request("https://example.com/v/1", Some("   "), None))
        .unwrap();
    coordinator.drain().await;

    let records = ledger.list().await.unwrap();
    assert!(records[0].filename.starts_with("video_"));
}
