mod common;

use catalogdrop::common::{EngineConfig, UploadError};
use catalogdrop::progress::{DisplayState, PhaseLabel, SessionStatus};
use catalogdrop::session::SessionController;
use common::{csv_file, eventually, test_config, wait_for, FakeApi};
use std::time::Duration;
use tokio::sync::watch;

fn is_streaming(s: &DisplayState) -> bool {
    s.status == SessionStatus::Streaming
}

fn is_idle(s: &DisplayState) -> bool {
    s.status == SessionStatus::Idle
}

/// Collect every published percent until the session returns to Idle
fn record_percents(mut rx: watch::Receiver<DisplayState>) -> tokio::task::JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if state.status == SessionStatus::Idle {
                break;
            }
            seen.push(state.overall_percent);
        }
        seen
    })
}

#[tokio::test]
async fn test_upload_validate_complete_then_settle() {
    let (api, mut control) = FakeApi::new(vec![(500, 1000)]);
    let config = EngineConfig {
        settle_delay_ms: 50,
        ..test_config()
    };
    let controller = SessionController::new(api.clone(), config);
    let mut rx = controller.subscribe();
    let recorder = record_percents(controller.subscribe());

    controller.start(Some(csv_file(1000))).unwrap();

    let state = wait_for(&mut rx, |s| s.overall_percent == 15).await;
    assert_eq!(state.phase, PhaseLabel::Uploading);
    assert_eq!(state.status, SessionStatus::Uploading);

    control.accept("job-42");
    wait_for(&mut rx, is_streaming).await;
    assert_eq!(controller.job_id().unwrap().as_str(), "job-42");

    assert!(control.send(r#"{"status": "Validating", "progress": 60}"#));
    let state = wait_for(&mut rx, |s| s.overall_percent == 72).await;
    assert_eq!(state.phase, PhaseLabel::Validating);
    assert_eq!(state.status, SessionStatus::Streaming);

    assert!(control.send(r#"{"status": "Completed", "progress": 100}"#));
    let state = wait_for(&mut rx, |s| s.status == SessionStatus::Completed).await;
    assert_eq!(state.overall_percent, 100);
    assert_eq!(state.phase, PhaseLabel::Completed);

    assert!(eventually(|| api.stream_drops() == 1).await);
    assert!(!controller.is_subscribed());

    let state = wait_for(&mut rx, is_idle).await;
    assert_eq!(state, DisplayState::default());
    assert_eq!(controller.job_id(), None);

    let seen = recorder.await.unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "percent went backwards: {:?}", seen);
    assert_eq!(seen.last(), Some(&100));
    assert_eq!(api.subscribes(), 1);
    assert_eq!(api.stream_drops(), 1);
}

#[tokio::test]
async fn test_server_error_is_terminal_until_acknowledged() {
    let (api, mut control) = FakeApi::new(vec![(1000, 1000)]);
    let config = EngineConfig {
        settle_delay_ms: 10,
        ..test_config()
    };
    let controller = SessionController::new(api.clone(), config);
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    control.accept("job-7");
    wait_for(&mut rx, is_streaming).await;

    assert!(control.send(r#"{"status": "Parsing CSV", "progress": 20}"#));
    wait_for(&mut rx, |s| s.phase == PhaseLabel::ParsingCsv).await;

    assert!(control.send(r#"{"status": "Error", "error": "duplicate SKU at row 4821"}"#));
    let state = wait_for(&mut rx, |s| s.status == SessionStatus::Error).await;
    assert_eq!(state.error_message.as_deref(), Some("duplicate SKU at row 4821"));
    assert_eq!(state.phase, PhaseLabel::Error);
    assert_eq!(
        controller.last_error(),
        Some(UploadError::ServerReported("duplicate SKU at row 4821".to_string()))
    );

    assert!(eventually(|| api.stream_drops() == 1).await);
    assert!(!controller.is_subscribed());

    // no settle timer for failures
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.display().status, SessionStatus::Error);

    assert_eq!(
        controller.start(Some(csv_file(10))),
        Err(UploadError::UnacknowledgedError)
    );
    assert!(controller.acknowledge());
    assert_eq!(controller.display(), DisplayState::default());
}

#[tokio::test]
async fn test_upload_failure_never_opens_stream() {
    let (api, mut control) = FakeApi::new(vec![]);
    let controller = SessionController::new(api.clone(), test_config());
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    control.reject(UploadError::Transport("No file provided".to_string()));

    let state = wait_for(&mut rx, |s| s.status == SessionStatus::Error).await;
    assert_eq!(
        state.error_message.as_deref(),
        Some("Upload request failed: No file provided")
    );
    assert_eq!(controller.job_id(), None);
    assert_eq!(api.subscribes(), 0);
}

#[tokio::test]
async fn test_cancel_closes_stream_once_and_ignores_late_messages() {
    let (api, mut control) = FakeApi::new(vec![(1000, 1000)]);
    let controller = SessionController::new(api.clone(), test_config());
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    control.accept("job-9");
    wait_for(&mut rx, is_streaming).await;
    assert!(control.send(r#"{"status": "Importing", "progress": 10}"#));
    wait_for(&mut rx, |s| s.phase == PhaseLabel::Importing).await;

    assert!(controller.cancel());
    assert_eq!(controller.display(), DisplayState::default());
    assert!(!controller.is_subscribed());
    assert!(eventually(|| api.stream_drops() == 1).await);

    // nothing is listening any more
    control.send(r#"{"status": "Completed", "progress": 100}"#);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.display(), DisplayState::default());

    assert!(!controller.cancel());
    assert_eq!(api.stream_drops(), 1);
}

#[tokio::test]
async fn test_cancel_during_upload_discards_job() {
    let (api, mut control) = FakeApi::new(vec![(200, 1000)]);
    let controller = SessionController::new(api.clone(), test_config());
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    wait_for(&mut rx, |s| s.overall_percent == 6).await;

    assert!(controller.cancel());
    control.accept("job-late");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(controller.display(), DisplayState::default());
    assert_eq!(controller.job_id(), None);
    assert_eq!(api.subscribes(), 0);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_active() {
    let (api, _control) = FakeApi::new(vec![]);
    let controller = SessionController::new(api.clone(), test_config());

    controller.start(Some(csv_file(1000))).unwrap();
    assert_eq!(
        controller.start(Some(csv_file(1000))),
        Err(UploadError::SessionActive)
    );
    assert!(eventually(|| api.uploads.load(std::sync::atomic::Ordering::SeqCst) == 1).await);
    assert_eq!(controller.display().status, SessionStatus::Uploading);
}

#[tokio::test]
async fn test_missing_file_is_rejected() {
    let (api, _control) = FakeApi::new(vec![]);
    let controller = SessionController::new(api, test_config());

    let err = controller.start(None).unwrap_err();
    assert!(matches!(err, UploadError::InvalidInput(_)));
    assert_eq!(controller.display(), DisplayState::default());
}

#[tokio::test]
async fn test_simulator_fills_transfer_band_without_byte_progress() {
    let (api, _control) = FakeApi::new(vec![]);
    let config = EngineConfig {
        simulator_tick_ms: 5,
        ..test_config()
    };
    let controller = SessionController::new(api, config);
    let mut rx = controller.subscribe();
    let recorder = record_percents(controller.subscribe());

    controller.start(Some(csv_file(1000))).unwrap();
    let state = wait_for(&mut rx, |s| s.overall_percent == 30).await;
    assert_eq!(state.status, SessionStatus::Uploading);
    assert_eq!(state.phase, PhaseLabel::Uploading);

    controller.cancel();
    let seen = recorder.await.unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "percent went backwards: {:?}", seen);
    assert!(seen.iter().all(|p| *p <= 30));
}

#[tokio::test]
async fn test_malformed_payload_is_skipped() {
    let (api, mut control) = FakeApi::new(vec![(1000, 1000)]);
    let controller = SessionController::new(api, test_config());
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    control.accept("job-3");
    wait_for(&mut rx, is_streaming).await;

    assert!(control.send("{oops"));
    assert!(control.send(r#"{"status": "Teleporting", "progress": 50}"#));
    assert!(control.send(r#"{"status": "Importing", "progress": 80}"#));

    let state = wait_for(&mut rx, |s| s.overall_percent == 86).await;
    assert_eq!(state.phase, PhaseLabel::Importing);
    assert_eq!(state.status, SessionStatus::Streaming);
}

#[tokio::test]
async fn test_stream_dropping_mid_job_fails_session() {
    let (api, mut control) = FakeApi::new(vec![(1000, 1000)]);
    let controller = SessionController::new(api, test_config());
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    control.accept("job-5");
    wait_for(&mut rx, is_streaming).await;

    assert!(control.fail_stream("connection reset"));
    let state = wait_for(&mut rx, |s| s.status == SessionStatus::Error).await;
    assert_eq!(
        state.error_message.as_deref(),
        Some("Progress stream failed: connection reset")
    );
}

#[tokio::test]
async fn test_unmount_tears_down_session() {
    let (api, mut control) = FakeApi::new(vec![(1000, 1000)]);
    let controller = SessionController::new(api.clone(), test_config());
    let mut rx = controller.subscribe();

    let guard = controller.mount();
    controller.start(Some(csv_file(1000))).unwrap();
    control.accept("job-11");
    wait_for(&mut rx, is_streaming).await;

    drop(guard);
    assert_eq!(controller.display().status, SessionStatus::Idle);
    assert!(eventually(|| api.stream_drops() == 1).await);
}

#[tokio::test]
async fn test_silent_stream_trips_idle_watchdog() {
    let (api, mut control) = FakeApi::new(vec![(1000, 1000)]);
    let config = EngineConfig {
        stream_idle_timeout_secs: Some(1),
        ..test_config()
    };
    let controller = SessionController::new(api.clone(), config);
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    control.accept("job-12");
    wait_for(&mut rx, is_streaming).await;
    assert!(control.send(r#"{"status": "Validating", "progress": 40}"#));
    wait_for(&mut rx, |s| s.phase == PhaseLabel::Validating).await;

    let state = wait_for(&mut rx, |s| s.status == SessionStatus::Error).await;
    assert_eq!(
        state.error_message.as_deref(),
        Some("Progress stream failed: no progress received for 1s")
    );
    assert!(matches!(
        controller.last_error(),
        Some(UploadError::StreamTransport(_))
    ));
    assert!(!controller.is_subscribed());
    assert!(eventually(|| api.stream_drops() == 1).await);
}

#[tokio::test]
async fn test_idle_watchdog_is_silent_after_completion() {
    let (api, mut control) = FakeApi::new(vec![(1000, 1000)]);
    let config = EngineConfig {
        stream_idle_timeout_secs: Some(1),
        ..test_config()
    };
    let controller = SessionController::new(api.clone(), config);
    let mut rx = controller.subscribe();

    controller.start(Some(csv_file(1000))).unwrap();
    control.accept("job-13");
    wait_for(&mut rx, is_streaming).await;
    assert!(control.send(r#"{"status": "Completed", "progress": 100}"#));
    wait_for(&mut rx, |s| s.status == SessionStatus::Completed).await;

    // well past the watchdog deadline
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let state = controller.display();
    assert_eq!(state.status, SessionStatus::Completed);
    assert_eq!(state.overall_percent, 100);
    assert_eq!(state.error_message, None);
    assert_eq!(controller.last_error(), None);
    assert_eq!(api.stream_drops(), 1);
}
