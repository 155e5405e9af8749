//! End-to-end training scenarios against the session manager
//!
//! These tests exercise the manager/engine/pool stack without the HTTP
//! layer: the happy path with real learning, pause/resume pacing, numeric
//! failure capture, and the polling invariants (monotone epochs,
//! append-only prefixes, terminal absorption).

use adiestra::dataset::DatasetRegistry;
use adiestra::model::LayerSpec;
use adiestra::train::Prediction;
use adiestra::{ManagerConfig, SessionManager, SessionStatus, TrainRequest, TrainingSession};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn manager() -> SessionManager {
    SessionManager::new(
        Arc::new(DatasetRegistry::with_builtins()),
        ManagerConfig::default(),
    )
}

fn iris_layers() -> Vec<LayerSpec> {
    vec![
        LayerSpec::Input {
            neurons: Some(4),
            activation: None,
            position: Some(0),
        },
        LayerSpec::Hidden {
            neurons: 16,
            activation: "relu".to_string(),
            position: Some(1),
        },
        LayerSpec::Output {
            neurons: Some(3),
            activation: Some("softmax".to_string()),
            position: Some(2),
        },
    ]
}

fn iris_request(model_id: &str, epochs: usize, learning_rate: f32) -> TrainRequest {
    TrainRequest {
        model_id: model_id.to_string(),
        dataset_id: "iris".to_string(),
        layers: iris_layers(),
        epochs: Some(epochs),
        learning_rate: Some(learning_rate),
        batch_size: Some(16),
        optimizer: Some("adam".to_string()),
        max_samples: Some(100),
    }
}

fn wait_terminal(manager: &SessionManager, session_id: &str) -> TrainingSession {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let snapshot = manager.get_session(session_id, 0).unwrap();
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "session {session_id} did not terminate in time"
        );
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn iris_happy_path_learns() {
    let manager = manager();
    let session = manager
        .start_training(iris_request("model-happy", 10, 0.01))
        .unwrap();

    let done = wait_terminal(&manager, &session.session_id);
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.metrics.len(), 10);

    for metric in &done.metrics {
        let accuracy = metric.accuracy.expect("classification accuracy");
        assert!((0.0..=1.0).contains(&accuracy));
        assert!(metric.loss.is_finite());
    }
    let final_accuracy = done.metrics.last().unwrap().accuracy.unwrap();
    assert!(
        final_accuracy >= 0.7,
        "final iris accuracy {final_accuracy} below 0.7"
    );
}

#[test]
fn metrics_are_monotone_and_append_only() {
    let manager = manager();
    let session = manager
        .start_training(iris_request("model-poll", 2_000, 0.01))
        .unwrap();
    let id = session.session_id.clone();

    let mut previous: Vec<u32> = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let snapshot = manager.get_session(&id, 0).unwrap();
        let epochs: Vec<u32> = snapshot.metrics.iter().map(|m| m.epoch).collect();

        // Strictly increasing from 1
        for (i, &epoch) in epochs.iter().enumerate() {
            assert_eq!(epoch, i as u32 + 1);
        }
        // Earlier polls are a prefix of later ones
        assert!(epochs.starts_with(&previous), "append-only violated");
        previous = epochs;

        if snapshot.status.is_terminal() {
            break;
        }
        if snapshot.current_epoch > 50 {
            manager.stop(&id).unwrap();
        }
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn terminal_status_is_absorbing() {
    let manager = manager();
    let session = manager
        .start_training(iris_request("model-term", 3, 0.01))
        .unwrap();
    let done = wait_terminal(&manager, &session.session_id);

    for _ in 0..5 {
        thread::sleep(Duration::from_millis(10));
        let again = manager.get_session(&session.session_id, 0).unwrap();
        assert_eq!(again.status, done.status);
        assert_eq!(again.current_epoch, done.current_epoch);
        assert_eq!(again.metrics.len(), done.metrics.len());
        assert_eq!(again.end_time, done.end_time);
    }
}

#[test]
fn numeric_failure_is_captured_not_thrown() {
    let manager = manager();
    let session = manager
        .start_training(iris_request("model-diverge", 30, 1e6))
        .unwrap();

    let done = wait_terminal(&manager, &session.session_id);
    assert_eq!(done.status, SessionStatus::Failed);
    assert!(!done.metrics.is_empty());
    let message = done.error_message.expect("failure message recorded");
    assert!(
        message.contains("Diverged") || message.contains("NumericNaN"),
        "unexpected failure message: {message}"
    );
}

#[test]
fn pause_freezes_progress_and_resume_continues() {
    let manager = manager();
    let session = manager
        .start_training(iris_request("model-pause", 20_000, 0.01))
        .unwrap();
    let id = session.session_id.clone();

    // Let at least one epoch land
    let deadline = Instant::now() + Duration::from_secs(30);
    while manager.get_session(&id, 0).unwrap().current_epoch < 1 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }

    manager.pause(&id).unwrap();
    let deadline = Instant::now() + Duration::from_secs(30);
    while manager.get_session(&id, 0).unwrap().status != SessionStatus::Paused {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }

    // Two observations apart in time: the epoch counter must not move
    let first = manager.get_session(&id, 0).unwrap().current_epoch;
    thread::sleep(Duration::from_millis(150));
    let second = manager.get_session(&id, 0).unwrap().current_epoch;
    assert_eq!(first, second, "paused session advanced");

    manager.resume(&id).unwrap();
    let deadline = Instant::now() + Duration::from_secs(30);
    while manager.get_session(&id, 0).unwrap().current_epoch <= second {
        let status = manager.get_session(&id, 0).unwrap().status;
        assert!(!status.is_terminal(), "session ended before advancing");
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }

    manager.stop(&id).unwrap();
    let done = wait_terminal(&manager, &id);
    assert_eq!(done.status, SessionStatus::Stopped);
}

#[test]
fn stop_honored_within_one_epoch() {
    let manager = manager();
    let session = manager
        .start_training(iris_request("model-stop", 20_000, 0.01))
        .unwrap();
    let id = session.session_id.clone();

    let deadline = Instant::now() + Duration::from_secs(30);
    while manager.get_session(&id, 0).unwrap().current_epoch < 2 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }

    let acknowledged_at = manager.stop(&id).unwrap().current_epoch;
    let done = wait_terminal(&manager, &id);
    assert_eq!(done.status, SessionStatus::Stopped);
    // At most the epoch in progress at acknowledgment time completes
    assert!(done.current_epoch <= acknowledged_at + 1);

    // Idempotent on the now-stopped session
    let again = manager.stop(&id).unwrap();
    assert_eq!(again.status, SessionStatus::Stopped);
}

#[test]
fn prediction_is_reproducible_and_gated() {
    let manager = manager();
    let session = manager
        .start_training(iris_request("model-pred", 8, 0.01))
        .unwrap();
    let id = session.session_id.clone();

    let done = wait_terminal(&manager, &id);
    assert_eq!(done.status, SessionStatus::Completed);

    let a = manager.predict(&id, &[6.3, 3.3, 6.0, 2.5]).unwrap();
    let b = manager.predict(&id, &[6.3, 3.3, 6.0, 2.5]).unwrap();
    assert_eq!(a, b);

    match a {
        Prediction::Classification {
            prediction,
            probabilities,
            confidence,
        } => {
            assert!(prediction < 3);
            assert_eq!(probabilities.len(), 3);
            assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-4);
            assert!((0.0..=1.0).contains(&confidence));
        }
        other => panic!("expected classification, got {other:?}"),
    }
}

#[test]
fn queued_sessions_wait_for_a_free_worker() {
    // One worker: the second session stays pending until the first ends
    let manager = manager();
    let first = manager
        .start_training(iris_request("model-q1", 20_000, 0.01))
        .unwrap();
    let second = manager
        .start_training(iris_request("model-q2", 2, 0.01))
        .unwrap();

    thread::sleep(Duration::from_millis(100));
    let queued = manager.get_session(&second.session_id, 0).unwrap();
    assert_eq!(
        queued.status,
        SessionStatus::Pending,
        "queued session must stay pending while the worker is busy"
    );

    manager.stop(&first.session_id).unwrap();
    wait_terminal(&manager, &first.session_id);
    let done = wait_terminal(&manager, &second.session_id);
    assert_eq!(done.status, SessionStatus::Completed);
}

#[test]
fn conv_architecture_trains_on_image_dataset() {
    let manager = manager();
    let layers = vec![
        LayerSpec::Input {
            neurons: None,
            activation: None,
            position: Some(0),
        },
        LayerSpec::Conv2d {
            filters: 4,
            kernel: 3,
            activation: "relu".to_string(),
            position: Some(1),
        },
        LayerSpec::Maxpool2d {
            pool: 2,
            position: Some(2),
        },
        LayerSpec::Flatten { position: Some(3) },
        LayerSpec::Hidden {
            neurons: 16,
            activation: "relu".to_string(),
            position: Some(4),
        },
        LayerSpec::Output {
            neurons: None,
            activation: None,
            position: Some(5),
        },
    ];
    let session = manager
        .start_training(TrainRequest {
            model_id: "model-conv".to_string(),
            dataset_id: "blocks".to_string(),
            layers,
            epochs: Some(3),
            learning_rate: Some(0.005),
            batch_size: Some(32),
            optimizer: Some("adam".to_string()),
            max_samples: Some(200),
        })
        .unwrap();

    let done = wait_terminal(&manager, &session.session_id);
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.metrics.len(), 3);
    assert!(done.metrics.iter().all(|m| m.loss.is_finite()));
}
