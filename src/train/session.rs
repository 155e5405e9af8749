//! Training session records
//!
//! `TrainingSession` is the live progress record owned by a training
//! engine. Readers always receive snapshot copies; the metrics list is
//! append-only and ordered by epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Poll hint while a session is still producing epochs
pub const POLL_INTERVAL_ACTIVE: f64 = 1.5;
/// Poll hint once a session is terminal
pub const POLL_INTERVAL_TERMINAL: f64 = 5.0;

/// Hook invoked by the engine on every observable session change: the
/// running transition, each metric append, pause/resume, and the terminal
/// transition. Persistence backends attach here for write-through.
pub trait SessionObserver: Send + Sync {
    fn on_update(&self, session: &TrainingSession);
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl SessionStatus {
    /// Terminal states are absorbing
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Stopped | SessionStatus::Failed
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SessionStatus::Pending),
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "stopped" => Ok(SessionStatus::Stopped),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("Invalid status: {other}")),
        }
    }
}

/// One epoch's recorded metrics
///
/// `accuracy` is `None` for regression tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetric {
    pub epoch: u32,
    pub loss: f64,
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Live progress record for one training session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub session_id: String,
    pub model_id: String,
    pub dataset_id: String,
    pub status: SessionStatus,
    pub total_epochs: u32,
    pub current_epoch: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub metrics: Vec<TrainingMetric>,
    pub error_message: Option<String>,
}

impl TrainingSession {
    pub fn new(
        session_id: impl Into<String>,
        model_id: impl Into<String>,
        dataset_id: impl Into<String>,
        total_epochs: u32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            model_id: model_id.into(),
            dataset_id: dataset_id.into(),
            status: SessionStatus::Pending,
            total_epochs,
            current_epoch: 0,
            start_time: Utc::now(),
            end_time: None,
            metrics: Vec::new(),
            error_message: None,
        }
    }

    /// Fractional progress through the configured epochs
    pub fn progress(&self) -> f64 {
        if self.total_epochs == 0 {
            return 0.0;
        }
        (self.current_epoch as f64 / self.total_epochs as f64).clamp(0.0, 1.0)
    }

    /// Recommended delay before the next poll (seconds)
    pub fn poll_interval_seconds(&self) -> f64 {
        if self.status.is_terminal() {
            POLL_INTERVAL_TERMINAL
        } else {
            POLL_INTERVAL_ACTIVE
        }
    }

    /// Snapshot with metrics filtered to `epoch > since_epoch`
    pub fn snapshot_since(&self, since_epoch: u32) -> TrainingSession {
        let mut snapshot = self.clone();
        if since_epoch > 0 {
            snapshot.metrics.retain(|m| m.epoch > since_epoch);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Running,
            SessionStatus::Paused,
            SessionStatus::Completed,
            SessionStatus::Stopped,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<SessionStatus>(), Ok(status));
        }
        assert!("killed".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Stopped.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_new_session_is_pending() {
        let session = TrainingSession::new("sess-1", "model-1", "iris", 10);
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.current_epoch, 0);
        assert!(session.metrics.is_empty());
        assert!(session.end_time.is_none());
    }

    #[test]
    fn test_progress() {
        let mut session = TrainingSession::new("s", "m", "d", 10);
        assert_eq!(session.progress(), 0.0);
        session.current_epoch = 5;
        assert_eq!(session.progress(), 0.5);
        session.current_epoch = 10;
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn test_poll_interval_hint() {
        let mut session = TrainingSession::new("s", "m", "d", 10);
        assert_eq!(session.poll_interval_seconds(), POLL_INTERVAL_ACTIVE);
        session.status = SessionStatus::Completed;
        assert_eq!(session.poll_interval_seconds(), POLL_INTERVAL_TERMINAL);
    }

    #[test]
    fn test_snapshot_since_filters_metrics() {
        let mut session = TrainingSession::new("s", "m", "d", 5);
        for epoch in 1..=5 {
            session.metrics.push(TrainingMetric {
                epoch,
                loss: 1.0 / epoch as f64,
                accuracy: Some(0.5),
                timestamp: Utc::now(),
            });
        }
        let snapshot = session.snapshot_since(3);
        let epochs: Vec<u32> = snapshot.metrics.iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![4, 5]);
        // The full record is untouched
        assert_eq!(session.metrics.len(), 5);
    }
}
