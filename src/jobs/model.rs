//! Job data model: lifecycle states and the status events streamed to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the pending sequence.
    Queued,
    /// Occupying the single execution lane.
    Running,
    /// Search completed and results were delivered.
    Finished,
    /// Search failed, timed out, or the payload was rejected.
    Failed,
}

impl JobState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Queued, Running) | (Running, Finished) | (Running, Failed)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One face-search submission.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// Raw submitted image: base64, optionally behind a `data:` URI prefix.
    pub payload: String,
    /// Number of matches requested from the recognition service.
    pub top_k: usize,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(payload: impl Into<String>, top_k: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: payload.into(),
            top_k,
            state: JobState::Queued,
            enqueued_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Move to `target`, stamping start/end times. States never regress.
    pub fn transition_to(&mut self, target: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                state: self.state.to_string(),
                target: target.to_string(),
            });
        }

        let now = Utc::now();
        match target {
            JobState::Running => self.started_at = Some(now),
            JobState::Finished | JobState::Failed => self.ended_at = Some(now),
            JobState::Queued => {}
        }
        self.state = target;
        Ok(())
    }
}

/// Status events pushed to a submitting client (one JSON object each).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Human-readable progress note.
    Info { message: String },
    /// One search result, in the recognition service's order.
    Match {
        index: usize,
        data: String,
        score: f64,
        original: String,
    },
    /// Snapshot of the job's place in the queue.
    Position {
        #[serde(rename = "jobId")]
        job_id: Uuid,
        position: i64,
    },
    /// Search finished with `count` matches.
    Done { count: usize },
    /// Search failed; the stream ends here.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl StatusEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>, detail: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            detail,
        }
    }

    /// `done` and `error` end a job's event sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued() {
        let job = Job::new("abc", 10);
        assert_eq!(job.state, JobState::Queued);
        assert!(job.started_at.is_none());
        assert!(job.ended_at.is_none());
    }

    #[test]
    fn lifecycle_is_monotonic() {
        let mut job = Job::new("abc", 10);
        job.transition_to(JobState::Running).unwrap();
        assert!(job.started_at.is_some());

        job.transition_to(JobState::Finished).unwrap();
        assert!(job.ended_at.is_some());
        assert!(job.state.is_terminal());

        // Terminal states never move again.
        assert!(job.transition_to(JobState::Running).is_err());
        assert!(job.transition_to(JobState::Failed).is_err());
    }

    #[test]
    fn queued_cannot_skip_running() {
        let mut job = Job::new("abc", 10);
        let err = job.transition_to(JobState::Finished).unwrap_err();
        assert!(err.to_string().contains("queued"));
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn event_wire_shapes() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(StatusEvent::Position {
            job_id: id,
            position: 2,
        })
        .unwrap();
        assert_eq!(json["type"], "position");
        assert_eq!(json["jobId"], id.to_string());
        assert_eq!(json["position"], 2);

        let json = serde_json::to_value(StatusEvent::Done { count: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "done", "count": 2}));

        let json = serde_json::to_value(StatusEvent::Match {
            index: 1,
            data: "data:image/png;base64,AAAA".into(),
            score: 0.92,
            original: "/photos/a.jpg".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "match");
        assert_eq!(json["index"], 1);
        assert_eq!(json["original"], "/photos/a.jpg");
    }

    #[test]
    fn error_detail_is_optional() {
        let json = serde_json::to_value(StatusEvent::error("boom", None)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "message": "boom"}));

        let json =
            serde_json::to_value(StatusEvent::error("boom", Some("why".into()))).unwrap();
        assert_eq!(json["detail"], "why");
    }

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(StatusEvent::Done { count: 0 }.is_terminal());
        assert!(StatusEvent::error("x", None).is_terminal());
        assert!(!StatusEvent::info("x").is_terminal());
    }
}
