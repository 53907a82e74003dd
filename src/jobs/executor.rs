//! Job executor: runs one search from payload validation to a terminal event.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::model::{Job, JobState, StatusEvent};
use super::payload::ImagePayload;
use super::recognizer::{RecognizedMatch, Recognizer};
use super::sink::EventSink;
use crate::error::{Error, UpstreamError};

/// Runs face-search jobs against a [`Recognizer`].
pub struct JobExecutor {
    recognizer: Arc<dyn Recognizer>,
    timeout: Duration,
}

impl JobExecutor {
    pub fn new(recognizer: Arc<dyn Recognizer>, timeout: Duration) -> Self {
        Self {
            recognizer,
            timeout,
        }
    }

    /// Run `job` to completion, emitting exactly one terminal event
    /// (`done` or `error`). Returns the state the job should end in.
    pub async fn run(&self, job: &Job, sink: &dyn EventSink) -> JobState {
        info!(job_id = %job.id, top_k = job.top_k, "Executing job");

        match self.search(job, sink).await {
            Ok(matches) => {
                let count = emit_matches(matches, sink);
                sink.emit(StatusEvent::Done { count });
                info!(job_id = %job.id, count, "Job finished");
                JobState::Finished
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Job failed");
                sink.emit(failure_event(&e));
                JobState::Failed
            }
        }
    }

    async fn search(
        &self,
        job: &Job,
        sink: &dyn EventSink,
    ) -> crate::error::Result<Vec<RecognizedMatch>> {
        let image = ImagePayload::decode(&job.payload)?;

        sink.emit(StatusEvent::info(format!(
            "Searching for up to {} similar faces",
            job.top_k
        )));

        let matches = tokio::time::timeout(self.timeout, self.recognizer.search(&image, job.top_k))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))??;
        Ok(matches)
    }
}

/// Emit one `match` per displayable result, numbered from 1.
fn emit_matches(matches: Vec<RecognizedMatch>, sink: &dyn EventSink) -> usize {
    let mut count = 0;
    for m in matches {
        let Some(data) = m.data_uri else {
            debug!(original = %m.original, "Skipping match without image data");
            continue;
        };
        count += 1;
        sink.emit(StatusEvent::Match {
            index: count,
            data,
            score: m.score,
            original: m.original,
        });
    }
    count
}

fn failure_event(err: &Error) -> StatusEvent {
    match err {
        Error::Validation(e) => StatusEvent::error("Invalid image payload", Some(e.to_string())),
        Error::Upstream(UpstreamError::Timeout(_)) => {
            StatusEvent::error("Search timed out", Some(err.to_string()))
        }
        Error::Upstream(e) => StatusEvent::error("Search failed", Some(e.to_string())),
        other => StatusEvent::error("Search failed", Some(other.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::jobs::payload::tests::png_base64;

    /// Collects emitted events for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingSink(pub(crate) Mutex<Vec<StatusEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: StatusEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl RecordingSink {
        pub(crate) fn events(&self) -> Vec<StatusEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Recognizer with a canned reply that counts its calls.
    pub(crate) struct StubRecognizer {
        pub(crate) reply: Result<Vec<RecognizedMatch>, String>,
        pub(crate) delay: Duration,
        pub(crate) calls: AtomicUsize,
    }

    impl StubRecognizer {
        pub(crate) fn with_matches(n: usize) -> Self {
            let matches = (1..=n)
                .map(|i| RecognizedMatch {
                    data_uri: Some(format!("data:image/jpeg;base64,m{i}")),
                    score: 1.0 - i as f64 / 10.0,
                    original: format!("/photos/{i}.jpg"),
                })
                .collect();
            Self {
                reply: Ok(matches),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(reason: &str) -> Self {
            Self {
                reply: Err(reason.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::with_matches(1)
            }
        }
    }

    #[async_trait]
    impl Recognizer for StubRecognizer {
        async fn search(
            &self,
            _image: &ImagePayload,
            _top_k: usize,
        ) -> Result<Vec<RecognizedMatch>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(UpstreamError::Request)
        }
    }

    fn executor(stub: Arc<StubRecognizer>) -> JobExecutor {
        JobExecutor::new(stub, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn emits_matches_then_done() {
        let stub = Arc::new(StubRecognizer::with_matches(2));
        let sink = RecordingSink::default();
        let job = Job::new(png_base64(), 10);

        let state = executor(stub.clone()).run(&job, &sink).await;
        assert_eq!(state, JobState::Finished);

        let events = sink.events();
        assert!(matches!(events[0], StatusEvent::Info { .. }));
        assert!(matches!(events[1], StatusEvent::Match { index: 1, .. }));
        assert!(matches!(events[2], StatusEvent::Match { index: 2, .. }));
        assert_eq!(events[3], StatusEvent::Done { count: 2 });
        assert_eq!(events.len(), 4);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_payload_never_calls_recognizer() {
        let stub = Arc::new(StubRecognizer::with_matches(2));
        let sink = RecordingSink::default();
        let job = Job::new("", 10);

        let state = executor(stub.clone()).run(&job, &sink).await;
        assert_eq!(state, JobState::Failed);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StatusEvent::Error { message, detail } => {
                assert_eq!(message, "Invalid image payload");
                assert_eq!(detail.as_deref(), Some("No image provided"));
            }
            other => panic!("Expected Error, got {other:?}"),
        }
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upstream_failure_becomes_error_event() {
        let stub = Arc::new(StubRecognizer::failing("connection refused"));
        let sink = RecordingSink::default();
        let job = Job::new(png_base64(), 10);

        let state = executor(stub).run(&job, &sink).await;
        assert_eq!(state, JobState::Failed);

        let events = sink.events();
        let last = events.last().unwrap();
        assert!(last.is_terminal());
        match last {
            StatusEvent::Error { message, detail } => {
                assert_eq!(message, "Search failed");
                assert!(detail.as_deref().unwrap().contains("connection refused"));
            }
            other => panic!("Expected Error, got {other:?}"),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn slow_recognizer_times_out() {
        let stub = Arc::new(StubRecognizer::slow(Duration::from_secs(5)));
        let sink = RecordingSink::default();
        let job = Job::new(png_base64(), 10);

        let started = std::time::Instant::now();
        let state = executor(stub).run(&job, &sink).await;
        assert_eq!(state, JobState::Failed);
        assert!(started.elapsed() < Duration::from_secs(2));

        match sink.events().last().unwrap() {
            StatusEvent::Error { message, .. } => assert_eq!(message, "Search timed out"),
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn matches_without_image_are_skipped() {
        let stub = Arc::new(StubRecognizer {
            reply: Ok(vec![
                RecognizedMatch {
                    data_uri: None,
                    score: 0.99,
                    original: "/photos/missing.jpg".into(),
                },
                RecognizedMatch {
                    data_uri: Some("data:image/png;base64,x".into()),
                    score: 0.8,
                    original: "/photos/kept.png".into(),
                },
            ]),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let sink = RecordingSink::default();
        let job = Job::new(png_base64(), 10);

        executor(stub).run(&job, &sink).await;

        let events = sink.events();
        match &events[1] {
            StatusEvent::Match {
                index, original, ..
            } => {
                assert_eq!(*index, 1);
                assert_eq!(original, "/photos/kept.png");
            }
            other => panic!("Expected Match, got {other:?}"),
        }
        assert_eq!(events.last().unwrap(), &StatusEvent::Done { count: 1 });
    }
}
