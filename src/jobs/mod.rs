//! Search job system: single-lane scheduling with live status streams.
//!
//! - `model`: `Job`, `JobState` (Queued → Running → Finished/Failed), `StatusEvent`
//! - `payload`: base64 / data-URI image decoding and validation
//! - `sink`: `EventSink` trait and the channel-backed sink
//! - `recognizer`: client for the external recognition service
//! - `executor`: runs one job to a terminal event
//! - `queue`: the scheduler (FIFO order, reorder, pause, position lookup)
//! - `channel`: per-submission status stream
//! - `routes` / `ws`: HTTP and WebSocket surface

pub mod channel;
pub mod executor;
pub mod model;
pub mod payload;
pub mod queue;
pub mod recognizer;
pub mod routes;
pub mod sink;
pub mod ws;

pub use channel::{ChannelConfig, StatusChannel};
pub use executor::JobExecutor;
pub use model::{Job, JobState, StatusEvent};
pub use queue::{JobQueue, QueueSnapshot};
pub use recognizer::{HttpRecognizer, RecognizedMatch, Recognizer};
pub use routes::search_routes;
pub use sink::{ChannelSink, EventSink};
