//! face-queue: single-lane face search scheduler with streamed status.

pub mod config;
pub mod error;
pub mod jobs;
