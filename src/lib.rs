//! Batch video compression engine built around the ffmpeg command-line tools.
//!
//! The crate drives ffmpeg/ffprobe as child processes: [`probe`] gathers
//! source metadata, [`progress`] parses the encoder's diagnostic stream,
//! [`job`] runs a single encode, and [`manager`] schedules a batch of them
//! under a concurrency bound while broadcasting [`events::AppEvent`]s.

pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod manager;
pub mod probe;
pub mod progress;
pub mod request;
pub mod tools;

pub use error::{Error, Result};
