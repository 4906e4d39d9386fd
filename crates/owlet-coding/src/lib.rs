//! Session reconciliation, batching, and coding sheets.
//!
//! The orchestrating crate of the pipeline: it matches expected session
//! videos against discovered raw uploads, drives the media engine to
//! produce labeled/trimmed clips and per-session artifacts, partitions
//! trimmed clips into coding batches, and round-trips CSV coding sheets.
//! All state lives in the snapshot store; every expensive step checks for
//! its own output first, so reruns after partial failures are cheap and
//! safe.

pub mod batching;
pub mod clips;
pub mod coding;
pub mod config;
pub mod context;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod reconcile;
pub mod sheets;
pub mod study;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::OwletConfig;
pub use context::{CodingData, RunContext, VideoData};
pub use error::{CodingError, CodingResult};
