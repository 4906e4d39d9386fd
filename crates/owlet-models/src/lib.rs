//! Shared data models for the Owlet research-video backend.
//!
//! This crate provides Serde-serializable types for:
//! - Raw upload filenames and session keys
//! - Raw video records and processed-variant bookkeeping
//! - Session coding records
//! - Coding batches
//! - Remote session/account record shapes
//! - Per-study configuration

pub mod batch;
pub mod coding;
pub mod error;
pub mod filename;
pub mod session;
pub mod study;
pub mod video;

// Re-export common types
pub use batch::{BatchId, BatchMember, BatchRecord};
pub use coding::SessionCodingRecord;
pub use error::{ModelError, ModelResult};
pub use filename::{SessionId, SessionKey, VideoIdentifier, PREVIEW_MARKER, RAW_EXTENSION};
pub use session::{
    AccountRecord, ChildProfile, FrameData, FrameEvent, SessionAttributes, SessionRecord,
    StudySessions,
};
pub use study::{StudyConfig, StudyStrategyKind, TrimSpec};
pub use video::{RawVideoRecord, VariantOutput, VARIANT_TRIMMED, VARIANT_WHOLE};
