//! Client for the remote Experimenter data API.
//!
//! A narrow interface: fetch all records in a collection (paginated),
//! fetch one record, update a session's feedback sub-resource. Failures
//! are hard errors — runs abort and are rerun manually, which is safe
//! because the rest of the pipeline is idempotent.

pub mod client;
pub mod error;

pub use client::ExperimenterClient;
pub use error::{ClientError, ClientResult};
