//! Shared types for the jobmon monitoring pipeline.
//!
//! Holds the monitor event catalogue, the job/system event contexts carried
//! through the dispatch queue, rule and distribution-group models, and the
//! persisted alert record.

pub mod events;
pub mod id;
pub mod types;
