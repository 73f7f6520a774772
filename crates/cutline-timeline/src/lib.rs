//! Cutline Timeline - Timeline data model
//!
//! Maps timeline-time to (source, source-time):
//! - Clips placed at absolute positions with a trim offset
//! - Tracks stacked top to bottom, first covering clip wins
//! - Pure resolution, safe to call from any thread on a snapshot

pub mod clip;
pub mod timeline;
pub mod track;

pub use clip::Clip;
pub use timeline::{Resolution, Timeline};
pub use track::Track;
