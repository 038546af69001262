//! Decoupled result reporting.
//!
//! The audio callback never performs I/O; it writes the latest frame
//! snapshot (and, at segment end, the finished segment) into a shared
//! single-slot cell. A background thread paces itself against that cell and
//! posts to the collector with short timeouts, dropping anything it cannot
//! deliver.

pub mod payload;
pub mod publisher;

pub use payload::MetricsPayload;
pub use publisher::{MetricsPublisher, Snapshot};
