//! Domain types and pure logic for tracking document-analysis jobs.
//!
//! Nothing in this crate performs I/O. The tracker crate feeds it raw
//! updates from the live channel and the polling fallback; the
//! [`reconcile`] module folds them into one [`status::StatusRecord`].

pub mod document;
pub mod error;
pub mod reconcile;
pub mod status;
pub mod timestamp;
pub mod types;
pub mod update;
