//! Terminal front end for the document-analysis tracker.
//!
//! The binary lives in `main.rs`; this library holds the rendering code so
//! it can be tested without a terminal.

pub mod render;
