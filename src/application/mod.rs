//! Application layer: the consent flow and the pieces it orchestrates.
//!
//! `ConsentFlowController` runs the six-step sequence for one session. The
//! other modules are the pure helpers it leans on (substitution, extraction,
//! default templates) and the process-wide callback inbox.

pub mod controller;
pub mod correlator;
pub mod defaults;
pub mod extractor;
pub mod substitution;
