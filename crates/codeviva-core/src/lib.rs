//! codeviva-core — Exam model, traits, orchestration, and scoring.
//!
//! This crate owns everything an exam session needs that is not I/O bound:
//! the data model, the session state machine, score aggregation, and the
//! request shaping and response normalization around the AI collaborators.

pub mod analysis;
pub mod archive;
pub mod audio;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod model;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod session;
pub mod traits;
