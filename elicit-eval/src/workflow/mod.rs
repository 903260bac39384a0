//! Workflow Module
//!
//! Sequences the stages from raw records to the written reports.

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineInputs, PipelineOutcome, PipelineSettings, Scores};
