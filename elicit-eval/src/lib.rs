//! # Elicit Eval
//!
//! Scoring and statistics pipeline for a gesture elicitation study comparing
//! human- and model-written descriptions of mid-air hand gestures, and how
//! well each description predicts the command the gesture was meant for.
//!
//! ## Overview
//!
//! Raw elicitation records and a ground-truth command table are loaded into
//! typed [`GestureRecord`]s. Descriptions come from human annotation tables
//! or from a text-generation model; predictions come from recorded human
//! guesses or from the model classifying a description. Everything is joined
//! back to ground truth, scored, aggregated and run through ANOVA,
//! chi-square and Tukey HSD.
//!
//! ## Quick Start
//!
//! ```no_run
//! use elicit_eval::app::config::Config;
//! use elicit_eval::workflow::{Pipeline, PipelineInputs};
//!
//! let config = Config::default();
//! let pipeline = Pipeline::offline(&config).expect("invalid config");
//! let inputs = PipelineInputs {
//!     records: "dataset/participants".into(),
//!     ground_truth: "dataset/ground_truth.csv".into(),
//!     descriptions: vec!["data/descriptions.csv".into()],
//!     predictions: vec!["data/predictions.csv".into()],
//! };
//! let outcome = pipeline.run(&inputs, &config.output_dirs()).expect("pipeline failed");
//! println!("{}", outcome.summary);
//! ```
//!
//! ## Architecture
//!
//! - [`records`]: typed entities, record loading, wide annotation tables, vocabulary
//! - [`extraction`]: annotation cleaning, human/model descriptions, predictions
//! - [`collaborator`]: text-generation client, retry, response cache, worker pool
//! - [`scoring`]: similarity metrics, alignment to ground truth, aggregation
//! - [`stats`]: ANOVA, chi-square, Tukey HSD
//! - [`report`]: CSV tables, statistics report, pgfplots figures, run summary
//! - [`workflow`]: the pipeline object sequencing the stages
//! - [`app`]: CLI and configuration management
//!
//! ## Data Flow
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │   Records   │───▶│ Description │───▶│ Prediction  │───▶│  Alignment  │
//! │ + ground    │    │  Extractor  │    │  Generator  │    │  & Scoring  │
//! │   truth     │    └─────────────┘    └─────────────┘    └─────────────┘
//! └─────────────┘                                                 │
//!                                                                 ▼
//!                    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//!                    │   outputs/  │◀───│ Statistical │◀───│ Aggregation │
//!                    │    pgf/     │    │ Test Runner │    │             │
//!                    └─────────────┘    └─────────────┘    └─────────────┘
//! ```

pub mod records;
pub mod extraction;
pub mod collaborator;
pub mod scoring;
pub mod stats;
pub mod report;
pub mod workflow;
pub mod app;

// Re-export commonly used types
pub use records::types::{
    AggregateStat, Description, DescriptionSource, GestureRecord, PredictedCommand, Prediction,
    PredictorSource, RecordKey, ScoreRow,
};
pub use records::vocabulary::CommandVocabulary;
pub use collaborator::CollaboratorError;
pub use workflow::Pipeline;

/// Result type alias for the evaluation pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the evaluation pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing key {key}: {detail}")]
    MissingKey { key: RecordKey, detail: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Out of vocabulary command: {0:?}")]
    OutOfVocabulary(String),

    #[error("Command vocabulary is empty")]
    EmptyVocabulary,

    #[error("Excluded {excluded} of {total} records (rate {rate:.3} exceeds limit {limit:.3})")]
    ExclusionThreshold {
        excluded: usize,
        total: usize,
        rate: f64,
        limit: f64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
