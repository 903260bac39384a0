//! Alignment & Scoring Engine
//!
//! Joins predictions and descriptions back to ground truth, scores
//! correctness and description similarity, and aggregates the results.

pub mod aggregation;
pub mod alignment;
pub mod similarity;

pub use aggregation::{aggregate, similarity_matrix, ScoreGrouping};
pub use alignment::{align, AlignmentReport};
pub use similarity::{metric_by_name, SimilarityMetric, TfCosine, TokenJaccard};
