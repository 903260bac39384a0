//! Study Records
//!
//! Typed entities, the record loader, CSV input helpers and the closed
//! command vocabulary.

pub mod types;
pub mod csv_input;
pub mod loader;
pub mod vocabulary;

pub use types::{
    AggregateStat, Description, DescriptionSource, GestureRecord, PredictedCommand, Prediction,
    PredictorSource, RecordKey, ScoreRow,
};
pub use loader::load_records;
pub use vocabulary::{normalize_command, CommandVocabulary};
