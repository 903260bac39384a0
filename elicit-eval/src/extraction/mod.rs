//! Description Extractor and Prediction Generator
//!
//! Human descriptions come from annotation tables, model descriptions from
//! the text-generation collaborator. Both pass through the same annotation
//! cleaning. Predictions map a description onto the command vocabulary.

pub mod cleaning;
pub mod human;
pub mod model;
pub mod pose_frames;
pub mod prediction;
pub mod prompts;

pub use cleaning::clean_annotation;
pub use human::{extract_structured, extract_unstructured};
pub use model::{describe_with_model, FrameSource};
pub use pose_frames::PoseStage;
pub use prediction::{predict_with_model, read_human_predictions, restrict_to_vocabulary};
pub use prompts::{DescriptionPrompt, PredictionPrompt};
