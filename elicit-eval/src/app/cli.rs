//! Command-Line Interface

use crate::extraction::PoseStage;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Elicit Eval - score human and model gesture descriptions against ground truth
#[derive(Parser, Debug)]
#[command(name = "elicit-eval")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Where descriptions come from
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeFrom {
    /// Labeled annotation fields
    HumanStructured,
    /// Free-text annotations
    HumanUnstructured,
    /// The text-generation model
    Model,
}

/// Who predicts the command
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictWith {
    /// Recorded human guesses
    Human,
    /// The text-generation model
    Model,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate records, then print the summary
    Load {
        /// Participant JSON file or directory, or elicitation CSV
        #[arg(long)]
        records: PathBuf,

        /// Ground-truth command table
        #[arg(long)]
        ground_truth: PathBuf,
    },

    /// Produce a descriptions table
    Describe {
        /// Description source
        #[arg(value_enum)]
        from: DescribeFrom,

        /// Annotation table (human sources)
        #[arg(long, required_unless_present = "records")]
        input: Option<PathBuf>,

        /// Participant records (model source)
        #[arg(long, requires = "ground_truth")]
        records: Option<PathBuf>,

        /// Ground-truth command table (model source)
        #[arg(long)]
        ground_truth: Option<PathBuf>,

        /// Output descriptions CSV
        #[arg(short, long)]
        output: PathBuf,

        /// Model name (overrides config)
        #[arg(long)]
        model: Option<String>,

        /// Root of the per-gesture hand-pose frame directories
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Part of each frame sent to the model
        #[arg(long, default_value = "poses")]
        stage: PoseStage,
    },

    /// Produce a predictions table
    Predict {
        /// Predictor
        #[arg(value_enum)]
        with: PredictWith,

        /// Wide guess table (human) or descriptions CSV (model)
        #[arg(long)]
        input: PathBuf,

        /// Ground-truth command table, source of the vocabulary
        #[arg(long)]
        ground_truth: PathBuf,

        /// Output predictions CSV
        #[arg(short, long)]
        output: PathBuf,

        /// Model name (overrides config)
        #[arg(long)]
        model: Option<String>,

        /// Predictor source label of recorded guesses
        #[arg(long, default_value = "human")]
        source: String,

        /// Description source the recorded guesses were made from
        #[arg(long, default_value = "human-structured")]
        description_source: String,
    },

    /// Align predictions to ground truth and write score tables
    Score {
        #[arg(long)]
        records: PathBuf,

        #[arg(long)]
        ground_truth: PathBuf,

        /// Descriptions CSVs
        #[arg(long, num_args = 1..)]
        descriptions: Vec<PathBuf>,

        /// Predictions CSVs
        #[arg(long, num_args = 1.., required = true)]
        predictions: Vec<PathBuf>,

        /// Root for outputs/ and pgf/ (defaults to the configured directories)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Run the statistical tests on a scores table
    Stats {
        /// scores.csv
        #[arg(long)]
        scores: PathBuf,

        /// Root for outputs/ (defaults to the configured directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Load, score and test in one go
    Run {
        #[arg(long)]
        records: PathBuf,

        #[arg(long)]
        ground_truth: PathBuf,

        #[arg(long, num_args = 1..)]
        descriptions: Vec<PathBuf>,

        #[arg(long, num_args = 1.., required = true)]
        predictions: Vec<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Initialize configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// View or reset configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a specific configuration value
    Get {
        /// Dotted key, e.g. "collaborator.model"
        key: String,
    },

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
