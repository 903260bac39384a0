//! Pipeline
//!
//! Sequences loading, description, prediction, scoring and statistics, and
//! accumulates one [`RunSummary`] across every stage it runs.

use crate::app::config::Config;
use crate::collaborator::client::ChatCompletionsClient;
use crate::collaborator::{Collaborator, CollaboratorError, TextGenerator};
use crate::extraction::{self, FrameSource, PredictionPrompt};
use crate::records::types::{
    AggregateStat, Description, DescriptionSource, GestureRecord, Prediction, PredictorSource, ScoreRow,
};
use crate::records::loader::read_ground_truth;
use crate::records::{load_records, CommandVocabulary};
use crate::report::{self, tables, OutputDirs, RunSummary};
use crate::scoring::{aggregate, align, metric_by_name, similarity_matrix, AlignmentReport, SimilarityMetric};
use crate::stats::{run_study_tests, StatsSettings, StudyTests};
use std::path::{Path, PathBuf};
use tracing::info;

/// Runtime settings of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Largest share of records that may be excluded at load time
    pub max_exclusion_rate: f64,
    /// Minimum similarity for snapping free-text answers onto the vocabulary
    pub min_snap_similarity: f64,
    /// `jaccard` or `cosine`
    pub similarity_metric: String,
    /// Description source that similarity is measured against
    pub reference_source: DescriptionSource,
    pub stats: StatsSettings,
    /// Replaces the default usage context of the prediction prompt
    pub prediction_context: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_exclusion_rate: 0.2,
            min_snap_similarity: 0.5,
            similarity_metric: "jaccard".to_string(),
            reference_source: DescriptionSource::HumanStructured,
            stats: StatsSettings::default(),
            prediction_context: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self {
            max_exclusion_rate: config.loader.max_exclusion_rate,
            min_snap_similarity: config.scoring.min_snap_similarity,
            similarity_metric: config.scoring.similarity_metric.clone(),
            reference_source: config.reference_source()?,
            stats: config.stats_settings(),
            prediction_context: config.collaborator.prediction_context.clone(),
        })
    }
}

/// Input files of a full run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInputs {
    /// Participant JSON directory or elicitation CSV
    pub records: PathBuf,
    pub ground_truth: PathBuf,
    /// `descriptions.csv` tables, concatenated
    pub descriptions: Vec<PathBuf>,
    /// `predictions.csv` tables, concatenated
    pub predictions: Vec<PathBuf>,
}

/// Result of the scoring stage
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub report: AlignmentReport,
    pub aggregates: Vec<AggregateStat>,
    /// Pairwise similarity between description sources
    pub similarity_matrix: Vec<AggregateStat>,
}

/// Everything a full run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub records: usize,
    pub scores: Scores,
    pub tests: StudyTests,
    pub summary: RunSummary,
    pub dirs: OutputDirs,
}

/// The evaluation pipeline.
///
/// Stages can be called one at a time (the CLI does) or all at once with
/// [`Pipeline::run`]. Stages that call the text-generation collaborator
/// fail with [`CollaboratorError::NotConfigured`] on an offline pipeline.
pub struct Pipeline<G = ChatCompletionsClient> {
    settings: PipelineSettings,
    metric: Box<dyn SimilarityMetric>,
    collaborator: Option<Collaborator<G>>,
}

impl Pipeline<ChatCompletionsClient> {
    /// Pipeline without a collaborator, for stages that only read tables
    pub fn offline(config: &Config) -> crate::Result<Self> {
        Self::build(PipelineSettings::from_config(config)?, None)
    }

    /// Pipeline talking to the configured chat-completions endpoint.
    ///
    /// `model` overrides the configured model.
    pub fn from_config(config: &Config, model: Option<&str>) -> crate::Result<Self> {
        let client = config.chat_client();
        if !client.is_configured() {
            return Err(CollaboratorError::NotConfigured(format!(
                "set {} to call {}",
                config.collaborator.provider.key_variable(),
                config.collaborator.model
            ))
            .into());
        }
        let collaborator = Collaborator::new(client, config.generation_settings(model))
            .with_cache(config.response_cache())
            .with_policy(config.retry_policy())
            .with_concurrency(config.collaborator.concurrency);
        Self::build(PipelineSettings::from_config(config)?, Some(collaborator))
    }
}

impl<G: TextGenerator + 'static> Pipeline<G> {
    fn build(settings: PipelineSettings, collaborator: Option<Collaborator<G>>) -> crate::Result<Self> {
        let metric = metric_by_name(&settings.similarity_metric)?;
        Ok(Self {
            settings,
            metric,
            collaborator,
        })
    }

    /// Pipeline with an explicit collaborator
    pub fn with_collaborator(settings: PipelineSettings, collaborator: Collaborator<G>) -> crate::Result<Self> {
        Self::build(settings, Some(collaborator))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn collaborator(&self) -> crate::Result<&Collaborator<G>> {
        self.collaborator.as_ref().ok_or_else(|| {
            CollaboratorError::NotConfigured("pipeline was built without a collaborator".to_string()).into()
        })
    }

    /// Load and join gesture records
    pub fn load(
        &self,
        records: &Path,
        ground_truth: &Path,
        summary: &mut RunSummary,
    ) -> crate::Result<Vec<GestureRecord>> {
        load_records(records, ground_truth, self.settings.max_exclusion_rate, summary)
    }

    /// Closed command vocabulary of the loaded records
    pub fn vocabulary(&self, records: &[GestureRecord]) -> crate::Result<CommandVocabulary> {
        CommandVocabulary::from_records(records)
    }

    /// Vocabulary straight from the ground-truth table
    pub fn ground_truth_vocabulary(&self, path: &Path, summary: &mut RunSummary) -> crate::Result<CommandVocabulary> {
        let table = read_ground_truth(path, summary)?;
        CommandVocabulary::from_labels(table.values())
    }

    pub fn describe_structured(&self, path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<Description>> {
        extraction::extract_structured(path, summary)
    }

    pub fn describe_unstructured(&self, path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<Description>> {
        extraction::extract_unstructured(path, summary)
    }

    /// Model descriptions of every record, optionally from hand-pose frames
    pub fn describe_model(
        &self,
        records: &[GestureRecord],
        frames: Option<&FrameSource>,
        summary: &mut RunSummary,
    ) -> crate::Result<Vec<Description>> {
        extraction::describe_with_model(self.collaborator()?, records, frames, summary)
    }

    /// Recorded guesses from a wide `c<N>_command` table
    pub fn predict_human(
        &self,
        path: &Path,
        source: PredictorSource,
        description_source: DescriptionSource,
        vocabulary: &CommandVocabulary,
        summary: &mut RunSummary,
    ) -> crate::Result<Vec<Prediction>> {
        extraction::read_human_predictions(
            path,
            source,
            description_source,
            vocabulary,
            self.settings.min_snap_similarity,
            summary,
        )
    }

    /// Model classification of every description
    pub fn predict_model(
        &self,
        descriptions: &[Description],
        vocabulary: &CommandVocabulary,
        summary: &mut RunSummary,
    ) -> crate::Result<Vec<Prediction>> {
        let prompt = match &self.settings.prediction_context {
            Some(context) => PredictionPrompt::with_context(vocabulary, context.clone()),
            None => PredictionPrompt::new(vocabulary),
        };
        extraction::predict_with_model(
            self.collaborator()?,
            descriptions,
            &prompt,
            vocabulary,
            self.settings.min_snap_similarity,
            summary,
        )
    }

    /// Align to ground truth, then aggregate.
    ///
    /// Known labels outside `vocabulary` are demoted to unrecognized before
    /// alignment, so they never count as wrong answers.
    pub fn score(
        &self,
        records: &[GestureRecord],
        descriptions: &[Description],
        predictions: &[Prediction],
        vocabulary: &CommandVocabulary,
        summary: &mut RunSummary,
    ) -> Scores {
        let predictions = extraction::restrict_to_vocabulary(predictions, vocabulary, summary);
        let report = align(
            records,
            descriptions,
            &predictions,
            self.metric.as_ref(),
            &self.settings.reference_source,
            summary,
        );
        let aggregates = aggregate(&report);
        let similarity_matrix = similarity_matrix(descriptions, self.metric.as_ref());
        Scores {
            report,
            aggregates,
            similarity_matrix,
        }
    }

    pub fn stats(&self, rows: &[ScoreRow]) -> StudyTests {
        run_study_tests(rows, &self.settings.stats)
    }

    /// Run every table-driven stage and write the reports under `dirs`
    pub fn run(&self, inputs: &PipelineInputs, dirs: &OutputDirs) -> crate::Result<PipelineOutcome> {
        let mut summary = RunSummary::new();
        let records = self.load(&inputs.records, &inputs.ground_truth, &mut summary)?;

        let mut descriptions = Vec::new();
        for path in &inputs.descriptions {
            descriptions.extend(tables::read_descriptions(path, &mut summary)?);
        }
        let mut predictions = Vec::new();
        for path in &inputs.predictions {
            predictions.extend(tables::read_predictions(path, &mut summary)?);
        }
        // Schema problems of the ground-truth table were tallied by `load`
        let vocabulary = self.ground_truth_vocabulary(&inputs.ground_truth, &mut RunSummary::new())?;

        let scores = self.score(&records, &descriptions, &predictions, &vocabulary, &mut summary);
        report::write_score_tables(dirs, &scores.report.rows, &scores.aggregates, &scores.similarity_matrix)?;

        let tests = self.stats(&scores.report.rows);
        report::write_statistics(dirs, &tests)?;

        summary.log("run");
        info!(
            records = records.len(),
            descriptions = descriptions.len(),
            predictions = predictions.len(),
            scored = scores.report.rows.len(),
            skipped = summary.total(),
            "Pipeline finished"
        );
        Ok(PipelineOutcome {
            records: records.len(),
            scores,
            tests,
            summary,
            dirs: dirs.clone(),
        })
    }
}
