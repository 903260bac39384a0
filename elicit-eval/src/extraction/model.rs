//! Model descriptions generated through the text-generation collaborator

use super::cleaning::clean_annotation;
use super::pose_frames::{render_frames, PoseStage};
use super::prompts::DescriptionPrompt;
use crate::collaborator::{CacheKey, Collaborator, FetchJob, TextGenerator};
use crate::records::types::{Description, DescriptionSource, GestureRecord, RecordKey};
use crate::report::summary::{RunSummary, SkipCategory};
use std::path::PathBuf;
use tracing::{info, warn};

/// Hand-pose frames to attach to every prompt
#[derive(Debug, Clone)]
pub struct FrameSource {
    pub root: PathBuf,
    pub stage: PoseStage,
}

/// Source tag for a model, with the pose stage when frames are attached
pub fn model_source(model: &str, frames: Option<&FrameSource>) -> DescriptionSource {
    match frames {
        Some(frames) => DescriptionSource::model(format!("{}/{}", model, frames.stage)),
        None => DescriptionSource::model(model),
    }
}

/// Build one fetch job per record.
///
/// A record whose frames are missing or unreadable gets no job.
pub fn description_jobs<G: TextGenerator + 'static>(
    collaborator: &Collaborator<G>,
    records: &[GestureRecord],
    frames: Option<&FrameSource>,
    summary: &mut RunSummary,
) -> Vec<FetchJob<RecordKey>> {
    let prompt = DescriptionPrompt;
    let stage_tag = frames.map(|f| f.stage.as_str()).unwrap_or_default();
    let hash = prompt.template_hash(stage_tag);

    let mut jobs = Vec::with_capacity(records.len());
    for record in records {
        let key = record.key();
        let rendered = match frames {
            Some(source) => match render_frames(&source.root, &key, source.stage) {
                Ok(Some(text)) => Some(text),
                Ok(None) => {
                    warn!(key = %key, "No pose frames for gesture, skipping");
                    summary.record(SkipCategory::MissingRecord, &key);
                    continue;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Unreadable pose frames, skipping");
                    summary.record(SkipCategory::Schema, &key);
                    continue;
                }
            },
            None => None,
        };
        let messages = prompt.render(record, rendered.as_deref());
        jobs.push(FetchJob {
            cache_key: CacheKey::new(key.to_string(), collaborator.model(), hash.as_str()),
            request: collaborator.settings.request(messages),
            id: key,
        });
    }
    jobs
}

/// Describe every record with the configured model.
///
/// Collaborator failures and empty responses are tallied and skipped; the
/// batch always runs to completion.
pub fn describe_with_model<G: TextGenerator + 'static>(
    collaborator: &Collaborator<G>,
    records: &[GestureRecord],
    frames: Option<&FrameSource>,
    summary: &mut RunSummary,
) -> crate::Result<Vec<Description>> {
    let source = model_source(collaborator.model(), frames);
    let jobs = description_jobs(collaborator, records, frames, summary);
    let requested = jobs.len();
    let results = collaborator.fetch_blocking(jobs)?;

    let mut descriptions = Vec::with_capacity(results.len());
    for (key, result) in results {
        match result {
            Ok(text) => match clean_annotation(&text) {
                Some(text) => descriptions.push(Description {
                    participant_id: key.participant_id,
                    gesture_id: key.gesture_id,
                    source: source.clone(),
                    text,
                }),
                None => summary.record(SkipCategory::EmptyText, &key),
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Description failed");
                summary.record(SkipCategory::Collaborator, &key);
            }
        }
    }

    info!(
        source = %source,
        requested,
        described = descriptions.len(),
        cache_hits = collaborator.cache.hits(),
        "Model descriptions finished"
    );
    Ok(descriptions)
}
