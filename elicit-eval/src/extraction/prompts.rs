//! Prompt templates for model descriptions and command classification
//!
//! Each template has a stable hash that goes into the cache key, so editing
//! a template invalidates its cached responses and nothing else.

use crate::collaborator::cache::template_hash;
use crate::collaborator::ChatMessage;
use crate::records::types::GestureRecord;
use crate::records::vocabulary::CommandVocabulary;

const DESCRIPTION_SYSTEM: &str = "You are a helpful assistant trained to analyze a mid-air hand gesture \
and describe it. Describe the identified hand gestures concisely in one sentence. Do not describe the \
meaning of the gesture, what it suggests, or the user's intention. If the user does not perform any \
gesture, report this. When a sequence of hand-pose frames is given, consider how the gesture develops \
over the whole sequence rather than each frame individually.";

const DESCRIPTION_USER: &str = "Participant {participant} performs gesture {gesture}, elicited through the \
{modality} modality. The clip contains none, one single or two combined hand gestures in sequence. Ignore \
the hands' initial and final resting positions. Focus on the fingers and hand pose, orientation and \
direction, and the main movements that characterize the gesture.";

const PREDICTION_SYSTEM: &str = "You are a helpful assistant trained to interpret a human hand gesture \
from its textual description. A system can recognize the gesture as a command. Determine which \
controlling command the user intends for the given context. Answer with the exact label of the \
identified command, without extra words or special characters.";

const PREDICTION_USER: &str = "Here is a description of a user's hand gesture. {context} Evaluate the \
gesture against the following control commands: {options}.";

/// Scenario the study's commands belong to
pub const DEFAULT_PREDICTION_CONTEXT: &str = "The gesture controls a unified communication platform \
during a hybrid meeting: the user is physically in a room and remotely connected to other participants.";

/// Prompt asking the model to describe one gesture
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptionPrompt;

impl DescriptionPrompt {
    /// Hash of the template text plus the pose stage tag (empty without frames)
    pub fn template_hash(&self, stage_tag: &str) -> String {
        template_hash(&[DESCRIPTION_SYSTEM, DESCRIPTION_USER, stage_tag])
    }

    pub fn render(&self, record: &GestureRecord, frames: Option<&str>) -> Vec<ChatMessage> {
        let user = DESCRIPTION_USER
            .replace("{participant}", &record.participant_id)
            .replace("{gesture}", &record.gesture_id)
            .replace("{modality}", &record.modality);
        let mut messages = vec![ChatMessage::system(DESCRIPTION_SYSTEM), ChatMessage::user(user)];
        if let Some(frames) = frames {
            messages.push(ChatMessage::user(frames));
        }
        messages
    }
}

/// Prompt asking the model to pick a command for a description
#[derive(Debug, Clone)]
pub struct PredictionPrompt {
    context: String,
    options: String,
}

impl PredictionPrompt {
    pub fn new(vocabulary: &CommandVocabulary) -> Self {
        Self::with_context(vocabulary, DEFAULT_PREDICTION_CONTEXT)
    }

    pub fn with_context(vocabulary: &CommandVocabulary, context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            options: vocabulary.render_options(),
        }
    }

    /// Covers the template, the scenario and the option list
    pub fn template_hash(&self) -> String {
        template_hash(&[PREDICTION_SYSTEM, PREDICTION_USER, &self.context, &self.options])
    }

    pub fn render(&self, description: &str) -> Vec<ChatMessage> {
        let user = PREDICTION_USER
            .replace("{context}", &self.context)
            .replace("{options}", &self.options);
        vec![
            ChatMessage::system(PREDICTION_SYSTEM),
            ChatMessage::user(user),
            ChatMessage::user(description),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> GestureRecord {
        GestureRecord {
            participant_id: "p07".into(),
            gesture_id: "c3".into(),
            modality: "no-screen".into(),
            ground_truth_command: "Mute microphone".into(),
        }
    }

    #[test]
    fn test_description_prompt_renders_metadata() {
        let messages = DescriptionPrompt.render(&record(), None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("Participant p07 performs gesture c3"));
        assert!(messages[1].content.contains("no-screen modality"));
    }

    #[test]
    fn test_description_prompt_attaches_frames() {
        let messages = DescriptionPrompt.render(&record(), Some("Frame 1: {}"));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "Frame 1: {}");
    }

    #[test]
    fn test_description_hash_depends_on_stage() {
        let prompt = DescriptionPrompt;
        assert_eq!(prompt.template_hash(""), prompt.template_hash(""));
        assert_ne!(prompt.template_hash(""), prompt.template_hash("poses"));
    }

    #[test]
    fn test_prediction_prompt_lists_options() {
        let vocab = CommandVocabulary::from_labels(["End call", "Mute microphone"]).unwrap();
        let prompt = PredictionPrompt::new(&vocab);
        let messages = prompt.render("Index finger on the lips");
        assert_eq!(messages.len(), 3);
        assert!(messages[1].content.contains("- `End call` - `Mute microphone`"));
        assert_eq!(messages[2].content, "Index finger on the lips");
    }

    #[test]
    fn test_prediction_hash_tracks_vocabulary() {
        let a = CommandVocabulary::from_labels(["End call"]).unwrap();
        let b = CommandVocabulary::from_labels(["End call", "Mute microphone"]).unwrap();
        assert_ne!(
            PredictionPrompt::new(&a).template_hash(),
            PredictionPrompt::new(&b).template_hash()
        );
        assert_ne!(
            PredictionPrompt::new(&a).template_hash(),
            PredictionPrompt::with_context(&a, "A smart TV.").template_hash()
        );
    }
}
