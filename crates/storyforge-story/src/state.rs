//! The state record flowing through the story-generation graph.
//!
//! Every field except the message log uses override merge semantics; the log
//! appends. Patches default to leaving every field untouched, so a node only
//! states what it changed.

use serde::{Deserialize, Serialize};

use storyforge_pipeline::{append, overwrite, GraphState, Update};

use crate::twee::{Passage, PassagePlan};

/// Where the mechanics plan stands in the review cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Drafted,
    NeedsDevRevision,
    DevApproved,
    NeedsWriterRevision,
    WriterApproved,
    Revised,
}

/// Shared state for one story-generation run.
#[derive(Debug, Clone)]
pub struct StoryState {
    pub prompt: String,
    pub theme: String,
    /// Opaque progress-stream id supplied by the caller; absent for
    /// non-interactive runs.
    pub stream_id: Option<String>,
    pub doc_context: Option<String>,
    pub brainstormed_ideas: Option<String>,
    pub selected_concept: Option<String>,
    pub outline: Option<String>,
    pub features_draft: Option<String>,
    pub features_plan: Option<String>,
    pub dev_notes: Option<String>,
    pub writer_notes: Option<String>,
    pub feature_status: Option<FeatureStatus>,
    /// Review-cycle attempt counter; incremented by the reviewing nodes,
    /// never reset mid-run.
    pub feature_attempts: u32,
    pub story_plan: Option<Vec<PassagePlan>>,
    pub passages: Option<Vec<Passage>>,
    pub lint_findings: Option<String>,
    /// Repair-cycle attempt counter; incremented by the fix node, never reset
    /// mid-run.
    pub lint_attempts: u32,
    pub messages: Vec<String>,
}

impl StoryState {
    pub fn new(prompt: impl Into<String>, theme: impl Into<String>, stream_id: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            theme: theme.into(),
            stream_id,
            doc_context: None,
            brainstormed_ideas: None,
            selected_concept: None,
            outline: None,
            features_draft: None,
            features_plan: None,
            dev_notes: None,
            writer_notes: None,
            feature_status: None,
            feature_attempts: 0,
            story_plan: None,
            passages: None,
            lint_findings: None,
            lint_attempts: 0,
            messages: Vec::new(),
        }
    }
}

/// Partial update returned by a story node.
#[derive(Debug, Default)]
pub struct StoryPatch {
    pub doc_context: Update<String>,
    pub brainstormed_ideas: Update<String>,
    pub selected_concept: Update<String>,
    pub outline: Update<String>,
    pub features_draft: Update<String>,
    pub features_plan: Update<String>,
    pub dev_notes: Update<String>,
    pub writer_notes: Update<String>,
    pub feature_status: Update<FeatureStatus>,
    pub feature_attempts: Option<u32>,
    pub story_plan: Update<Vec<PassagePlan>>,
    pub passages: Update<Vec<Passage>>,
    pub lint_findings: Update<String>,
    pub lint_attempts: Option<u32>,
}

impl GraphState for StoryState {
    type Patch = StoryPatch;

    fn merge(&self, patch: StoryPatch) -> Self {
        let mut next = self.clone();
        patch.doc_context.apply(&mut next.doc_context);
        patch.brainstormed_ideas.apply(&mut next.brainstormed_ideas);
        patch.selected_concept.apply(&mut next.selected_concept);
        patch.outline.apply(&mut next.outline);
        patch.features_draft.apply(&mut next.features_draft);
        patch.features_plan.apply(&mut next.features_plan);
        patch.dev_notes.apply(&mut next.dev_notes);
        patch.writer_notes.apply(&mut next.writer_notes);
        patch.feature_status.apply(&mut next.feature_status);
        overwrite(&mut next.feature_attempts, patch.feature_attempts);
        patch.story_plan.apply(&mut next.story_plan);
        patch.passages.apply(&mut next.passages);
        patch.lint_findings.apply(&mut next.lint_findings);
        overwrite(&mut next.lint_attempts, patch.lint_attempts);
        next
    }

    fn push_messages(&mut self, messages: &[String]) {
        append(&mut self.messages, messages.to_vec());
    }

    fn messages(&self) -> &[String] {
        &self.messages
    }
}
