//! The agent roster: node handlers for the story-generation graph.
//!
//! Every handler that talks to the task model routes the call through the
//! retry wrapper and reports unusable output as a node failure. Review and
//! lint findings are recoverable state that drives routing; only a cycle's
//! attempt ceiling turns them into a fatal error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use storyforge_llm::{CompletionRequest, TaskModel};
use storyforge_pipeline::{with_retry, NodeHandler, NodeOutput, RetryPolicy, Update};
use storyforge_types::{ForgeError, Result};

use crate::docs::DocIndex;
use crate::lint::lint_passages;
use crate::prompts;
use crate::state::{FeatureStatus, StoryPatch, StoryState};
use crate::twee::{Passage, PassagePlan};

/// Ceiling for the mechanics review cycle.
pub const MAX_FEATURE_ATTEMPTS: u32 = 3;

/// Ceiling for the lint/repair cycle.
pub const MAX_LINT_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Shared model-call plumbing
// ---------------------------------------------------------------------------

struct Agent {
    model: Arc<dyn TaskModel>,
    retry: RetryPolicy,
}

impl Agent {
    fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
        }
    }

    async fn complete(&self, node: &str, request: CompletionRequest) -> Result<String> {
        tracing::debug!(node = %node, structured = request.response_format.is_some(), "agent call");
        let text = with_retry(&self.retry, || self.model.complete(&request)).await?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ForgeError::NodeFailed {
                node: node.into(),
                message: "model returned empty output".into(),
            });
        }
        Ok(text)
    }

    async fn complete_json<T: DeserializeOwned>(
        &self,
        node: &str,
        request: CompletionRequest,
    ) -> Result<T> {
        let text = self.complete(node, request).await?;
        serde_json::from_str(&text).map_err(|e| ForgeError::NodeFailed {
            node: node.into(),
            message: format!("model reply did not match the expected schema: {e}"),
        })
    }
}

fn doc_context(state: &StoryState) -> &str {
    state.doc_context.as_deref().unwrap_or_default()
}

fn require<'a>(field: &'a Option<String>, node: &str, what: &str) -> Result<&'a str> {
    field.as_deref().ok_or_else(|| ForgeError::NodeFailed {
        node: node.into(),
        message: format!("requires {what}"),
    })
}

// ---------------------------------------------------------------------------
// Structured-output shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OutlineSelection {
    concept: String,
    outline: String,
}

fn outline_selection_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "concept": { "type": "string" },
            "outline": { "type": "string" }
        },
        "required": ["concept", "outline"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
struct Review {
    approved: bool,
    notes: String,
}

fn review_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "approved": { "type": "boolean" },
            "notes": { "type": "string" }
        },
        "required": ["approved", "notes"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    passages: Vec<PassagePlan>,
}

fn story_plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "passages": {
                "type": "array",
                "minItems": 6,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "summary": { "type": "string" },
                        "pseudocode": { "type": "string" }
                    },
                    "required": ["name", "summary", "pseudocode"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["passages"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
struct PassagesResponse {
    passages: Vec<Passage>,
}

fn passages_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "passages": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "source": { "type": "string" }
                    },
                    "required": ["name", "source"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["passages"],
        "additionalProperties": false
    })
}

// ---------------------------------------------------------------------------
// retrieve_docs
// ---------------------------------------------------------------------------

/// Ranks reference sections against the run so far and shares the excerpts.
pub struct RetrieveDocs {
    docs: Arc<DocIndex>,
}

impl RetrieveDocs {
    pub fn new(docs: Arc<DocIndex>) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for RetrieveDocs {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let mut query_parts = vec![
            format!("Theme: {}", state.theme),
            format!("Prompt: {}", state.prompt),
        ];
        if let Some(concept) = &state.selected_concept {
            query_parts.push(format!("Concept: {concept}"));
        }
        if let Some(outline) = &state.outline {
            let head: String = outline.chars().take(200).collect();
            query_parts.push(format!("Outline snippet: {head}"));
        }
        if let Some(plan) = &state.features_plan {
            query_parts.push(format!("Approved features: {plan}"));
        } else if let Some(draft) = &state.features_draft {
            query_parts.push(format!("Features draft: {draft}"));
        }
        let query = query_parts.join("\n");

        let context = self
            .docs
            .retrieve(&query, 3)
            .unwrap_or_else(|| self.docs.snippet().to_string());

        Ok(NodeOutput::new(StoryPatch {
            doc_context: Update::Set(context),
            ..Default::default()
        })
        .with_message(
            "DocRetriever: shared relevant Harlowe excerpts so downstream agents ground their ideas.",
        ))
    }
}

// ---------------------------------------------------------------------------
// brainstorm_concepts
// ---------------------------------------------------------------------------

/// Pitches candidate story concepts.
pub struct BrainstormConcepts {
    agent: Agent,
}

impl BrainstormConcepts {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for BrainstormConcepts {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let request = CompletionRequest::new(
            format!("{}\n{}", prompts::IDEA_SMITH, doc_context(state)),
            format!(
                "Theme: {}\nPrompt: {}\nReference the structure of Harlowe stories and prefer \
                 ideas that require meaningful choices.",
                state.theme, state.prompt
            ),
        );
        let ideas = self.agent.complete("brainstorm_concepts", request).await?;

        Ok(NodeOutput::new(StoryPatch {
            brainstormed_ideas: Update::Set(ideas.clone()),
            ..Default::default()
        })
        .with_message("IdeaSmith: generated candidate story concepts.")
        .with_message(format!("IdeaSmith concepts:\n{ideas}")))
    }
}

// ---------------------------------------------------------------------------
// writer_outline
// ---------------------------------------------------------------------------

/// Locks a concept and produces the outline beats.
pub struct WriterOutline {
    agent: Agent,
}

impl WriterOutline {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for WriterOutline {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let ideas = require(
            &state.brainstormed_ideas,
            "writer_outline",
            "brainstormed ideas to select from",
        )?;
        let request = CompletionRequest::new(
            prompts::STORY_WRITER_OUTLINE,
            format!(
                "Theme: {}\nPrompt: {}\nConcept options:\n{ideas}\nPick the most teachable \
                 concept and outline 5-7 beats.",
                state.theme, state.prompt
            ),
        )
        .with_schema("OutlineSelection", outline_selection_schema());

        let selection: OutlineSelection =
            self.agent.complete_json("writer_outline", request).await?;
        let concept = selection.concept.trim();
        let outline = selection.outline.trim();
        if concept.is_empty() || outline.is_empty() {
            return Err(ForgeError::NodeFailed {
                node: "writer_outline".into(),
                message: "model did not return a usable concept and outline".into(),
            });
        }

        Ok(NodeOutput::new(StoryPatch {
            selected_concept: Update::Set(concept.to_string()),
            outline: Update::Set(outline.to_string()),
            ..Default::default()
        })
        .with_message("StoryWriter: locked a concept and produced the outline beats."))
    }
}

// ---------------------------------------------------------------------------
// feature_muse
// ---------------------------------------------------------------------------

/// Drafts the interactive mechanics.
pub struct FeatureMuse {
    agent: Agent,
}

impl FeatureMuse {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for FeatureMuse {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let outline = require(&state.outline, "feature_muse", "an outline to build against")?;
        let feedback = state
            .writer_notes
            .as_deref()
            .or(state.dev_notes.as_deref())
            .unwrap_or("(none)");
        let request = CompletionRequest::new(
            format!("{}\n{}", prompts::MECHANICS_MUSE, doc_context(state)),
            format!(
                "Theme: {}\nConcept: {}\nOutline:\n{outline}\nRecent feedback: {feedback}\n\
                 Draft mechanics that feel cohesive with the outline.",
                state.theme,
                state.selected_concept.as_deref().unwrap_or("(not stated)"),
            ),
        );
        let draft = self.agent.complete("feature_muse", request).await?;

        Ok(NodeOutput::new(StoryPatch {
            features_draft: Update::Set(draft.clone()),
            feature_status: Update::Set(FeatureStatus::Drafted),
            dev_notes: Update::Clear,
            writer_notes: Update::Clear,
            ..Default::default()
        })
        .with_message("MechanicsMuse: proposed interactive learning features.")
        .with_message(format!("Mechanics draft:\n{draft}")))
    }
}

// ---------------------------------------------------------------------------
// developer_review
// ---------------------------------------------------------------------------

/// Feasibility gate on the mechanics draft; owns the review-cycle ceiling.
pub struct DeveloperReview {
    agent: Agent,
}

impl DeveloperReview {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for DeveloperReview {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let draft = require(
            &state.features_draft,
            "developer_review",
            "a features draft to review",
        )?;
        let request = CompletionRequest::new(
            format!("{}\n{}", prompts::BUILDER_BOT, doc_context(state)),
            format!(
                "Theme: {}\nOutline:\n{}\nMechanics draft:\n{draft}\nProvide JSON with your \
                 approval decision and notes.",
                state.theme,
                state.outline.as_deref().unwrap_or("(missing)"),
            ),
        )
        .with_schema("FeatureReview", review_schema());

        let review: Review = self.agent.complete_json("developer_review", request).await?;

        if !review.approved {
            let attempts = state.feature_attempts + 1;
            if attempts > MAX_FEATURE_ATTEMPTS {
                return Err(ForgeError::RepairExhausted {
                    node: "developer_review".into(),
                    attempts: MAX_FEATURE_ATTEMPTS,
                    findings: review.notes,
                });
            }
            return Ok(NodeOutput::new(StoryPatch {
                feature_status: Update::Set(FeatureStatus::NeedsDevRevision),
                dev_notes: Update::Set(review.notes.clone()),
                feature_attempts: Some(attempts),
                ..Default::default()
            })
            .with_message("BuilderBot: requested revisions before implementation.")
            .with_message(format!("BuilderBot notes:\n{}", review.notes)));
        }

        Ok(NodeOutput::new(StoryPatch {
            feature_status: Update::Set(FeatureStatus::DevApproved),
            features_plan: Update::Set(draft.to_string()),
            dev_notes: Update::Set(review.notes.clone()),
            ..Default::default()
        })
        .with_message("BuilderBot: approved the mechanics with implementation notes.")
        .with_message(format!("BuilderBot approval notes:\n{}", review.notes)))
    }
}

// ---------------------------------------------------------------------------
// writer_approval
// ---------------------------------------------------------------------------

/// Narrative gate on the dev-approved plan; shares the review-cycle counter.
pub struct WriterApproval {
    agent: Agent,
}

impl WriterApproval {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for WriterApproval {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let plan = require(
            &state.features_plan,
            "writer_approval",
            "an approved features plan",
        )?;
        let request = CompletionRequest::new(
            prompts::WRITER_REVIEW,
            format!(
                "Concept: {}\nOutline:\n{}\nMechanics plan:\n{plan}\nReply using the JSON \
                 review schema.",
                state.selected_concept.as_deref().unwrap_or("(not stated)"),
                state.outline.as_deref().unwrap_or("(missing)"),
            ),
        )
        .with_schema("FeatureReview", review_schema());

        let review: Review = self.agent.complete_json("writer_approval", request).await?;

        if !review.approved {
            let attempts = state.feature_attempts + 1;
            if attempts > MAX_FEATURE_ATTEMPTS {
                return Err(ForgeError::RepairExhausted {
                    node: "writer_approval".into(),
                    attempts: MAX_FEATURE_ATTEMPTS,
                    findings: review.notes,
                });
            }
            return Ok(NodeOutput::new(StoryPatch {
                feature_status: Update::Set(FeatureStatus::NeedsWriterRevision),
                writer_notes: Update::Set(review.notes.clone()),
                features_draft: Update::Set(plan.to_string()),
                feature_attempts: Some(attempts),
                ..Default::default()
            })
            .with_message("StoryWriter: asked for narrative adjustments before coding.")
            .with_message(format!("StoryWriter notes:\n{}", review.notes)));
        }

        Ok(NodeOutput::new(StoryPatch {
            feature_status: Update::Set(FeatureStatus::WriterApproved),
            writer_notes: Update::Clear,
            ..Default::default()
        })
        .with_message("StoryWriter: approved the mechanics and green-lit passage planning."))
    }
}

// ---------------------------------------------------------------------------
// feature_rewrite
// ---------------------------------------------------------------------------

/// Revises the mechanics plan against outstanding critique; the back-edge of
/// the review cycle.
pub struct FeatureRewrite {
    agent: Agent,
}

impl FeatureRewrite {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for FeatureRewrite {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let critique = state
            .writer_notes
            .as_deref()
            .or(state.dev_notes.as_deref())
            .ok_or_else(|| ForgeError::NodeFailed {
                node: "feature_rewrite".into(),
                message: "requires critique notes to revise against".into(),
            })?;
        let base_plan = state
            .features_plan
            .as_deref()
            .or(state.features_draft.as_deref())
            .ok_or_else(|| ForgeError::NodeFailed {
                node: "feature_rewrite".into(),
                message: "requires a base plan to revise".into(),
            })?;

        let request = CompletionRequest::new(
            prompts::FEATURE_REWRITE,
            format!(
                "Theme: {}\nConcept: {}\nOutline:\n{}\nCurrent plan:\n{base_plan}\nFeedback to \
                 address:\n{critique}",
                state.theme,
                state.selected_concept.as_deref().unwrap_or("(not stated)"),
                state.outline.as_deref().unwrap_or("(missing)"),
            ),
        );
        let revised = self.agent.complete("feature_rewrite", request).await?;

        Ok(NodeOutput::new(StoryPatch {
            features_draft: Update::Set(revised.clone()),
            feature_status: Update::Set(FeatureStatus::Revised),
            dev_notes: Update::Clear,
            writer_notes: Update::Clear,
            ..Default::default()
        })
        .with_message("MechanicsMuse: produced a revised plan responding to critiques.")
        .with_message(format!("Revised plan:\n{revised}")))
    }
}

// ---------------------------------------------------------------------------
// plan_passages
// ---------------------------------------------------------------------------

/// Expands the outline and mechanics into per-passage pseudocode.
pub struct PlanPassages {
    agent: Agent,
}

impl PlanPassages {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for PlanPassages {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let outline = require(&state.outline, "plan_passages", "the outline")?;
        let plan = require(&state.features_plan, "plan_passages", "the approved mechanics")?;
        let request = CompletionRequest::new(
            format!("{}\n{}", prompts::PASSAGE_PLANNER, doc_context(state)),
            format!(
                "Theme: {}\nConcept: {}\nOutline:\n{outline}\nMechanics plan:\n{plan}\nReturn \
                 the JSON schema exactly.",
                state.theme,
                state.selected_concept.as_deref().unwrap_or("(not stated)"),
            ),
        )
        .with_schema("StoryPlan", story_plan_schema());

        let response: PlanResponse = self.agent.complete_json("plan_passages", request).await?;
        if response.passages.is_empty() {
            return Err(ForgeError::NodeFailed {
                node: "plan_passages".into(),
                message: "model did not return any planned passages".into(),
            });
        }

        Ok(NodeOutput::new(StoryPatch {
            story_plan: Update::Set(response.passages),
            ..Default::default()
        })
        .with_message("PassagePlanner: produced pseudocode for every passage."))
    }
}

// ---------------------------------------------------------------------------
// generate_passages
// ---------------------------------------------------------------------------

/// Turns the plan into real twee passages. Excluded from progress streaming:
/// its output is raw content, not a progress note.
pub struct GeneratePassages {
    agent: Agent,
}

impl GeneratePassages {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for GeneratePassages {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let outline = require(&state.outline, "generate_passages", "the outline")?;
        let mechanics = require(&state.features_plan, "generate_passages", "the mechanics")?;
        let plan = state.story_plan.as_ref().ok_or_else(|| ForgeError::NodeFailed {
            node: "generate_passages".into(),
            message: "requires the passage plan".into(),
        })?;

        let request = CompletionRequest::new(
            format!("{}\n{}", prompts::BUILD_CODER, doc_context(state)),
            format!(
                "Theme: {}\nConcept: {}\nOutline:\n{outline}\nMechanics:\n{mechanics}\nPassage \
                 plan JSON:\n{}\nWrite immersive passages that follow the plan, honor its tone \
                 cues, and only take liberties when it heightens drama without breaking \
                 instructions.",
                state.theme,
                state.selected_concept.as_deref().unwrap_or("(not stated)"),
                serde_json::to_string_pretty(plan)?,
            ),
        )
        .with_schema("TwinePassages", passages_schema());

        let response: PassagesResponse =
            self.agent.complete_json("generate_passages", request).await?;
        if response.passages.is_empty() {
            return Err(ForgeError::NodeFailed {
                node: "generate_passages".into(),
                message: "model emitted no passages".into(),
            });
        }

        Ok(NodeOutput::new(StoryPatch {
            passages: Update::Set(response.passages),
            ..Default::default()
        })
        .with_message("BuildCoder: converted the plan into executable Harlowe passages."))
    }
}

// ---------------------------------------------------------------------------
// lint_passages
// ---------------------------------------------------------------------------

/// Verification node of the repair cycle: inspects the artifact and either
/// routes to success, emits findings for repair, or fails the run once the
/// attempt ceiling is reached.
pub struct LintPassages;

#[async_trait]
impl NodeHandler<StoryState> for LintPassages {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let passages = state.passages.as_deref().unwrap_or_default();
        if passages.is_empty() {
            return Err(ForgeError::NodeFailed {
                node: "lint_passages".into(),
                message: "no passages available for linting".into(),
            });
        }

        let findings = lint_passages(passages);
        if findings.is_empty() {
            return Ok(NodeOutput::new(StoryPatch {
                lint_findings: Update::Clear,
                ..Default::default()
            })
            .with_message("LintCheck: no blocking lint issues detected."));
        }

        let summary = findings.join("\n");
        if state.lint_attempts >= MAX_LINT_ATTEMPTS {
            return Err(ForgeError::RepairExhausted {
                node: "lint_passages".into(),
                attempts: state.lint_attempts,
                findings: summary,
            });
        }

        Ok(NodeOutput::new(StoryPatch {
            lint_findings: Update::Set(summary.clone()),
            ..Default::default()
        })
        .with_message(format!(
            "LintCheck: detected issues (cycle {} of {MAX_LINT_ATTEMPTS}).",
            state.lint_attempts + 1
        ))
        .with_message(format!("Lint findings:\n{summary}")))
    }
}

// ---------------------------------------------------------------------------
// fix_passages
// ---------------------------------------------------------------------------

/// Repair node of the lint cycle: re-invokes generation with the prior
/// artifact and the findings as extra context, increments the attempt
/// counter, and hands back to verification. Excluded from progress streaming.
pub struct FixPassages {
    agent: Agent,
}

impl FixPassages {
    pub fn new(model: Arc<dyn TaskModel>) -> Self {
        Self {
            agent: Agent::new(model),
        }
    }
}

#[async_trait]
impl NodeHandler<StoryState> for FixPassages {
    async fn run(&self, state: &StoryState) -> Result<NodeOutput<StoryPatch>> {
        let Some(findings) = state.lint_findings.as_deref() else {
            return Ok(NodeOutput::new(StoryPatch::default())
                .with_message("LintFixer: no lint findings provided, keeping current passages."));
        };
        let outline = require(&state.outline, "fix_passages", "the outline")?;
        let passages = state.passages.as_ref().ok_or_else(|| ForgeError::NodeFailed {
            node: "fix_passages".into(),
            message: "requires passages to revise".into(),
        })?;
        let plan = state.story_plan.as_ref().ok_or_else(|| ForgeError::NodeFailed {
            node: "fix_passages".into(),
            message: "requires the passage plan".into(),
        })?;

        let attempt = state.lint_attempts + 1;
        let request = CompletionRequest::new(
            format!("{}\n{}", prompts::LINT_FIXER, doc_context(state)),
            format!(
                "Theme: {}\nConcept: {}\nOutline:\n{outline}\nMechanics:\n{}\nPassage plan \
                 JSON:\n{}\nCurrent passages JSON:\n{}\nLint findings to fix:\n{findings}",
                state.theme,
                state.selected_concept.as_deref().unwrap_or("(not stated)"),
                state.features_plan.as_deref().unwrap_or("(missing)"),
                serde_json::to_string(plan)?,
                serde_json::to_string(passages)?,
            ),
        )
        .with_schema("TwinePassages", passages_schema());

        let response: PassagesResponse = self.agent.complete_json("fix_passages", request).await?;
        if response.passages.is_empty() {
            return Err(ForgeError::NodeFailed {
                node: "fix_passages".into(),
                message: "model did not return updated passages".into(),
            });
        }

        Ok(NodeOutput::new(StoryPatch {
            passages: Update::Set(response.passages),
            lint_findings: Update::Clear,
            lint_attempts: Some(attempt),
            ..Default::default()
        })
        .with_message(format!(
            "LintFixer: applied fixes on attempt {attempt}; rerunning lint."
        )))
    }
}
