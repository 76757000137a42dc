//! Wiring of the story-generation graph: the agent roster, its edges, and the
//! streaming exclusion set.

use std::sync::Arc;

use storyforge_llm::TaskModel;
use storyforge_pipeline::{Graph, GraphBuilder, MessageHook, Target};
use storyforge_types::Result;

use crate::docs::DocIndex;
use crate::nodes::{
    BrainstormConcepts, DeveloperReview, FeatureMuse, FeatureRewrite, FixPassages,
    GeneratePassages, LintPassages, PlanPassages, RetrieveDocs, WriterApproval, WriterOutline,
};
use crate::state::{FeatureStatus, StoryState};

/// Nodes whose output is raw content rather than a progress note; they are
/// kept out of the progress stream.
pub const STREAM_EXCLUDED_NODES: [&str; 2] = ["generate_passages", "fix_passages"];

/// Build the compiled story graph. One instance serves many concurrent runs.
///
/// Flow: docs → brainstorm → outline → mechanics draft → developer review
/// (loops through rewrite until approved) → writer approval (same loop) →
/// passage plan → generation → lint (loops through fix until clean).
pub fn story_graph(
    model: Arc<dyn TaskModel>,
    hook: Option<MessageHook<StoryState>>,
) -> Result<Graph<StoryState>> {
    let docs = Arc::new(DocIndex::builtin());

    let mut builder = GraphBuilder::new()
        .add_node("retrieve_docs", RetrieveDocs::new(docs))
        .add_node("brainstorm_concepts", BrainstormConcepts::new(model.clone()))
        .add_node("writer_outline", WriterOutline::new(model.clone()))
        .add_node("feature_muse", FeatureMuse::new(model.clone()))
        .add_node("developer_review", DeveloperReview::new(model.clone()))
        .add_node("writer_approval", WriterApproval::new(model.clone()))
        .add_node("feature_rewrite", FeatureRewrite::new(model.clone()))
        .add_node("plan_passages", PlanPassages::new(model.clone()))
        .add_node("generate_passages", GeneratePassages::new(model.clone()))
        .add_node("lint_passages", LintPassages)
        .add_node("fix_passages", FixPassages::new(model))
        .add_edge("retrieve_docs", Target::node("brainstorm_concepts"))
        .add_edge("brainstorm_concepts", Target::node("writer_outline"))
        .add_edge("writer_outline", Target::node("feature_muse"))
        .add_edge("feature_muse", Target::node("developer_review"))
        .add_edge("feature_rewrite", Target::node("developer_review"))
        .add_branch(
            "developer_review",
            [Target::node("feature_rewrite"), Target::node("writer_approval")],
            |state: &StoryState| match state.feature_status {
                Some(FeatureStatus::NeedsDevRevision) => Target::node("feature_rewrite"),
                _ => Target::node("writer_approval"),
            },
        )
        .add_branch(
            "writer_approval",
            [Target::node("feature_rewrite"), Target::node("plan_passages")],
            |state: &StoryState| match state.feature_status {
                Some(FeatureStatus::NeedsWriterRevision) => Target::node("feature_rewrite"),
                _ => Target::node("plan_passages"),
            },
        )
        .add_edge("plan_passages", Target::node("generate_passages"))
        .add_edge("generate_passages", Target::node("lint_passages"))
        .add_branch(
            "lint_passages",
            [Target::node("fix_passages"), Target::End],
            |state: &StoryState| {
                if state.lint_findings.is_some() {
                    Target::node("fix_passages")
                } else {
                    Target::End
                }
            },
        )
        .add_edge("fix_passages", Target::node("lint_passages"))
        .entry("retrieve_docs");

    for node in STREAM_EXCLUDED_NODES {
        builder = builder.quiet(node);
    }
    if let Some(hook) = hook {
        builder = builder.on_messages(hook);
    }
    builder.compile()
}
