//! End-to-end runs of the story graph against a scripted task model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use storyforge_llm::{CompletionRequest, TaskModel};
use storyforge_pipeline::{broker_hook, Frame, ProgressBroker};
use storyforge_story::{
    story_graph, FeatureStatus, StoryState, MAX_LINT_ATTEMPTS, START_PASSAGE, TITLE_PASSAGE,
};
use storyforge_types::{ForgeError, Result};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl TaskModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ForgeError::Other("scripted model ran out of replies".into()))
    }
}

fn outline_json() -> String {
    serde_json::json!({
        "concept": "The Hollow Door",
        "outline": "1. Arrival. 2. The locked door. 3. Choice of keys. 4. Consequences. 5. Endings."
    })
    .to_string()
}

fn approve_json(notes: &str) -> String {
    serde_json::json!({ "approved": true, "notes": notes }).to_string()
}

fn reject_json(notes: &str) -> String {
    serde_json::json!({ "approved": false, "notes": notes }).to_string()
}

fn plan_json() -> String {
    serde_json::json!({
        "passages": [
            { "name": TITLE_PASSAGE, "summary": "title card", "pseudocode": "title text" },
            { "name": START_PASSAGE, "summary": "arrival, second person", "pseudocode": "link to Hall" },
            { "name": "Hall", "summary": "quiet dread", "pseudocode": "(set: $in to true)" }
        ]
    })
    .to_string()
}

fn passages_json(hall_source: &str) -> String {
    serde_json::json!({
        "passages": [
            { "name": TITLE_PASSAGE, "source": "The Hollow Door" },
            { "name": START_PASSAGE, "source": "You arrive. [[Go in->Hall]]" },
            { "name": "Hall", "source": hall_source }
        ]
    })
    .to_string()
}

const CLEAN_HALL: &str = "(set: $in to true) Quiet.";
const BROKEN_HALL: &str = "[[Flee->Garden]]";

/// Replies for a run that reaches passage generation with no review friction.
fn smooth_prefix() -> Vec<String> {
    vec![
        "1. The Hollow Door, a patience story.".to_string(),
        outline_json(),
        "Mechanics: a trust meter built on (set:) and (if:).".to_string(),
        approve_json("buildable as described"),
        approve_json("voice survives"),
        plan_json(),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_run_reaches_terminal_with_no_repairs() {
    let mut replies = smooth_prefix();
    replies.push(passages_json(CLEAN_HALL));
    let graph = story_graph(ScriptedModel::new(replies), None).unwrap();

    let final_state = graph
        .invoke(StoryState::new("a door", "patience", None))
        .await
        .unwrap();

    assert_eq!(final_state.lint_attempts, 0);
    assert_eq!(final_state.feature_attempts, 0);
    assert_eq!(final_state.feature_status, Some(FeatureStatus::WriterApproved));
    assert_eq!(final_state.passages.as_ref().unwrap().len(), 3);
    assert!(final_state.lint_findings.is_none());
    // The log starts with retrieval and ends with the clean lint verdict.
    assert!(final_state.messages[0].starts_with("DocRetriever:"));
    assert_eq!(
        final_state.messages.last().unwrap(),
        "LintCheck: no blocking lint issues detected."
    );
}

#[tokio::test]
async fn repair_cycle_converges_after_one_fix() {
    let mut replies = smooth_prefix();
    replies.push(passages_json(BROKEN_HALL));
    replies.push(passages_json(CLEAN_HALL));
    let graph = story_graph(ScriptedModel::new(replies), None).unwrap();

    let final_state = graph
        .invoke(StoryState::new("a door", "patience", None))
        .await
        .unwrap();

    // Two verification passes, one repair, counter at 1 on success.
    let lint_runs = final_state
        .messages
        .iter()
        .filter(|m| m.starts_with("LintCheck:"))
        .count();
    let fix_runs = final_state
        .messages
        .iter()
        .filter(|m| m.starts_with("LintFixer:"))
        .count();
    assert_eq!(lint_runs, 2);
    assert_eq!(fix_runs, 1);
    assert_eq!(final_state.lint_attempts, 1);
    assert!(final_state.lint_findings.is_none());
    assert_eq!(
        final_state.passages.as_ref().unwrap()[2].source,
        CLEAN_HALL
    );
}

#[tokio::test]
async fn repair_cycle_fails_fatally_at_the_attempt_ceiling() {
    let mut replies = smooth_prefix();
    replies.push(passages_json(BROKEN_HALL));
    for _ in 0..MAX_LINT_ATTEMPTS {
        replies.push(passages_json(BROKEN_HALL));
    }
    let graph = story_graph(ScriptedModel::new(replies), None).unwrap();

    let err = graph
        .invoke(StoryState::new("a door", "patience", None))
        .await
        .unwrap_err();

    match err {
        ForgeError::Stage { node, source } => {
            assert_eq!(node, "lint_passages");
            match *source {
                ForgeError::RepairExhausted {
                    attempts, findings, ..
                } => {
                    assert_eq!(attempts, MAX_LINT_ATTEMPTS);
                    assert_eq!(
                        findings,
                        "Passage 'Hall' links to missing target 'Garden'."
                    );
                }
                other => panic!("expected RepairExhausted, got {other:?}"),
            }
        }
        other => panic!("expected Stage-tagged error, got {other:?}"),
    }
}

#[tokio::test]
async fn review_rejection_routes_through_rewrite_and_back() {
    let replies = vec![
        "1. The Hollow Door.".to_string(),
        outline_json(),
        "Mechanics v1".to_string(),
        reject_json("the gating needs a variable"),
        "Mechanics v2".to_string(),
        approve_json("v2 is buildable"),
        approve_json("voice survives"),
        plan_json(),
        passages_json(CLEAN_HALL),
    ];
    let graph = story_graph(ScriptedModel::new(replies), None).unwrap();

    let final_state = graph
        .invoke(StoryState::new("a door", "patience", None))
        .await
        .unwrap();

    assert_eq!(final_state.feature_attempts, 1);
    assert_eq!(final_state.features_plan.as_deref(), Some("Mechanics v2"));
    assert!(final_state
        .messages
        .iter()
        .any(|m| m.starts_with("MechanicsMuse: produced a revised plan")));
}

#[tokio::test]
async fn progress_stream_carries_notes_but_not_raw_generation() {
    let mut replies = smooth_prefix();
    replies.push(passages_json(BROKEN_HALL));
    replies.push(passages_json(CLEAN_HALL));

    let broker = ProgressBroker::new();
    let mut sub = broker.subscribe("run-7");
    assert_eq!(sub.recv().await, Some(Frame::Connected));

    let hook = broker_hook(broker.clone(), |state: &StoryState| {
        state.stream_id.as_deref()
    });
    let graph = story_graph(ScriptedModel::new(replies), Some(hook)).unwrap();
    graph
        .invoke(StoryState::new("a door", "patience", Some("run-7".into())))
        .await
        .unwrap();

    let mut nodes_seen = Vec::new();
    while let Some(frame) = sub.try_recv() {
        if let Frame::Event(ev) = frame {
            nodes_seen.push(ev.node);
        }
    }
    assert!(nodes_seen.contains(&"retrieve_docs".to_string()));
    assert!(nodes_seen.contains(&"lint_passages".to_string()));
    assert!(!nodes_seen.contains(&"generate_passages".to_string()));
    assert!(!nodes_seen.contains(&"fix_passages".to_string()));
}

#[tokio::test]
async fn run_without_stream_id_publishes_nothing() {
    let mut replies = smooth_prefix();
    replies.push(passages_json(CLEAN_HALL));

    let broker = ProgressBroker::new();
    let mut sub = broker.subscribe("run-7");
    assert_eq!(sub.recv().await, Some(Frame::Connected));

    let hook = broker_hook(broker.clone(), |state: &StoryState| {
        state.stream_id.as_deref()
    });
    let graph = story_graph(ScriptedModel::new(replies), Some(hook)).unwrap();
    graph
        .invoke(StoryState::new("a door", "patience", None))
        .await
        .unwrap();

    assert!(sub.try_recv().is_none());
}
