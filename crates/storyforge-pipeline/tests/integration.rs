//! End-to-end tests of the graph engine: a generic bounded repair cycle
//! composed from generation, verification, and repair nodes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use storyforge_pipeline::{
    append, node_fn, overwrite, Graph, GraphBuilder, GraphState, NodeOutput, Target, Update,
};
use storyforge_types::ForgeError;

// ---------------------------------------------------------------------------
// A small artifact-producing state
// ---------------------------------------------------------------------------

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default)]
struct RepairState {
    artifact: Option<String>,
    findings: Option<String>,
    attempts: u32,
    log: Vec<String>,
}

#[derive(Default)]
struct RepairPatch {
    artifact: Update<String>,
    findings: Update<String>,
    attempts: Option<u32>,
}

impl GraphState for RepairState {
    type Patch = RepairPatch;

    fn merge(&self, patch: RepairPatch) -> Self {
        let mut next = self.clone();
        patch.artifact.apply(&mut next.artifact);
        patch.findings.apply(&mut next.findings);
        overwrite(&mut next.attempts, patch.attempts);
        next
    }

    fn push_messages(&mut self, messages: &[String]) {
        append(&mut self.log, messages.to_vec());
    }

    fn messages(&self) -> &[String] {
        &self.log
    }
}

/// Build generate → verify ⇄ repair, where `verdicts` scripts how many
/// findings each verification pass reports.
fn repair_graph(verdicts: Vec<usize>) -> Graph<RepairState> {
    let verdicts = Arc::new(verdicts);
    let pass = Arc::new(AtomicUsize::new(0));

    GraphBuilder::new()
        .add_node("generate", node_fn(|_: RepairState| async move {
            Ok(NodeOutput::new(RepairPatch {
                artifact: Update::Set("draft".into()),
                ..Default::default()
            })
            .with_message("generated draft"))
        }))
        .add_node("verify", node_fn(move |state: RepairState| {
            let verdicts = verdicts.clone();
            let pass = pass.clone();
            async move {
                let n = pass.fetch_add(1, Ordering::SeqCst);
                let findings = verdicts.get(n).copied().unwrap_or(0);
                if findings == 0 {
                    return Ok(NodeOutput::new(RepairPatch {
                        findings: Update::Clear,
                        ..Default::default()
                    })
                    .with_message("verified clean"));
                }
                let summary = (0..findings)
                    .map(|i| format!("finding {i}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                if state.attempts >= MAX_ATTEMPTS {
                    return Err(ForgeError::RepairExhausted {
                        node: "verify".into(),
                        attempts: state.attempts,
                        findings: summary,
                    });
                }
                Ok(NodeOutput::new(RepairPatch {
                    findings: Update::Set(summary),
                    ..Default::default()
                })
                .with_message(format!("found {findings} issues")))
            }
        }))
        .add_node("repair", node_fn(|state: RepairState| async move {
            Ok(NodeOutput::new(RepairPatch {
                artifact: Update::Set(format!("draft+fix{}", state.attempts + 1)),
                findings: Update::Clear,
                attempts: Some(state.attempts + 1),
                ..Default::default()
            })
            .with_message("repaired draft"))
        }))
        .add_edge("generate", Target::node("verify"))
        .add_branch(
            "verify",
            [Target::node("repair"), Target::End],
            |state: &RepairState| {
                if state.findings.is_some() {
                    Target::node("repair")
                } else {
                    Target::End
                }
            },
        )
        .add_edge("repair", Target::node("verify"))
        .entry("generate")
        .compile()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_findings_routes_straight_to_terminal() {
    let final_state = repair_graph(vec![0]).invoke(RepairState::default()).await.unwrap();
    assert_eq!(final_state.attempts, 0);
    assert_eq!(final_state.log, vec!["generated draft", "verified clean"]);
}

#[tokio::test]
async fn two_findings_then_clean_means_one_repair() {
    let final_state = repair_graph(vec![2, 0])
        .invoke(RepairState::default())
        .await
        .unwrap();

    // Exactly 2 verification passes, 1 repair, counter at 1 on success.
    assert_eq!(final_state.attempts, 1);
    assert_eq!(
        final_state.log,
        vec![
            "generated draft",
            "found 2 issues",
            "repaired draft",
            "verified clean",
        ]
    );
    assert_eq!(final_state.artifact.as_deref(), Some("draft+fix1"));
    assert!(final_state.findings.is_none());
}

#[tokio::test]
async fn persistent_findings_fail_fatally_at_the_ceiling() {
    let final_err = repair_graph(vec![1, 1, 1, 1, 1])
        .invoke(RepairState::default())
        .await
        .unwrap_err();

    match final_err {
        ForgeError::Stage { node, source } => {
            assert_eq!(node, "verify");
            match *source {
                ForgeError::RepairExhausted {
                    attempts, findings, ..
                } => {
                    assert_eq!(attempts, MAX_ATTEMPTS);
                    assert_eq!(findings, "finding 0");
                }
                other => panic!("expected RepairExhausted, got {other:?}"),
            }
        }
        other => panic!("expected Stage-tagged error, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_run_returns_no_partial_state_but_log_order_held_until_failure() {
    // The counter climbs once per cycle and is never reset: attempts hit the
    // ceiling after exactly MAX_ATTEMPTS repairs.
    let graph = repair_graph(vec![1; 10]);
    let err = graph.invoke(RepairState::default()).await.unwrap_err();
    assert!(err.to_string().contains("verify"));
    assert!(err.to_string().contains("finding 0"));
}

#[tokio::test]
async fn terminal_state_is_the_last_merge() {
    let final_state = repair_graph(vec![1, 1, 0])
        .invoke(RepairState::default())
        .await
        .unwrap();
    assert_eq!(final_state.attempts, 2);
    assert_eq!(final_state.artifact.as_deref(), Some("draft+fix2"));
}
