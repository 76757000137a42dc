//! Passage verification: the checks behind the bounded repair cycle.
//!
//! Findings are human-readable strings naming the offending passage and the
//! concrete defect. They are recoverable data consumed by the repair node;
//! only the cycle's attempt ceiling turns them into a fatal error.

use std::sync::OnceLock;

use regex::Regex;

use crate::twee::{Passage, START_PASSAGE, TITLE_PASSAGE};

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("link pattern compiles"))
}

fn external_target_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(https?:|mailto:|javascript:)").expect("external pattern compiles")
    })
}

/// Resolve the target passage name of one `[[...]]` link body.
///
/// Harlowe link forms: `[[Target]]`, `[[Text->Target]]`, `[[Text|Target]]`.
fn link_target(raw: &str) -> &str {
    let raw = raw.trim();
    if let Some((_, target)) = raw.rsplit_once("->") {
        target.trim()
    } else if let Some((_, target)) = raw.rsplit_once('|') {
        target.trim()
    } else {
        raw
    }
}

/// Inspect generated passages for integrity defects.
///
/// Checks: the required named passages are present; every link target resolves
/// to an existing passage unless it is an external reference; parentheses are
/// balanced within each passage (unbalanced ones usually mean a mangled
/// macro). Returns an empty list when the artifact is clean.
pub fn lint_passages(passages: &[Passage]) -> Vec<String> {
    if passages.is_empty() {
        return vec!["No passages were generated to lint.".to_string()];
    }

    let mut findings = Vec::new();
    let names: std::collections::HashSet<&str> =
        passages.iter().map(|p| p.name.as_str()).collect();

    for required in [START_PASSAGE, TITLE_PASSAGE] {
        if !names.contains(required) {
            findings.push(format!("Missing required passage '{required}'."));
        }
    }

    for passage in passages {
        for capture in link_pattern().captures_iter(&passage.source) {
            let target = link_target(&capture[1]);
            if target.is_empty() || external_target_pattern().is_match(target) {
                continue;
            }
            if !names.contains(target) {
                findings.push(format!(
                    "Passage '{}' links to missing target '{target}'.",
                    passage.name
                ));
            }
        }

        let open = passage.source.matches('(').count();
        let close = passage.source.matches(')').count();
        if open != close {
            findings.push(format!(
                "Passage '{}' has unbalanced parentheses ({open} '(' vs {close} ')').",
                passage.name
            ));
        }
    }

    findings
}
