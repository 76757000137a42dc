//! Harlowe manual retrieval: rank reference sections against a run's query so
//! agents ground their output in real syntax instead of inventing macros.

use std::collections::HashMap;

const HARLOWE_MANUAL: &str = include_str!("../assets/harlowe-reference.md");

/// Length of the leading-snippet fallback handed out when retrieval finds
/// nothing useful.
const DOC_SNIPPET_LEN: usize = 4000;

struct ManualSection {
    title: String,
    body: String,
    token_counts: HashMap<String, usize>,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect::<Vec<_>>()
        .into_iter()
}

fn token_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn is_section_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    (3..=6).contains(&hashes)
        && trimmed[hashes..].starts_with(|c: char| c.is_whitespace())
}

fn build_sections(manual: &str) -> Vec<ManualSection> {
    let mut sections = Vec::new();
    let mut current_title = "Introduction".to_string();
    let mut buffer: Vec<&str> = Vec::new();

    let flush = |title: &str, buffer: &mut Vec<&str>, sections: &mut Vec<ManualSection>| {
        if buffer.is_empty() {
            return;
        }
        let body = buffer.join("\n").trim().to_string();
        buffer.clear();
        if body.is_empty() {
            return;
        }
        sections.push(ManualSection {
            token_counts: token_counts(&format!("{title} {body}")),
            title: title.to_string(),
            body,
        });
    };

    for line in manual.lines() {
        if is_section_heading(line) {
            flush(&current_title, &mut buffer, &mut sections);
            let heading = line.trim_start().trim_start_matches('#').trim();
            if !heading.is_empty() {
                current_title = heading.to_string();
            }
        } else {
            buffer.push(line);
        }
    }
    flush(&current_title, &mut buffer, &mut sections);
    sections
}

fn score(query: &HashMap<String, usize>, section: &ManualSection) -> usize {
    query
        .iter()
        .map(|(token, count)| count * section.token_counts.get(token).copied().unwrap_or(0))
        .sum()
}

/// Pre-tokenized manual, built once and shared by every run.
pub struct DocIndex {
    sections: Vec<ManualSection>,
    snippet: String,
}

impl DocIndex {
    /// Index over the embedded Harlowe reference.
    pub fn builtin() -> Self {
        Self::from_manual(HARLOWE_MANUAL)
    }

    pub fn from_manual(manual: &str) -> Self {
        let snippet = manual.chars().take(DOC_SNIPPET_LEN).collect();
        Self {
            sections: build_sections(manual),
            snippet,
        }
    }

    /// Leading slice of the manual, used when retrieval has nothing to rank.
    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    /// Top `max_sections` sections ranked by token overlap with `query`.
    /// Sections with zero overlap are skipped unless nothing scores at all,
    /// in which case the first sections are returned as-is.
    pub fn retrieve(&self, query: &str, max_sections: usize) -> Option<String> {
        if query.trim().is_empty() || self.sections.is_empty() {
            return None;
        }
        let query_counts = token_counts(query);
        let mut ranked: Vec<(usize, &ManualSection)> = self
            .sections
            .iter()
            .map(|section| (score(&query_counts, section), section))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let chosen: Vec<&ManualSection> = {
            let top: Vec<_> = ranked
                .iter()
                .filter(|(s, _)| *s > 0)
                .take(max_sections)
                .map(|(_, sec)| *sec)
                .collect();
            if top.is_empty() {
                ranked.iter().take(max_sections).map(|(_, sec)| *sec).collect()
            } else {
                top
            }
        };

        if chosen.is_empty() {
            return None;
        }
        Some(
            chosen
                .iter()
                .map(|section| format!("### {}\n{}", section.title, section.body))
                .collect::<Vec<_>>()
                .join("\n\n---\n\n"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_manual_splits_into_sections() {
        let index = DocIndex::builtin();
        assert!(index.sections.len() >= 5);
        assert!(index
            .sections
            .iter()
            .any(|s| s.title == "Passages and links"));
    }

    #[test]
    fn retrieval_ranks_matching_sections_first() {
        let index = DocIndex::builtin();
        let hit = index.retrieve("conditional branching with if and else", 1).unwrap();
        assert!(hit.contains("### Conditionals"), "got: {hit}");
    }

    #[test]
    fn retrieval_caps_section_count() {
        let index = DocIndex::builtin();
        let hits = index.retrieve("link passage variable set macro", 2).unwrap();
        assert_eq!(hits.matches("### ").count(), 2);
    }

    #[test]
    fn empty_query_returns_none() {
        let index = DocIndex::builtin();
        assert!(index.retrieve("   ", 3).is_none());
    }

    #[test]
    fn zero_overlap_falls_back_to_leading_sections() {
        let index = DocIndex::from_manual("### Alpha\nfirst body\n\n### Beta\nsecond body\n");
        let hits = index.retrieve("zzzz qqqq", 1).unwrap();
        assert!(hits.contains("### Alpha"));
    }

    #[test]
    fn snippet_is_leading_slice() {
        let index = DocIndex::from_manual("### Alpha\nbody text here");
        assert!(index.snippet().starts_with("### Alpha"));
    }

    #[test]
    fn heading_detection_requires_three_to_six_hashes() {
        assert!(is_section_heading("### Links"));
        assert!(is_section_heading("###### Deep"));
        assert!(!is_section_heading("## Chapter"));
        assert!(!is_section_heading("####### Too deep"));
        assert!(!is_section_heading("###NoSpace"));
    }
}
