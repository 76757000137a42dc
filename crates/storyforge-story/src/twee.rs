//! Story artifact types and twee source rendering.
//!
//! A finished artifact is a collection of named passages with `[[link]]`
//! cross-references between them. Conversion into a playable document is the
//! job of an external compiler behind [`StoryCompiler`].

use serde::{Deserialize, Serialize};

/// Name of the passage a reader starts in.
pub const START_PASSAGE: &str = "Starting Passage";

/// Name of the passage holding the story's title.
pub const TITLE_PASSAGE: &str = "StoryTitle";

/// Planning record for one passage: what it covers and the pseudocode the
/// coder agent turns into real macros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassagePlan {
    pub name: String,
    pub summary: String,
    pub pseudocode: String,
}

/// One generated passage of twee source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: String,
}

impl Passage {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            source: source.into(),
        }
    }
}

/// A complete story artifact.
#[derive(Debug, Clone)]
pub struct Story {
    pub passages: Vec<Passage>,
}

impl Story {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    /// The passage a reader starts in: the designated start passage if
    /// present, otherwise the first passage.
    pub fn start_passage(&self) -> Option<&Passage> {
        self.passages
            .iter()
            .find(|p| p.name == START_PASSAGE)
            .or_else(|| self.passages.first())
    }

    /// The story title, when a title passage exists.
    pub fn title(&self) -> Option<&str> {
        self.passages
            .iter()
            .find(|p| p.name == TITLE_PASSAGE)
            .map(|p| p.source.trim())
    }

    /// Render the story as twee source.
    pub fn to_twee(&self) -> String {
        let mut out = String::new();
        for passage in &self.passages {
            out.push_str(":: ");
            out.push_str(&passage.name);
            if !passage.tags.is_empty() {
                out.push_str(" [");
                out.push_str(&passage.tags.join(" "));
                out.push(']');
            }
            out.push('\n');
            out.push_str(passage.source.trim_end());
            out.push_str("\n\n");
        }
        out
    }
}

/// External collaborator that turns a finished story into a distributable
/// document (e.g. a playable HTML file). No implementation is bundled here.
pub trait StoryCompiler: Send + Sync {
    fn compile(&self, story: &Story) -> storyforge_types::Result<String>;
}
