use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical slide identifier. After normalization, `id == position + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlideId(pub u32);

impl SlideId {
    /// The slide id for a zero-based position in the slide list.
    pub fn from_position(position: usize) -> Self {
        Self(position as u32 + 1)
    }

    /// Zero-based position this id occupies in a canonical story.
    pub fn position(&self) -> usize {
        (self.0 as usize).saturating_sub(1)
    }
}

impl fmt::Display for SlideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An edge from the decision slide to another slide.
///
/// The label is learner-facing and never reveals which branch is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    #[serde(rename = "nextSlide")]
    pub target: SlideId,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
}

/// A node in the story graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub id: SlideId,
    pub text: String,
    #[serde(rename = "imagePrompt")]
    pub illustration_prompt: String,
    /// Attached asynchronously by the illustration collaborator; absent means text-only.
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Slide {
    /// Returns true if this slide carries choices.
    pub fn is_decision(&self) -> bool {
        self.choices.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// The choices of a decision slide, or an empty slice for linear slides.
    pub fn choices(&self) -> &[Choice] {
        self.choices.as_deref().unwrap_or(&[])
    }

    /// The branch flagged safe, if any.
    pub fn safe_choice(&self) -> Option<&Choice> {
        self.choices().iter().find(|c| c.is_correct)
    }

    /// The branch flagged unsafe, if any.
    pub fn unsafe_choice(&self) -> Option<&Choice> {
        self.choices().iter().find(|c| !c.is_correct)
    }
}
