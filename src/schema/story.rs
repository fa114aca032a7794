use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

use super::slide::{Slide, SlideId};

/// Fewest slides a playable story may have.
pub const MIN_SLIDES: usize = 7;
/// Most slides a playable story may have.
pub const MAX_SLIDES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    #[error("slide {0} not found")]
    SlideNotFound(SlideId),
    #[error("slide {0}: text must not be empty")]
    EmptyText(SlideId),
    #[error("slide {0}: illustration prompt must not be empty")]
    EmptyPrompt(SlideId),
}

/// A structural invariant a canonical story does not satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("story has {found} slides, expected between {min} and {max}")]
    SlideCount { found: usize, min: usize, max: usize },
    #[error("slide at position {position} has id {id}")]
    IdOutOfSequence { position: usize, id: SlideId },
    #[error("slide {0} has empty text")]
    EmptyText(SlideId),
    #[error("slide {0} has an empty illustration prompt")]
    EmptyPrompt(SlideId),
    #[error("story has {0} decision slides, expected exactly one")]
    DecisionCount(usize),
    #[error("decision slide {slide} has {found} choices, expected 2")]
    ChoiceCount { slide: SlideId, found: usize },
    #[error("decision slide {0} must have exactly one safe and one unsafe choice")]
    Polarity(SlideId),
    #[error("choice on slide {slide} has an empty label")]
    EmptyLabel { slide: SlideId },
    #[error("choice on slide {slide} targets missing slide {target}")]
    DanglingTarget { slide: SlideId, target: SlideId },
    #[error("choice on slide {0} targets its own slide")]
    SelfLoop(SlideId),
    #[error("choice on slide {slide} targets earlier slide {target}")]
    BackwardTarget { slide: SlideId, target: SlideId },
}

/// A character from the story blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub traits: Vec<String>,
}

/// Descriptive metadata produced alongside the slides.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub age_group: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moral_lesson: Option<String>,
    #[serde(default)]
    pub characters: Vec<Character>,
}

/// A canonical story graph.
///
/// Only the normalizer builds one from raw input. After that the slide list
/// and all choices are fixed; the edit methods below touch text and
/// illustrations only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    #[serde(flatten)]
    pub meta: StoryMeta,
    pub slides: Vec<Slide>,
}

impl Story {
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Look up a slide by id. Ids are contiguous, so this is a direct index.
    pub fn slide(&self, id: SlideId) -> Option<&Slide> {
        self.slides.get(id.position()).filter(|s| s.id == id)
    }

    /// Zero-based position of a slide in reading order.
    pub fn position_of(&self, id: SlideId) -> Option<usize> {
        self.slide(id).map(|_| id.position())
    }

    pub fn first(&self) -> Option<&Slide> {
        self.slides.first()
    }

    /// The single slide bearing choices.
    pub fn decision_slide(&self) -> Option<&Slide> {
        self.slides.iter().find(|s| s.is_decision())
    }

    pub fn moral_lesson(&self) -> Option<&str> {
        self.meta.moral_lesson.as_deref()
    }

    fn slide_mut(&mut self, id: SlideId) -> Result<&mut Slide, StoryError> {
        self.slides
            .get_mut(id.position())
            .filter(|s| s.id == id)
            .ok_or(StoryError::SlideNotFound(id))
    }

    /// Replace the narrative text of one slide.
    pub fn replace_text(&mut self, id: SlideId, text: &str) -> Result<(), StoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoryError::EmptyText(id));
        }
        self.slide_mut(id)?.text = text.to_string();
        Ok(())
    }

    /// Replace the illustration prompt of one slide.
    pub fn replace_illustration_prompt(
        &mut self,
        id: SlideId,
        prompt: &str,
    ) -> Result<(), StoryError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StoryError::EmptyPrompt(id));
        }
        self.slide_mut(id)?.illustration_prompt = prompt.to_string();
        Ok(())
    }

    /// Attach (or replace) a generated illustration on one slide.
    pub fn attach_illustration(&mut self, id: SlideId, url: &str) -> Result<(), StoryError> {
        self.slide_mut(id)?.image_url = Some(url.to_string());
        Ok(())
    }

    /// Drop an illustration, returning the slide to text-only rendering.
    pub fn clear_illustration(&mut self, id: SlideId) -> Result<Option<String>, StoryError> {
        Ok(self.slide_mut(id)?.image_url.take())
    }

    /// Check every structural invariant with the default length bounds.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        self.validate_bounds(MIN_SLIDES..=MAX_SLIDES)
    }

    /// Check every structural invariant against the given length bounds.
    pub fn validate_bounds(&self, bounds: RangeInclusive<usize>) -> Result<(), InvariantViolation> {
        let total = self.slides.len();
        if !bounds.contains(&total) {
            return Err(InvariantViolation::SlideCount {
                found: total,
                min: *bounds.start(),
                max: *bounds.end(),
            });
        }

        let mut decisions = 0;
        for (position, slide) in self.slides.iter().enumerate() {
            if slide.id != SlideId::from_position(position) {
                return Err(InvariantViolation::IdOutOfSequence {
                    position,
                    id: slide.id,
                });
            }
            if slide.text.trim().is_empty() {
                return Err(InvariantViolation::EmptyText(slide.id));
            }
            if slide.illustration_prompt.trim().is_empty() {
                return Err(InvariantViolation::EmptyPrompt(slide.id));
            }
            if slide.is_decision() {
                decisions += 1;
                check_decision(slide, total)?;
            }
        }

        if decisions != 1 {
            return Err(InvariantViolation::DecisionCount(decisions));
        }
        Ok(())
    }

    /// One line per slide describing how the graph is wired.
    pub fn outline(&self) -> Vec<String> {
        self.slides
            .iter()
            .map(|slide| {
                let branches = match (slide.safe_choice(), slide.unsafe_choice()) {
                    (Some(safe), Some(risky)) => {
                        format!(" [decision] -> safe: {}, unsafe: {}", safe.target, risky.target)
                    }
                    _ if slide.id.0 as usize == self.slides.len() => " -> end".to_string(),
                    _ => format!(" -> {}", slide.id.0 + 1),
                };
                let art = if slide.image_url.is_some() { "" } else { " (text-only)" };
                format!("Slide {}{}{}", slide.id, branches, art)
            })
            .collect()
    }
}

fn check_decision(slide: &Slide, total: usize) -> Result<(), InvariantViolation> {
    let choices = slide.choices();
    if choices.len() != 2 {
        return Err(InvariantViolation::ChoiceCount {
            slide: slide.id,
            found: choices.len(),
        });
    }
    if choices[0].is_correct == choices[1].is_correct {
        return Err(InvariantViolation::Polarity(slide.id));
    }
    for choice in choices {
        if choice.label.trim().is_empty() {
            return Err(InvariantViolation::EmptyLabel { slide: slide.id });
        }
        if choice.target == slide.id {
            return Err(InvariantViolation::SelfLoop(slide.id));
        }
        if choice.target.0 == 0 || choice.target.0 as usize > total {
            return Err(InvariantViolation::DanglingTarget {
                slide: slide.id,
                target: choice.target,
            });
        }
        if choice.target < slide.id {
            return Err(InvariantViolation::BackwardTarget {
                slide: slide.id,
                target: choice.target,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::slide::Choice;

    fn linear(id: u32) -> Slide {
        Slide {
            id: SlideId(id),
            text: format!("Slide {id} text"),
            illustration_prompt: format!("Slide {id} picture"),
            image_url: None,
            choices: None,
            created_at: None,
        }
    }

    fn sample_story() -> Story {
        let mut slides: Vec<Slide> = (1..=8).map(linear).collect();
        slides[2].choices = Some(vec![
            Choice {
                label: "Ask for help from a trusted adult".to_string(),
                target: SlideId(5),
                is_correct: true,
            },
            Choice {
                label: "Go with the person".to_string(),
                target: SlideId(6),
                is_correct: false,
            },
        ]);
        Story {
            meta: StoryMeta {
                title: "Rani and the Playground".to_string(),
                moral_lesson: Some("Say no and tell a trusted adult.".to_string()),
                ..StoryMeta::default()
            },
            slides,
        }
    }

    #[test]
    fn sample_story_is_valid() {
        let story = sample_story();
        assert_eq!(story.validate(), Ok(()));
        assert_eq!(story.decision_slide().map(|s| s.id), Some(SlideId(3)));
        assert_eq!(story.moral_lesson(), Some("Say no and tell a trusted adult."));
    }

    #[test]
    fn lookup_by_id() {
        let story = sample_story();
        assert_eq!(story.slide(SlideId(4)).map(|s| s.id), Some(SlideId(4)));
        assert!(story.slide(SlideId(0)).is_none());
        assert!(story.slide(SlideId(9)).is_none());
        assert_eq!(story.position_of(SlideId(4)), Some(3));
        assert_eq!(story.position_of(SlideId(9)), None);
    }

    #[test]
    fn detects_count_violation() {
        let mut story = sample_story();
        story.slides.truncate(6);
        assert!(matches!(
            story.validate(),
            Err(InvariantViolation::SlideCount { found: 6, .. })
        ));
    }

    #[test]
    fn detects_second_decision() {
        let mut story = sample_story();
        story.slides[5].choices = story.slides[2].choices.clone();
        let err = story.validate().unwrap_err();
        assert!(matches!(
            err,
            InvariantViolation::BackwardTarget { .. } | InvariantViolation::DecisionCount(2)
        ));
    }

    #[test]
    fn detects_polarity_and_self_loop() {
        let mut story = sample_story();
        if let Some(choices) = story.slides[2].choices.as_mut() {
            choices[1].is_correct = true;
        }
        assert_eq!(story.validate(), Err(InvariantViolation::Polarity(SlideId(3))));

        let mut story = sample_story();
        if let Some(choices) = story.slides[2].choices.as_mut() {
            choices[0].target = SlideId(3);
        }
        assert_eq!(story.validate(), Err(InvariantViolation::SelfLoop(SlideId(3))));
    }

    #[test]
    fn detects_dangling_target() {
        let mut story = sample_story();
        if let Some(choices) = story.slides[2].choices.as_mut() {
            choices[1].target = SlideId(12);
        }
        assert!(matches!(
            story.validate(),
            Err(InvariantViolation::DanglingTarget { target: SlideId(12), .. })
        ));
    }

    #[test]
    fn edits_touch_only_text_and_art() {
        let mut story = sample_story();
        story.replace_text(SlideId(2), "  A stranger walks up.  ").unwrap();
        story.attach_illustration(SlideId(2), "https://img/2.png").unwrap();
        story
            .replace_illustration_prompt(SlideId(2), "A stranger with candy")
            .unwrap();

        let slide = story.slide(SlideId(2)).unwrap();
        assert_eq!(slide.text, "A stranger walks up.");
        assert_eq!(slide.image_url.as_deref(), Some("https://img/2.png"));
        assert_eq!(story.validate(), Ok(()));

        assert_eq!(
            story.clear_illustration(SlideId(2)).unwrap().as_deref(),
            Some("https://img/2.png")
        );
        assert!(story.slide(SlideId(2)).unwrap().image_url.is_none());
    }

    #[test]
    fn edits_reject_bad_input() {
        let mut story = sample_story();
        assert_eq!(
            story.replace_text(SlideId(2), "   "),
            Err(StoryError::EmptyText(SlideId(2)))
        );
        assert_eq!(
            story.replace_illustration_prompt(SlideId(2), ""),
            Err(StoryError::EmptyPrompt(SlideId(2)))
        );
        assert_eq!(
            story.attach_illustration(SlideId(40), "x"),
            Err(StoryError::SlideNotFound(SlideId(40)))
        );
    }

    #[test]
    fn outline_describes_graph() {
        let mut story = sample_story();
        story.attach_illustration(SlideId(1), "https://img/1.png").unwrap();
        let lines = story.outline();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "Slide 1 -> 2");
        assert_eq!(lines[2], "Slide 3 [decision] -> safe: 5, unsafe: 6 (text-only)");
        assert_eq!(lines[7], "Slide 8 -> end (text-only)");
    }

    #[test]
    fn serializes_flat_meta() {
        let json = serde_json::to_value(sample_story()).unwrap();
        assert_eq!(json["title"], "Rani and the Playground");
        assert_eq!(json["moralLesson"], "Say no and tell a trusted adult.");
        assert_eq!(json["slides"].as_array().map(Vec::len), Some(8));
    }
}
