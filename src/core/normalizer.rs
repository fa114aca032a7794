/// Story normalizer: repairs a raw story tree into a canonical story graph.
///
/// Filtering, truncation, id remapping, decision selection and choice repair
/// run as one deterministic pass. Only two conditions are fatal (too few
/// usable slides, a payload that is not a slide list); everything else is
/// repaired and recorded as a [`Repair`].

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::core::config::{ConfigError, NormalizerConfig};
use crate::schema::raw::{MalformedPayload, RawChoice, RawSlide, RawStory};
use crate::schema::slide::{Choice, Slide, SlideId};
use crate::schema::story::{Story, StoryMeta};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("only {found} usable slides were generated, at least {required} are needed; try generating again")]
    GenerationTooShort { found: usize, required: usize },
    #[error(transparent)]
    MalformedPayload(#[from] MalformedPayload),
}

/// Why a raw slide was discarded during filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingText,
    MissingPrompt,
}

/// A silent repair applied while normalizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// A raw slide (1-based raw position) lacked text or prompt.
    DroppedSlide { position: usize, reason: DropReason },
    /// Slides past the maximum were cut.
    Truncated { kept: usize, dropped: usize },
    /// A later slide reused a raw id already owned by `owner`.
    DuplicateId { raw_id: u64, owner: SlideId, slide: SlideId },
    /// A non-decision slide proposed choices; they were removed.
    ClearedChoices { slide: SlideId },
    /// The decision slide proposed more than two choices.
    ExtraChoicesDropped { slide: SlideId, dropped: usize },
    /// Both choices had the same polarity; the second was flipped.
    FlippedPolarity { slide: SlideId },
    /// A choice target was unresolved, out of range, backward or a self-loop.
    RetargetedChoice {
        slide: SlideId,
        choice: usize,
        raw_target: Option<u64>,
        target: SlideId,
    },
    /// A choice had no label; the default for its polarity was used.
    DefaultLabel { slide: SlideId, choice: usize },
    /// The decision slide had a single choice; a second was added.
    SynthesizedChoice { slide: SlideId },
    /// No slide could host the decision; one was built from defaults.
    SynthesizedDecision { slide: SlideId },
}

impl Repair {
    /// Short stable name of the repair, for tallies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DroppedSlide { .. } => "dropped-slide",
            Self::Truncated { .. } => "truncated",
            Self::DuplicateId { .. } => "duplicate-id",
            Self::ClearedChoices { .. } => "cleared-choices",
            Self::ExtraChoicesDropped { .. } => "extra-choices-dropped",
            Self::FlippedPolarity { .. } => "flipped-polarity",
            Self::RetargetedChoice { .. } => "retargeted-choice",
            Self::DefaultLabel { .. } => "default-label",
            Self::SynthesizedChoice { .. } => "synthesized-choice",
            Self::SynthesizedDecision { .. } => "synthesized-decision",
        }
    }
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DroppedSlide { position, reason } => {
                let what = match reason {
                    DropReason::MissingText => "text",
                    DropReason::MissingPrompt => "image prompt",
                };
                write!(f, "dropped raw slide #{position}: missing {what}")
            }
            Self::Truncated { kept, dropped } => {
                write!(f, "kept first {kept} slides, dropped {dropped}")
            }
            Self::DuplicateId { raw_id, owner, slide } => {
                write!(f, "slide {slide} reuses raw id {raw_id} (owned by slide {owner})")
            }
            Self::ClearedChoices { slide } => write!(f, "cleared extra choices on slide {slide}"),
            Self::ExtraChoicesDropped { slide, dropped } => {
                write!(f, "dropped {dropped} surplus choices on slide {slide}")
            }
            Self::FlippedPolarity { slide } => {
                write!(f, "flipped polarity of second choice on slide {slide}")
            }
            Self::RetargetedChoice {
                slide,
                choice,
                raw_target,
                target,
            } => match raw_target {
                Some(raw) => write!(
                    f,
                    "choice {choice} on slide {slide}: target {raw} replaced by {target}"
                ),
                None => write!(f, "choice {choice} on slide {slide}: missing target set to {target}"),
            },
            Self::DefaultLabel { slide, choice } => {
                write!(f, "choice {choice} on slide {slide}: default label used")
            }
            Self::SynthesizedChoice { slide } => {
                write!(f, "added missing second choice on slide {slide}")
            }
            Self::SynthesizedDecision { slide } => {
                write!(f, "no usable decision point; built one on slide {slide}")
            }
        }
    }
}

/// A canonical story plus the repairs it took to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub story: Story,
    pub repairs: Vec<Repair>,
}

/// A raw slide that survived filtering, with its resolved original id.
struct Candidate<'a> {
    original_id: u64,
    raw: &'a RawSlide,
}

/// Converts untrusted story trees into canonical stories.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Build a normalizer, rejecting configs that could yield a non-canonical story.
    pub fn new(config: NormalizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize a raw slide list into a canonical story.
    pub fn normalize(&self, raw: &[RawSlide]) -> Result<Story, NormalizationError> {
        self.normalize_with_report(raw).map(|n| n.story)
    }

    /// Normalize a parsed JSON payload (bare slide array or `{title, slides}`).
    pub fn normalize_value(&self, value: &Value) -> Result<Normalized, NormalizationError> {
        let raw = RawStory::from_value(value)?;
        self.normalize_story(&raw)
    }

    /// Normalize model output text.
    pub fn normalize_json(&self, content: &str) -> Result<Normalized, NormalizationError> {
        let raw = RawStory::from_json(content)?;
        self.normalize_story(&raw)
    }

    /// Normalize a raw story, carrying its title into the metadata.
    pub fn normalize_story(&self, raw: &RawStory) -> Result<Normalized, NormalizationError> {
        let mut normalized = self.normalize_with_report(&raw.slides)?;
        normalized.story.meta.title = raw.title.clone().unwrap_or_default();
        Ok(normalized)
    }

    /// Normalize and report every silent repair.
    pub fn normalize_with_report(&self, raw: &[RawSlide]) -> Result<Normalized, NormalizationError> {
        let mut repairs = Vec::new();

        let mut candidates = filter_usable(raw, &mut repairs);
        if candidates.len() < self.config.min_slides {
            tracing::debug!(
                found = candidates.len(),
                required = self.config.min_slides,
                "generation too short"
            );
            return Err(NormalizationError::GenerationTooShort {
                found: candidates.len(),
                required: self.config.min_slides,
            });
        }

        if candidates.len() > self.config.max_slides {
            repairs.push(Repair::Truncated {
                kept: self.config.max_slides,
                dropped: candidates.len() - self.config.max_slides,
            });
            candidates.truncate(self.config.max_slides);
        }
        let total = candidates.len();

        let id_map = remap_ids(&candidates, &mut repairs);

        let decision = select_decision(&candidates, &mut repairs);

        let mut slides: Vec<Slide> = candidates
            .iter()
            .enumerate()
            .map(|(position, c)| Slide {
                id: SlideId::from_position(position),
                text: c.raw.text.clone().unwrap_or_default(),
                illustration_prompt: c.raw.image_prompt.clone().unwrap_or_default(),
                image_url: c.raw.image_url.clone(),
                choices: None,
                created_at: c.raw.created_at.clone(),
            })
            .collect();

        let (position, raw_choices) = match decision {
            Some(position) => (position, candidates[position].raw.choices.as_slice()),
            None => {
                // Lands the synthesized decision where both fallbacks stay in range.
                let position = total.saturating_sub(4);
                repairs.push(Repair::SynthesizedDecision {
                    slide: SlideId::from_position(position),
                });
                (position, &[][..])
            }
        };
        let choices = self.repair_choices(
            SlideId::from_position(position),
            total,
            raw_choices,
            &id_map,
            &mut repairs,
        );
        slides[position].choices = Some(choices);

        for repair in &repairs {
            tracing::debug!(%repair, "repaired story");
        }

        Ok(Normalized {
            story: Story {
                meta: StoryMeta::default(),
                slides,
            },
            repairs,
        })
    }

    /// Repair the decision slide's choices so exactly two forward edges of
    /// opposite polarity remain.
    fn repair_choices(
        &self,
        slide: SlideId,
        total: usize,
        raw: &[RawChoice],
        id_map: &FxHashMap<u64, SlideId>,
        repairs: &mut Vec<Repair>,
    ) -> Vec<Choice> {
        if raw.len() > 2 {
            repairs.push(Repair::ExtraChoicesDropped {
                slide,
                dropped: raw.len() - 2,
            });
        }

        // Polarity is settled first so fallbacks and labels follow the final flags.
        let first_correct = raw.first().map_or(true, |c| c.is_correct);
        let second_correct = raw.get(1).map_or(false, |c| c.is_correct);
        let second_correct = if second_correct == first_correct {
            if raw.len() >= 2 {
                repairs.push(Repair::FlippedPolarity { slide });
            }
            !first_correct
        } else {
            second_correct
        };

        let mut choices = Vec::with_capacity(2);
        for (index, is_correct) in [first_correct, second_correct].into_iter().enumerate() {
            let raw_choice = raw.get(index);
            if raw_choice.is_none() && raw.len() == 1 {
                repairs.push(Repair::SynthesizedChoice { slide });
            }

            let raw_target = raw_choice.and_then(|c| c.target);
            let resolved = raw_target
                .and_then(|t| id_map.get(&t).copied())
                .filter(|t| *t > slide && t.0 as usize <= total);
            let target = match resolved {
                Some(target) => target,
                None => {
                    let target = self.fallback_target(slide, total, is_correct);
                    if raw_choice.is_some() {
                        repairs.push(Repair::RetargetedChoice {
                            slide,
                            choice: index,
                            raw_target,
                            target,
                        });
                    }
                    target
                }
            };

            let label = match raw_choice.and_then(|c| c.label.clone()) {
                Some(label) => label,
                None => {
                    if raw_choice.is_some() {
                        repairs.push(Repair::DefaultLabel {
                            slide,
                            choice: index,
                        });
                    }
                    self.default_label(is_correct).to_string()
                }
            };

            choices.push(Choice {
                label,
                target,
                is_correct,
            });
        }
        choices
    }

    fn fallback_target(&self, slide: SlideId, total: usize, is_correct: bool) -> SlideId {
        let offset = if is_correct {
            self.config.safe_offset
        } else {
            self.config.unsafe_offset
        };
        let target = (slide.0 as usize + offset).min(total);
        SlideId(target as u32)
    }

    fn default_label(&self, is_correct: bool) -> &str {
        if is_correct {
            &self.config.safe_label
        } else {
            &self.config.unsafe_label
        }
    }
}

/// Drop slides without text or prompt, resolving each survivor's original id.
fn filter_usable<'a>(raw: &'a [RawSlide], repairs: &mut Vec<Repair>) -> Vec<Candidate<'a>> {
    let mut candidates = Vec::with_capacity(raw.len());
    for (index, slide) in raw.iter().enumerate() {
        if slide.is_usable() {
            candidates.push(Candidate {
                original_id: slide.id.unwrap_or(index as u64 + 1),
                raw: slide,
            });
            continue;
        }
        let reason = if slide.text.is_none() {
            DropReason::MissingText
        } else {
            DropReason::MissingPrompt
        };
        repairs.push(Repair::DroppedSlide {
            position: index + 1,
            reason,
        });
    }
    candidates
}

/// Map original ids to canonical ids. The first slide to claim an id keeps it.
fn remap_ids(candidates: &[Candidate<'_>], repairs: &mut Vec<Repair>) -> FxHashMap<u64, SlideId> {
    let mut id_map = FxHashMap::default();
    for (position, candidate) in candidates.iter().enumerate() {
        let id = SlideId::from_position(position);
        match id_map.get(&candidate.original_id) {
            Some(&owner) => repairs.push(Repair::DuplicateId {
                raw_id: candidate.original_id,
                owner,
                slide: id,
            }),
            None => {
                id_map.insert(candidate.original_id, id);
            }
        }
    }
    id_map
}

/// Pick the first slide with raw choices that has a successor to branch to.
/// Every other slide's proposed choices are cleared.
fn select_decision(candidates: &[Candidate<'_>], repairs: &mut Vec<Repair>) -> Option<usize> {
    let last = candidates.len().saturating_sub(1);
    candidates
        .iter()
        .enumerate()
        .fold(None, |decision, (position, candidate)| {
            if candidate.raw.choices.is_empty() {
                return decision;
            }
            if decision.is_none() && position < last {
                return Some(position);
            }
            repairs.push(Repair::ClearedChoices {
                slide: SlideId::from_position(position),
            });
            decision
        })
}
