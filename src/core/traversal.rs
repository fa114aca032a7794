/// Story traversal: a pure reducer driving one learner through a story.
///
/// The engine never mutates the story. Per-learner state lives in a
/// [`Session`] owned by the caller, which also makes it the progress record
/// a persistence layer can store and hand back later.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::{ResumePolicy, TraversalConfig};
use crate::schema::slide::{Choice, Slide, SlideId};
use crate::schema::story::Story;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraversalError {
    #[error("the story is already complete")]
    AlreadyCompleted,
    #[error("slide {0} is a decision point; pick one of its choices")]
    DecisionPending(SlideId),
    #[error("slide {0} has no choices")]
    NotADecision(SlideId),
    #[error("slide {slide} has no choice {index}")]
    NoSuchChoice { slide: SlideId, index: usize },
    #[error("the corrective message must be acknowledged before continuing")]
    ResumePending,
    #[error("there is nothing to resume")]
    NothingToResume,
}

/// How a finished session is classified for the reinforcement screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// The learner took the safe branch.
    Positive,
    /// The learner took the unsafe branch and was shown the correction.
    Educational,
}

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Position {
    /// Showing a slide.
    Slide { slide: SlideId },
    /// The unsafe branch was picked on `decision`; waiting for the learner to resume.
    Corrective { decision: SlideId },
    /// Absorbing terminal state.
    Completed { outcome: Outcome },
}

/// Learner input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Advance from a linear slide.
    Continue,
    /// Pick a choice on the decision slide by index.
    Choose(usize),
    /// Leave the corrective interstitial.
    Resume,
}

/// Per-learner traversal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub position: Position,
    /// Set once an unsafe choice has been taken.
    pub took_unsafe_branch: bool,
    /// Slides shown so far, in order.
    pub path: Vec<SlideId>,
}

impl Session {
    /// The slide being shown; for the interstitial this is the decision slide.
    pub fn current_slide_id(&self) -> Option<SlideId> {
        match self.position {
            Position::Slide { slide } => Some(slide),
            Position::Corrective { decision } => Some(decision),
            Position::Completed { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.position, Position::Completed { .. })
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.position {
            Position::Completed { outcome } => Some(outcome),
            _ => None,
        }
    }
}

/// Shown once the session reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion<'a> {
    pub outcome: Outcome,
    pub moral_lesson: Option<&'a str>,
}

/// What the renderer needs for the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView<'a> {
    pub slide: Option<&'a Slide>,
    pub is_decision: bool,
    /// `None` means render text-only.
    pub illustration: Option<&'a str>,
    pub corrective: bool,
    pub completion: Option<Completion<'a>>,
}

/// Reducer over a canonical story.
#[derive(Debug, Clone, Copy)]
pub struct Traversal<'a> {
    story: &'a Story,
    resume: ResumePolicy,
}

impl<'a> Traversal<'a> {
    pub fn new(story: &'a Story, config: &TraversalConfig) -> Self {
        Self {
            story,
            resume: config.resume,
        }
    }

    pub fn story(&self) -> &'a Story {
        self.story
    }

    /// A fresh session positioned on the first slide.
    pub fn start(&self) -> Session {
        let mut session = Session {
            position: Position::Completed {
                outcome: Outcome::Positive,
            },
            took_unsafe_branch: false,
            path: Vec::new(),
        };
        match self.story.first() {
            Some(first) => self.enter(&mut session, first.id),
            None => tracing::warn!("story has no slides; session starts completed"),
        }
        session
    }

    /// Apply one action. On error the caller's session is unchanged.
    pub fn apply(&self, session: &Session, action: Action) -> Result<Session, TraversalError> {
        let mut next = session.clone();
        match (session.position, action) {
            (Position::Completed { .. }, _) => return Err(TraversalError::AlreadyCompleted),

            (Position::Corrective { decision }, Action::Resume) => {
                match self.resume_target(decision) {
                    Some(target) => self.enter(&mut next, target),
                    None => self.finish(&mut next),
                }
            }
            (Position::Corrective { .. }, _) => return Err(TraversalError::ResumePending),

            (Position::Slide { slide: id }, action) => {
                let Some(slide) = self.story.slide(id) else {
                    tracing::warn!(slide = %id, "session points at a missing slide; completing");
                    self.finish(&mut next);
                    return Ok(next);
                };
                match action {
                    Action::Continue if slide.is_decision() => {
                        return Err(TraversalError::DecisionPending(id));
                    }
                    Action::Continue => self.enter(&mut next, SlideId(id.0 + 1)),
                    Action::Choose(index) => {
                        let choice = choose(slide, index)?;
                        if choice.is_correct {
                            self.enter(&mut next, choice.target);
                        } else {
                            next.took_unsafe_branch = true;
                            next.position = Position::Corrective { decision: id };
                        }
                    }
                    Action::Resume => return Err(TraversalError::NothingToResume),
                }
            }
        }
        Ok(next)
    }

    /// Apply a sequence of actions, stopping at the first error.
    pub fn walk<I>(&self, actions: I) -> Result<Session, TraversalError>
    where
        I: IntoIterator<Item = Action>,
    {
        actions
            .into_iter()
            .try_fold(self.start(), |session, action| self.apply(&session, action))
    }

    /// Render data for the session's current step.
    pub fn view(&self, session: &Session) -> StepView<'a> {
        let slide = session.current_slide_id().and_then(|id| self.story.slide(id));
        let completion = session.outcome().map(|outcome| Completion {
            outcome,
            moral_lesson: self.story.moral_lesson(),
        });
        StepView {
            slide,
            is_decision: slide.is_some_and(Slide::is_decision),
            illustration: slide.and_then(|s| s.image_url.as_deref()),
            corrective: matches!(session.position, Position::Corrective { .. }),
            completion,
        }
    }

    fn resume_target(&self, decision: SlideId) -> Option<SlideId> {
        let slide = self.story.slide(decision)?;
        let choice = match self.resume {
            ResumePolicy::SafeChoice => slide.safe_choice(),
            ResumePolicy::FirstChoice => slide.choices().first(),
        };
        choice.map(|c| c.target)
    }

    /// Move to `target`, or complete if the story has nothing there.
    fn enter(&self, session: &mut Session, target: SlideId) {
        if self.story.slide(target).is_some() {
            session.position = Position::Slide { slide: target };
            session.path.push(target);
        } else {
            if target.0 as usize != self.story.len() + 1 {
                tracing::warn!(%target, "unresolvable slide reference; completing");
            }
            self.finish(session);
        }
    }

    fn finish(&self, session: &mut Session) {
        let outcome = if session.took_unsafe_branch {
            Outcome::Educational
        } else {
            Outcome::Positive
        };
        session.position = Position::Completed { outcome };
    }
}

fn choose(slide: &Slide, index: usize) -> Result<&Choice, TraversalError> {
    if !slide.is_decision() {
        return Err(TraversalError::NotADecision(slide.id));
    }
    slide
        .choices()
        .get(index)
        .ok_or(TraversalError::NoSuchChoice {
            slide: slide.id,
            index,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::story::StoryMeta;

    fn story() -> Story {
        let mut slides: Vec<Slide> = (1..=7)
            .map(|i| Slide {
                id: SlideId(i),
                text: format!("Slide {i}"),
                illustration_prompt: format!("Picture {i}"),
                image_url: None,
                choices: None,
                created_at: None,
            })
            .collect();
        slides[2].choices = Some(vec![
            Choice {
                label: "Go with the person".to_string(),
                target: SlideId(6),
                is_correct: false,
            },
            Choice {
                label: "Ask for help from a trusted adult".to_string(),
                target: SlideId(4),
                is_correct: true,
            },
        ]);
        slides[0].image_url = Some("https://img/1.png".to_string());
        Story {
            meta: StoryMeta {
                moral_lesson: Some("Tell a trusted adult.".to_string()),
                ..StoryMeta::default()
            },
            slides,
        }
    }

    #[test]
    fn starts_on_first_slide() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let session = engine.start();
        assert_eq!(session.position, Position::Slide { slide: SlideId(1) });
        let view = engine.view(&session);
        assert_eq!(view.illustration, Some("https://img/1.png"));
        assert!(!view.is_decision);
    }

    #[test]
    fn text_only_when_illustration_missing() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let session = engine.apply(&engine.start(), Action::Continue).unwrap();
        let view = engine.view(&session);
        assert!(view.slide.is_some());
        assert!(view.illustration.is_none());
    }

    #[test]
    fn safe_choice_completes_positive() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let session = engine
            .walk([
                Action::Continue,
                Action::Continue,
                Action::Choose(1),
                Action::Continue,
                Action::Continue,
                Action::Continue,
            ])
            .unwrap();
        assert_eq!(session.outcome(), Some(Outcome::Positive));
        assert_eq!(
            session.path,
            vec![1, 2, 3, 4, 5, 6, 7].into_iter().map(SlideId).collect::<Vec<_>>()
        );
        let view = engine.view(&session);
        let completion = view.completion.unwrap();
        assert_eq!(completion.moral_lesson, Some("Tell a trusted adult."));
    }

    #[test]
    fn unsafe_choice_shows_correction_then_safe_branch() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let at_decision = engine.walk([Action::Continue, Action::Continue]).unwrap();
        let corrective = engine.apply(&at_decision, Action::Choose(0)).unwrap();
        assert_eq!(corrective.position, Position::Corrective { decision: SlideId(3) });
        assert!(engine.view(&corrective).corrective);

        let resumed = engine.apply(&corrective, Action::Resume).unwrap();
        assert_eq!(resumed.position, Position::Slide { slide: SlideId(4) });
        assert!(resumed.took_unsafe_branch);
    }

    #[test]
    fn first_choice_policy_follows_listed_order() {
        let story = story();
        let config = TraversalConfig {
            resume: ResumePolicy::FirstChoice,
        };
        let engine = Traversal::new(&story, &config);
        let resumed = engine
            .walk([Action::Continue, Action::Continue, Action::Choose(0), Action::Resume])
            .unwrap();
        assert_eq!(resumed.current_slide_id(), Some(SlideId(6)));
    }

    #[test]
    fn educational_outcome_after_unsafe_branch() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let mut session = engine
            .walk([Action::Continue, Action::Continue, Action::Choose(0), Action::Resume])
            .unwrap();
        while !session.is_completed() {
            session = engine.apply(&session, Action::Continue).unwrap();
        }
        assert_eq!(session.outcome(), Some(Outcome::Educational));
    }

    #[test]
    fn invalid_actions_are_rejected() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let start = engine.start();
        assert_eq!(
            engine.apply(&start, Action::Choose(0)),
            Err(TraversalError::NotADecision(SlideId(1)))
        );
        assert_eq!(
            engine.apply(&start, Action::Resume),
            Err(TraversalError::NothingToResume)
        );

        let decision = engine.walk([Action::Continue, Action::Continue]).unwrap();
        assert_eq!(
            engine.apply(&decision, Action::Continue),
            Err(TraversalError::DecisionPending(SlideId(3)))
        );
        assert_eq!(
            engine.apply(&decision, Action::Choose(2)),
            Err(TraversalError::NoSuchChoice {
                slide: SlideId(3),
                index: 2
            })
        );

        let corrective = engine.apply(&decision, Action::Choose(0)).unwrap();
        assert_eq!(
            engine.apply(&corrective, Action::Continue),
            Err(TraversalError::ResumePending)
        );
    }

    #[test]
    fn completed_is_absorbing() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let done = Session {
            position: Position::Completed {
                outcome: Outcome::Positive,
            },
            took_unsafe_branch: false,
            path: vec![SlideId(1)],
        };
        for action in [Action::Continue, Action::Choose(0), Action::Resume] {
            assert_eq!(
                engine.apply(&done, action),
                Err(TraversalError::AlreadyCompleted)
            );
        }
    }

    #[test]
    fn dangling_target_completes_instead_of_failing() {
        let mut story = story();
        if let Some(choices) = story.slides[2].choices.as_mut() {
            choices[1].target = SlideId(42);
        }
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let session = engine
            .walk([Action::Continue, Action::Continue, Action::Choose(1)])
            .unwrap();
        assert_eq!(session.outcome(), Some(Outcome::Positive));
    }

    #[test]
    fn stale_session_completes() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let stale = Session {
            position: Position::Slide { slide: SlideId(30) },
            took_unsafe_branch: false,
            path: Vec::new(),
        };
        let next = engine.apply(&stale, Action::Continue).unwrap();
        assert!(next.is_completed());
    }

    #[test]
    fn session_serializes_for_progress_storage() {
        let story = story();
        let engine = Traversal::new(&story, &TraversalConfig::default());
        let session = engine.apply(&engine.start(), Action::Continue).unwrap();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["position"]["state"], "slide");
        assert_eq!(json["position"]["slide"], 2);
        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }
}
