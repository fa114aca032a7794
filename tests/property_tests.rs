/// Seeded property checks over noisy sampled payloads.

use safestory_engine::core::config::TraversalConfig;
use safestory_engine::core::normalizer::{NormalizationError, Normalizer};
use safestory_engine::core::sampler::{PayloadSampler, SamplerConfig};
use safestory_engine::core::traversal::{Action, Outcome, Session, Traversal};
use safestory_engine::schema::story::Story;

const SEEDS: u64 = 300;

fn sampled_stories() -> Vec<Story> {
    let normalizer = Normalizer::default();
    let mut stories = Vec::new();
    for seed in 0..SEEDS {
        let payload = PayloadSampler::new(seed).sample();
        match normalizer.normalize_value(&payload) {
            Ok(out) => stories.push(out.story),
            Err(NormalizationError::GenerationTooShort { found, required }) => {
                assert!(found < required, "seed {seed}");
            }
            Err(other) => panic!("seed {seed}: unexpected error {other}"),
        }
    }
    stories
}

fn play(engine: &Traversal<'_>, take_safe: bool) -> (Session, usize) {
    let mut session = engine.start();
    let mut steps = 0;
    while !session.is_completed() {
        let view = engine.view(&session);
        let action = if view.corrective {
            Action::Resume
        } else if view.is_decision {
            let slide = view.slide.unwrap();
            Action::Choose(
                slide
                    .choices()
                    .iter()
                    .position(|c| c.is_correct == take_safe)
                    .unwrap(),
            )
        } else {
            Action::Continue
        };
        if action != Action::Resume {
            steps += 1;
        }
        session = engine.apply(&session, action).unwrap();
        assert!(steps <= engine.story().len(), "traversal did not terminate");
    }
    (session, steps)
}

#[test]
fn sampled_payloads_normalize_into_valid_stories() {
    let stories = sampled_stories();
    assert!(!stories.is_empty());
    for story in &stories {
        assert_eq!(story.validate(), Ok(()), "{:#?}", story.outline());
        assert_eq!(
            story.slides.iter().filter(|s| s.is_decision()).count(),
            1
        );
    }
}

#[test]
fn normalization_is_idempotent() {
    let normalizer = Normalizer::default();
    for story in sampled_stories() {
        let value = serde_json::to_value(&story).unwrap();
        let again = normalizer.normalize_value(&value).unwrap();
        assert!(again.repairs.is_empty(), "{:?}", again.repairs);
        assert_eq!(again.story, story);
    }
}

#[test]
fn every_story_is_completable_both_ways() {
    for story in sampled_stories() {
        let engine = Traversal::new(&story, &TraversalConfig::default());

        let (safe, _) = play(&engine, true);
        assert_eq!(safe.outcome(), Some(Outcome::Positive));

        let (corrected, _) = play(&engine, false);
        assert_eq!(corrected.outcome(), Some(Outcome::Educational));
        assert_eq!(safe.path.last(), corrected.path.last());
    }
}

#[test]
fn heavy_noise_never_breaks_invariants() {
    let config = SamplerConfig {
        noise: 0.5,
        choice_rate: 0.6,
        ..SamplerConfig::default()
    };
    let normalizer = Normalizer::default();
    for seed in 0..SEEDS {
        let payload = PayloadSampler::with_config(seed, config.clone()).sample();
        if let Ok(out) = normalizer.normalize_value(&payload) {
            assert_eq!(out.story.validate(), Ok(()), "seed {seed}");
        }
    }
}
