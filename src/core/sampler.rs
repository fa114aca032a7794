/// Seeded generator of noisy story-tree payloads.
///
/// Produces the kinds of defects real model output shows: missing or
/// string ids, duplicate ids, blank text, choices on the wrong slides,
/// dangling and backward targets, missing labels and odd polarity flags.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};

/// Bounds for sampled payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub min_slides: usize,
    pub max_slides: usize,
    /// Probability that any single field is corrupted.
    pub noise: f64,
    /// Probability that a slide proposes choices.
    pub choice_rate: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_slides: 4,
            max_slides: 16,
            noise: 0.1,
            choice_rate: 0.25,
        }
    }
}

pub struct PayloadSampler {
    rng: StdRng,
    config: SamplerConfig,
}

impl PayloadSampler {
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, SamplerConfig::default())
    }

    pub fn with_config(seed: u64, config: SamplerConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// One payload, either a bare slide array or a `{title, slides}` envelope.
    pub fn sample(&mut self) -> Value {
        let count = self
            .rng
            .gen_range(self.config.min_slides..=self.config.max_slides.max(self.config.min_slides));
        let slides: Vec<Value> = (1..=count).map(|n| self.slide(n, count)).collect();
        if self.rng.gen_bool(0.5) {
            json!({ "title": format!("Sampled story {count}"), "slides": slides })
        } else {
            Value::Array(slides)
        }
    }

    fn corrupt(&mut self) -> bool {
        self.rng.gen_bool(self.config.noise)
    }

    fn slide(&mut self, n: usize, count: usize) -> Value {
        let mut obj = Map::new();

        let id = if self.corrupt() {
            match self.rng.gen_range(0..4) {
                0 => None,
                1 => Some(json!(n.saturating_sub(1))),
                2 => Some(json!(format!("slide-{n}"))),
                _ => Some(json!(self.rng.gen_range(100..200))),
            }
        } else if self.rng.gen_bool(0.1) {
            Some(json!(n.to_string()))
        } else {
            Some(json!(n))
        };
        if let Some(id) = id {
            obj.insert("id".to_string(), id);
        }

        let text = self.text(&format!("Part {n} of the story."));
        if let Some(text) = text {
            obj.insert("text".to_string(), text);
        }
        let prompt = self.text(&format!("Illustration for part {n}"));
        if let Some(prompt) = prompt {
            obj.insert("imagePrompt".to_string(), prompt);
        }

        if self.rng.gen_bool(self.config.choice_rate) {
            let how_many = self.rng.gen_range(0..=3);
            let choices: Vec<Value> = (0..how_many).map(|i| self.choice(i, count)).collect();
            obj.insert("choices".to_string(), Value::Array(choices));
        }

        Value::Object(obj)
    }

    fn text(&mut self, content: &str) -> Option<Value> {
        if !self.corrupt() {
            return Some(json!(content));
        }
        match self.rng.gen_range(0..3) {
            0 => None,
            1 => Some(json!("   ")),
            _ => Some(json!(42)),
        }
    }

    fn choice(&mut self, index: usize, count: usize) -> Value {
        let mut obj = Map::new();
        if !self.corrupt() {
            obj.insert("label".to_string(), json!(format!("Option {}", index + 1)));
        }

        let target = self.rng.gen_range(0..=count + 3);
        let target = if self.corrupt() {
            json!(format!("{target}"))
        } else {
            json!(target)
        };
        if !self.corrupt() {
            obj.insert("nextSlide".to_string(), target);
        }

        let flag = match self.rng.gen_range(0..6) {
            0 => json!("true"),
            1 => json!(1),
            2 => Value::Null,
            _ => json!(index == 0),
        };
        if !self.corrupt() {
            obj.insert("isCorrect".to_string(), flag);
        }
        Value::Object(obj)
    }
}
