/// Engine configuration: length bounds, fallback policy, resume policy.
///
/// Loaded from RON; every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;

use crate::schema::story::{MAX_SLIDES, MIN_SLIDES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Knobs for the story normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub min_slides: usize,
    pub max_slides: usize,
    /// Fallback target offset for the safe branch: `min(position + offset, total)`.
    pub safe_offset: usize,
    /// Fallback target offset for the unsafe branch.
    pub unsafe_offset: usize,
    pub safe_label: String,
    pub unsafe_label: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_slides: MIN_SLIDES,
            max_slides: MAX_SLIDES,
            safe_offset: 2,
            unsafe_offset: 3,
            safe_label: "Ask for help from a trusted adult".to_string(),
            unsafe_label: "Go with the person".to_string(),
        }
    }
}

impl NormalizerConfig {
    /// Reject settings under which the normalizer could emit a non-canonical story.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A synthesized decision sits at `total - 3`, so four slides is the floor.
        if self.min_slides < 4 {
            return Err(ConfigError::Invalid(format!(
                "min_slides must be at least 4, got {}",
                self.min_slides
            )));
        }
        if self.min_slides > self.max_slides {
            return Err(ConfigError::Invalid(format!(
                "min_slides ({}) exceeds max_slides ({})",
                self.min_slides, self.max_slides
            )));
        }
        if self.safe_offset == 0 || self.unsafe_offset == 0 {
            return Err(ConfigError::Invalid(
                "fallback offsets must point past the decision slide".to_string(),
            ));
        }
        if self.safe_label.trim().is_empty() || self.unsafe_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default choice labels must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Accepted slide count range for stories produced under this config.
    pub fn bounds(&self) -> RangeInclusive<usize> {
        self.min_slides..=self.max_slides
    }
}

/// Which branch the learner resumes on after the corrective interstitial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResumePolicy {
    /// Follow the choice flagged safe, wherever it sits in the list.
    #[default]
    SafeChoice,
    /// Follow whichever choice is listed first.
    FirstChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    pub resume: ResumePolicy,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub traversal: TraversalConfig,
    /// Appended to every illustration prompt sent to the illustrator.
    pub illustration_style: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            traversal: TraversalConfig::default(),
            illustration_style: "Children's book style, warm colors, safe educational tone."
                .to_string(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a configuration from a RON string.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.normalizer.validate()
    }
}
