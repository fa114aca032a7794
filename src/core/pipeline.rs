/// The generation pipeline: request → blueprint → story tree → canonical story.
///
/// Wires together the text collaborator, the normalizer and the illustration
/// collaborator, reporting progress through an injected sink. Every piece of
/// I/O sits behind a trait, so the pipeline itself stays synchronous and pure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::normalizer::{NormalizationError, Normalizer};
use crate::schema::raw::{parse_model_json, RawStory};
use crate::schema::slide::SlideId;
use crate::schema::story::{Character, Story, StoryError, StoryMeta};

pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error("story error: {0}")]
    Story(#[from] StoryError),
    #[error("story writer failed: {0}")]
    Writer(CollaboratorError),
    #[error("invalid blueprint: {0}")]
    InvalidBlueprint(String),
    #[error("no story writer configured")]
    MissingWriter,
}

/// What an organization asks the generator for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub topic: String,
    pub age_group: String,
    pub language: String,
    pub character_count: usize,
    pub region_context: String,
    pub description: String,
    #[serde(default)]
    pub moral_lesson: Option<String>,
}

/// Planning output of the first model call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub setting: String,
    #[serde(default)]
    pub moral_lesson: Option<String>,
    #[serde(default)]
    pub characters: Vec<Character>,
}

impl Blueprint {
    /// Parse blueprint model output and check it against the request.
    pub fn parse(content: &str, request: &GenerationRequest) -> Result<Blueprint, PipelineError> {
        let value = parse_model_json(content)
            .map_err(|e| PipelineError::InvalidBlueprint(format!("invalid JSON: {e}")))?;
        let blueprint: Blueprint = serde_json::from_value(value)
            .map_err(|e| PipelineError::InvalidBlueprint(e.to_string()))?;

        if blueprint.title.trim().is_empty() {
            return Err(PipelineError::InvalidBlueprint("missing title".to_string()));
        }
        if blueprint.characters.len() != request.character_count {
            return Err(PipelineError::InvalidBlueprint(format!(
                "{} characters requested, blueprint has {}",
                request.character_count,
                blueprint.characters.len()
            )));
        }
        Ok(blueprint)
    }
}

/// Produces model text for the two generation stages.
pub trait StoryWriter {
    fn write_blueprint(&mut self, request: &GenerationRequest) -> Result<String, CollaboratorError>;

    fn write_story_tree(
        &mut self,
        request: &GenerationRequest,
        blueprint: &Blueprint,
    ) -> Result<String, CollaboratorError>;
}

/// Turns an illustration prompt into an image reference, when it can.
pub trait Illustrator {
    fn illustrate(&mut self, prompt: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationStage {
    Initializing,
    BlueprintRequest,
    BlueprintReady,
    StoryTreeRequest,
    StoryTreeReady,
    ImagesStart,
    ImageProgress,
    ImagesReady,
    Completed,
}

/// A progress report from the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationEvent {
    pub stage: GenerationStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl GenerationEvent {
    fn new(stage: GenerationStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            current: None,
            total: None,
        }
    }

    fn total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    fn progress(mut self, current: usize, total: usize) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }
}

/// Receives pipeline progress.
pub trait ProgressSink {
    fn report(&mut self, event: &GenerationEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&mut self, _event: &GenerationEvent) {}
}

/// Emits each event as an `info` log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&mut self, event: &GenerationEvent) {
        tracing::info!(
            stage = ?event.stage,
            current = event.current,
            total = event.total,
            "{}",
            event.message
        );
    }
}

impl ProgressSink for Vec<GenerationEvent> {
    fn report(&mut self, event: &GenerationEvent) {
        self.push(event.clone());
    }
}

/// The top-level generation pipeline. Built via `StoryPipeline::builder()`.
pub struct StoryPipeline {
    config: EngineConfig,
    normalizer: Normalizer,
    writer: Box<dyn StoryWriter>,
    illustrator: Option<Box<dyn Illustrator>>,
}

/// Builder for constructing a `StoryPipeline`.
pub struct StoryPipelineBuilder {
    config: EngineConfig,
    writer: Option<Box<dyn StoryWriter>>,
    illustrator: Option<Box<dyn Illustrator>>,
}

impl StoryPipeline {
    pub fn builder() -> StoryPipelineBuilder {
        StoryPipelineBuilder {
            config: EngineConfig::default(),
            writer: None,
            illustrator: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every stage for one request.
    pub fn generate(
        &mut self,
        request: &GenerationRequest,
        sink: &mut dyn ProgressSink,
    ) -> Result<Story, PipelineError> {
        let mut report = |event: GenerationEvent| sink.report(&event);

        report(GenerationEvent::new(
            GenerationStage::Initializing,
            "Starting story generation pipeline...",
        ));

        // 1. Blueprint
        report(GenerationEvent::new(
            GenerationStage::BlueprintRequest,
            "Requesting story blueprint...",
        ));
        let content = self
            .writer
            .write_blueprint(request)
            .map_err(PipelineError::Writer)?;
        let blueprint = Blueprint::parse(&content, request)?;
        report(GenerationEvent::new(
            GenerationStage::BlueprintReady,
            format!("Blueprint ready with {} characters.", blueprint.characters.len()),
        ));

        // 2. Story tree, repaired into a canonical story
        report(GenerationEvent::new(
            GenerationStage::StoryTreeRequest,
            "Generating branching story...",
        ));
        let content = self
            .writer
            .write_story_tree(request, &blueprint)
            .map_err(PipelineError::Writer)?;
        let raw = RawStory::from_json(&content).map_err(NormalizationError::from)?;
        let normalized = self.normalizer.normalize_story(&raw)?;
        let mut story = normalized.story;
        let total = story.len();
        tracing::debug!(repairs = normalized.repairs.len(), slides = total, "story tree normalized");
        report(
            GenerationEvent::new(
                GenerationStage::StoryTreeReady,
                format!("Story structure ready with {total} slides."),
            )
            .total(total),
        );

        // 3. Illustrations; a missing image leaves the slide text-only
        if let Some(illustrator) = self.illustrator.as_mut() {
            report(
                GenerationEvent::new(
                    GenerationStage::ImagesStart,
                    "Generating illustrations for each slide...",
                )
                .total(total),
            );
            for position in 0..total {
                let id = SlideId::from_position(position);
                let prompt = styled_prompt(
                    &story.slides[position].illustration_prompt,
                    &self.config.illustration_style,
                );
                if let Some(url) = illustrator.illustrate(&prompt) {
                    story.attach_illustration(id, &url)?;
                }
                report(
                    GenerationEvent::new(
                        GenerationStage::ImageProgress,
                        format!("Generated image {} of {total}.", position + 1),
                    )
                    .progress(position + 1, total),
                );
            }
            report(
                GenerationEvent::new(
                    GenerationStage::ImagesReady,
                    "All slide illustrations generated.",
                )
                .total(total),
            );
        }

        story.meta = StoryMeta {
            title: blueprint.title,
            topic: request.topic.clone(),
            age_group: request.age_group.clone(),
            language: request.language.clone(),
            moral_lesson: blueprint.moral_lesson.or_else(|| request.moral_lesson.clone()),
            characters: blueprint.characters,
        };

        report(
            GenerationEvent::new(
                GenerationStage::Completed,
                "Story generation completed successfully.",
            )
            .total(total),
        );
        Ok(story)
    }

    /// Ask the illustrator for a fresh image of one slide.
    ///
    /// Returns `Ok(false)` when no illustrator is configured or it produced
    /// nothing; the slide keeps whatever image it had.
    pub fn regenerate_illustration(
        &mut self,
        story: &mut Story,
        id: SlideId,
    ) -> Result<bool, PipelineError> {
        let prompt = match story.slide(id) {
            Some(slide) => styled_prompt(&slide.illustration_prompt, &self.config.illustration_style),
            None => return Err(StoryError::SlideNotFound(id).into()),
        };
        let Some(illustrator) = self.illustrator.as_mut() else {
            return Ok(false);
        };
        match illustrator.illustrate(&prompt) {
            Some(url) => {
                story.attach_illustration(id, &url)?;
                Ok(true)
            }
            None => {
                tracing::debug!(slide = %id, "illustrator returned nothing");
                Ok(false)
            }
        }
    }
}

impl StoryPipelineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_writer(mut self, writer: impl StoryWriter + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    pub fn with_illustrator(mut self, illustrator: impl Illustrator + 'static) -> Self {
        self.illustrator = Some(Box::new(illustrator));
        self
    }

    pub fn build(self) -> Result<StoryPipeline, PipelineError> {
        let normalizer = Normalizer::new(self.config.normalizer.clone())?;
        let writer = self.writer.ok_or(PipelineError::MissingWriter)?;
        Ok(StoryPipeline {
            normalizer,
            config: self.config,
            writer,
            illustrator: self.illustrator,
        })
    }
}

fn styled_prompt(prompt: &str, style: &str) -> String {
    let prompt = prompt.trim_end_matches('.');
    if style.is_empty() {
        prompt.to_string()
    } else {
        format!("{prompt}. {style}")
    }
}
