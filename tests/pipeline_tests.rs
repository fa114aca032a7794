/// Pipeline integration tests: request to illustrated canonical story.

use safestory_engine::core::config::EngineConfig;
use safestory_engine::core::normalizer::NormalizationError;
use safestory_engine::core::pipeline::{
    Blueprint, CollaboratorError, GenerationEvent, GenerationRequest, GenerationStage,
    Illustrator, NullSink, PipelineError, StoryPipeline, StoryWriter,
};
use safestory_engine::schema::slide::SlideId;
use std::cell::RefCell;
use std::rc::Rc;

struct CannedWriter {
    blueprint: String,
    tree: String,
}

impl CannedWriter {
    fn from_fixtures(tree: &str) -> Self {
        Self {
            blueprint: std::fs::read_to_string("tests/fixtures/blueprint.json").unwrap(),
            tree: std::fs::read_to_string(format!("tests/fixtures/{tree}")).unwrap(),
        }
    }
}

impl StoryWriter for CannedWriter {
    fn write_blueprint(&mut self, _request: &GenerationRequest) -> Result<String, CollaboratorError> {
        Ok(self.blueprint.clone())
    }

    fn write_story_tree(
        &mut self,
        _request: &GenerationRequest,
        blueprint: &Blueprint,
    ) -> Result<String, CollaboratorError> {
        assert_eq!(blueprint.characters.len(), 2);
        Ok(self.tree.clone())
    }
}

struct OfflineWriter;

impl StoryWriter for OfflineWriter {
    fn write_blueprint(&mut self, _request: &GenerationRequest) -> Result<String, CollaboratorError> {
        Err("model endpoint unreachable".into())
    }

    fn write_story_tree(
        &mut self,
        _request: &GenerationRequest,
        _blueprint: &Blueprint,
    ) -> Result<String, CollaboratorError> {
        Err("model endpoint unreachable".into())
    }
}

/// Records every prompt; fails on every third call.
#[derive(Clone, Default)]
struct FlakyIllustrator {
    prompts: Rc<RefCell<Vec<String>>>,
}

impl Illustrator for FlakyIllustrator {
    fn illustrate(&mut self, prompt: &str) -> Option<String> {
        let mut prompts = self.prompts.borrow_mut();
        prompts.push(prompt.to_string());
        let n = prompts.len();
        (n % 3 != 0).then(|| format!("https://images.example/{n}.png"))
    }
}

fn request() -> GenerationRequest {
    GenerationRequest {
        topic: "Stranger danger".to_string(),
        age_group: "6-8".to_string(),
        language: "English".to_string(),
        character_count: 2,
        region_context: "Urban India".to_string(),
        description: "A child is approached by a stranger at the park.".to_string(),
        moral_lesson: None,
    }
}

#[test]
fn generates_illustrated_story_from_fixtures() {
    let illustrator = FlakyIllustrator::default();
    let prompts = illustrator.prompts.clone();
    let mut pipeline = StoryPipeline::builder()
        .with_writer(CannedWriter::from_fixtures("rani_playground.json"))
        .with_illustrator(illustrator)
        .build()
        .unwrap();

    let mut events: Vec<GenerationEvent> = Vec::new();
    let story = pipeline.generate(&request(), &mut events).unwrap();

    assert_eq!(story.validate(), Ok(()));
    assert_eq!(story.len(), 9);
    assert_eq!(story.meta.title, "Rani and the Playground");
    assert_eq!(story.meta.topic, "Stranger danger");
    assert_eq!(story.meta.characters.len(), 2);
    assert_eq!(
        story.moral_lesson(),
        Some("Never go with strangers. Say no and tell a trusted adult.")
    );

    // Every slide was attempted, with the house style appended.
    let prompts = prompts.borrow();
    assert_eq!(prompts.len(), 9);
    assert!(prompts
        .iter()
        .all(|p| p.ends_with(&pipeline.config().illustration_style)));

    // Failed illustrations leave those slides text-only.
    assert!(story.slide(SlideId(3)).unwrap().image_url.is_none());
    assert!(story.slide(SlideId(6)).unwrap().image_url.is_none());
    assert_eq!(
        story.slide(SlideId(1)).unwrap().image_url.as_deref(),
        Some("https://images.example/1.png")
    );

    let stages: Vec<GenerationStage> = events.iter().map(|e| e.stage).collect();
    assert_eq!(stages.first(), Some(&GenerationStage::Initializing));
    assert_eq!(stages.last(), Some(&GenerationStage::Completed));
    assert_eq!(
        stages
            .iter()
            .filter(|s| **s == GenerationStage::ImageProgress)
            .count(),
        9
    );
    assert_eq!(events.len(), 17);
    let last_progress = events
        .iter()
        .rev()
        .find(|e| e.stage == GenerationStage::ImageProgress)
        .unwrap();
    assert_eq!((last_progress.current, last_progress.total), (Some(9), Some(9)));
}

#[test]
fn without_illustrator_story_is_text_only() {
    let mut pipeline = StoryPipeline::builder()
        .with_writer(CannedWriter::from_fixtures("rani_playground.json"))
        .build()
        .unwrap();

    let mut events: Vec<GenerationEvent> = Vec::new();
    let story = pipeline.generate(&request(), &mut events).unwrap();

    assert!(story.slides.iter().all(|s| s.image_url.is_none()));
    assert_eq!(
        events.iter().map(|e| e.stage).collect::<Vec<_>>(),
        vec![
            GenerationStage::Initializing,
            GenerationStage::BlueprintRequest,
            GenerationStage::BlueprintReady,
            GenerationStage::StoryTreeRequest,
            GenerationStage::StoryTreeReady,
            GenerationStage::Completed,
        ]
    );
}

#[test]
fn request_moral_used_when_blueprint_has_none() {
    let mut writer = CannedWriter::from_fixtures("rani_playground.json");
    writer.blueprint = r#"{"title": "Rani", "characters": [
        {"name": "Rani", "role": "protagonist"},
        {"name": "Mrs. Sharma", "role": "teacher"}]}"#
        .to_string();
    let mut pipeline = StoryPipeline::builder().with_writer(writer).build().unwrap();

    let mut req = request();
    req.moral_lesson = Some("Tell a trusted adult.".to_string());
    let story = pipeline.generate(&req, &mut NullSink).unwrap();
    assert_eq!(story.moral_lesson(), Some("Tell a trusted adult."));
}

#[test]
fn short_story_tree_is_reported_for_regeneration() {
    let mut pipeline = StoryPipeline::builder()
        .with_writer(CannedWriter::from_fixtures("too_short.json"))
        .build()
        .unwrap();

    let err = pipeline.generate(&request(), &mut NullSink).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Normalization(NormalizationError::GenerationTooShort { found: 5, .. })
    ));
}

#[test]
fn writer_failure_surfaces() {
    let mut pipeline = StoryPipeline::builder()
        .with_writer(OfflineWriter)
        .build()
        .unwrap();

    let mut events: Vec<GenerationEvent> = Vec::new();
    let err = pipeline.generate(&request(), &mut events).unwrap_err();
    assert!(matches!(err, PipelineError::Writer(_)));
    assert!(err.to_string().contains("unreachable"));
    assert_eq!(events.last().map(|e| e.stage), Some(GenerationStage::BlueprintRequest));
}

#[test]
fn blueprint_with_wrong_cast_is_rejected() {
    let mut req = request();
    req.character_count = 3;
    let mut pipeline = StoryPipeline::builder()
        .with_writer(CannedWriter::from_fixtures("rani_playground.json"))
        .build()
        .unwrap();
    assert!(matches!(
        pipeline.generate(&req, &mut NullSink),
        Err(PipelineError::InvalidBlueprint(_))
    ));
}

#[test]
fn invalid_config_is_rejected_at_build() {
    let mut config = EngineConfig::default();
    config.normalizer.min_slides = 2;
    let result = StoryPipeline::builder()
        .config(config)
        .with_writer(OfflineWriter)
        .build();
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[test]
fn regenerates_single_illustration() {
    let illustrator = FlakyIllustrator::default();
    let prompts = illustrator.prompts.clone();
    let mut pipeline = StoryPipeline::builder()
        .with_writer(CannedWriter::from_fixtures("rani_playground.json"))
        .with_illustrator(illustrator)
        .build()
        .unwrap();
    let mut story = pipeline.generate(&request(), &mut NullSink).unwrap();
    assert!(story.slide(SlideId(3)).unwrap().image_url.is_none());

    // Call 10 succeeds, filling the gap left by call 3.
    assert!(pipeline.regenerate_illustration(&mut story, SlideId(3)).unwrap());
    assert_eq!(
        story.slide(SlideId(3)).unwrap().image_url.as_deref(),
        Some("https://images.example/10.png")
    );
    assert_eq!(prompts.borrow().len(), 10);

    // Call 11 succeeds too; call 12 fails and keeps the previous image.
    assert!(pipeline.regenerate_illustration(&mut story, SlideId(1)).unwrap());
    assert!(!pipeline.regenerate_illustration(&mut story, SlideId(1)).unwrap());
    assert_eq!(
        story.slide(SlideId(1)).unwrap().image_url.as_deref(),
        Some("https://images.example/11.png")
    );

    assert!(matches!(
        pipeline.regenerate_illustration(&mut story, SlideId(40)),
        Err(PipelineError::Story(_))
    ));
}
