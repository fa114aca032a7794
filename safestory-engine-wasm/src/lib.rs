//! WASM bindings for safestory-engine: normalization and the story reader for the web viewer.

use wasm_bindgen::prelude::*;

use safestory_engine::core::config::EngineConfig;
use safestory_engine::core::normalizer::Normalizer;
use safestory_engine::core::traversal::{Action, Session, Traversal};
use safestory_engine::schema::slide::SlideId;
use safestory_engine::schema::story::Story;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct NormalizedOutput<'a> {
    story: &'a Story,
    repairs: Vec<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReport {
    valid: bool,
    problem: Option<String>,
}

fn load_config(config_ron: Option<String>) -> Result<EngineConfig, JsError> {
    match config_ron {
        Some(src) => EngineConfig::parse_ron(&src)
            .map_err(|e| JsError::new(&format!("Config parse error: {e}"))),
        None => Ok(EngineConfig::default()),
    }
}

fn normalizer(config: &EngineConfig) -> Result<Normalizer, JsError> {
    Normalizer::new(config.normalizer.clone())
        .map_err(|e| JsError::new(&format!("Config error: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

/// Repair a raw story tree. Returns `{ story, repairs }` as JSON.
#[wasm_bindgen]
pub fn normalize_story(raw_json: &str, config_ron: Option<String>) -> Result<String, JsError> {
    let config = load_config(config_ron)?;
    let out = normalizer(&config)?
        .normalize_json(raw_json)
        .map_err(|e| JsError::new(&e.to_string()))?;
    to_json(&NormalizedOutput {
        story: &out.story,
        repairs: out.repairs.iter().map(ToString::to_string).collect(),
    })
}

/// Check a canonical story without repairing it, against the configured length bounds.
#[wasm_bindgen]
pub fn validate_story(story_json: &str, config_ron: Option<String>) -> Result<String, JsError> {
    let config = load_config(config_ron)?;
    let story: Story = serde_json::from_str(story_json)
        .map_err(|e| JsError::new(&format!("Invalid story JSON: {e}")))?;
    let report = match story.validate_bounds(config.normalizer.bounds()) {
        Ok(()) => ValidationReport {
            valid: true,
            problem: None,
        },
        Err(violation) => ValidationReport {
            valid: false,
            problem: Some(violation.to_string()),
        },
    };
    to_json(&report)
}

// ---------------------------------------------------------------------------
// StoryReader: one learner reading one story
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StoryReader {
    story: Story,
    session: Session,
    config: EngineConfig,
}

impl StoryReader {
    fn engine(&self) -> Traversal<'_> {
        Traversal::new(&self.story, &self.config.traversal)
    }

    fn step(&mut self, action: Action) -> Result<String, JsError> {
        let next = self
            .engine()
            .apply(&self.session, action)
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.session = next;
        self.current()
    }
}

#[wasm_bindgen]
impl StoryReader {
    /// Normalize `raw_json` and start a session on its first slide.
    #[wasm_bindgen(constructor)]
    pub fn new(raw_json: &str, config_ron: Option<String>) -> Result<StoryReader, JsError> {
        let config = load_config(config_ron)?;
        let story = normalizer(&config)?
            .normalize_json(raw_json)
            .map_err(|e| JsError::new(&e.to_string()))?
            .story;
        let session = Traversal::new(&story, &config.traversal).start();
        Ok(StoryReader {
            story,
            session,
            config,
        })
    }

    /// The current step as JSON: slide, decision flag, illustration,
    /// corrective flag and completion.
    pub fn current(&self) -> Result<String, JsError> {
        to_json(&self.engine().view(&self.session))
    }

    /// Continue from a linear slide.
    pub fn advance(&mut self) -> Result<String, JsError> {
        self.step(Action::Continue)
    }

    /// Pick a choice on the decision slide by zero-based index.
    pub fn choose(&mut self, index: usize) -> Result<String, JsError> {
        self.step(Action::Choose(index))
    }

    /// Leave the corrective message.
    pub fn resume(&mut self) -> Result<String, JsError> {
        self.step(Action::Resume)
    }

    pub fn restart(&mut self) -> Result<String, JsError> {
        self.session = self.engine().start();
        self.current()
    }

    pub fn is_completed(&self) -> bool {
        self.session.is_completed()
    }

    /// Attach an illustration that arrived after the story was loaded.
    pub fn attach_illustration(&mut self, slide_id: u32, url: &str) -> Result<(), JsError> {
        self.story
            .attach_illustration(SlideId(slide_id), url)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    pub fn story_json(&self) -> Result<String, JsError> {
        to_json(&self.story)
    }

    /// The session as JSON, for progress storage.
    pub fn session_json(&self) -> Result<String, JsError> {
        to_json(&self.session)
    }

    /// Restore a session previously returned by `session_json`.
    pub fn load_session(&mut self, session_json: &str) -> Result<String, JsError> {
        self.session = serde_json::from_str(session_json)
            .map_err(|e| JsError::new(&format!("Invalid session JSON: {e}")))?;
        self.current()
    }

    /// Return JSON array of outline lines describing the slide graph.
    pub fn outline(&self) -> Result<String, JsError> {
        to_json(&self.story.outline())
    }
}
