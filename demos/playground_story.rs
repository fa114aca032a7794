/// Playground story demo: runs the whole pipeline with canned model output.
///
/// A blueprint and a deliberately messy story tree come from a canned writer;
/// a placeholder illustrator fails on one slide. The repaired story is then
/// read twice, once choosing safely and once choosing unsafely.
///
/// Run with: RUST_LOG=info cargo run --example playground_story

use safestory_engine::core::config::EngineConfig;
use safestory_engine::core::pipeline::{
    Blueprint, CollaboratorError, GenerationRequest, Illustrator, StoryPipeline, StoryWriter,
    TracingSink,
};
use safestory_engine::core::traversal::{Action, Traversal};
use safestory_engine::schema::story::Story;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const BLUEPRINT: &str = r#"```json
{
  "title": "Arjun at the School Gate",
  "summary": "A man Arjun does not know offers him a ride home.",
  "setting": "The gate outside Arjun's primary school",
  "moralLesson": "Never leave with someone you don't know. Go back and tell a trusted adult.",
  "characters": [
    { "name": "Arjun", "role": "protagonist", "traits": ["cheerful", "trusting"] },
    { "name": "Mr. Rao", "role": "security guard", "traits": ["watchful"] }
  ]
}
```"#;

// Slide 4 has no label on its unsafe choice and points past the end;
// slide 6 has no image prompt; slide 9 proposes a stray choice.
const STORY_TREE: &str = r#"[
  {"id": 1, "text": "The school bell rings and Arjun runs to the gate.", "imagePrompt": "Boy with a backpack running to a school gate"},
  {"id": 2, "text": "His mother is late today. Arjun waits by the wall.", "imagePrompt": "Boy waiting alone by a school wall"},
  {"id": 3, "text": "A man he does not know walks up, smiling.", "imagePrompt": "Smiling stranger approaching a boy"},
  {"id": 4, "text": "\"Your mum sent me. Hop in the car,\" the man says.", "imagePrompt": "Stranger pointing at a parked car",
   "choices": [
     {"label": "Say no and go back to Mr. Rao", "nextSlide": 5, "isCorrect": true},
     {"nextSlide": 42, "isCorrect": false}
   ]},
  {"id": 5, "text": "Arjun says \"No!\" and runs back to Mr. Rao at the gate.", "imagePrompt": "Boy running to a security guard"},
  {"id": 6, "text": "Mr. Rao calls Arjun's mother."},
  {"id": 7, "text": "Mr. Rao calls Arjun's mother, who says she sent nobody.", "imagePrompt": "Guard on the phone, boy beside him"},
  {"id": 8, "text": "The man hurries away. Mr. Rao reports him to the principal.", "imagePrompt": "Guard talking to the principal"},
  {"id": 9, "text": "Arjun's mother arrives and hugs him tight.", "imagePrompt": "Mother hugging her son at the gate",
   "choices": [{"label": "Go home", "nextSlide": 10, "isCorrect": true}]},
  {"id": 10, "text": "\"You did exactly the right thing,\" she says.", "imagePrompt": "Mother and son walking home together"}
]"#;

struct CannedWriter;

impl StoryWriter for CannedWriter {
    fn write_blueprint(&mut self, _request: &GenerationRequest) -> Result<String, CollaboratorError> {
        Ok(BLUEPRINT.to_string())
    }

    fn write_story_tree(
        &mut self,
        _request: &GenerationRequest,
        _blueprint: &Blueprint,
    ) -> Result<String, CollaboratorError> {
        Ok(STORY_TREE.to_string())
    }
}

/// Hands out placeholder URLs; the fourth request fails.
struct PlaceholderIllustrator {
    calls: usize,
}

impl Illustrator for PlaceholderIllustrator {
    fn illustrate(&mut self, prompt: &str) -> Option<String> {
        self.calls += 1;
        tracing::debug!(prompt, "illustrating");
        (self.calls != 4).then(|| format!("https://images.example/playground/{}.png", self.calls))
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = EngineConfig::load_from_ron(std::path::Path::new("config/default.ron"))
        .expect("Failed to load engine config");

    let mut pipeline = StoryPipeline::builder()
        .config(config.clone())
        .with_writer(CannedWriter)
        .with_illustrator(PlaceholderIllustrator { calls: 0 })
        .build()
        .expect("Failed to build pipeline");

    let request = GenerationRequest {
        topic: "Stranger danger".to_string(),
        age_group: "6-8".to_string(),
        language: "English".to_string(),
        character_count: 2,
        region_context: "Urban India".to_string(),
        description: "A child waiting after school is offered a ride by a stranger.".to_string(),
        moral_lesson: None,
    };

    let story = pipeline
        .generate(&request, &mut TracingSink)
        .expect("Story generation failed");

    println!("=== {} ===\n", story.meta.title);
    for line in story.outline() {
        println!("  {}", line);
    }

    let engine = Traversal::new(&story, &config.traversal);

    println!("\n--- Reading with the safe choice ---\n");
    read(&engine, &story, true);

    println!("\n--- Reading with the unsafe choice ---\n");
    read(&engine, &story, false);
}

fn read(engine: &Traversal<'_>, story: &Story, take_safe: bool) {
    let mut session = engine.start();
    while !session.is_completed() {
        let view = engine.view(&session);
        let action = match view.slide {
            _ if view.corrective => {
                println!("  (!) That was not safe. Let's see what should happen instead.");
                Action::Resume
            }
            Some(slide) if view.is_decision => {
                println!("  [{}] {}", slide.id, slide.text);
                let (index, choice) = slide
                    .choices()
                    .iter()
                    .enumerate()
                    .find(|(_, c)| c.is_correct == take_safe)
                    .expect("decision slide has both branches");
                println!("      -> {}", choice.label);
                Action::Choose(index)
            }
            Some(slide) => {
                let art = if view.illustration.is_some() { "" } else { " (text-only)" };
                println!("  [{}] {}{}", slide.id, slide.text, art);
                Action::Continue
            }
            None => break,
        };
        session = engine
            .apply(&session, action)
            .expect("reader chose a valid action");
    }

    if let Some(outcome) = session.outcome() {
        println!("\n  Outcome: {:?}", outcome);
    }
    if let Some(lesson) = story.moral_lesson() {
        println!("  Lesson: {}", lesson);
    }
}
