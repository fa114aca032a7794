/// Untrusted story-tree payloads as returned by the generation collaborator.
///
/// Nothing here is derived with serde: model output drifts between schema
/// versions (numeric vs string ids, missing flags, stray fields), so each
/// record goes through an explicit parse pass that keeps whatever is usable
/// and marks the rest as missing.

use serde_json::{Map, Value};
use thiserror::Error;

/// The payload is not a list of slide-shaped records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed payload: {reason}")]
pub struct MalformedPayload {
    pub reason: String,
}

impl MalformedPayload {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A raw choice record. All fields are optional in the source data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawChoice {
    pub label: Option<String>,
    pub target: Option<u64>,
    pub is_correct: bool,
}

/// A raw slide record with explicit optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawSlide {
    pub id: Option<u64>,
    pub text: Option<String>,
    pub image_prompt: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
    pub choices: Vec<RawChoice>,
}

impl RawSlide {
    /// A slide with text and prompt and nothing else.
    pub fn new(text: &str, image_prompt: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            image_prompt: Some(image_prompt.to_string()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns true if both the narrative text and the illustration prompt are present.
    pub fn is_usable(&self) -> bool {
        self.text.is_some() && self.image_prompt.is_some()
    }

    /// Parse one slide record. Fails only if the record is not an object.
    pub fn from_value(value: &Value) -> Result<Self, MalformedPayload> {
        let obj = value
            .as_object()
            .ok_or_else(|| MalformedPayload::new(format!("slide record is {}", kind(value))))?;

        let choices = match obj.get("choices") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(RawChoice::from_object)
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            id: obj.get("id").and_then(numeric_ref),
            text: non_empty_string(obj.get("text")),
            image_prompt: non_empty_string(obj.get("imagePrompt")),
            image_url: non_empty_string(obj.get("imageUrl")),
            created_at: non_empty_string(obj.get("createdAt")),
            choices,
        })
    }
}

impl RawChoice {
    pub fn new(label: &str, target: u64, is_correct: bool) -> Self {
        Self {
            label: Some(label.to_string()),
            target: Some(target),
            is_correct,
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            label: non_empty_string(obj.get("label")),
            target: obj.get("nextSlide").and_then(numeric_ref),
            is_correct: obj.get("isCorrect").is_some_and(truthy_flag),
        }
    }
}

/// A full story-tree response: an optional title plus the slide list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawStory {
    pub title: Option<String>,
    pub slides: Vec<RawSlide>,
}

impl RawStory {
    /// Accepts either a bare slide array or an object with a `slides` array.
    pub fn from_value(value: &Value) -> Result<Self, MalformedPayload> {
        match value {
            Value::Array(items) => Ok(Self {
                title: None,
                slides: parse_slides(items)?,
            }),
            Value::Object(obj) => match obj.get("slides") {
                Some(Value::Array(items)) => Ok(Self {
                    title: non_empty_string(obj.get("title")),
                    slides: parse_slides(items)?,
                }),
                Some(other) => Err(MalformedPayload::new(format!(
                    "`slides` is {}, expected an array",
                    kind(other)
                ))),
                None => Err(MalformedPayload::new("object has no `slides` array")),
            },
            other => Err(MalformedPayload::new(format!(
                "payload is {}, expected a slide array",
                kind(other)
            ))),
        }
    }

    /// Parse model output text, tolerating a surrounding markdown code fence.
    pub fn from_json(content: &str) -> Result<Self, MalformedPayload> {
        let value = parse_model_json(content)
            .map_err(|e| MalformedPayload::new(format!("invalid JSON: {e}")))?;
        Self::from_value(&value)
    }
}

fn parse_slides(items: &[Value]) -> Result<Vec<RawSlide>, MalformedPayload> {
    items.iter().map(RawSlide::from_value).collect()
}

/// Parse JSON out of model output. A ```` ```json ```` fence, if present,
/// is stripped first; otherwise the whole trimmed text is parsed.
pub fn parse_model_json(content: &str) -> Result<Value, serde_json::Error> {
    let trimmed = content.trim();
    serde_json::from_str(strip_code_fence(trimmed).unwrap_or(trimmed))
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let mut rest = &text[open + 3..];
    if rest
        .get(..4)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("json"))
    {
        rest = &rest[4..];
    }
    let close = rest.find("```")?;
    Some(rest[..close].trim())
}

/// Ids and targets: integers, integral floats, or numeric strings.
fn numeric_ref(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn truthy_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
