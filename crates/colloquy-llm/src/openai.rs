//! OpenAI chat-completions backend: one `{role, content}` object per
//! message, with multimodal messages expanded into ordered
//! text / image_url content units.

use colloquy_types::{ColloquyError, Result};
use serde_json::json;

use crate::backend::{ensure_request, Backend};
use crate::media::resolve_image;
use crate::types::{ContentItem, GenerationParams, Message, NormalizedResult};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

// ---------------------------------------------------------------------------
// OpenAiBackend
// ---------------------------------------------------------------------------

pub struct OpenAiBackend {
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ColloquyError::InvalidArgument("OPENAI_API_KEY is not set".into())
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Message conversion
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    if !msg.is_multimodal() {
        return json!({
            "role": msg.role.as_str(),
            "content": msg.text,
        });
    }

    let mut units: Vec<serde_json::Value> = Vec::new();
    for item in &msg.content {
        match item {
            ContentItem::Text { text } => {
                units.push(json!({ "type": "text", "text": text }));
            }
            ContentItem::Image { source, mime_type } => {
                // An unresolvable image is dropped, not fatal.
                if let Some(resolved) = resolve_image(source, mime_type.as_deref()) {
                    units.push(json!({
                        "type": "image_url",
                        "image_url": { "url": resolved.to_url() },
                    }));
                }
            }
        }
    }

    json!({
        "role": msg.role.as_str(),
        "content": units,
    })
}

// ---------------------------------------------------------------------------
// Backend implementation
// ---------------------------------------------------------------------------

impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn endpoint(&self, _model: &str) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("authorization".into(), format!("Bearer {}", self.api_key)),
            ("content-type".into(), "application/json".into()),
        ]
    }

    fn to_request(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        model: &str,
    ) -> Result<serde_json::Value> {
        ensure_request(messages, model)?;
        let converted: Vec<serde_json::Value> = messages.iter().map(convert_message).collect();
        Ok(json!({
            "model": model,
            "messages": converted,
            "temperature": params.temperature_or_default(),
            "top_p": params.top_p(),
            "frequency_penalty": params.frequency_penalty(),
            "presence_penalty": params.presence_penalty(),
            "max_tokens": params.max_tokens_or_default(),
            "stream": params.stream(),
        }))
    }

    fn from_response(&self, bytes: &[u8]) -> Result<NormalizedResult> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| ColloquyError::Parse {
                backend: "openai".into(),
                message: e.to_string(),
            })?;
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(NormalizedResult { text })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
