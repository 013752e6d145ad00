//! Gemini contents/parts backend. System messages are lifted out into
//! `systemInstruction`; remaining roles map User→"user",
//! Assistant→"model"; images embed as `inline_data` (base64) or
//! `file_data` (remote URL reference).

use colloquy_types::{ColloquyError, Result};
use serde_json::json;

use crate::backend::{ensure_request, Backend};
use crate::media::{resolve_image, ResolvedImage, DEFAULT_IMAGE_MIME};
use crate::types::{ContentItem, GenerationParams, Message, NormalizedResult, Role};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ---------------------------------------------------------------------------
// GeminiBackend
// ---------------------------------------------------------------------------

pub struct GeminiBackend {
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| {
                ColloquyError::InvalidArgument(
                    "neither GOOGLE_API_KEY nor GEMINI_API_KEY is set".into(),
                )
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
    let role = match msg.role {
        Role::Assistant => "model",
        // System messages are filtered out before this point.
        Role::User | Role::System => "user",
    };

    let mut parts: Vec<serde_json::Value> = Vec::new();
    for item in &msg.content {
        match item {
            ContentItem::Text { text } => parts.push(json!({ "text": text })),
            ContentItem::Image { source, mime_type } => {
                match resolve_image(source, mime_type.as_deref()) {
                    Some(ResolvedImage::Inline { data, mime_type }) => parts.push(json!({
                        "inline_data": { "mime_type": mime_type, "data": data }
                    })),
                    Some(ResolvedImage::Remote { url }) => parts.push(json!({
                        "file_data": {
                            "file_uri": url,
                            "mime_type": mime_type.as_deref().unwrap_or(DEFAULT_IMAGE_MIME),
                        }
                    })),
                    None => {}
                }
            }
        }
    }
    // Every message must contribute at least one part, even when all of
    // its images were dropped.
    if parts.is_empty() {
        parts.push(json!({ "text": msg.text }));
    }

    json!({ "role": role, "parts": parts })
}

// ---------------------------------------------------------------------------
// Backend implementation
// ---------------------------------------------------------------------------

impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        )
    }

    fn headers(&self) -> Vec<(String, String)> {
        // Credential rides in the URL query instead.
        vec![("content-type".into(), "application/json".into())]
    }

    fn to_request(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        model: &str,
    ) -> Result<serde_json::Value> {
        ensure_request(messages, model)?;

        let system_texts: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .flat_map(|m| {
                m.content.iter().filter_map(|item| match item {
                    ContentItem::Text { text } => Some(json!({ "text": text })),
                    ContentItem::Image { .. } => None,
                })
            })
            .collect();

        let contents: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(convert_message)
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": params.temperature_or_default(),
                "topP": params.top_p(),
                "maxOutputTokens": params.max_tokens_or_default(),
            },
        });
        if !system_texts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_texts });
        }
        Ok(body)
    }

    fn from_response(&self, bytes: &[u8]) -> Result<NormalizedResult> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| ColloquyError::Parse {
                backend: "gemini".into(),
                message: e.to_string(),
            })?;

        let mut text = String::new();
        if let Some(parts) = value["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(t) = part["text"].as_str() {
                    text.push_str(t);
                }
            }
        }
        Ok(NormalizedResult {
            text: text.trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
