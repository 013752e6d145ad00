//! DeepSeek backend: chat-completion wire shape without multimodal
//! support. Multimodal messages are degraded to their text units joined
//! by a blank line; image units are dropped entirely.

use colloquy_types::{ColloquyError, Result};
use serde_json::json;

use crate::backend::{ensure_request, Backend};
use crate::types::{ContentItem, GenerationParams, Message, NormalizedResult};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

// ---------------------------------------------------------------------------
// DeepSeekBackend
// ---------------------------------------------------------------------------

pub struct DeepSeekBackend {
    api_key: String,
    base_url: String,
}

impl DeepSeekBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEEPSEEK_BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("DEEPSEEK_API_KEY").map_err(|_| {
            ColloquyError::InvalidArgument("DEEPSEEK_API_KEY is not set".into())
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

fn flatten_content(msg: &Message) -> String {
    if !msg.is_multimodal() {
        return msg.text.clone();
    }
    msg.content
        .iter()
        .filter_map(|item| match item {
            ContentItem::Text { text } => Some(text.as_str()),
            ContentItem::Image { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ---------------------------------------------------------------------------
// Backend implementation
// ---------------------------------------------------------------------------

impl Backend for DeepSeekBackend {
    fn name(&self) -> &str {
        "deepseek"
    }

    fn endpoint(&self, _model: &str) -> String {
        format!("{}/chat/completions", self.base_url)
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
        let converted: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": m.role.as_str(),
                    "content": flatten_content(m),
                })
            })
            .collect();
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
                backend: "deepseek".into(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn backend() -> DeepSeekBackend {
        DeepSeekBackend::new("test-key")
    }

    #[test]
    fn plain_messages_pass_through_flat() {
        let messages = vec![Message::system("rules"), Message::user("question")];
        let body = backend()
            .to_request(&messages, &GenerationParams::default(), "deepseek-chat")
            .unwrap();
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[0]["content"], "rules");
        assert_eq!(msgs[1]["role"], "user");
        assert_eq!(msgs[1]["content"], "question");
    }

    #[test]
    fn multimodal_message_degrades_to_joined_text() {
        let mut msg = Message::with_image(
            Role::User,
            "first part",
            "https://example.com/cat.png",
            None,
        );
        msg.content.push(ContentItem::Text {
            text: "second part".into(),
        });

        let body = backend()
            .to_request(&[msg], &GenerationParams::default(), "deepseek-chat")
            .unwrap();
        assert_eq!(
            body["messages"][0]["content"],
            "first part\n\nsecond part"
        );
    }

    #[test]
    fn round_trip_through_stub_response() {
        // System + user through the request normalizer, then a stubbed
        // choices[0].message.content back through the response normalizer.
        let b = backend();
        let messages = vec![Message::system("rules"), Message::user("question")];
        let body = b
            .to_request(&messages, &GenerationParams::default(), "deepseek-chat")
            .unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);

        let reply = serde_json::to_vec(&json!({
            "choices": [{ "message": { "role": "assistant", "content": "X" } }]
        }))
        .unwrap();
        let result = b.from_response(&reply).unwrap();
        assert_eq!(result, NormalizedResult::new("X"));
    }

    #[test]
    fn from_response_tolerates_missing_fields() {
        for case in [json!({}), json!({ "choices": [] })] {
            let bytes = serde_json::to_vec(&case).unwrap();
            assert_eq!(backend().from_response(&bytes).unwrap().text, "");
        }
    }

    #[test]
    fn from_response_rejects_non_json_bytes() {
        let err = backend().from_response(b"\x00\x01").unwrap_err();
        assert!(matches!(err, ColloquyError::Parse { .. }));
    }

    #[test]
    fn endpoint_uses_chat_completions_path() {
        assert_eq!(
            backend().endpoint("deepseek-chat"),
            "https://api.deepseek.com/chat/completions"
        );
    }
}
