use chrono::{DateTime, Utc};
use colloquy_types::ColloquyError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Who authored a message. The set is closed; anything else is rejected
/// at the parse boundary with `InvalidArgument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Lowercase wire/display name, also used by [`Conversation::formatted`].
    ///
    /// [`Conversation::formatted`]: crate::Conversation::formatted
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = ColloquyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ColloquyError::InvalidArgument(format!(
                "unknown role '{other}', expected system, user, or assistant"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentItem
// ---------------------------------------------------------------------------

/// One unit of message content. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
    },
    /// An image by URL, local path, data-URI, or raw base64 payload.
    /// The interpretation is decided at request-build time, see
    /// [`crate::media::resolve_image`].
    Image {
        source: String,
        mime_type: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One conversation turn. Role is fixed at construction; content items may
/// be stripped later (images after a successful exchange), the role never
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub content: Vec<ContentItem>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a plain-text message. The content list always carries one
    /// Text item mirroring `text`.
    pub fn from_text(role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: Uuid::new_v4(),
            role,
            content: vec![ContentItem::Text { text: text.clone() }],
            text,
            timestamp: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::from_text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::from_text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::from_text(Role::Assistant, text)
    }

    /// Build a multimodal message: one Text item mirroring `text` followed
    /// by one Image item.
    pub fn with_image(
        role: Role,
        text: impl Into<String>,
        source: impl Into<String>,
        mime_type: Option<String>,
    ) -> Self {
        let text = text.into();
        Self {
            id: Uuid::new_v4(),
            role,
            content: vec![
                ContentItem::Text { text: text.clone() },
                ContentItem::Image {
                    source: source.into(),
                    mime_type,
                },
            ],
            text,
            timestamp: Utc::now(),
        }
    }

    /// `true` iff any content item is an image.
    pub fn is_multimodal(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, ContentItem::Image { .. }))
    }

    /// Drop every Image item, keeping text content. Used after a
    /// successful multimodal exchange so history does not resend payloads.
    pub fn strip_images(&mut self) {
        self.content
            .retain(|c| matches!(c, ContentItem::Text { .. }));
    }
}

// ---------------------------------------------------------------------------
// GenerationParams
// ---------------------------------------------------------------------------

/// Default applied at request-build time when no temperature was set.
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
/// Default applied at request-build time when no token cap was set.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Upper bound any explicit token cap is clamped to.
pub const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Sampling parameters shared by every backend.
///
/// Setters clamp out-of-range input to the nearest bound rather than
/// failing. `temperature` and `max_tokens` are optional: when absent the
/// documented default is applied at request-build time, and clamping only
/// happens for values that were actually supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    temperature: Option<f64>,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    max_tokens: Option<u32>,
    stream: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: None,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: None,
            stream: false,
        }
    }
}

impl GenerationParams {
    pub fn set_temperature(&mut self, value: f64) {
        self.temperature = Some(value.clamp(0.0, 2.0));
    }

    pub fn set_top_p(&mut self, value: f64) {
        self.top_p = value.clamp(0.0, 1.0);
    }

    pub fn set_frequency_penalty(&mut self, value: f64) {
        self.frequency_penalty = value.clamp(-2.0, 2.0);
    }

    pub fn set_presence_penalty(&mut self, value: f64) {
        self.presence_penalty = value.clamp(-2.0, 2.0);
    }

    pub fn set_max_tokens(&mut self, value: u32) {
        self.max_tokens = Some(value.clamp(1, MAX_OUTPUT_TOKENS));
    }

    pub fn set_stream(&mut self, value: bool) {
        self.stream = value;
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn temperature_or_default(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    pub fn frequency_penalty(&self) -> f64 {
        self.frequency_penalty
    }

    pub fn presence_penalty(&self) -> f64 {
        self.presence_penalty
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn stream(&self) -> bool {
        self.stream
    }
}

// ---------------------------------------------------------------------------
// NormalizedResult
// ---------------------------------------------------------------------------

/// The provider-agnostic outcome of one exchange. `text` is the empty
/// string when the backend's response lacked recoverable content; it is
/// never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub text: String,
}

impl NormalizedResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
