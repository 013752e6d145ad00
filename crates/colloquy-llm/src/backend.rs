//! The seam between the provider-agnostic core and each backend's wire
//! schema. Normalizers are pure: building a request or reading a response
//! touches neither the network nor the conversation.

use colloquy_types::{ColloquyError, Result};

use crate::types::{GenerationParams, Message, NormalizedResult};

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// One external language-model service: its endpoint, credential
/// attachment, and the pure request/response translation for its schema.
pub trait Backend: Send + Sync {
    /// Stable identifier used for registration and error reporting.
    fn name(&self) -> &str;

    /// Full request URL for the given model.
    fn endpoint(&self, model: &str) -> String;

    /// Headers to attach, including the static credential where the
    /// backend expects one there.
    fn headers(&self) -> Vec<(String, String)>;

    /// Snapshot of messages + parameters → backend-specific JSON body.
    /// Messages are emitted in chronological order; every message
    /// contributes at least one content unit.
    fn to_request(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        model: &str,
    ) -> Result<serde_json::Value>;

    /// Raw response bytes → normalized result. Missing or empty fields
    /// degrade to an empty string; bytes that are not the expected
    /// schema at all are a `Parse` error.
    fn from_response(&self, bytes: &[u8]) -> Result<NormalizedResult>;
}

/// Reject an empty snapshot or a blank model id before any network work.
pub(crate) fn ensure_request(messages: &[Message], model: &str) -> Result<()> {
    if messages.is_empty() {
        return Err(ColloquyError::InvalidArgument(
            "cannot build a request from an empty conversation".into(),
        ));
    }
    if model.trim().is_empty() {
        return Err(ColloquyError::InvalidArgument(
            "model identifier is empty".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DynBackend
// ---------------------------------------------------------------------------

/// Boxed backend for registry storage.
pub struct DynBackend(Box<dyn Backend>);

impl DynBackend {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self(Box::new(backend))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn endpoint(&self, model: &str) -> String {
        self.0.endpoint(model)
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.0.headers()
    }

    pub fn to_request(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        model: &str,
    ) -> Result<serde_json::Value> {
        self.0.to_request(messages, params, model)
    }

    pub fn from_response(&self, bytes: &[u8]) -> Result<NormalizedResult> {
        self.0.from_response(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
