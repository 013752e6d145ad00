//! Orchestrating chat client: composes the conversation store, a
//! registered backend, and the retrying transport into one turn.
//!
//! The conversation lock is never held across the network exchange. A
//! turn is: append the user message (lock released), snapshot (lock
//! released), unlocked network exchange including all retries, then
//! append the assistant message. The user message is deliberately not
//! rolled back when the exchange fails or is cancelled.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use colloquy_types::{ColloquyError, Result};
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, DynBackend};
use crate::conversation::Conversation;
use crate::transport::{Transport, TransportRequest};
use crate::types::{GenerationParams, Message, Role};

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

pub struct ChatClient {
    backends: HashMap<String, DynBackend>,
    active: String,
    model: String,
    transport: Transport,
    conversation: Conversation,
    params: Mutex<GenerationParams>,
    cancel: CancellationToken,
}

impl ChatClient {
    /// Create a client with `backend` registered and active.
    pub fn new(backend: impl Backend + 'static, model: impl Into<String>) -> Self {
        let backend = DynBackend::new(backend);
        let active = backend.name().to_string();
        let mut backends = HashMap::new();
        backends.insert(active.clone(), backend);
        Self {
            backends,
            active,
            model: model.into(),
            transport: Transport::new(),
            conversation: Conversation::default(),
            params: Mutex::new(GenerationParams::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_messages(self, max_messages: usize) -> Result<Self> {
        self.conversation.set_max_messages(max_messages)?;
        Ok(self)
    }

    pub fn with_system_prompt(self, text: impl Into<String>) -> Result<Self> {
        self.conversation.append(Message::system(text))?;
        Ok(self)
    }

    /// Register an additional backend; does not change the active one.
    pub fn register_backend(&mut self, backend: impl Backend + 'static) {
        let backend = DynBackend::new(backend);
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Switch the active backend by identifier.
    pub fn use_backend(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(ColloquyError::InvalidArgument(format!(
                "backend '{name}' is not registered"
            )));
        }
        self.active = name.to_string();
        Ok(())
    }

    /// Shared handle to the underlying conversation.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Mutate generation parameters under the client's lock.
    pub fn update_params(&self, apply: impl FnOnce(&mut GenerationParams)) {
        let mut guard = self.params.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort any in-flight or waiting exchange.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Send one plain-text user turn and return the assistant's reply.
    pub async fn ask(&self, text: impl Into<String>) -> Result<String> {
        self.turn(Message::user(text)).await
    }

    /// Send one user turn carrying an image alongside the text.
    pub async fn ask_with_image(
        &self,
        text: impl Into<String>,
        image_source: impl Into<String>,
        mime_type: Option<String>,
    ) -> Result<String> {
        self.turn(Message::with_image(
            Role::User,
            text,
            image_source,
            mime_type,
        ))
        .await
    }

    async fn turn(&self, message: Message) -> Result<String> {
        let multimodal = message.is_multimodal();
        let backend = self.backends.get(&self.active).ok_or_else(|| {
            ColloquyError::InvalidArgument(format!(
                "active backend '{}' is not registered",
                self.active
            ))
        })?;

        self.conversation.append(message)?;
        let snapshot = self.conversation.snapshot();
        let params = self
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let body = backend.to_request(&snapshot, &params, &self.model)?;
        let request = TransportRequest {
            backend: backend.name().to_string(),
            url: backend.endpoint(&self.model),
            headers: backend.headers(),
            body,
        };

        tracing::info!(
            backend = %request.backend,
            model = %self.model,
            messages = snapshot.len(),
            multimodal,
            "sending turn"
        );

        let bytes = self.transport.send(&request, &self.cancel).await?;
        let result = backend.from_response(&bytes)?;

        tracing::info!(
            backend = %request.backend,
            reply_chars = result.text.len(),
            "turn complete"
        );

        self.conversation.append(Message::assistant(&result.text))?;
        if multimodal {
            // Do not resend image payloads with future turns.
            self.conversation.strip_images();
        }
        Ok(result.text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
