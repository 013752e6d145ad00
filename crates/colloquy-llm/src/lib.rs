//! Provider-agnostic LLM chat client (OpenAI, Gemini, DeepSeek).
//!
//! Provides a bounded, thread-safe [`Conversation`] store, a [`Backend`]
//! trait with pure per-provider request/response normalization, a
//! retrying cancellable [`Transport`], and the orchestrating
//! [`ChatClient`] that composes them per turn.

mod backend;
mod client;
mod conversation;
mod deepseek;
mod gemini;
pub mod media;
mod openai;
mod transport;
mod types;

pub use backend::{Backend, DynBackend};
pub use client::ChatClient;
pub use conversation::{Conversation, DEFAULT_MAX_MESSAGES};
pub use deepseek::DeepSeekBackend;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use transport::{
    DelayFn, Exchange, ExchangeReply, HttpExchange, RetrySchedule, SendState, Transport,
    TransportRequest,
};
pub use types::{
    ContentItem, GenerationParams, Message, NormalizedResult, Role, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE, MAX_OUTPUT_TOKENS,
};

pub use colloquy_types::{ColloquyError, Result};
