//! Providers module - chat completion backends
//!
//! [`CompletionProvider`] is the seam between the query handler and the
//! network: the handler only sees messages in and a [`Completion`] or a
//! classified [`ProviderError`](crate::error::ProviderError) out.

pub mod openai;
mod registry;
mod types;

pub use openai::OpenAIProvider;
pub use registry::{ProviderRegistry, UnknownProvider};
pub use types::{ChatMessage, ChatOptions, Completion, CompletionProvider, Role, Usage};
