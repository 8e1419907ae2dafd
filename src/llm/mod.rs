//! Language model access for list suggestions
//!
//! Only chat completion is needed. Providers speak the OpenAI chat API;
//! Ollama is reached through its OpenAI-compatible endpoint.

pub mod errors;
pub mod openai;
pub mod provider;
pub mod types;

pub use errors::*;
pub use provider::*;
pub use types::*;
