//! LLM client: an OpenAI-compatible chat backend, a process-local
//! circuit breaker wrapper, and the three-channel invocation shape used
//! by LLM-schema extraction.

mod backend;
mod breaker;
mod types;

pub use backend::{HttpChatBackend, LlmBackend};
pub use breaker::CircuitBreakingBackend;
pub use types::{LlmInvocation, LlmResult, Message, Role};
