//! # talon-llm
//!
//! The collaborators the skill runtime talks to but does not own: embedding
//! providers that turn text into comparable vectors, and the assistant that
//! a fired job re-enters with its task text.

pub mod assistant;
pub mod embedding;
pub mod hashing;
pub mod mock;

pub use assistant::{Assistant, AssistantRequest, WebhookAssistant};
pub use embedding::{EmbeddingProvider, OllamaEmbedding, OpenAiEmbedding};
pub use hashing::HashingEmbedding;
pub use mock::{MockAssistant, MockEmbedding};
