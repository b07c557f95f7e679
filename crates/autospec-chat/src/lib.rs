//! Conversational retrieval for AutoSpec.
//!
//! Holds the conversation memory, prompt templates, follow-up question
//! condensing, language model clients, and the answer generator, and wires
//! them with the ingestor and vector index into a [`RagSession`].

pub mod condense;
pub mod generator;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod session;

pub use condense::{render_history, HeuristicCondenser, LlmCondenser, QueryCondenser};
pub use generator::AnswerGenerator;
pub use llm::{LanguageModel, OpenAiCompatibleClient};
pub use memory::ConversationMemory;
pub use prompt::PromptTemplate;
pub use session::RagSession;
