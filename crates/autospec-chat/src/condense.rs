//! Turning follow-up questions into standalone retrieval queries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use autospec_core::error::{AutoSpecError, Result};
use autospec_core::types::{excerpt, Turn};

use crate::llm::LanguageModel;
use crate::prompt::PromptTemplate;

/// Rewrites a question so it can be understood without the conversation.
///
/// With an empty history every implementation returns the question as-is.
#[async_trait]
pub trait QueryCondenser: Send + Sync {
    async fn condense(&self, question: &str, history: &[Turn]) -> Result<String>;
}

/// Render turns as `Human:` / `Assistant:` lines, oldest first.
pub fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Asks the language model to rephrase the follow-up.
pub struct LlmCondenser {
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    timeout: Duration,
}

impl LlmCondenser {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            model,
            template: PromptTemplate::condense()?,
            timeout,
        })
    }
}

#[async_trait]
impl QueryCondenser for LlmCondenser {
    async fn condense(&self, question: &str, history: &[Turn]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let chat_history = render_history(history);
        let prompt = self
            .template
            .render(&[("chat_history", &chat_history), ("question", question)])?;

        let standalone = match tokio::time::timeout(self.timeout, self.model.complete(&prompt)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(model = self.model.name(), "Question condensing timed out");
                return Err(AutoSpecError::Generation(format!(
                    "condensing the question exceeded {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let standalone = standalone.trim();
        if standalone.is_empty() {
            return Err(AutoSpecError::Generation(
                "model returned an empty standalone question".to_string(),
            ));
        }
        debug!(original = question, standalone, "Condensed follow-up question");
        Ok(standalone.to_string())
    }
}

/// Prepends the most recent turns to the follow-up without a model call.
///
/// The resulting query is longer but carries the nouns the follow-up refers
/// to, which is what the embedding search needs.
#[derive(Debug, Clone)]
pub struct HeuristicCondenser {
    context_turns: usize,
    answer_chars: usize,
}

impl Default for HeuristicCondenser {
    fn default() -> Self {
        Self {
            context_turns: 1,
            answer_chars: 200,
        }
    }
}

impl HeuristicCondenser {
    pub fn new(context_turns: usize, answer_chars: usize) -> Self {
        Self {
            context_turns: context_turns.max(1),
            answer_chars,
        }
    }

    pub fn condense_sync(&self, question: &str, history: &[Turn]) -> String {
        let start = history.len().saturating_sub(self.context_turns);
        let mut parts: Vec<String> = Vec::new();
        for turn in &history[start..] {
            parts.push(turn.question.trim().to_string());
            let answer = excerpt(turn.answer.trim(), self.answer_chars);
            if !answer.is_empty() {
                parts.push(answer);
            }
        }
        parts.push(question.trim().to_string());
        parts.join(" ")
    }
}

#[async_trait]
impl QueryCondenser for HeuristicCondenser {
    async fn condense(&self, question: &str, history: &[Turn]) -> Result<String> {
        Ok(self.condense_sync(question, history))
    }
}
