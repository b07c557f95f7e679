//! Answer generator: condense, retrieve, prompt, generate, remember.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use autospec_core::error::{AutoSpecError, Result};
use autospec_core::types::{AnswerResult, Evidence};
use autospec_vector::embedding::{embed_query, DynEmbeddingService};
use autospec_vector::index::{SearchHit, VectorIndex};

use crate::condense::QueryCondenser;
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;
use crate::prompt::PromptTemplate;

/// Number of chunks placed in the prompt unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 5;

/// Retrieved chunk texts are joined with a paragraph break in the prompt.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Answers questions against the shared index and conversation memory.
pub struct AnswerGenerator {
    index: VectorIndex,
    memory: ConversationMemory,
    embedder: Arc<dyn DynEmbeddingService>,
    condenser: Arc<dyn QueryCondenser>,
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    top_k: usize,
    embed_timeout: Duration,
    llm_timeout: Duration,
}

impl AnswerGenerator {
    /// Create a generator with the technician prompt, k = 5, and 60s/120s
    /// embedding and generation timeouts.
    pub fn new(
        index: VectorIndex,
        memory: ConversationMemory,
        embedder: Arc<dyn DynEmbeddingService>,
        condenser: Arc<dyn QueryCondenser>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        Ok(Self {
            index,
            memory,
            embedder,
            condenser,
            model,
            template: PromptTemplate::answer()?,
            top_k: DEFAULT_TOP_K,
            embed_timeout: Duration::from_secs(60),
            llm_timeout: Duration::from_secs(120),
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_timeouts(mut self, embed: Duration, llm: Duration) -> Self {
        self.embed_timeout = embed;
        self.llm_timeout = llm;
        self
    }

    /// Replace the answer prompt. It must have `context` and `question` slots.
    pub fn with_template(mut self, template: PromptTemplate) -> Result<Self> {
        let slots: Vec<&str> = template.slots().collect();
        if slots != ["context", "question"] {
            return Err(AutoSpecError::Template(format!(
                "answer template must use exactly the context and question slots, found {slots:?}"
            )));
        }
        self.template = template;
        Ok(self)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` from the indexed documents.
    ///
    /// History is read once at the start of the call. The turn is recorded
    /// only after the model has produced an answer, and only if the session
    /// has not been reset in the meantime. On any error memory is unchanged.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AutoSpecError::EmptyQuestion);
        }

        // Snapshot before the emptiness check: a reset after this point either
        // empties the index first or makes the final append fail.
        let (epoch, history) = self.memory.snapshot();
        if self.index.is_empty() {
            return Err(AutoSpecError::NoKnowledgeBase);
        }

        let standalone_query = self.condenser.condense(question, &history).await?;
        debug!(turns = history.len(), query = %standalone_query, "Standalone query");

        let hits = self.retrieve(&standalone_query).await?;
        if hits.is_empty() {
            return Err(AutoSpecError::NoKnowledgeBase);
        }
        let context = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let prompt = self
            .template
            .render(&[("context", &context), ("question", question)])?;

        let answer = match tokio::time::timeout(self.llm_timeout, self.model.complete(&prompt)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(model = self.model.name(), "Answer generation timed out");
                return Err(AutoSpecError::Generation(format!(
                    "answer generation exceeded {}s",
                    self.llm_timeout.as_secs()
                )));
            }
        };
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(AutoSpecError::Generation(
                "model returned an empty answer".to_string(),
            ));
        }

        self.memory.append_if_epoch(epoch, question, answer.clone())?;

        let evidence: Vec<Evidence> = hits.iter().map(|hit| Evidence::from(&hit.chunk)).collect();
        info!(
            evidence = evidence.len(),
            turns = self.memory.len(),
            "Question answered"
        );
        Ok(AnswerResult {
            answer,
            evidence,
            standalone_query,
        })
    }

    /// Embed `query` and return the top-k hits from the index.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        let vector = match tokio::time::timeout(
            self.embed_timeout,
            embed_query(self.embedder.as_ref(), query),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(AutoSpecError::Embedding(format!(
                    "embedding the query exceeded {}s",
                    self.embed_timeout.as_secs()
                )))
            }
        };
        let hits = self.index.search(&vector, self.top_k)?;
        debug!(k = self.top_k, hits = hits.len(), "Retrieved chunks");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condense::HeuristicCondenser;
    use async_trait::async_trait;
    use autospec_core::types::{Chunk, Turn};
    use autospec_vector::embedding::{EmbeddingService, MockEmbedding};
    use std::sync::Mutex;

    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Tighten the drain plug to 30 Nm.".to_string())
        }
    }

    async fn indexed(texts: &[&str]) -> VectorIndex {
        let index = VectorIndex::new();
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new("manual.pdf", i as u32, i as u32, *t))
            .collect();
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = MockEmbedding::new().embed_batch(&owned).await.unwrap();
        index.add(chunks, vectors).unwrap();
        index
    }

    fn generator(index: VectorIndex, memory: ConversationMemory, model: Arc<Echo>) -> AnswerGenerator {
        AnswerGenerator::new(
            index,
            memory,
            Arc::new(MockEmbedding::new()),
            Arc::new(HeuristicCondenser::default()),
            model,
        )
        .unwrap()
    }

    fn echo() -> Arc<Echo> {
        Arc::new(Echo {
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let memory = ConversationMemory::new();
        let gen = generator(indexed(&["a"]).await, memory.clone(), echo());
        let err = gen.answer("   ").await.unwrap_err();
        assert!(matches!(err, AutoSpecError::EmptyQuestion));
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_is_no_knowledge_base() {
        let gen = generator(VectorIndex::new(), ConversationMemory::new(), echo());
        let err = gen
            .answer("What is the torque spec for the oil drain plug?")
            .await
            .unwrap_err();
        assert!(matches!(err, AutoSpecError::NoKnowledgeBase));
    }

    #[tokio::test]
    async fn test_prompt_holds_retrieved_context_and_question() {
        let model = echo();
        let gen = generator(
            indexed(&["Drain plug torque: 30 Nm.", "Coolant: long-life."]).await,
            ConversationMemory::new(),
            model.clone(),
        );
        let result = gen.answer("Drain plug torque?").await.unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Drain plug torque: 30 Nm."));
        assert!(prompts[0].contains("Coolant: long-life."));
        assert!(prompts[0].contains("Question:\nDrain plug torque?"));
        assert_eq!(result.evidence.len(), 2);
    }

    #[tokio::test]
    async fn test_top_k_limits_evidence() {
        let texts: Vec<String> = (0..12).map(|i| format!("Passage {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let gen = generator(indexed(&refs).await, ConversationMemory::new(), echo()).with_top_k(3);
        let result = gen.answer("Passage 4").await.unwrap();
        assert_eq!(result.evidence.len(), 3);
    }

    #[tokio::test]
    async fn test_turn_recorded_after_success() {
        let memory = ConversationMemory::new();
        let gen = generator(indexed(&["a"]).await, memory.clone(), echo());
        gen.answer("  Drain plug torque?  ").await.unwrap();
        let history = memory.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "Drain plug torque?");
        assert_eq!(history[0].answer, "Tighten the drain plug to 30 Nm.");
    }

    #[tokio::test]
    async fn test_reset_during_call_is_not_recorded() {
        struct ClearsMemory(ConversationMemory);

        #[async_trait]
        impl LanguageModel for ClearsMemory {
            fn name(&self) -> &str {
                "clears"
            }

            async fn complete(&self, _prompt: &str) -> Result<String> {
                self.0.clear();
                Ok("answer".to_string())
            }
        }

        let memory = ConversationMemory::new();
        let gen = AnswerGenerator::new(
            indexed(&["a"]).await,
            memory.clone(),
            Arc::new(MockEmbedding::new()),
            Arc::new(HeuristicCondenser::default()),
            Arc::new(ClearsMemory(memory.clone())),
        )
        .unwrap();
        let err = gen.answer("question").await.unwrap_err();
        assert!(matches!(err, AutoSpecError::SessionReset));
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_index_cleared_before_retrieval_is_no_knowledge_base() {
        struct ClearsIndex(VectorIndex);

        #[async_trait]
        impl QueryCondenser for ClearsIndex {
            async fn condense(&self, question: &str, _history: &[Turn]) -> Result<String> {
                self.0.clear()?;
                Ok(question.to_string())
            }
        }

        let index = indexed(&["Drain plug torque: 30 Nm."]).await;
        let memory = ConversationMemory::new();
        let model = echo();
        let gen = AnswerGenerator::new(
            index.clone(),
            memory.clone(),
            Arc::new(MockEmbedding::new()),
            Arc::new(ClearsIndex(index)),
            model.clone(),
        )
        .unwrap();

        let err = gen.answer("Drain plug torque?").await.unwrap_err();
        assert!(matches!(err, AutoSpecError::NoKnowledgeBase));
        assert!(model.prompts.lock().unwrap().is_empty());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_with_template_checks_slots() {
        let gen = generator(VectorIndex::new(), ConversationMemory::new(), echo());
        let bad = PromptTemplate::new("{question}", &["question"]).unwrap();
        assert!(gen.with_template(bad).is_err());

        let gen = generator(VectorIndex::new(), ConversationMemory::new(), echo());
        let good = PromptTemplate::new("{context}\n--\n{question}", &["context", "question"]).unwrap();
        assert!(gen.with_template(good).is_ok());
    }
}
