//! Knowledge Classifier
//!
//! Labels a single student answer as `EXCELLENT`, `REFRESH` or `UNKNOWN`.
//! The model-backed implementation never fails: any problem with the model
//! call degrades to the answer-length heuristic.

use crate::label::KnowledgeLabel;
use crate::llm_client::{CompletionRequest, LLMClient, render_template};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const CLASSIFY_PROMPT: &str = "classify_answer";

/// Everything the classifier needs to judge one answer.
#[derive(Debug, Clone)]
pub struct ClassificationInput<'a> {
    pub topic_title: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub language: &'a str,
}

/// Defines the contract for any service that can label an answer.
#[async_trait]
pub trait KnowledgeClassifier: Send + Sync {
    /// Returns exactly one label for the answer. Implementations must not fail.
    async fn classify(&self, input: ClassificationInput<'_>) -> KnowledgeLabel;
}

/// Classifies answers with an LLM constrained to reply with a single label token.
pub struct LLMKnowledgeClassifier {
    llm: Arc<dyn LLMClient>,
    prompts: Arc<HashMap<String, String>>,
}

impl LLMKnowledgeClassifier {
    pub fn new(llm: Arc<dyn LLMClient>, prompts: Arc<HashMap<String, String>>) -> Self {
        Self { llm, prompts }
    }

    async fn ask_model(&self, input: &ClassificationInput<'_>) -> Result<KnowledgeLabel> {
        let template = self
            .prompts
            .get(CLASSIFY_PROMPT)
            .context("Missing prompt template: 'classify_answer'")?;
        let prompt = render_template(
            template,
            &[
                ("topic", input.topic_title),
                ("question", input.question),
                ("answer", input.answer),
                ("language", input.language),
            ],
        );

        let reply = self
            .llm
            .complete(CompletionRequest::text(
                "You grade student answers. Reply with exactly one word: EXCELLENT, REFRESH or UNKNOWN.",
                prompt,
            ))
            .await?;

        KnowledgeLabel::from_model_reply(&reply)
            .with_context(|| format!("Unusable classifier reply: {:?}", reply))
    }
}

#[async_trait]
impl KnowledgeClassifier for LLMKnowledgeClassifier {
    async fn classify(&self, input: ClassificationInput<'_>) -> KnowledgeLabel {
        match self.ask_model(&input).await {
            Ok(label) => {
                debug!(topic = %input.topic_title, %label, "Answer classified by model");
                label
            }
            Err(e) => {
                let label = KnowledgeLabel::from_answer_length(input.answer);
                warn!(topic = %input.topic_title, %label, error = %e, "Classifier fell back to length heuristic");
                label
            }
        }
    }
}

/// Classifies purely by answer length. Deterministic, used offline and in tests.
pub struct HeuristicClassifier;

#[async_trait]
impl KnowledgeClassifier for HeuristicClassifier {
    async fn classify(&self, input: ClassificationInput<'_>) -> KnowledgeLabel {
        KnowledgeLabel::from_answer_length(input.answer)
    }
}
