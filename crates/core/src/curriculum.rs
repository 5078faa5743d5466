//! Curriculum Generation Service
//!
//! This module provides services for proposing the diagnostic topics of a
//! learning goal: a title and a first diagnostic question per topic. Teachers
//! review the proposals before they are stored as topics.

use crate::followup::strip_code_fence;
use crate::llm_client::{CompletionRequest, LLMClient, render_template};
use crate::topic::TopicDraft;
use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub const GENERATE_TOPICS_PROMPT: &str = "generate_topics";

/// The learning goal a curriculum is generated for.
#[derive(Debug, Clone)]
pub struct GoalBrief<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub language: &'a str,
}

/// Defines the contract for any service that can generate a curriculum.
///
/// This abstraction allows the system to swap between different curriculum
/// generation approaches (e.g., AI-powered, static mock) while maintaining a
/// consistent interface for the teacher-facing endpoints.
#[async_trait]
pub trait CurriculumService: Send + Sync {
    /// Proposes up to `count` topics for a learning goal.
    ///
    /// # Returns
    ///
    /// A `Result` containing normalized drafts (blank titles removed) or an error.
    async fn generate_topics(&self, goal: GoalBrief<'_>, count: usize) -> Result<Vec<TopicDraft>>;
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicsReply {
    topics: Vec<TopicDraft>,
}

/// An implementation of `CurriculumService` backed by an LLM.
pub struct LLMCurriculumService {
    llm: Arc<dyn LLMClient>,
    prompts: Arc<HashMap<String, String>>,
}

impl LLMCurriculumService {
    /// Creates a new LLM-based curriculum service.
    ///
    /// # Arguments
    ///
    /// * `llm` - The client used for chat completions.
    /// * `prompts` - A map of template strings, which must include a key
    ///   for `"generate_topics"`.
    pub fn new(llm: Arc<dyn LLMClient>, prompts: Arc<HashMap<String, String>>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl CurriculumService for LLMCurriculumService {
    async fn generate_topics(&self, goal: GoalBrief<'_>, count: usize) -> Result<Vec<TopicDraft>> {
        let prompt_template = self
            .prompts
            .get(GENERATE_TOPICS_PROMPT)
            .context("Missing prompt template: 'generate_topics'")?;
        let schema = serde_json::to_string_pretty(&schemars::schema_for!(TopicsReply))?;
        let count_str = count.to_string();
        let prompt = render_template(
            prompt_template,
            &[
                ("goal", goal.title),
                ("description", goal.description.unwrap_or("")),
                ("language", goal.language),
                ("count", &count_str),
                ("schema", &schema),
            ],
        );

        let reply = self
            .llm
            .complete(CompletionRequest::json(
                "You are a helpful assistant that designs diagnostic curricula. Reply with JSON only.",
                prompt,
            ))
            .await?;

        let parsed: TopicsReply = serde_json::from_str(strip_code_fence(&reply))
            .context("LLM returned topics in an unexpected shape")?;

        let topics: Vec<TopicDraft> = parsed
            .topics
            .into_iter()
            .filter_map(TopicDraft::normalized)
            .take(count)
            .collect();

        info!(goal = %goal.title, topics = topics.len(), "Generated topic proposals");
        Ok(topics)
    }
}

/// A mock `CurriculumService` for development and integration testing.
///
/// This implementation provides predictable, deterministic output, which is
/// useful for testing scenarios without external dependencies or API costs.
pub struct MockCurriculumService;

#[async_trait]
impl CurriculumService for MockCurriculumService {
    async fn generate_topics(&self, goal: GoalBrief<'_>, count: usize) -> Result<Vec<TopicDraft>> {
        let topics = [
            format!("Introduction to {}", goal.title),
            "Core Concepts".to_string(),
            "Practical Applications".to_string(),
            "Advanced Topics".to_string(),
        ];
        Ok(topics
            .into_iter()
            .take(count)
            .map(|title| {
                let question = format!("In your own words, what is {}?", title.to_lowercase());
                TopicDraft::new(title).with_question(question)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{MockLLMClient, ReplyFormat};
    use anyhow::anyhow;

    fn brief() -> GoalBrief<'static> {
        GoalBrief {
            title: "Fractions and decimals",
            description: Some("Grade 5 arithmetic"),
            language: "en",
        }
    }

    fn prompts() -> Arc<HashMap<String, String>> {
        let mut map = HashMap::new();
        map.insert(
            GENERATE_TOPICS_PROMPT.to_string(),
            "Goal {goal} ({description}) in {language}, {count} topics.\n{schema}".to_string(),
        );
        Arc::new(map)
    }

    #[tokio::test]
    async fn test_generate_topics_parses_and_limits() {
        let mut llm = MockLLMClient::new();
        llm.expect_complete()
            .withf(|req| {
                req.format == ReplyFormat::Json
                    && req.user.contains("Goal Fractions and decimals (Grade 5 arithmetic)")
                    && req.user.contains("2 topics")
            })
            .times(1)
            .returning(|_| {
                Ok(r#"{"topics": [
                    {"title": "Fractions", "firstQuestion": "What is 1/2?"},
                    {"title": " "},
                    {"title": "Decimals", "firstQuestion": "What is 0.5?"},
                    {"title": "Percentages"}
                ]}"#
                .to_string())
            });

        let service = LLMCurriculumService::new(Arc::new(llm), prompts());
        let topics = service.generate_topics(brief(), 2).await.unwrap();

        assert_eq!(
            topics,
            vec![
                TopicDraft::new("Fractions").with_question("What is 1/2?"),
                TopicDraft::new("Decimals").with_question("What is 0.5?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_topics_propagates_failure() {
        let mut llm = MockLLMClient::new();
        llm.expect_complete()
            .returning(|_| Err(anyhow!("quota exceeded")));

        let service = LLMCurriculumService::new(Arc::new(llm), prompts());
        assert!(service.generate_topics(brief(), 3).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_prompt_is_an_error() {
        let service =
            LLMCurriculumService::new(Arc::new(MockLLMClient::new()), Arc::new(HashMap::new()));
        let err = service.generate_topics(brief(), 3).await.unwrap_err();
        assert!(err.to_string().contains("generate_topics"));
    }

    #[tokio::test]
    async fn test_mock_curriculum_is_deterministic() {
        let topics = MockCurriculumService
            .generate_topics(brief(), 3)
            .await
            .unwrap();
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0].title, "Introduction to Fractions and decimals");
        assert!(topics.iter().all(|t| t.first_question.is_some()));
    }
}
