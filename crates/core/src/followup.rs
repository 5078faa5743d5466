//! Follow-up Generator
//!
//! Proposes up to two clarifying questions for each topic a student did not
//! answer convincingly. Failures never propagate: the caller simply receives
//! empty question lists.

use crate::diagnostic::MAX_FOLLOWUPS_PER_TOPIC;
use crate::llm_client::{CompletionRequest, LLMClient, render_template};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const FOLLOWUP_PROMPT: &str = "generate_followups";

/// One topic the generator should probe further.
#[derive(Debug, Clone, Serialize)]
pub struct FollowupRequest {
    pub topic_title: String,
    pub first_question: String,
    pub first_answer: String,
}

/// The reply shape the model is asked to produce.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FollowupReply {
    pub topics: Vec<FollowupReplyTopic>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FollowupReplyTopic {
    /// The topic title exactly as given in the request.
    pub topic: String,
    /// At most two questions, each quoting part of the student's answer.
    #[serde(default)]
    pub questions: Vec<String>,
}

#[async_trait]
pub trait FollowupGenerator: Send + Sync {
    /// Returns one question list per request, in request order.
    ///
    /// Every list holds at most `max_per_topic` (itself capped at
    /// `MAX_FOLLOWUPS_PER_TOPIC`) questions.
    async fn generate(
        &self,
        requests: &[FollowupRequest],
        language: &str,
        max_per_topic: usize,
    ) -> Vec<Vec<String>>;
}

/// Trims, drops empty entries and enforces the per-topic cap.
pub fn cap_questions(questions: Vec<String>, max_per_topic: usize) -> Vec<String> {
    questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(max_per_topic.min(MAX_FOLLOWUPS_PER_TOPIC))
        .collect()
}

/// Generates follow-ups with an LLM in JSON mode.
pub struct LLMFollowupGenerator {
    llm: Arc<dyn LLMClient>,
    prompts: Arc<HashMap<String, String>>,
}

impl LLMFollowupGenerator {
    pub fn new(llm: Arc<dyn LLMClient>, prompts: Arc<HashMap<String, String>>) -> Self {
        Self { llm, prompts }
    }

    async fn ask_model(
        &self,
        requests: &[FollowupRequest],
        language: &str,
        max_per_topic: usize,
    ) -> Result<FollowupReply> {
        let template = self
            .prompts
            .get(FOLLOWUP_PROMPT)
            .context("Missing prompt template: 'generate_followups'")?;
        let schema = serde_json::to_string_pretty(&schemars::schema_for!(FollowupReply))?;
        let items = serde_json::to_string_pretty(requests)?;
        let max = max_per_topic.to_string();
        let prompt = render_template(
            template,
            &[
                ("language", language),
                ("max_questions", &max),
                ("items", &items),
                ("schema", &schema),
            ],
        );

        let reply = self
            .llm
            .complete(CompletionRequest::json(
                "You are a tutor running a diagnostic interview. Reply with JSON only.",
                prompt,
            ))
            .await?;

        serde_json::from_str(strip_code_fence(&reply))
            .with_context(|| format!("Unparseable follow-up reply: {:?}", reply))
    }
}

#[async_trait]
impl FollowupGenerator for LLMFollowupGenerator {
    async fn generate(
        &self,
        requests: &[FollowupRequest],
        language: &str,
        max_per_topic: usize,
    ) -> Vec<Vec<String>> {
        let mut result = vec![Vec::new(); requests.len()];
        if requests.is_empty() || max_per_topic == 0 {
            return result;
        }

        let reply = match self.ask_model(requests, language, max_per_topic).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, topics = requests.len(), "Follow-up generation failed; returning none");
                return result;
            }
        };

        let titles: Vec<&str> = requests.iter().map(|r| r.topic_title.as_str()).collect();
        for entry in reply.topics {
            match match_title(&titles, &entry.topic) {
                Some(idx) if result[idx].is_empty() => {
                    result[idx] = cap_questions(entry.questions, max_per_topic);
                }
                Some(_) => {}
                None => warn!(topic = %entry.topic, "Model returned follow-ups for an unknown topic"),
            }
        }

        info!(
            topics = requests.len(),
            questions = result.iter().map(Vec::len).sum::<usize>(),
            "Follow-up questions generated"
        );
        result
    }
}

/// Resolves a title echoed by the model back to the request it belongs to.
fn match_title(titles: &[&str], candidate: &str) -> Option<usize> {
    let candidate = candidate.trim();
    if let Some(idx) = titles
        .iter()
        .position(|t| t.trim().eq_ignore_ascii_case(candidate))
    {
        return Some(idx);
    }

    let matcher = SkimMatcherV2::default();
    titles
        .iter()
        .enumerate()
        .filter_map(|(idx, title)| {
            matcher
                .fuzzy_match(title, candidate)
                .or_else(|| matcher.fuzzy_match(candidate, title))
                .map(|score| (idx, score))
        })
        .max_by_key(|(idx, score)| (*score, std::cmp::Reverse(*idx)))
        .map(|(idx, _)| idx)
}

/// Models sometimes wrap JSON in a markdown code fence even in JSON mode.
pub(crate) fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Never asks follow-ups. Used when no provider is configured.
pub struct NoFollowupGenerator;

#[async_trait]
impl FollowupGenerator for NoFollowupGenerator {
    async fn generate(
        &self,
        requests: &[FollowupRequest],
        _language: &str,
        _max_per_topic: usize,
    ) -> Vec<Vec<String>> {
        vec![Vec::new(); requests.len()]
    }
}

/// A deterministic generator for development and integration testing.
///
/// Asks "Can you explain more about {topic}?" and, when allowed, a second
/// question quoting the start of the student's answer.
pub struct StaticFollowupGenerator;

#[async_trait]
impl FollowupGenerator for StaticFollowupGenerator {
    async fn generate(
        &self,
        requests: &[FollowupRequest],
        _language: &str,
        max_per_topic: usize,
    ) -> Vec<Vec<String>> {
        requests
            .iter()
            .map(|r| {
                let excerpt: String = r.first_answer.chars().take(30).collect();
                cap_questions(
                    vec![
                        format!("Can you explain more about {}?", r.topic_title),
                        format!("You wrote \"{}\". What do you mean by that?", excerpt),
                    ],
                    max_per_topic,
                )
            })
            .collect()
    }
}
