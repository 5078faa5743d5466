use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
    },
};
use async_trait::async_trait;

/// The shape of reply requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Text,
    /// The model is instructed to reply with a single JSON object.
    Json,
}

/// A single system + user prompt pair sent to the model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub format: ReplyFormat,
}

impl CompletionRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ReplyFormat::Text,
        }
    }

    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ReplyFormat::Json,
        }
    }
}

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming call and returns the text of the first choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user)
                .build()?
                .into(),
        ]);
        if request.format == ReplyFormat::Json {
            args.response_format(ResponseFormat::JsonObject);
        }

        let response: CreateChatCompletionResponse =
            self.client.chat().create(args.build()?).await?;

        let content = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .as_ref()
            .context("No content in LLM response")?;

        Ok(content.clone())
    }
}

/// A client used when no provider is configured. Every call fails, which makes
/// the collaborators built on top of it fall back to their offline behavior.
pub struct DisabledLLMClient;

#[async_trait]
impl LLMClient for DisabledLLMClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        Err(anyhow!("No LLM provider is configured"))
    }
}

/// Fills `{name}` placeholders in a prompt template.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let candidate = &rest[open + 1..];
        let value = candidate.find('}').and_then(|close| {
            let name = &candidate[..close];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                rendered.push_str(value);
                rest = &candidate[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = candidate;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template_replaces_every_occurrence() {
        let rendered = render_template(
            "Topic: {topic}. Again: {topic}. Answer: {answer}. {missing}",
            &[("topic", "Fractions"), ("answer", "1/2")],
        );
        assert_eq!(
            rendered,
            "Topic: Fractions. Again: Fractions. Answer: 1/2. {missing}"
        );
    }

    #[test]
    fn test_render_template_does_not_expand_substituted_values() {
        let rendered = render_template(
            "Answer: {answer} in {language}. {schema}",
            &[
                ("answer", "I would write {language} and {schema}"),
                ("language", "en"),
                ("schema", "{}"),
            ],
        );
        assert_eq!(
            rendered,
            "Answer: I would write {language} and {schema} in en. {}"
        );
    }

    #[test]
    fn test_render_template_keeps_unmatched_braces() {
        assert_eq!(
            render_template("{\"a\": {x}} {", &[("x", "1")]),
            "{\"a\": 1} {"
        );
    }

    #[tokio::test]
    async fn test_disabled_client_always_fails() {
        let err = DisabledLLMClient
            .complete(CompletionRequest::text("system", "user"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No LLM provider"));
    }
}
