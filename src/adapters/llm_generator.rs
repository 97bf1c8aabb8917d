//! Language-model backed value generation.
//!
//! The model is shown the resolved JSON Schema and asked for a single JSON
//! value. The registry validates whatever comes back and falls back to local
//! synthesis when the answer is unusable.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{LLMConfig, LLMProvider};
use crate::domain::{SchemaNode, ValueGenerator};

const DEFAULT_SYSTEM_PROMPT: &str = "You generate realistic sample data for API mocks. \
Reply with a single JSON value that satisfies the given JSON Schema and nothing else.";

pub struct LlmValueGenerator {
    config: LLMConfig,
    api_key: String,
    http: reqwest::Client,
}

impl LlmValueGenerator {
    pub fn new(config: LLMConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Build from settings, reading the API key from the configured environment variable
    pub fn from_config(config: &LLMConfig) -> Result<Self> {
        let env_var = config
            .api_key_env
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No API key configuration provided"))?;
        let api_key = std::env::var(env_var)
            .map_err(|_| anyhow::anyhow!("API key environment variable {} not set", env_var))?;
        Ok(Self::new(config.clone(), api_key))
    }

    fn system_prompt(&self) -> String {
        self.config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        use async_openai::{config::OpenAIConfig, types::*, Client};

        let client = Client::with_config(OpenAIConfig::new().with_api_key(self.api_key.clone()));

        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(self.system_prompt())
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.to_string())
                    .build()?,
            ),
        ];

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(&self.config.model).messages(messages);
        if let Some(temp) = self.config.temperature {
            request_builder.temperature(temp);
        }
        if let Some(max_tokens) = openai_max_tokens(self.config.max_tokens)? {
            request_builder.max_tokens(max_tokens);
        }

        let response = client
            .chat()
            .create(request_builder.build()?)
            .await
            .map_err(|e| anyhow::anyhow!("OpenAI API error: {}", e))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("No response from OpenAI"))
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let mut request_body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens.unwrap_or(1000),
            "system": self.system_prompt(),
            "messages": [{
                "role": "user",
                "content": prompt
            }]
        });
        if let Some(temp) = self.config.temperature {
            request_body["temperature"] = json!(temp);
        }

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Anthropic API error: {}", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Anthropic API error: {}", error_text));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse Anthropic response: {}", e))?;

        response_json
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|item| item.get("text"))
            .and_then(|text| text.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No text content in Anthropic response"))
    }
}

#[async_trait]
impl ValueGenerator for LlmValueGenerator {
    fn name(&self) -> &str {
        match self.config.provider {
            LLMProvider::OpenAI => "openai",
            LLMProvider::Anthropic => "anthropic",
        }
    }

    async fn generate(&self, schema: &SchemaNode) -> Result<Value> {
        let prompt = build_prompt(schema)?;
        let text = match self.config.provider {
            LLMProvider::OpenAI => self.complete_openai(&prompt).await?,
            LLMProvider::Anthropic => self.complete_anthropic(&prompt).await?,
        };
        parse_reply(&text)
    }
}

/// The chat completions API takes a 16-bit token limit
fn openai_max_tokens(max_tokens: Option<u32>) -> Result<Option<u16>> {
    max_tokens
        .map(|limit| {
            u16::try_from(limit)
                .map_err(|_| anyhow::anyhow!("max_tokens {} exceeds the OpenAI limit of {}", limit, u16::MAX))
        })
        .transpose()
}

fn build_prompt(schema: &SchemaNode) -> Result<String> {
    Ok(format!(
        "JSON Schema:\n{}\n\nRespond with one JSON value matching this schema.",
        serde_json::to_string_pretty(&schema.to_json())?
    ))
}

/// Parse a model reply, tolerating a surrounding Markdown code fence
fn parse_reply(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```")
        .map(|rest| rest.trim_start_matches("json"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| anyhow::anyhow!("Model reply is not JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_reply() {
        assert_eq!(parse_reply(" {\"id\": 1} ").unwrap(), json!({ "id": 1 }));
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "```json\n{\"name\": \"Rex\"}\n```";
        assert_eq!(parse_reply(reply).unwrap(), json!({ "name": "Rex" }));
        assert_eq!(parse_reply("```\n[1, 2]\n```").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(parse_reply("Sure! Here is your data.").is_err());
    }

    #[test]
    fn test_openai_max_tokens_is_not_truncated() {
        assert_eq!(openai_max_tokens(None).unwrap(), None);
        assert_eq!(openai_max_tokens(Some(1000)).unwrap(), Some(1000));
        assert_eq!(openai_max_tokens(Some(65_535)).unwrap(), Some(u16::MAX));
        assert!(openai_max_tokens(Some(65_536)).is_err());
    }

    #[test]
    fn test_prompt_contains_schema() {
        let node = SchemaNode::from_json(&json!({ "type": "object", "properties": { "id": { "type": "integer" } } })).unwrap();
        let prompt = build_prompt(&node).unwrap();
        assert!(prompt.contains("\"integer\""));
    }

    #[test]
    fn test_missing_api_key_env() {
        let config = LLMConfig {
            provider: LLMProvider::Anthropic,
            api_key_env: Some("PROTEUS_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            model: "claude-3-haiku-20240307".to_string(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        };
        assert!(LlmValueGenerator::from_config(&config).is_err());

        let generator = LlmValueGenerator::new(config, "key");
        assert_eq!(generator.name(), "anthropic");
    }
}
