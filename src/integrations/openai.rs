use super::api_client::{ApiClient, Auth};
use crate::errors::AppError;
use serde::{Deserialize, Serialize};

// gpt-4o-mini list prices, USD per 1M tokens
const INPUT_COST_PER_MILLION: f64 = 0.15;
const OUTPUT_COST_PER_MILLION: f64 = 0.60;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Estimated spend in USD.
    pub fn estimated_cost(&self) -> f64 {
        f64::from(self.prompt_tokens) * INPUT_COST_PER_MILLION / 1_000_000.0
            + f64::from(self.completion_tokens) * OUTPUT_COST_PER_MILLION / 1_000_000.0
    }
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Chat-completions client returning JSON-mode replies.
#[derive(Clone)]
pub struct OpenAiClient {
    api: ApiClient,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, AppError> {
        Ok(Self {
            api: ApiClient::new("OpenAI", base_url, Auth::Bearer(api_key.to_string()))?,
            model: model.to_string(),
        })
    }

    /// Sends one system + user exchange and returns the raw JSON text of the reply.
    pub async fn chat_json(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ChatReply, AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response: ChatResponse = self.api.post_json("/chat/completions", &request).await?;

        if let Some(usage) = response.usage {
            tracing::info!(
                "OpenAI usage ({}): {} prompt + {} completion tokens, ~${:.5}",
                self.model,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.estimated_cost()
            );
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::ExternalApiError("OpenAI returned no choices".to_string()))?;

        Ok(ChatReply {
            content,
            usage: response.usage,
        })
    }
}
