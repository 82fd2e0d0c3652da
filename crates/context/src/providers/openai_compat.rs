//! OpenAI-style chat completions (Groq, SambaNova, OpenRouter)

use super::{non_empty, read_json, transport_error, CompletionRequest, ProviderAdapter, TEMPERATURE};
use async_trait::async_trait;
use genesis_common::errors::ProviderCallError;
use genesis_common::{Provider, Secret};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

pub struct OpenAiCompatAdapter {
    provider: Provider,
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiCompatAdapter {
    pub fn new(provider: Provider, client: reqwest::Client, base_url: impl AsRef<str>) -> Self {
        let endpoint = format!("{}/chat/completions", base_url.as_ref().trim_end_matches('/'));
        Self {
            provider,
            client,
            endpoint,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(
        &self,
        credential: &Secret,
        request: &CompletionRequest,
    ) -> Result<String, ProviderCallError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(self.provider, e))?;

        let chat: ChatResponse = read_json(self.provider, response).await?;
        non_empty(self.provider, chat.into_text())
    }
}
