use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::build_prompt::{Message, PromptPayload};
use crate::config::Provider;
use crate::error::{Error, Result};
use crate::http::HttpClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
}

/// Hosted chat model: takes a system turn and a user turn, returns text.
pub trait LanguageModel {
    fn generate(&self, messages: &[Message]) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct ChatClient {
    http: HttpClient,
    provider: Provider,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        http: HttpClient,
        provider: Provider,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

impl LanguageModel for ChatClient {
    fn generate(&self, messages: &[Message]) -> Result<String> {
        debug!(model = %self.model, "requesting completion");
        let content = match self.provider {
            Provider::Ollama => {
                let url = format!("{}/api/chat", self.base_url);
                let req = ChatRequest {
                    model: &self.model,
                    messages,
                    stream: Some(false),
                };
                let res = self
                    .http
                    .post_json::<OllamaChatResponse, _>(&url, &req)
                    .map_err(|e| Error::Model(e.to_string()))?;
                res.message.and_then(|m| m.content)
            }
            Provider::OpenAi => {
                let url = format!("{}/chat/completions", self.base_url);
                let req = ChatRequest {
                    model: &self.model,
                    messages,
                    stream: None,
                };
                let res = self
                    .http
                    .post_json::<OpenAiChatResponse, _>(&url, &req)
                    .map_err(|e| Error::Model(e.to_string()))?;
                res.choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message)
                    .and_then(|m| m.content)
            }
        };
        content.ok_or_else(|| Error::Model("response has no message content".to_string()))
    }
}

/// Sends the composed prompt and returns the model's reply verbatim.
pub fn answer(model: &dyn LanguageModel, payload: &PromptPayload) -> Result<Answer> {
    let text = model.generate(&payload.messages())?;
    Ok(Answer { text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_chat_response_shapes() {
        let ollama: OllamaChatResponse = serde_json::from_str(
            r#"{"model":"llama3.1","message":{"role":"assistant","content":"Inception."},"done":true}"#,
        )
        .expect("ollama response");
        assert_eq!(
            ollama.message.and_then(|m| m.content).as_deref(),
            Some("Inception.")
        );

        let openai: OpenAiChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Inception."}}]}"#,
        )
        .expect("openai response");
        assert_eq!(openai.choices.len(), 1);
    }

    #[test]
    fn ollama_request_disables_streaming() {
        let messages = vec![Message {
            role: "user".to_string(),
            content: "hi".to_string(),
        }];
        let with_stream = ChatRequest {
            model: "llama3.1",
            messages: &messages,
            stream: Some(false),
        };
        let without = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            stream: None,
        };
        let a = serde_json::to_value(&with_stream).expect("serialize");
        let b = serde_json::to_value(&without).expect("serialize");
        assert_eq!(a["stream"], false);
        assert!(b.get("stream").is_none());
    }
}
