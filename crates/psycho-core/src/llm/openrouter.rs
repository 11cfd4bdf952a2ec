//! HTTP-backed [`LlmProvider`] against an OpenAI-compatible chat-completions endpoint.
//!
//! Transient failures (connection errors, 5xx, 429) are retried with exponential
//! backoff (2 retries, 250ms/1s) inside `complete` before surfacing to the caller,
//! per the transient-external-failure policy.

use super::{ChatMessage as CoreChatMessage, CompletionResult, ContentStream, LlmProvider};
use crate::config::UserConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "anthropic/claude-3.5-haiku";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenRouterProvider {
    api_key: String,
    model: String,
    api_url: String,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    pub fn new(api_key: String, model: String, api_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { api_key: api_key.trim().to_string(), model, api_url, client }
    }

    /// Priority chain: `UserConfig` (toml) then environment. Returns `None` if no key found.
    pub fn from_env() -> Option<Self> {
        let user_config = UserConfig::load();
        let api_key = user_config.get_api_key()?;
        if api_key.is_empty() {
            return None;
        }
        let model = user_config.get_llm_model();
        let model = if model.is_empty() { DEFAULT_MODEL.to_string() } else { model };
        let api_url = user_config.get_llm_api_url();
        Some(Self::new(api_key, model, api_url))
    }

    fn to_wire<'a>(system: &'a str, messages: &'a [CoreChatMessage]) -> Vec<WireMessage<'a>> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            wire.push(WireMessage { role: "system", content: system });
        }
        for m in messages {
            wire.push(WireMessage { role: &m.role, content: &m.content });
        }
        wire
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let mut attempt = 0;
        loop {
            let res = self
                .client
                .post(&self.api_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("HTTP-Referer", "https://psycho-portal.local")
                .header("X-Title", "PsychoPortal")
                .json(body)
                .send()
                .await;

            match res {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().as_u16() == 429 && attempt < 2 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(250 * 4u64.pow(attempt))).await;
                    continue;
                }
                Ok(resp) if resp.status().is_server_error() && attempt < 2 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(250 * 4u64.pow(attempt))).await;
                    continue;
                }
                Ok(resp) if resp.status().as_u16() == 429 => return Err(LlmError::RateLimited),
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(LlmError::InvalidResponse(format!("{}: {}", status, text)));
                }
                Err(e) if attempt < 2 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(250 * 4u64.pow(attempt))).await;
                    continue;
                }
                Err(e) => return Err(LlmError::Http(e)),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn complete(
        &self,
        messages: &[CoreChatMessage],
        system: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<CompletionResult, LlmError> {
        let wire = Self::to_wire(system, messages);
        let body = ChatRequest { model: &self.model, messages: wire, temperature, max_tokens, stream: false };
        let resp = self.post(&body).await?;
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("parse failed: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices returned".into()))?;

        Ok(CompletionResult {
            content: choice.message.content,
            model: if parsed.model.is_empty() { self.model.clone() } else { parsed.model },
            input_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: parsed.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            stop_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }

    async fn stream(
        &self,
        messages: &[CoreChatMessage],
        system: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<ContentStream, LlmError> {
        let wire_owned: Vec<(String, String)> = {
            let mut v = Vec::with_capacity(messages.len() + 1);
            if !system.is_empty() {
                v.push(("system".to_string(), system.to_string()));
            }
            for m in messages {
                v.push((m.role.clone(), m.content.clone()));
            }
            v
        };
        let model = self.model.clone();
        let api_url = self.api_url.clone();
        let api_key = self.api_key.clone();
        let client = self.client.clone();

        let body = serde_json::json!({
            "model": model,
            "messages": wire_owned.iter().map(|(r, c)| serde_json::json!({"role": r, "content": c})).collect::<Vec<_>>(),
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": true,
        });

        let resp = client
            .post(&api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(LlmError::Http)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::InvalidResponse(format!("{}: {}", status, text)));
        }

        let byte_stream = resp.bytes_stream();
        let out = async_stream::stream! {
            futures_util::pin_mut!(byte_stream);
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LlmError::Http(e));
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<StreamChunk>(data) {
                        Ok(parsed) => {
                            for choice in parsed.choices {
                                if let Some(text) = choice.delta.content {
                                    if !text.is_empty() {
                                        yield Ok(text);
                                    }
                                }
                            }
                        }
                        Err(_) => continue,
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_prepend_system() {
        let msgs = vec![CoreChatMessage::user("hi")];
        let wire = OpenRouterProvider::to_wire("be terse", &msgs);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].role, "user");
    }
}
