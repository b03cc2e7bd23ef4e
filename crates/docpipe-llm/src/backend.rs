//! The `LlmBackend` trait and its HTTP implementation against an
//! OpenAI-compatible `/chat/completions` endpoint, grounded on the
//! backend-trait shape in `xchecker-llm/src/types.rs`.

use crate::types::{LlmInvocation, LlmResult, Role};
use async_trait::async_trait;
use docpipe_utils::{DocpipeError, Result};
use serde_json::json;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult>;
}

/// Calls an OpenAI-compatible chat completions endpoint, constraining
/// the response to `inv.schema` via `response_format: json_schema`.
pub struct HttpChatBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpChatBackend {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmBackend for HttpChatBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult> {
        let messages: Vec<_> = inv
            .to_messages()
            .into_iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({"role": role, "content": m.content})
            })
            .collect();

        let body = json!({
            "model": inv.model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "extraction", "schema": inv.schema, "strict": true},
            },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(inv.timeout)
            .send()
            .await
            .map_err(|e| DocpipeError::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DocpipeError::Llm(format!(
                "LLM endpoint returned {status}: {text}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DocpipeError::Llm(format!("invalid JSON response: {e}")))?;

        let raw_response = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| DocpipeError::Llm("response missing message content".into()))?
            .to_string();

        let fields: serde_json::Value = serde_json::from_str(&raw_response)
            .map_err(|e| DocpipeError::Llm(format!("response is not valid JSON: {e}")))?;

        let tokens_input = payload["usage"]["prompt_tokens"].as_u64();
        let tokens_output = payload["usage"]["completion_tokens"].as_u64();

        Ok(LlmResult {
            raw_response,
            fields,
            model_used: payload["model"].as_str().unwrap_or(&inv.model).to_string(),
            tokens_input,
            tokens_output,
        })
    }
}
