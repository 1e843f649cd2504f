//! Request and response bodies for `POST /chat/completions`.
use serde::{Deserialize, Serialize};

use partsage_core::error::LlmError;
use partsage_core::types::{Completion, Prompt, Role, SchemaHint};

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatRequest {
    /// JSON mode is requested when a schema hint is present; the hint's shape
    /// is appended to the system message since the endpoint only enforces
    /// "some JSON object".
    pub fn from_prompt(model: &str, prompt: &Prompt, schema: Option<&SchemaHint>) -> Self {
        let mut system = prompt.system.clone();
        if let Some(schema) = schema {
            system.push_str(&format!("\n\nRespond with a single JSON object ({}) shaped like:\n{}", schema.name, schema.shape));
        }
        let mut messages = Vec::with_capacity(prompt.turns.len() + 1);
        messages.push(ChatMessage { role: "system".into(), content: system });
        for turn in &prompt.turns {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(ChatMessage { role: role.into(), content: turn.content.clone() });
        }
        Self {
            model: model.to_string(),
            messages,
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
            response_format: schema.map(|_| ResponseFormat { kind: "json_object" }),
        }
    }
}

/// Turns a response body into a completion, validating JSON when structured
/// output was requested.
pub fn parse_completion(body: &str, structured: bool) -> Result<Completion, LlmError> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| LlmError::MalformedOutput(format!("response body: {e}")))?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| LlmError::MalformedOutput("response has no content".into()))?;
    if !structured {
        return Ok(Completion::Text(content));
    }
    let value: serde_json::Value =
        serde_json::from_str(strip_code_fence(&content)).map_err(|e| LlmError::MalformedOutput(format!("expected JSON object: {e}")))?;
    if !value.is_object() {
        return Err(LlmError::MalformedOutput("expected JSON object".into()));
    }
    Ok(Completion::Structured(value))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}
