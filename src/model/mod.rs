//! Decision-model boundary.
//!
//! The analyzer and the summarization pipeline only need one capability from a model:
//! complete a conversation, optionally constrained to a declared JSON schema.
//! [`DecisionModel`] is that capability; [`decide`] layers typed parsing on top.

pub mod openai;

pub use openai::{OpenAiConfig, OpenAiModel};

use crate::error::{Result, ScrapeError};
use async_trait::async_trait;
use base64::Engine;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One part of a message
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// PNG image, base64 encoded
    Image(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// Attach a PNG screenshot
    pub fn with_png(mut self, png: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        self.parts.push(ContentPart::Image(encoded));
        self
    }

    /// Concatenated text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// JSON schema the response must satisfy
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    /// Schema derived from a Rust type
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// A language model able to take page-structure and summarization decisions.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait DecisionModel: Send + Sync {
    /// Complete `messages`; when `schema` is given the reply is a JSON document matching it
    async fn complete(&self, messages: &[Message], schema: Option<&ResponseSchema>) -> Result<String>;
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json" or "csv")
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a structured reply, tolerating code fences and prose around the JSON object
pub fn parse_structured<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let body = strip_code_fence(reply);
    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }

    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end])
            .map_err(|e| ScrapeError::MalformedResponse(format!("{}: {}", e, truncate_chars(body, 200)))),
        _ => Err(ScrapeError::MalformedResponse(format!(
            "no JSON object in reply: {}",
            truncate_chars(body, 200)
        ))),
    }
}

/// First `max` characters of `text`, marking the cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

/// Ask `model` for a decision of type `T`, declared to it as a JSON schema
pub async fn decide<T>(model: &dyn DecisionModel, name: &str, messages: &[Message]) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = ResponseSchema::of::<T>(name);
    let reply = model.complete(messages, Some(&schema)).await?;
    log::debug!("Decision '{}' reply: {}", name, truncate_chars(&reply, 500));
    parse_structured(&reply)
}
