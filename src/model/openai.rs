use crate::error::{Result, ScrapeError};
use crate::model::{ContentPart, DecisionModel, Message, ResponseSchema, Role};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Connection settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(120),
            temperature: 0.0,
        }
    }
}

impl OpenAiConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `HARVEST_MODEL`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ScrapeError::InvalidConfig("OPENAI_API_KEY is not set".to_string()))?;
        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("HARVEST_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// [`DecisionModel`] over the chat completions API
pub struct OpenAiModel {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiModel {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| ScrapeError::InvalidConfig("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ScrapeError::ModelRequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn encode_message(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
    };

    let only_text = message.parts.iter().all(|p| matches!(p, ContentPart::Text(_)));
    if only_text {
        return json!({ "role": role, "content": message.text() });
    }

    let content: Vec<Value> = message
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "type": "text", "text": text }),
            ContentPart::Image(png) => json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", png) }
            }),
        })
        .collect();
    json!({ "role": role, "content": content })
}

fn response_format(schema: &ResponseSchema) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": schema.name,
            "schema": schema.schema,
            "strict": false
        }
    })
}

#[async_trait]
impl DecisionModel for OpenAiModel {
    async fn complete(&self, messages: &[Message], schema: Option<&ResponseSchema>) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: messages.iter().map(encode_message).collect(),
            response_format: schema.map(response_format),
        };

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| ScrapeError::ModelRequestFailed(format!("failed to call chat completions: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ScrapeError::ModelRequestFailed(format!("{} returned {}: {}", self.config.model, status, text)));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ScrapeError::MalformedResponse(format!("failed to parse chat response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| ScrapeError::MalformedResponse("empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_text_message() {
        let encoded = encode_message(&Message::system("be terse"));
        assert_eq!(encoded, json!({ "role": "system", "content": "be terse" }));
    }

    #[test]
    fn test_encode_image_message() {
        let encoded = encode_message(&Message::user("what is this").with_png(&[1, 2, 3]));
        let content = encoded["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "text");
        assert!(content[1]["image_url"]["url"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_response_format() {
        let schema = ResponseSchema {
            name: "pick".to_string(),
            schema: json!({ "type": "object" }),
        };
        let format = response_format(&schema);
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "pick");
    }

    #[test]
    fn test_endpoint() {
        let model = OpenAiModel::new(OpenAiConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            api_key: "sk-test".to_string(),
            ..OpenAiConfig::default()
        })
        .unwrap();
        assert_eq!(model.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{\"ok\": true}"));
    }
}
