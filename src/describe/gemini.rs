// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! Gemini generateContent REST 客户端

use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

use super::DescriptionClient;
use crate::config::DescribeConfig;
use crate::error::DescribeError;

pub struct GeminiClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, config: &DescribeConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            agent,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

/// 请求体: 文本提示 + 内联 JPEG
pub fn request_body(prompt: &str, jpeg: &[u8]) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                { "inline_data": { "mime_type": "image/jpeg", "data": STANDARD.encode(jpeg) } }
            ]
        }]
    })
}

/// 错误负载中的信息
fn service_error(status: u16, body: &Value) -> DescribeError {
    let error = &body["error"];
    let status = error["code"].as_u64().map(|c| c as u16).unwrap_or(status);
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    DescribeError::Service { status, message }
}

/// 拼接首个候选的全部文本片段
pub fn response_text(body: &Value) -> Result<String, DescribeError> {
    if body.get("error").is_some() {
        return Err(service_error(200, body));
    }

    let text: String = body["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(DescribeError::EmptyResponse);
    }
    Ok(text)
}

impl DescriptionClient for GeminiClient {
    fn describe(&self, image: &Path, prompt: &str) -> Result<String, DescribeError> {
        let jpeg = fs::read(image)?;
        debug!("POST {} ({} bytes)", self.url(), jpeg.len());

        let response = self
            .agent
            .post(&self.url())
            .set("x-goog-api-key", &self.api_key)
            .send_json(request_body(prompt, &jpeg));

        let body: Value = match response {
            Ok(resp) => resp.into_json()?,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_json::<Value>().unwrap_or(Value::Null);
                return Err(service_error(status, &body));
            }
            Err(ureq::Error::Transport(e)) => return Err(DescribeError::Transport(e.to_string())),
        };
        response_text(&body)
    }
}
