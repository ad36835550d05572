//! Ollama 客户端
//!
//! 走本地 Ollama HTTP 接口：/api/generate 生成回复，/api/tags 列模型。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::LlmClient;

/// 本地 Ollama 默认地址
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama 客户端：持有模型名与基地址
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    pub model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// 已安装模型名列表
    pub async fn list_models(&self) -> Result<Vec<String>, String> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Could not reach Ollama at {}: {}", self.base_url, e))?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| format!("Bad response from Ollama: {}", e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// 配置的模型是否已安装（名字前缀匹配，"mistral" 命中 "mistral:latest"）
    pub async fn check_model(&self) -> bool {
        match self.list_models().await {
            Ok(models) => models.iter().any(|name| name.starts_with(&self.model)),
            Err(e) => {
                tracing::warn!("Model check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("Could not reach Ollama at {}: {}", self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Ollama returned HTTP {}", status.as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| format!("Bad response from Ollama: {}", e))?;
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_keeps_model_name() {
        let client = OllamaClient::new(DEFAULT_BASE_URL, "mistral", 120);
        assert_eq!(client.model, "mistral");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/", "mistral", 120);
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_err_not_panic() {
        let client = OllamaClient::new("http://127.0.0.1:9", "mistral", 2);
        assert!(client.complete("hello").await.is_err());
        assert!(client.list_models().await.is_err());
        assert!(!client.check_model().await);
    }
}
