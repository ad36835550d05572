//! TTS 合成客户端
//!
//! 向 ElevenLabs 风格的接口 POST 文本，拿回 MP3 字节。HTTP 状态被归类成
//! 显式错误枚举，由一个有界重试状态机消费：401 直接放弃、429 退避后重试
//! 一次、422 去掉非 ASCII 后重试一次、超时与其它传输错误立即失败。

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::voice::filter::ascii_only;

/// 合成接口默认地址
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
/// 合成模型
const MODEL_ID: &str = "eleven_flash_v2_5";
/// 单次合成请求超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// 429 后的固定退避
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

/// 分类后的合成错误（按类各有一次重试上限，见 RetryState）
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("invalid API key")]
    Auth,

    #[error("rate limited")]
    RateLimited,

    #[error("text rejected by synthesis service")]
    InvalidInput,

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Http(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

/// 重试状态机的下一步动作
#[derive(Debug, PartialEq, Eq)]
enum RetryDecision {
    /// 退避固定间隔后原文重试（429）
    BackoffAndRetry,
    /// 去掉非 ASCII 后重试（422）
    RetryWithAscii,
    /// 放弃
    GiveUp,
}

/// 每类错误最多重试一次
#[derive(Debug, Default)]
struct RetryState {
    rate_limit_used: bool,
    invalid_input_used: bool,
}

impl RetryState {
    fn decide(&mut self, err: &TtsError) -> RetryDecision {
        match err {
            TtsError::RateLimited if !self.rate_limit_used => {
                self.rate_limit_used = true;
                RetryDecision::BackoffAndRetry
            }
            TtsError::InvalidInput if !self.invalid_input_used => {
                self.invalid_input_used = true;
                RetryDecision::RetryWithAscii
            }
            _ => RetryDecision::GiveUp,
        }
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// TTS 客户端：一个 voice_id 对应一个合成端点
pub struct TtsClient {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    stability: f32,
    similarity: f32,
    base_url: String,
}

impl TtsClient {
    pub fn new(api_key: &str, voice_id: &str, stability: f32, similarity: f32) -> Self {
        Self::with_base_url(api_key, voice_id, stability, similarity, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: &str,
        voice_id: &str,
        stability: f32,
        similarity: f32,
        base_url: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            voice_id: voice_id.to_string(),
            stability,
            similarity,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 合成文本，返回音频字节；重试策略见模块文档
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        let mut text = text.to_string();
        let mut retry = RetryState::default();

        loop {
            let err = match self.request_once(&text).await {
                Ok(audio) => return Ok(audio),
                Err(e) => e,
            };

            match retry.decide(&err) {
                RetryDecision::BackoffAndRetry => {
                    tracing::warn!(
                        "TTS rate limited, retrying in {}s",
                        RATE_LIMIT_BACKOFF.as_secs()
                    );
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                }
                RetryDecision::RetryWithAscii => {
                    tracing::warn!("TTS rejected text, retrying with ASCII only");
                    text = ascii_only(&text);
                    if text.trim().is_empty() {
                        return Err(TtsError::InvalidInput);
                    }
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }

    /// 发一次请求并归类结果
    async fn request_once(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let payload = SynthesisRequest {
            text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await.map_err(classify_transport)?;
            return Ok(bytes.to_vec());
        }
        Err(classify_status(status.as_u16()))
    }
}

/// HTTP 状态码到错误类别
fn classify_status(status: u16) -> TtsError {
    match status {
        401 => TtsError::Auth,
        429 => TtsError::RateLimited,
        422 => TtsError::InvalidInput,
        other => TtsError::Http(other),
    }
}

/// reqwest 传输层错误到错误类别
fn classify_transport(err: reqwest::Error) -> TtsError {
    if err.is_timeout() {
        TtsError::Timeout
    } else {
        TtsError::Transport(err.to_string())
    }
}
