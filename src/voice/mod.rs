//! 语音层：文本过滤、TTS 合成请求、外部播放进程管理

pub mod engine;
pub mod filter;
pub mod tts;

pub use engine::VoiceEngine;
pub use filter::filter_for_speech;
pub use tts::{TtsClient, TtsError};
