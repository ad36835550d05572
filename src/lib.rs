//! Swot - Rust 语音学习助手
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量 + CLI 覆盖）
//! - **knowledge**: 知识库检索引擎（字面量匹配、上下文窗口、大小上限）
//! - **session**: 会话记忆（知识摘录累积、对话轮次、落盘持久化）
//! - **llm**: 模型客户端抽象与实现（Ollama / Mock）
//! - **voice**: 语音播报（TTS 请求、文本过滤、外部播放进程管理）
//! - **repl**: 交互主循环与命令

pub mod config;
pub mod knowledge;
pub mod llm;
pub mod repl;
pub mod session;
pub mod voice;

pub use knowledge::KnowledgeStore;
pub use session::{Session, Speaker};
pub use voice::VoiceEngine;
