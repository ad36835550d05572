//! 模型层：客户端抽象与实现（Ollama / Mock）
//!
//! 对主循环而言模型就是"一段上下文进、一段回复出"的同步边界；
//! 回复没拿全之前绝不开始语音播报。

pub mod mock;
pub mod ollama;

use async_trait::async_trait;

/// 模型客户端 trait：完整上下文进，完整回复出
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}
