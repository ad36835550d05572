//! Mock 模型客户端（测试用）：固定回复并记录收到的上下文

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;

/// 固定回复的 Mock 客户端；prompts 记录每次 complete 收到的完整上下文
#[derive(Default)]
pub struct MockLlmClient {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}
