//! 会话记忆
//!
//! 一次运行对应一个会话：累积加载的知识摘录、记录对话轮次，
//! 每次变更后整体重写落盘文件（write-through）。模型看到的就是
//! build_context 拼出的那一个字符串：系统提示 + 知识 + 对话历史。

use std::path::{Path, PathBuf};

/// 说话方：用户或助手
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// 会话概要（供 REPL 展示）
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub filepath: PathBuf,
    pub turn_count: usize,
    pub has_knowledge: bool,
    pub knowledge_len: usize,
}

/// 单个学习会话：知识摘录 + 对话轮次 + 落盘文件
pub struct Session {
    /// 时间戳派生的会话 ID（YYYYMMDD_HHMMSS）
    id: String,
    filepath: PathBuf,
    system_prompt: String,
    user_name: String,
    assistant_name: String,
    /// 已加载的知识摘录（只追加，load 越多上下文越长）
    knowledge: String,
    /// (说话方, 内容)，按插入顺序，从不重排
    turns: Vec<(Speaker, String)>,
}

impl Session {
    /// 新建会话：确保记忆目录存在并立即写出空的落盘文件
    ///
    /// 落盘文件先建好，clear 与崩溃恢复才总有文件可指。
    pub fn new(
        memory_dir: impl AsRef<Path>,
        system_prompt: impl Into<String>,
        user_name: impl Into<String>,
        assistant_name: impl Into<String>,
    ) -> Self {
        let id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let memory_dir = memory_dir.as_ref();
        if let Err(e) = std::fs::create_dir_all(memory_dir) {
            tracing::warn!("Could not create memory dir {}: {}", memory_dir.display(), e);
        }
        let filepath = memory_dir.join(format!("session_{}.txt", id));

        let session = Self {
            id,
            filepath,
            system_prompt: system_prompt.into(),
            user_name: user_name.into(),
            assistant_name: assistant_name.into(),
            knowledge: String::new(),
            turns: Vec::new(),
        };
        session.persist();
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// 把一次检索的摘录追加进会话知识上下文
    ///
    /// 用首尾标记包裹并标注主题，模型据此知道这是参考材料。
    /// 只追加不替换；空内容是 no-op。
    pub fn add_knowledge(&mut self, content: &str, topic: &str) {
        if content.is_empty() {
            return;
        }
        let formatted = format!(
            "\n=== KNOWLEDGE ON '{}' ===\n{}\n=== END KNOWLEDGE ===\n",
            topic, content
        );
        self.knowledge.push_str(&formatted);
        self.persist();
    }

    /// 追加一轮对话；空白内容是 no-op，内容先 trim 再入库
    pub fn add_turn(&mut self, speaker: Speaker, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.turns.push((speaker, text.to_string()));
        self.persist();
    }

    /// 拼出发给模型的完整上下文
    ///
    /// 顺序固定：系统提示、知识上下文（为空则整段省略）、
    /// 每轮对话一行 `名字: 内容`。本层不做任何截断。
    pub fn build_context(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.push(self.system_prompt.clone());
        if !self.knowledge.is_empty() {
            parts.push(self.knowledge.clone());
        }
        for (speaker, text) in &self.turns {
            parts.push(format!("{}: {}", self.speaker_name(*speaker), text));
        }
        parts.join("\n")
    }

    /// 最近一条消息；可按说话方过滤
    pub fn last_turn(&self, speaker: Option<Speaker>) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|(s, _)| speaker.map_or(true, |want| *s == want))
            .map(|(_, text)| text.as_str())
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// 清空知识与对话并落盘；会话 ID 与落盘路径不变
    pub fn clear(&mut self) {
        self.knowledge.clear();
        self.turns.clear();
        self.persist();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            filepath: self.filepath.clone(),
            turn_count: self.turns.len(),
            has_knowledge: !self.knowledge.is_empty(),
            knowledge_len: self.knowledge.len(),
        }
    }

    fn speaker_name(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => &self.user_name,
            Speaker::Assistant => &self.assistant_name,
        }
    }

    /// 整体重写落盘文件；格式面向人读，不要求能被机器解析回来
    ///
    /// 写失败只记日志不上抛，内存状态仍是本进程的权威数据。
    fn persist(&self) {
        let mut out = String::new();
        out.push_str(&format!("## Session: {}\n", self.id));
        out.push_str(&format!("## Started: {}\n\n", chrono::Local::now().to_rfc3339()));

        if !self.knowledge.is_empty() {
            out.push_str("## === KNOWLEDGE CONTEXT ===\n");
            out.push_str(&self.knowledge);
            out.push('\n');
        }

        out.push_str("## === CONVERSATION ===\n");
        for (speaker, text) in &self.turns {
            out.push_str(&format!("{}: {}\n", self.speaker_name(*speaker), text));
        }

        if let Err(e) = std::fs::write(&self.filepath, out) {
            tracing::warn!("Could not save session {}: {}", self.filepath.display(), e);
        }
    }
}
