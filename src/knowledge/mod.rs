//! 知识库层：目录内 .md 文件的检索、列表、笔记追加与统计

pub mod store;

pub use store::{KnowledgeStats, KnowledgeStore};
