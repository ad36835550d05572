//! 知识库检索引擎
//!
//! 扫描知识目录下的 .md 文件，做大小写不敏感的字面量子串匹配，
//! 按匹配行提取上下文窗口（同文件内去重），装配带来源标签的摘录报告。
//!
//! 上限常量（防止小模型被超长上下文噎住）：
//! - MAX_MATCHES_PER_FILE：单文件内做窗口种子的匹配行数
//! - CONTEXT_LINES：每个匹配行前后各取的行数
//! - APPROX_CHAR_LIMIT：报告总大小（约 2000 token）
//! - MAX_FILES：报告包含的文件数

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};

/// 单文件内做窗口种子的匹配行数上限
const MAX_MATCHES_PER_FILE: usize = 3;
/// 每个匹配行前后各取的上下文行数
const CONTEXT_LINES: usize = 5;
/// 报告总大小上限（字节）
const APPROX_CHAR_LIMIT: usize = 8000;
/// 报告包含的文件数上限
const MAX_FILES: usize = 5;
/// 截断后低于此大小则整个文件不收录
const MIN_MEANINGFUL_CHARS: usize = 200;
/// 同文件内不相邻窗口之间的分隔
const BLOCK_SEPARATOR: &str = "\n--\n";
/// 默认笔记文件
const DEFAULT_NOTE_FILE: &str = "general_notes.md";

/// 知识库统计
#[derive(Debug, Clone)]
pub struct KnowledgeStats {
    pub file_count: usize,
    pub total_lines: usize,
    pub total_size_label: String,
    pub dir: PathBuf,
}

/// 知识库检索引擎：每次操作都重读磁盘，不做跨调用缓存
///
/// 文件可能被外部进程随时修改（追加笔记），缓存会读到陈旧内容。
pub struct KnowledgeStore {
    dir: PathBuf,
}

impl KnowledgeStore {
    /// 创建引擎并确保知识目录存在
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!("Could not create knowledge dir {}: {}", dir.display(), e);
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 按主题检索全部 .md 文件，返回装配好的摘录报告
    ///
    /// 空主题、无文件、无匹配都返回空串，绝不报错。
    /// 文件按文件名字典序处理，保证输出可复现。
    ///
    /// 输出形如：
    /// ```text
    /// [SOURCE: networking.md]
    /// TCP is a connection-based protocol...
    ///
    /// [SOURCE: protocols.md]
    /// TCP provides reliable delivery...
    /// ```
    pub fn search(&self, topic: &str) -> String {
        let topic = topic.trim();
        if topic.is_empty() {
            return String::new();
        }

        // 字面量匹配：先转义再编译，避免把 "c++" 之类当正则
        let pattern = match RegexBuilder::new(&regex::escape(topic))
            .case_insensitive(true)
            .build()
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Could not compile search pattern for '{}': {}", topic, e);
                return String::new();
            }
        };

        let mut results: Vec<String> = Vec::new();
        let mut total_chars = 0usize;
        let mut files_included = 0usize;

        for path in self.markdown_files() {
            if files_included >= MAX_FILES || total_chars >= APPROX_CHAR_LIMIT {
                break;
            }

            let mut excerpt = self.search_file(&path, &pattern);
            if excerpt.is_empty() {
                continue;
            }

            // 超出剩余预算时截断；截断后太短则整个文件不收录，装配到此为止
            if total_chars + excerpt.len() > APPROX_CHAR_LIMIT {
                let remaining = APPROX_CHAR_LIMIT - total_chars;
                if remaining > MIN_MEANINGFUL_CHARS {
                    excerpt = format!(
                        "{}\n[...truncated...]",
                        truncate_to_char_boundary(&excerpt, remaining)
                    );
                } else {
                    break;
                }
            }

            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let formatted = format!("[SOURCE: {}]\n{}", filename, excerpt);
            total_chars += formatted.len();
            files_included += 1;
            results.push(formatted);
        }

        results.join("\n\n")
    }

    /// 在单个文件内匹配并提取上下文窗口
    ///
    /// 每个匹配行取前后 CONTEXT_LINES 行（裁剪到文件边界），同文件内已
    /// 输出过的行不再重复；不相邻的窗口用 BLOCK_SEPARATOR 连接。
    fn search_file(&self, path: &Path, pattern: &Regex) -> String {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Could not read {}: {}", path.display(), e);
                return String::new();
            }
        };
        let lines: Vec<&str> = content.lines().collect();

        let mut match_indices: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| pattern.is_match(line))
            .map(|(i, _)| i)
            .collect();
        if match_indices.is_empty() {
            return String::new();
        }
        match_indices.truncate(MAX_MATCHES_PER_FILE);

        let mut extracted: Vec<String> = Vec::new();
        let mut seen: HashSet<usize> = HashSet::new();

        for idx in match_indices {
            let start = idx.saturating_sub(CONTEXT_LINES);
            let end = (idx + CONTEXT_LINES + 1).min(lines.len());

            let mut section: Vec<&str> = Vec::new();
            for i in start..end {
                if seen.insert(i) {
                    section.push(lines[i].trim_end());
                }
            }
            if !section.is_empty() {
                extracted.push(section.join("\n"));
            }
        }

        extracted.join(BLOCK_SEPARATOR)
    }

    /// 列出全部知识文件：（文件名，行数，大小标签）
    ///
    /// 尽力而为：读不了的文件跳过，不中断列表。
    pub fn list_files(&self) -> Vec<(String, usize, String)> {
        let mut files = Vec::new();
        for path in self.markdown_files() {
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("Could not read {}: {}", path.display(), e);
                    continue;
                }
            };
            let size = match std::fs::metadata(&path) {
                Ok(m) => m.len(),
                Err(_) => content.len() as u64,
            };
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push((filename, content.lines().count(), size_label(size)));
        }
        files
    }

    /// 读取单个知识文件的完整内容；失败时返回可读的提示文本
    pub fn file_content(&self, filename: &str) -> String {
        let Some(name) = safe_file_name(filename) else {
            return format!("File not found: {}", filename);
        };
        let path = self.dir.join(name);
        if !path.exists() {
            return format!("File not found: {}", filename);
        }
        match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => format!("Error reading {}: {}", filename, e),
        }
    }

    /// 追加一条带时间戳的笔记；文件不存在时创建，绝不覆盖已有内容
    pub fn add_note(&self, note: &str, filename: Option<&str>) -> std::io::Result<PathBuf> {
        let raw = filename.unwrap_or(DEFAULT_NOTE_FILE);
        let name = safe_file_name(raw).unwrap_or_else(|| DEFAULT_NOTE_FILE.to_string());
        let path = self.dir.join(name);

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
        let block = format!("\n## {}\n{}\n", timestamp, note);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?
            .write_all(block.as_bytes())?;
        Ok(path)
    }

    /// 知识库总体统计；读不了的文件计入 file_count 但不计行数与大小
    pub fn stats(&self) -> KnowledgeStats {
        let mut file_count = 0usize;
        let mut total_lines = 0usize;
        let mut total_size = 0u64;

        for path in self.markdown_files() {
            file_count += 1;
            match std::fs::read_to_string(&path) {
                Ok(c) => {
                    total_lines += c.lines().count();
                    total_size += c.len() as u64;
                }
                Err(e) => {
                    tracing::warn!("Could not read {}: {}", path.display(), e);
                }
            }
        }

        KnowledgeStats {
            file_count,
            total_lines,
            total_size_label: size_label(total_size),
            dir: self.dir.clone(),
        }
    }

    /// 知识目录下全部 .md 文件，按路径字典序排列
    fn markdown_files(&self) -> Vec<PathBuf> {
        let pattern = self.dir.join("*.md");
        let mut paths: Vec<PathBuf> = match glob::glob(&pattern.to_string_lossy()) {
            Ok(entries) => entries.filter_map(|e| e.ok()).collect(),
            Err(e) => {
                tracing::warn!("Bad glob pattern {}: {}", pattern.display(), e);
                Vec::new()
            }
        };
        paths.sort();
        paths
    }
}

/// 在不超过 max 字节的前提下于字符边界截断
fn truncate_to_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// "X.YKB" 形式的大小标签
fn size_label(bytes: u64) -> String {
    format!("{:.1}KB", bytes as f64 / 1024.0)
}

/// 只接受纯文件名，拒绝带路径分隔的输入（防止逃出知识目录）
fn safe_file_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let path = Path::new(raw);
    match path.file_name() {
        Some(name) if name == raw => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, KnowledgeStore) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let store = KnowledgeStore::new(dir.path());
        (dir, store)
    }

    fn networking_file() -> String {
        let mut lines: Vec<String> = (1..=20).map(|i| format!("Line {} of notes", i)).collect();
        lines[9] = "TCP is a connection-based protocol".to_string();
        lines.join("\n")
    }

    #[test]
    fn test_search_blank_topic_is_empty() {
        let (_d, store) = store_with(&[("a.md", "TCP handshake")]);
        assert_eq!(store.search(""), "");
        assert_eq!(store.search("   "), "");
    }

    #[test]
    fn test_search_no_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        assert_eq!(store.search("tcp"), "");
    }

    #[test]
    fn test_search_finds_match_with_context() {
        let (_d, store) = store_with(&[("networking.md", &networking_file())]);
        let report = store.search("tcp");
        assert!(report.starts_with("[SOURCE: networking.md]"));
        assert!(report.contains("TCP is a connection-based protocol"));
        // 前后各 5 行的对称窗口
        assert!(report.contains("Line 5 of notes"));
        assert!(report.contains("Line 15 of notes"));
        assert!(!report.contains("Line 4 of notes"));
        assert!(!report.contains("Line 16 of notes"));
    }

    #[test]
    fn test_search_miss_is_empty() {
        let (_d, store) = store_with(&[("networking.md", &networking_file())]);
        assert_eq!(store.search("quantumfoo"), "");
    }

    #[test]
    fn test_search_is_literal_not_regex() {
        let (_d, store) = store_with(&[("langs.md", "We cover c++ templates here\nand a.b dotted names")]);
        let report = store.search("c++");
        assert!(report.contains("c++ templates"));
        // "a.b" 不该匹配任意字符
        assert_eq!(store.search("aXb"), "");
        assert!(store.search("a.b").contains("dotted names"));
    }

    #[test]
    fn test_search_no_duplicate_lines_in_one_file() {
        // 第 3 与第 5 行都匹配，窗口重叠，重叠行只能出现一次
        let content = (1..=10)
            .map(|i| {
                if i == 3 || i == 5 {
                    format!("topic hit on line {}", i)
                } else {
                    format!("filler line {}", i)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let (_d, store) = store_with(&[("overlap.md", &content)]);
        let report = store.search("topic hit");
        let occurrences = report.matches("filler line 4").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_search_respects_file_cap() {
        let files: Vec<(String, String)> = (0..8)
            .map(|i| (format!("file{}.md", i), format!("shared term in file {}", i)))
            .collect();
        let refs: Vec<(&str, &str)> = files
            .iter()
            .map(|(n, c)| (n.as_str(), c.as_str()))
            .collect();
        let (_d, store) = store_with(&refs);
        let report = store.search("shared term");
        assert_eq!(report.matches("[SOURCE:").count(), MAX_FILES);
        // 字典序：file0 在前
        assert!(report.starts_with("[SOURCE: file0.md]"));
    }

    #[test]
    fn test_search_respects_byte_cap() {
        // 行很长，3 个种子窗口就足以超出总预算
        let long_line = format!("the quick brown fox {}", "padding ".repeat(120));
        let big: String = (0..30)
            .map(|_| long_line.clone())
            .collect::<Vec<_>>()
            .join("\n");
        let (_d, store) = store_with(&[("a.md", &big), ("b.md", &big), ("c.md", &big)]);
        let report = store.search("the");
        assert!(
            report.len() <= APPROX_CHAR_LIMIT + 100,
            "report too long: {}",
            report.len()
        );
    }

    #[test]
    fn test_search_truncation_marker() {
        // 单文件摘录就超过预算时，应截断并打上标记
        let long_line = "tcp ".repeat(500);
        let big: String = (0..10)
            .map(|_| long_line.clone())
            .collect::<Vec<_>>()
            .join("\n");
        let (_d, store) = store_with(&[("huge.md", &big)]);
        let report = store.search("tcp");
        assert!(report.contains("[...truncated...]"));
        assert!(report.len() <= APPROX_CHAR_LIMIT + 100);
    }

    #[test]
    fn test_list_files_sorted_with_counts() {
        let (_d, store) = store_with(&[("b.md", "one\ntwo\nthree"), ("a.md", "solo")]);
        let files = store.list_files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "a.md");
        assert_eq!(files[0].1, 1);
        assert_eq!(files[1].0, "b.md");
        assert_eq!(files[1].1, 3);
        assert!(files[1].2.ends_with("KB"));
    }

    #[test]
    fn test_add_note_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        store.add_note("TCP uses a three-way handshake", None).unwrap();
        let content = store.file_content("general_notes.md");
        assert!(content.contains("TCP uses a three-way handshake"));
        // 笔记前一行是 "## YYYY-MM-DD HH:MM" 时间戳头
        let note_line = content
            .lines()
            .position(|l| l.contains("three-way handshake"))
            .unwrap();
        let header = content.lines().nth(note_line - 1).unwrap();
        assert!(header.starts_with("## 20"));
    }

    #[test]
    fn test_add_note_appends_not_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        store.add_note("first", Some("study.md")).unwrap();
        store.add_note("second", Some("study.md")).unwrap();
        let content = store.file_content("study.md");
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }

    #[test]
    fn test_add_note_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        let path = store.add_note("sneaky", Some("../outside.md")).unwrap();
        // 落回默认笔记文件，不逃出知识目录
        assert_eq!(path.file_name().unwrap(), "general_notes.md");
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn test_stats_counts_all_files() {
        let (_d, store) = store_with(&[("a.md", "one\ntwo"), ("b.md", "three")]);
        let stats = store.stats();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_lines, 3);
        assert!(stats.total_size_label.ends_with("KB"));
    }

    #[test]
    fn test_file_content_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        assert!(store.file_content("nope.md").starts_with("File not found"));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let s = "héllo wörld";
        let t = truncate_to_char_boundary(s, 2);
        assert!(t.len() <= 2);
        assert!(s.starts_with(t));
    }
}
