//! 交互主循环
//!
//! 读一行、认命令、走模型、播语音。Ctrl+C 永远只是"跳过当前语音/
//! 打断本次生成"，不结束进程；退出只有 exit 命令或 EOF 两条路。
//! 语音引擎是构造时注入的状态，不是全局变量。

use std::io::Write as _;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::config::AppConfig;
use crate::knowledge::KnowledgeStore;
use crate::llm::LlmClient;
use crate::session::{Session, Speaker};
use crate::voice::VoiceEngine;

/// load 命令回显的摘录预览上限（完整内容已进会话上下文）
const PREVIEW_CHARS: usize = 2000;

enum Flow {
    Continue,
    Exit,
}

/// 交互循环的全部状态
pub struct Repl {
    config: AppConfig,
    session: Session,
    store: KnowledgeStore,
    llm: Box<dyn LlmClient>,
    voice: Option<VoiceEngine>,
}

impl Repl {
    pub fn new(config: AppConfig, llm: Box<dyn LlmClient>) -> Self {
        let session = Session::new(
            &config.app.memory_dir,
            &config.app.system_prompt,
            &config.app.user_name,
            &config.app.assistant_name,
        );
        let store = KnowledgeStore::new(&config.app.knowledge_dir);
        let voice = if config.voice.enabled {
            Some(VoiceEngine::new(
                &config.voice.api_key,
                &config.voice.voice_id,
                config.voice.stability,
                config.voice.similarity,
                &config.voice.player,
            ))
        } else {
            None
        };
        Self {
            config,
            session,
            store,
            llm,
            voice,
        }
    }

    /// 运行主循环直到 exit 或 EOF
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        if let Some(voice) = &self.voice {
            voice.speak("G'day. Ready when you are.").await;
        }

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            print!("\n{}> ", self.config.app.user_name);
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(l)) => l,
                    Ok(None) => {
                        println!("\n[EOF - exiting]");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Stdin read failed: {}", e);
                        break;
                    }
                },
                // 等输入时按 Ctrl+C：跳过语音，回到提示符
                _ = tokio::signal::ctrl_c() => {
                    if let Some(voice) = &self.voice {
                        voice.skip().await;
                    }
                    println!();
                    continue;
                }
            };

            let input = line.trim().to_string();
            if input.is_empty() {
                continue;
            }

            match self.handle(&input, &mut lines).await {
                Flow::Continue => {}
                Flow::Exit => break,
            }
        }

        if let Some(voice) = &self.voice {
            voice.skip().await;
        }
        Ok(())
    }

    /// 命令分发；认不出的输入都当作发给模型的话
    async fn handle<R: AsyncBufRead + Unpin>(
        &mut self,
        input: &str,
        lines: &mut Lines<R>,
    ) -> Flow {
        let lower = input.to_lowercase();

        match lower.as_str() {
            "exit" | "quit" | "bye" => {
                let summary = self.session.summary();
                println!("\nSESSION SUMMARY");
                println!("Session file: {}", summary.filepath.display());
                println!("Messages: {}", summary.turn_count);
                if let Some(voice) = &self.voice {
                    voice.speak("Session complete.").await;
                    voice.wait().await;
                }
                println!("Session ended. Memory preserved.");
                return Flow::Exit;
            }
            "help" => {
                self.print_help();
                return Flow::Continue;
            }
            "clear" => {
                self.session.clear();
                println!("Session cleared. Knowledge and history reset.");
                return Flow::Continue;
            }
            "paste" => {
                let pasted = multiline_input(lines).await;
                if pasted.is_empty() {
                    println!("(empty - cancelled)");
                    return Flow::Continue;
                }
                self.chat(&pasted).await;
                return Flow::Continue;
            }
            "show files" => {
                println!("\nKNOWLEDGE BASE FILES:");
                let files = self.store.list_files();
                if files.is_empty() {
                    println!("  (no files yet - use 'remember' to create)");
                }
                for (name, line_count, size) in files {
                    println!("  {} ({} lines, {})", name, line_count, size);
                }
                return Flow::Continue;
            }
            "show knowledge" => {
                let stats = self.store.stats();
                println!("\nKNOWLEDGE BASE STATS:");
                println!("  files: {}", stats.file_count);
                println!("  lines: {}", stats.total_lines);
                println!("  size: {}", stats.total_size_label);
                println!("  dir: {}", stats.dir.display());
                return Flow::Continue;
            }
            _ => {}
        }

        if lower.starts_with("show ") {
            let name = input[5..].trim();
            if !name.is_empty() {
                println!("\n{}", self.store.file_content(name));
            }
            return Flow::Continue;
        }

        if lower.starts_with("load ") {
            let topic = input[5..].trim().to_string();
            if topic.is_empty() {
                println!("Usage: load <topic>");
                return Flow::Continue;
            }
            self.load_topic(&topic).await;
            return Flow::Continue;
        }

        if lower.starts_with("remember ") {
            let note = input[9..].trim();
            if note.is_empty() {
                println!("Usage: remember <note>");
                println!("   or: remember <file>: <note>");
                return Flow::Continue;
            }
            let (filename, text) = split_note_target(note);
            match self.store.add_note(&text, Some(&filename)) {
                Ok(path) => {
                    println!("Added to: {}", path.file_name().unwrap_or_default().to_string_lossy());
                    if let Some(voice) = &self.voice {
                        voice.speak("Note added.").await;
                    }
                }
                Err(e) => println!("Could not save note: {}", e),
            }
            return Flow::Continue;
        }

        self.chat(input).await;
        Flow::Continue
    }

    /// load <topic>：检索知识库并把摘录灌进会话上下文
    async fn load_topic(&mut self, topic: &str) {
        println!("\nSearching knowledge base for: {}", topic);
        let report = self.store.search(topic);

        if report.is_empty() {
            println!("No knowledge found on '{}'.", topic);
            println!("\nAvailable files:");
            for (name, line_count, _) in self.store.list_files() {
                println!("  {} ({} lines)", name, line_count);
            }
            return;
        }

        println!("{}", preview(&report, PREVIEW_CHARS));
        if report.len() > PREVIEW_CHARS {
            println!("\n[...{} more chars...]", report.len() - PREVIEW_CHARS);
        }

        self.session.add_knowledge(&report, topic);
        println!("\nKnowledge loaded into session context.");
        if let Some(voice) = &self.voice {
            voice.speak(&format!("Knowledge loaded on {}.", topic)).await;
        }
    }

    /// 普通一轮对话：先拿全模型回复，落库之后才开口播报
    async fn chat(&mut self, input: &str) {
        self.session.add_turn(Speaker::User, input);
        let context = self.session.build_context();

        println!("\n{}:", self.config.app.assistant_name);
        let reply = tokio::select! {
            result = self.llm.complete(&context) => match result {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Model call failed: {}", e);
                    println!("[Model error: {}]", e);
                    String::new()
                }
            },
            // 生成途中 Ctrl+C：丢弃本轮回复
            _ = tokio::signal::ctrl_c() => {
                println!("[Interrupted]");
                String::new()
            }
        };

        if reply.trim().is_empty() {
            return;
        }
        println!("{}", reply.trim());

        self.session.add_turn(Speaker::Assistant, &reply);
        if let Some(voice) = &self.voice {
            // 播放进程起了就返回，不等播完
            voice.speak(&reply).await;
        }
    }

    fn print_banner(&self) {
        println!("============================================================");
        println!("SWOT - Voice-enabled study assistant");
        println!(
            "Session: {} | Model: {}",
            self.session.id(),
            self.config.llm.model
        );
        println!("Knowledge: {}", self.config.app.knowledge_dir.display());
        println!();
        println!("Commands: exit | clear | load <topic> | paste | help");
        println!("Ctrl+C = skip voice | Type 'exit' to quit");
        println!("============================================================");
    }

    fn print_help(&self) {
        println!(
            "
SWOT COMMANDS
------------------------------------------------------------
  exit                    - End session (saves memory)
  clear                   - Reset session (clears history + knowledge)
  paste                   - Multiline input (blank line to send)
  load <topic>            - Search the knowledge base for a topic
  remember <note>         - Add to general_notes.md
  remember <file>: <note> - Add to a specific file
  show files              - List all knowledge files
  show knowledge          - Display knowledge base stats
  show <file>             - Print a knowledge file in full
  help                    - Show this message
------------------------------------------------------------
Ctrl+C skips voice playback. Type 'exit' to quit."
        );
    }
}

/// 多行输入：连续读到空行为止
async fn multiline_input<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> String {
    println!("\nMULTILINE INPUT MODE");
    println!("Type your message (blank line to send):");

    let mut collected: Vec<String> = Vec::new();
    loop {
        print!("| ");
        let _ = std::io::stdout().flush();
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => collected.push(line),
            _ => break,
        }
    }
    collected.join("\n")
}

/// remember 的目标解析："file: note" 写到 file.md，否则进默认笔记文件
fn split_note_target(note: &str) -> (String, String) {
    if let Some((file, text)) = note.split_once(": ") {
        let file = file.trim();
        if !file.is_empty() {
            return (format!("{}.md", file), text.trim().to_string());
        }
    }
    ("general_notes.md".to_string(), note.trim().to_string())
}

/// 在字符边界上截取前 max 字节
fn preview(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
