//! 念稿前的文本过滤
//!
//! 模型回复里常混着代码块与 Markdown 标记，直接送 TTS 会念出一堆符号。
//! 这里去掉围栏/行内代码、加粗斜体标记，丢弃看起来像源代码的行，
//! 压缩连续空行，留下适合朗读的纯文本。

use std::sync::OnceLock;

use regex::Regex;

static FENCED_CODE_RE: OnceLock<Regex> = OnceLock::new();
static INLINE_CODE_RE: OnceLock<Regex> = OnceLock::new();
static BOLD_STAR_RE: OnceLock<Regex> = OnceLock::new();
static ITALIC_STAR_RE: OnceLock<Regex> = OnceLock::new();
static BOLD_UNDER_RE: OnceLock<Regex> = OnceLock::new();
static ITALIC_UNDER_RE: OnceLock<Regex> = OnceLock::new();
static CODE_KEYWORD_RE: OnceLock<Regex> = OnceLock::new();
static BRACKET_ASSIGN_RE: OnceLock<Regex> = OnceLock::new();
static BLANK_RUN_RE: OnceLock<Regex> = OnceLock::new();

/// 过滤出适合朗读的文本；可能返回空串（此时上层不该调 TTS）
pub fn filter_for_speech(text: &str) -> String {
    let fenced = FENCED_CODE_RE.get_or_init(|| Regex::new(r"```[\s\S]*?```").unwrap());
    let inline = INLINE_CODE_RE.get_or_init(|| Regex::new(r"`[^`]*`").unwrap());
    let bold_star = BOLD_STAR_RE.get_or_init(|| Regex::new(r"\*\*([^*]*)\*\*").unwrap());
    let italic_star = ITALIC_STAR_RE.get_or_init(|| Regex::new(r"\*([^*]*)\*").unwrap());
    let bold_under = BOLD_UNDER_RE.get_or_init(|| Regex::new(r"__([^_]*)__").unwrap());
    let italic_under = ITALIC_UNDER_RE.get_or_init(|| Regex::new(r"_([^_]*)_").unwrap());

    let text = fenced.replace_all(text, "");
    let text = inline.replace_all(&text, "");
    let text = bold_star.replace_all(&text, "$1");
    let text = italic_star.replace_all(&text, "$1");
    let text = bold_under.replace_all(&text, "$1");
    let text = italic_under.replace_all(&text, "$1");

    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !looks_like_code(line))
        .collect();
    let text = kept.join("\n");

    // 连续 3+ 个空行压成 2 个
    let blank_run = BLANK_RUN_RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap());
    blank_run.replace_all(&text, "\n\n").trim().to_string()
}

/// 判断一行是否像源代码（关键字开头、括号加赋值、非 Markdown 标题的注释行）
fn looks_like_code(line: &str) -> bool {
    let keyword = CODE_KEYWORD_RE.get_or_init(|| {
        Regex::new(
            r"^\s*(fn |let |use |impl |pub |struct |enum |match |if |for |while |return |def |class |import |from |print\()",
        )
        .unwrap()
    });
    if keyword.is_match(line) {
        return true;
    }

    let bracket_assign = BRACKET_ASSIGN_RE.get_or_init(|| Regex::new(r"[{};\[\]]=").unwrap());
    if bracket_assign.is_match(line) {
        return true;
    }

    // '#' 开头且不是 "# " 的 Markdown 标题，当作代码注释丢掉
    let trimmed = line.trim();
    if trimmed.starts_with('#') && !trimmed.starts_with("# ") {
        return true;
    }

    false
}

/// 去掉全部非 ASCII 字符（422 重试时用）
pub fn ascii_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_fenced_code() {
        let text = "Before.\n```rust\nfn main() {}\n```\nAfter.";
        let out = filter_for_speech(text);
        assert!(out.contains("Before."));
        assert!(out.contains("After."));
        assert!(!out.contains("main"));
        assert!(!out.contains("```"));
    }

    #[test]
    fn test_strips_inline_code() {
        let out = filter_for_speech("Use `tokio::spawn` for that.");
        assert!(!out.contains("tokio::spawn"));
        assert!(out.contains("Use"));
    }

    #[test]
    fn test_unwraps_emphasis() {
        let out = filter_for_speech("This is **really** _quite_ *simple* and __clear__.");
        assert_eq!(out, "This is really quite simple and clear.");
    }

    #[test]
    fn test_drops_code_like_lines() {
        let text = "Explanation first.\nlet x = 5;\nreturn x\nprint(x)\nAnd a closing thought.";
        let out = filter_for_speech(text);
        assert!(out.contains("Explanation first."));
        assert!(out.contains("closing thought"));
        assert!(!out.contains("let x"));
        assert!(!out.contains("print"));
    }

    #[test]
    fn test_drops_bracket_assignment_lines() {
        let out = filter_for_speech("prose line\narr[0]= 1\nmore prose");
        assert!(!out.contains("arr"));
        assert!(out.contains("prose line"));
        assert!(out.contains("more prose"));
    }

    #[test]
    fn test_keeps_markdown_headers_drops_comments() {
        let out = filter_for_speech("# Heading stays\n#comment goes\n## also goes");
        assert!(out.contains("# Heading stays"));
        assert!(!out.contains("#comment"));
        assert!(!out.contains("## also"));
    }

    #[test]
    fn test_collapses_blank_runs() {
        let out = filter_for_speech("one\n\n\n\n\ntwo");
        assert_eq!(out, "one\n\ntwo");
    }

    #[test]
    fn test_pure_code_becomes_empty() {
        let out = filter_for_speech("```\nlet a = 1;\n```");
        assert!(out.is_empty());
    }

    #[test]
    fn test_ascii_only() {
        assert_eq!(ascii_only("G'day — mate ✨"), "G'day  mate ");
        assert_eq!(ascii_only("plain"), "plain");
    }
}
