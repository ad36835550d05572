//! 端到端学习流程测试
//!
//! 串起知识库检索 → 会话上下文 → 模型调用 → 落盘持久化，
//! 全程使用临时目录与 Mock 模型，不触网。

use swot::knowledge::KnowledgeStore;
use swot::llm::mock::MockLlmClient;
use swot::llm::LlmClient;
use swot::session::{Session, Speaker};

const PROMPT: &str = "You are a study tutor.";

fn seed_knowledge(dir: &std::path::Path) {
    std::fs::write(
        dir.join("networking.md"),
        "# Networking\n\nTCP is a connection-based protocol.\nIt guarantees ordered delivery.\nUDP is connectionless.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("rust.md"),
        "# Rust\n\nOwnership moves values.\nBorrowing takes references.\n",
    )
    .unwrap();
}

#[tokio::test]
async fn test_load_then_chat_reaches_model_with_knowledge() {
    let root = tempfile::tempdir().unwrap();
    let knowledge_dir = root.path().join("knowledge");
    std::fs::create_dir_all(&knowledge_dir).unwrap();
    seed_knowledge(&knowledge_dir);

    let store = KnowledgeStore::new(&knowledge_dir);
    let mut session = Session::new(root.path().join("memory"), PROMPT, "George", "Digger");
    let llm = MockLlmClient::new("TCP keeps your packets in order.");

    // load tcp
    let report = store.search("tcp");
    assert!(report.contains("[SOURCE: networking.md]"));
    assert!(report.contains("TCP is a connection-based protocol."));
    session.add_knowledge(&report, "tcp");

    // 一轮对话
    session.add_turn(Speaker::User, "explain tcp");
    let context = session.build_context();
    let reply = llm.complete(&context).await.unwrap();
    session.add_turn(Speaker::Assistant, &reply);

    // 模型确实拿到了系统提示、知识摘录与用户消息
    let prompts = llm.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with(PROMPT));
    assert!(prompts[0].contains("=== KNOWLEDGE ON 'tcp' ==="));
    assert!(prompts[0].contains("George: explain tcp"));

    // 落盘文件反映完整会话
    let on_disk = std::fs::read_to_string(session.filepath()).unwrap();
    assert!(on_disk.contains("## === KNOWLEDGE CONTEXT ==="));
    assert!(on_disk.contains("George: explain tcp"));
    assert!(on_disk.contains("Digger: TCP keeps your packets in order."));
}

#[tokio::test]
async fn test_remember_then_search_finds_new_note() {
    let root = tempfile::tempdir().unwrap();
    let store = KnowledgeStore::new(root.path().join("knowledge"));

    store
        .add_note("Mnemonic: TCP = Transmission Control Protocol", Some("networking.md"))
        .unwrap();

    let report = store.search("mnemonic");
    assert!(report.contains("[SOURCE: networking.md]"));
    assert!(report.contains("Transmission Control Protocol"));

    let files = store.list_files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, "networking.md");
}

#[tokio::test]
async fn test_clear_drops_knowledge_from_later_prompts() {
    let root = tempfile::tempdir().unwrap();
    let knowledge_dir = root.path().join("knowledge");
    std::fs::create_dir_all(&knowledge_dir).unwrap();
    seed_knowledge(&knowledge_dir);

    let store = KnowledgeStore::new(&knowledge_dir);
    let mut session = Session::new(root.path().join("memory"), PROMPT, "George", "Digger");
    let llm = MockLlmClient::new("ok");

    session.add_knowledge(&store.search("ownership"), "ownership");
    session.add_turn(Speaker::User, "first");
    let _ = llm.complete(&session.build_context()).await;

    session.clear();
    session.add_turn(Speaker::User, "second");
    let _ = llm.complete(&session.build_context()).await;

    let prompts = llm.prompts.lock().unwrap();
    assert!(prompts[0].contains("KNOWLEDGE ON 'ownership'"));
    assert!(!prompts[1].contains("KNOWLEDGE ON"));
    assert!(prompts[1].contains("George: second"));
}
