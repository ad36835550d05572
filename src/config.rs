//! 应用配置：TOML 文件 + 环境变量加载
//!
//! 优先级从低到高：内置默认值 < 配置文件 < 环境变量 < CLI 参数
//! （CLI 覆盖由 main 在拿到 AppConfig 后就地修改）。
//! 环境变量用 `SWOT__*` 前缀（双下划线表示嵌套，如 `SWOT__LLM__MODEL`）；
//! 另外认两个惯用名：`ELEVENLABS_API_KEY`、`OLLAMA_MODEL`。

use std::path::PathBuf;

use serde::Deserialize;

/// 内置的学习助教系统提示
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Swot, a blunt Australian study tutor. \
Keep answers sharp and throw in a bit of friendly ribbing.

RULES:
1. Answer the question correctly FIRST
2. Then the banter, kept short
3. NEVER prefix your response with \"Swot:\" or any name
4. NEVER generate fake dialogue or multiple turns
5. ONE short response only

If knowledge is provided above, use it.";

/// 应用配置根（对应 swot.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub voice: VoiceSection,
}

/// [app] 段：目录、人设提示、双方显示名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub knowledge_dir: PathBuf,
    pub memory_dir: PathBuf,
    pub system_prompt: String,
    pub user_name: String,
    pub assistant_name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            knowledge_dir: PathBuf::from("./knowledge"),
            memory_dir: PathBuf::from("./memory"),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_name: "You".to_string(),
            assistant_name: "Swot".to_string(),
        }
    }
}

/// [llm] 段：Ollama 模型与地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: String,
    /// 单次生成请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "mistral".to_string(),
            base_url: crate::llm::ollama::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// [voice] 段：TTS 凭据与播放器
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceSection {
    pub enabled: bool,
    pub api_key: String,
    pub voice_id: String,
    pub stability: f32,
    pub similarity: f32,
    /// 播放命令，音频文件路径会追加在末尾
    pub player: String,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(),
            stability: 0.4,
            similarity: 0.8,
            player: "mpg123 -q".to_string(),
        }
    }
}

/// 按优先级加载配置
///
/// 1. 依次找 ~/.config/swot/config.toml、~/.swot/config.toml、./swot.toml，
///    第一个存在的作为文件源
/// 2. 若显式传入 config_path 且存在，追加为更高优先级的文件源
/// 3. 叠加环境变量 SWOT__*（双下划线表示嵌套键）
/// 4. 最后认 ELEVENLABS_API_KEY / OLLAMA_MODEL 两个惯用变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for candidate in default_config_paths() {
        if candidate.exists() {
            builder = builder.add_source(config::File::from(candidate).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SWOT")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;

    if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
        if !key.is_empty() {
            cfg.voice.api_key = key;
        }
    }
    if let Ok(model) = std::env::var("OLLAMA_MODEL") {
        if !model.is_empty() {
            cfg.llm.model = model;
        }
    }

    Ok(cfg)
}

/// 配置文件候选路径，按查找顺序
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("swot").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".swot").join("config.toml"));
    }
    paths.push(PathBuf::from("./swot.toml"));
    paths
}

/// 启动期校验：无 API Key 时关掉语音，并确保两个工作目录存在
pub fn validate(cfg: &mut AppConfig) {
    if cfg.voice.enabled && cfg.voice.api_key.is_empty() {
        tracing::info!("No ELEVENLABS_API_KEY set, voice disabled");
        cfg.voice.enabled = false;
    }
    for dir in [&cfg.app.knowledge_dir, &cfg.app.memory_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("Could not create {}: {}", dir.display(), e);
        }
    }
}
