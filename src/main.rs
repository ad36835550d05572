//! Swot - 语音学习助教
//!
//! 入口：初始化日志、解析命令行参数、加载配置并运行交互循环。

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swot::config::{self, AppConfig};
use swot::llm::ollama::OllamaClient;
use swot::repl::Repl;

/// 命令行参数（手动解析，就这几个开关不值得上解析库）
#[derive(Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    model: Option<String>,
    knowledge_dir: Option<PathBuf>,
    memory_dir: Option<PathBuf>,
    no_voice: bool,
    list_models: bool,
    help: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Try 'swot --help'.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let mut cfg = match config::load_config(args.config_path.clone()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Could not load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    apply_overrides(&mut cfg, &args);
    config::validate(&mut cfg);

    let llm = OllamaClient::new(
        &cfg.llm.base_url,
        &cfg.llm.model,
        cfg.llm.request_timeout_secs,
    );

    if args.list_models {
        return match llm.list_models().await {
            Ok(models) => {
                println!("Installed Ollama models:");
                for name in models {
                    println!("  {}", name);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    if !llm.check_model().await {
        tracing::warn!(
            "Model '{}' not found on Ollama (is it pulled and is Ollama running?)",
            cfg.llm.model
        );
    }

    let mut repl = Repl::new(cfg, Box::new(llm));
    if let Err(e) = repl.run().await {
        eprintln!("Fatal: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-h" | "--help" => args.help = true,
            "-l" | "--list" => args.list_models = true,
            "--no-voice" => args.no_voice = true,
            "-m" | "--model" => {
                args.model = Some(expect_value(&arg, argv.next())?);
            }
            "-c" | "--config" => {
                args.config_path = Some(PathBuf::from(expect_value(&arg, argv.next())?));
            }
            "--knowledge-dir" => {
                args.knowledge_dir = Some(PathBuf::from(expect_value(&arg, argv.next())?));
            }
            "--memory-dir" => {
                args.memory_dir = Some(PathBuf::from(expect_value(&arg, argv.next())?));
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(args)
}

fn expect_value(flag: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("{} requires a value", flag))
}

/// CLI 参数是最高优先级，直接改写已加载的配置
fn apply_overrides(cfg: &mut AppConfig, args: &CliArgs) {
    if let Some(ref model) = args.model {
        cfg.llm.model = model.clone();
    }
    if let Some(ref dir) = args.knowledge_dir {
        cfg.app.knowledge_dir = dir.clone();
    }
    if let Some(ref dir) = args.memory_dir {
        cfg.app.memory_dir = dir.clone();
    }
    if args.no_voice {
        cfg.voice.enabled = false;
    }
}

fn print_usage() {
    println!(
        "swot - voice-enabled study assistant

USAGE:
  swot [OPTIONS]

OPTIONS:
  -m, --model <NAME>       Ollama model to use (default: mistral)
  -c, --config <FILE>      Extra config file (overrides defaults)
      --knowledge-dir <D>  Knowledge base directory
      --memory-dir <D>     Session memory directory
      --no-voice           Disable speech output
  -l, --list               List installed Ollama models and exit
  -h, --help               Show this message

Config file search order: ~/.config/swot/config.toml, ~/.swot/config.toml,
./swot.toml. Environment: SWOT__* (nested keys via __), plus
ELEVENLABS_API_KEY and OLLAMA_MODEL."
    );
}
