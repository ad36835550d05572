//! 语音引擎：合成 + 外部进程播放
//!
//! 播放交给独立的播放器进程（默认 mpg123），主循环不被占住，
//! 随时可以杀掉进程实现"跳过"。引擎同一时刻最多持有一个播放句柄；
//! 句柄在 skip、wait 或进程退出清理时释放。
//!
//! 叫停顺序：先 SIGTERM 请求退出，宽限 1 秒不退再强杀，临时音频文件
//! 无论如何都会删掉。

use std::process::Stdio;
use std::time::Duration;

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::voice::filter::filter_for_speech;
use crate::voice::tts::TtsClient;

/// 请求退出后的宽限期，超过则强杀
const KILL_GRACE: Duration = Duration::from_secs(1);
/// 默认播放命令
const DEFAULT_PLAYER: &str = "mpg123 -q";

/// 一次在播的话：播放进程 + 它的临时音频文件
///
/// TempPath 丢弃时自动删除文件。
struct Playback {
    child: Child,
    audio: TempPath,
}

/// 语音引擎
///
/// playback 槽位用互斥锁保护：skip 可能来自 Ctrl+C 监听任务，
/// 与主循环里的 speak 不在同一个调用方。
pub struct VoiceEngine {
    /// None 表示未配置 API Key，speak 一律返回 false
    tts: Option<TtsClient>,
    /// 播放器命令（程序名 + 固定参数，音频路径追加在最后）
    player: Vec<String>,
    playback: Mutex<Option<Playback>>,
}

impl VoiceEngine {
    pub fn new(api_key: &str, voice_id: &str, stability: f32, similarity: f32, player: &str) -> Self {
        let tts = if api_key.is_empty() {
            None
        } else {
            Some(TtsClient::new(api_key, voice_id, stability, similarity))
        };
        let mut player: Vec<String> = player.split_whitespace().map(str::to_string).collect();
        if player.is_empty() {
            player = DEFAULT_PLAYER.split_whitespace().map(str::to_string).collect();
        }
        Self {
            tts,
            player,
            playback: Mutex::new(None),
        }
    }

    /// 合成并开始播放；返回 true 表示播放进程已启动（不等播完）
    ///
    /// 空文本、无 API Key、过滤后没剩下可念的内容，都直接返回 false，
    /// 不会碰远端服务。合成失败降级为"本句无语音"，绝不让会话中断。
    pub async fn speak(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(tts) = &self.tts else {
            tracing::debug!("Voice disabled: no API key");
            return false;
        };

        let clean = filter_for_speech(text);
        if clean.is_empty() {
            return false;
        }

        let audio = match tts.synthesize(&clean).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!("Voice unavailable: {}", e);
                return false;
            }
        };

        self.play(&audio).await
    }

    /// 把音频写进新的临时文件并启动播放进程
    ///
    /// stdin 绑到 null 设备：播放器绝不能抢走前台键盘输入。
    async fn play(&self, audio: &[u8]) -> bool {
        let temp = match tempfile::Builder::new()
            .prefix("swot-voice-")
            .suffix(".mp3")
            .tempfile()
        {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Could not create temp audio file: {}", e);
                return false;
            }
        };
        let path = temp.into_temp_path();
        let mut file = match tokio::fs::File::create(&path).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Could not open temp audio file: {}", e);
                return false;
            }
        };
        if let Err(e) = file.write_all(audio).await {
            tracing::warn!("Could not write audio data: {}", e);
            return false;
        }
        drop(file);

        let mut command = Command::new(&self.player[0]);
        command
            .args(&self.player[1..])
            .arg(&*path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match command.spawn() {
            Ok(child) => {
                // 新句柄顶掉旧句柄：旧临时文件随 TempPath 丢弃删除，
                // 旧进程不会被动杀——想打断必须先 skip
                let mut slot = self.playback.lock().await;
                *slot = Some(Playback { child, audio: path });
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Audio player '{}' not installed, voice output disabled for this reply",
                    self.player[0]
                );
                false
            }
            Err(e) => {
                tracing::warn!("Could not start audio player: {}", e);
                false
            }
        }
    }

    /// 立即叫停当前播放；没有在播时是安全的 no-op
    pub async fn skip(&self) {
        let mut slot = self.playback.lock().await;
        if let Some(mut playback) = slot.take() {
            stop_child(&mut playback.child).await;
            // playback.audio 随 drop 删除临时文件
        }
    }

    /// 等当前播放自然结束并清理临时文件；只在收尾处调用，主循环不用
    pub async fn wait(&self) {
        let mut slot = self.playback.lock().await;
        if let Some(mut playback) = slot.take() {
            let _ = playback.child.wait().await;
        }
    }

    /// 是否有播放进程还没退出
    pub async fn is_playing(&self) -> bool {
        let mut slot = self.playback.lock().await;
        match slot.as_mut() {
            Some(playback) => matches!(playback.child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

/// 先请求退出，宽限期内不退则强杀
async fn stop_child(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
    }
}
