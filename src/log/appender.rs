use anyhow::Result;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 日志输出器 trait
///
/// 负责将格式化后的日志行输出到目标介质
#[async_trait::async_trait]
pub trait LogAppender: Send + Sync {
    async fn append(&self, line: &str) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// 终端输出目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, SmartDefault)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Stdout,
    Stderr,
}

/// ConsoleAppender 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ConsoleAppenderConfig {
    pub target: Target,
}

/// 终端输出器
pub struct ConsoleAppender {
    config: ConsoleAppenderConfig,
}

impl ConsoleAppender {
    pub fn new(config: ConsoleAppenderConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl LogAppender for ConsoleAppender {
    async fn append(&self, line: &str) -> Result<()> {
        match self.config.target {
            Target::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", line)?;
                out.flush()?;
            }
            Target::Stderr => {
                let mut out = std::io::stderr().lock();
                writeln!(out, "{}", line)?;
            }
        }
        Ok(())
    }
}

/// FileAppender 配置
#[derive(Debug, Clone, Deserialize)]
pub struct FileAppenderConfig {
    /// 日志文件路径，父目录不存在时自动创建
    pub file_path: String,
}

/// 文件输出器，以追加方式写入
pub struct FileAppender {
    file: tokio::sync::Mutex<tokio::fs::File>,
    path: PathBuf,
}

impl FileAppender {
    pub fn open(config: FileAppenderConfig) -> Result<Self> {
        let path = crate::cfg::expand_path(&config.file_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            file: tokio::sync::Mutex::new(tokio::fs::File::from_std(file)),
            path,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl LogAppender for FileAppender {
    async fn append(&self, line: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        self.file.lock().await.flush().await?;
        Ok(())
    }
}

/// MemoryAppender 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct MemoryAppenderConfig {
    /// 最多保留的行数，超出后丢弃最旧的行
    #[default = 10000]
    pub capacity: usize,
}

/// 内存输出器
///
/// 将日志行保存在内存中，多个句柄共享同一份内容（clone 后指向同一缓冲区）。
#[derive(Clone)]
pub struct MemoryAppender {
    lines: Arc<Mutex<Vec<String>>>,
    capacity: usize,
}

impl Default for MemoryAppender {
    fn default() -> Self {
        Self::new(MemoryAppenderConfig::default())
    }
}

impl MemoryAppender {
    pub fn new(config: MemoryAppenderConfig) -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            capacity: config.capacity.max(1),
        }
    }

    /// 当前保存的全部日志行
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

#[async_trait::async_trait]
impl LogAppender for MemoryAppender {
    async fn append(&self, line: &str) -> Result<()> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| anyhow::anyhow!("memory appender lock poisoned"))?;
        if lines.len() >= self.capacity {
            lines.remove(0);
        }
        lines.push(line.to_string());
        Ok(())
    }
}

crate::impl_from!(ConsoleAppenderConfig => ConsoleAppender);
crate::impl_box_from!(ConsoleAppender => dyn LogAppender);
crate::impl_box_from!(FileAppender => dyn LogAppender);
crate::impl_from!(MemoryAppenderConfig => MemoryAppender);
crate::impl_box_from!(MemoryAppender => dyn LogAppender);
