//! 日志模块
//!
//! 日志由三部分组成：
//!
//! - `LogRecord`：级别、消息和有序的 metadata
//! - `LogFormatter`：`TextFormatter`、`JsonFormatter`
//! - `LogAppender`：`ConsoleAppender`、`FileAppender`、`MemoryAppender`
//!
//! formatter 和 appender 都通过 `TypeOptions` 按名称创建：
//!
//! ```rust,no_run
//! use blobsync::log::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config: LoggerConfig = json5::from_str(r#"
//!     {
//!         level: "info",
//!         formatter: { type: "TextFormatter", options: { colored: true } },
//!         appender: { type: "FileAppender", options: { file_path: "~/.blobsync/job.log" } }
//!     }
//! "#)?;
//!
//! let logger = Logger::new(config)?;
//! logger.log(LogRecord::new(LogLevel::Info, "replication started")).await?;
//! # Ok(())
//! # }
//! ```

pub mod appender;
pub mod formatter;
pub mod log_record;
pub mod logger;

pub use appender::{
    ConsoleAppender, ConsoleAppenderConfig, FileAppender, FileAppenderConfig, LogAppender,
    MemoryAppender, MemoryAppenderConfig, Target,
};
pub use formatter::{
    JsonFormatter, JsonFormatterConfig, LogFormatter, TextFormatter, TextFormatterConfig,
};
pub use log_record::{LogLevel, LogRecord, MetadataValue};
pub use logger::{Logger, LoggerConfig};

use crate::cfg::{register_trait, register_trait_fallible};
use anyhow::Result;
use std::sync::Once;

static REGISTER_ONCE: Once = Once::new();

/// 注册内置的 formatter 和 appender（只执行一次）
pub fn register_log_components() -> Result<()> {
    let mut result = Ok(());
    REGISTER_ONCE.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> Result<()> {
    register_trait::<TextFormatter, dyn LogFormatter, TextFormatterConfig>("TextFormatter")?;
    register_trait::<JsonFormatter, dyn LogFormatter, JsonFormatterConfig>("JsonFormatter")?;

    register_trait::<ConsoleAppender, dyn LogAppender, ConsoleAppenderConfig>("ConsoleAppender")?;
    register_trait_fallible::<FileAppender, dyn LogAppender, FileAppenderConfig, _>(
        "FileAppender",
        FileAppender::open,
    )?;
    register_trait::<MemoryAppender, dyn LogAppender, MemoryAppenderConfig>("MemoryAppender")?;

    Ok(())
}
