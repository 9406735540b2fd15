use crate::cfg::{create_trait_from_type_options, TypeOptions};
use crate::log::{
    appender::LogAppender,
    formatter::LogFormatter,
    log_record::{LogLevel, LogRecord},
};
use anyhow::Result;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::sync::Arc;

/// Logger 配置
#[derive(Debug, Clone, Deserialize, SmartDefault, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    /// 日志级别
    #[default = "info"]
    pub level: String,

    /// Formatter 配置
    #[default(TypeOptions::new("TextFormatter", serde_json::json!({})))]
    pub formatter: TypeOptions,

    /// Appender 配置
    #[default(TypeOptions::new("ConsoleAppender", serde_json::json!({})))]
    pub appender: TypeOptions,
}

/// 核心日志器
///
/// 负责日志的级别控制、格式化和输出。克隆开销很小，内部组件通过 Arc 共享。
#[derive(Clone)]
pub struct Logger {
    level: LogLevel,
    formatter: Arc<dyn LogFormatter>,
    appender: Arc<dyn LogAppender>,
}

impl Logger {
    /// 从配置创建 Logger
    pub fn new(config: LoggerConfig) -> Result<Self> {
        crate::log::register_log_components()?;

        let level = config
            .level
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!(e))?;

        let formatter: Box<dyn LogFormatter> = create_trait_from_type_options(&config.formatter)?;
        let appender: Box<dyn LogAppender> = create_trait_from_type_options(&config.appender)?;

        Ok(Self::from_parts(level, Arc::from(formatter), Arc::from(appender)))
    }

    /// 直接用组件创建 Logger，便于测试中注入 MemoryAppender
    pub fn from_parts(
        level: LogLevel,
        formatter: Arc<dyn LogFormatter>,
        appender: Arc<dyn LogAppender>,
    ) -> Self {
        Self {
            level,
            formatter,
            appender,
        }
    }

    /// 记录日志，低于配置级别的记录直接丢弃
    pub async fn log(&self, record: LogRecord) -> Result<()> {
        if record.level < self.level {
            return Ok(());
        }

        let formatted = self.formatter.format(&record)?;
        self.appender.append(&formatted).await
    }

    /// 不经过格式化和级别过滤，直接输出一行（如作业结束时的汇总行）
    pub async fn write_line(&self, line: &str) -> Result<()> {
        self.appender.append(line).await?;
        self.appender.flush().await
    }

    pub async fn flush(&self) -> Result<()> {
        self.appender.flush().await
    }
}
