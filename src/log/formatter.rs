use crate::log::log_record::{LogLevel, LogRecord};
use anyhow::Result;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::fmt::Write;

/// 日志格式化器 trait
///
/// 负责将 LogRecord 格式化为一行字符串
pub trait LogFormatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> Result<String>;
}

/// TextFormatter 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct TextFormatterConfig {
    /// 是否启用颜色输出
    #[default = false]
    pub colored: bool,

    /// 时间戳格式（chrono strftime）
    #[default = "%Y-%m-%dT%H:%M:%S%.3fZ"]
    pub time_format: String,
}

/// 文本格式化器
///
/// 输出形如 `[2025-01-19T12:34:56.789Z] WARN  retrying copy | attempt=2 resource_uri=...`
pub struct TextFormatter {
    config: TextFormatterConfig,
}

impl TextFormatter {
    pub fn new(config: TextFormatterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, out: &mut String, code: &str, text: &str) {
        if self.config.colored {
            let _ = write!(out, "\x1b[{}m{}\x1b[0m", code, text);
        } else {
            out.push_str(text);
        }
    }
}

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "31",
        LogLevel::Warn => "33",
        LogLevel::Info => "32",
        LogLevel::Debug => "36",
        LogLevel::Trace => "37;2",
    }
}

impl LogFormatter for TextFormatter {
    fn format(&self, record: &LogRecord) -> Result<String> {
        let mut out = String::with_capacity(64 + record.message.len());

        out.push('[');
        let timestamp = record.timestamp.format(&self.config.time_format).to_string();
        self.paint(&mut out, "2", &timestamp);
        out.push_str("] ");

        let level = format!("{:<5}", record.level);
        self.paint(&mut out, level_color(record.level), &level);
        out.push(' ');

        if let Some(module) = &record.module {
            out.push('[');
            self.paint(&mut out, "2", module);
            out.push_str("] ");
        }

        out.push_str(&record.message);

        if !record.metadata.is_empty() {
            out.push_str(" |");
            for (key, value) in &record.metadata {
                out.push(' ');
                self.paint(&mut out, "36", key);
                let _ = write!(out, "={}", value);
            }
        }

        Ok(out)
    }
}

/// JsonFormatter 配置（保留扩展性）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct JsonFormatterConfig {}

/// JSON 格式化器，每条记录一行 JSON
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new(_: JsonFormatterConfig) -> Self {
        Self
    }
}

impl LogFormatter for JsonFormatter {
    fn format(&self, record: &LogRecord) -> Result<String> {
        Ok(serde_json::to_string(record)?)
    }
}

crate::impl_from!(TextFormatterConfig => TextFormatter);
crate::impl_box_from!(TextFormatter => dyn LogFormatter);
crate::impl_from!(JsonFormatterConfig => JsonFormatter);
crate::impl_box_from!(JsonFormatter => dyn LogFormatter);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> LogRecord {
        LogRecord::new(LogLevel::Warn, "retrying copy")
            .with_metadata("attempt", 2u32)
            .with_metadata("resource_uri", "mem://dst/x")
    }

    #[test]
    fn test_text_formatter_plain() {
        let formatter = TextFormatter::new(TextFormatterConfig::default());
        let line = formatter.format(&sample_record()).unwrap();

        assert!(line.starts_with('['));
        assert!(line.contains("] WARN  retrying copy"));
        assert!(line.ends_with("| attempt=2 resource_uri=mem://dst/x"));
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn test_text_formatter_colored() {
        let formatter = TextFormatter::new(TextFormatterConfig {
            colored: true,
            ..Default::default()
        });
        let line = formatter.format(&sample_record()).unwrap();
        assert!(line.contains("\x1b[33mWARN \x1b[0m"));
    }

    #[test]
    fn test_json_formatter() {
        let formatter = JsonFormatter::new(JsonFormatterConfig::default());
        let line = formatter.format(&sample_record()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["message"], "retrying copy");
        assert_eq!(value["attempt"], 2);
    }
}
