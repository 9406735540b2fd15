use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("invalid log level: {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.pad(name)
    }
}

/// 元数据值
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Null,
    /// 任意 JSON 数据（如可序列化的结构体）
    Json(Value),
}

impl MetadataValue {
    /// 从任意可序列化的值创建，序列化失败时退化为 Null
    pub fn from_struct<T: Serialize>(value: T) -> Self {
        serde_json::to_value(value)
            .map(MetadataValue::Json)
            .unwrap_or(MetadataValue::Null)
    }
}

impl Serialize for MetadataValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MetadataValue::String(s) => serializer.serialize_str(s),
            MetadataValue::I64(n) => serializer.serialize_i64(*n),
            MetadataValue::U64(n) => serializer.serialize_u64(*n),
            MetadataValue::F64(n) => serializer.serialize_f64(*n),
            MetadataValue::Bool(b) => serializer.serialize_bool(*b),
            MetadataValue::Null => serializer.serialize_none(),
            MetadataValue::Json(v) => v.serialize(serializer),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{}", s),
            MetadataValue::I64(n) => write!(f, "{}", n),
            MetadataValue::U64(n) => write!(f, "{}", n),
            MetadataValue::F64(n) => write!(f, "{}", n),
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Null => write!(f, "null"),
            MetadataValue::Json(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<&String> for MetadataValue {
    fn from(s: &String) -> Self {
        MetadataValue::String(s.clone())
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::I64(n)
    }
}

impl From<i32> for MetadataValue {
    fn from(n: i32) -> Self {
        MetadataValue::I64(n as i64)
    }
}

impl From<u64> for MetadataValue {
    fn from(n: u64) -> Self {
        MetadataValue::U64(n)
    }
}

impl From<u32> for MetadataValue {
    fn from(n: u32) -> Self {
        MetadataValue::U64(n as u64)
    }
}

impl From<usize> for MetadataValue {
    fn from(n: usize) -> Self {
        MetadataValue::U64(n as u64)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::F64(n)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<Value> for MetadataValue {
    fn from(v: Value) -> Self {
        MetadataValue::Json(v)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetadataValue::Null)
    }
}

/// 日志记录
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    /// 模块路径
    pub module: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// 自定义元数据，保持插入顺序
    pub metadata: Vec<(String, MetadataValue)>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            module: None,
            timestamp: Utc::now(),
            metadata: Vec::new(),
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// 按 key 查找元数据
    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl Serialize for LogRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?;
        map.serialize_entry("level", &self.level.to_string())?;
        map.serialize_entry("message", &self.message)?;
        if let Some(module) = &self.module {
            map.serialize_entry("module", module)?;
        }
        // 元数据平铺到顶层，便于日志系统检索
        for (key, value) in &self.metadata {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse_and_order() {
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("loud").is_err());
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Debug > LogLevel::Trace);
        assert_eq!(format!("{:<5}|", LogLevel::Info), "INFO |");
    }

    #[test]
    fn test_record_metadata() {
        let record = LogRecord::new(LogLevel::Warn, "retrying")
            .with_metadata("attempt", 2u32)
            .with_metadata("resource_uri", "mem://src/a.txt")
            .with_metadata("etag", None::<String>);

        assert_eq!(record.metadata_value("attempt"), Some(&MetadataValue::U64(2)));
        assert_eq!(record.metadata_value("etag"), Some(&MetadataValue::Null));
        assert!(record.metadata_value("missing").is_none());
    }

    #[test]
    fn test_record_serialize_flattens_metadata() {
        let record = LogRecord::new(LogLevel::Info, "copied")
            .with_module("blobsync::replication")
            .with_metadata("bytes", 42u64);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "copied");
        assert_eq!(value["module"], "blobsync::replication");
        assert_eq!(value["bytes"], 42);
    }
}
