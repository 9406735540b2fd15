use thiserror::Error;

use crate::oss::{BlobKind, ObjectStoreError};

/// 复制作业级别的错误
///
/// 单个对象的可恢复失败不会以这个类型返回，而是记录在 `ProgressRecorder` 中。
#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("存储错误: {0}")]
    Storage(ObjectStoreError),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("未配置的账号: {0}")]
    UnknownAccount(String),

    #[error("对象类型不一致: {key} (源 {source_kind}, 目标 {destination_kind})")]
    KindMismatch {
        key: String,
        source_kind: BlobKind,
        destination_kind: BlobKind,
    },

    #[error("checkpoint 与当前作业不匹配: {0}")]
    CheckpointMismatch(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<ObjectStoreError> for ReplicationError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::UnknownAccount(account) => ReplicationError::UnknownAccount(account),
            other => ReplicationError::Storage(other),
        }
    }
}

impl From<garde::Report> for ReplicationError {
    fn from(report: garde::Report) -> Self {
        ReplicationError::Configuration(report.to_string())
    }
}
