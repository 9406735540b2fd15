//! blobsync - 对象存储容器复制
//!
//! 将一个账号下的容器以服务端复制的方式同步到另一个账号（或同一账号）的容器，
//! 支持增量模式、有界并发、重试、取消以及基于 checkpoint 的断点续传。
//!
//! ## 模块
//!
//! - **cfg**: 配置加载、`TypeOptions` 与组件注册表
//! - **log**: 结构化日志（多种格式和输出方式）
//! - **oss**: 对象存储抽象（S3 与内存实现）
//! - **replication**: 复制引擎

pub mod cfg;
pub mod log;
pub mod oss;
pub mod replication;

// 重新导出主要的公共 API
pub use cfg::{create_trait_from_type_options, register_trait, TypeOptions};

pub use log::{LogAppender, LogFormatter, LogLevel, LogRecord, Logger, LoggerConfig};

pub use oss::register_object_store;
pub use oss::{AwsS3ObjectStore, AwsS3ObjectStoreConfig, MemoryObjectStore, MemoryObjectStoreConfig};
pub use oss::{ObjectMeta, ObjectStore, ObjectStoreError, ObjectStoreManager};

pub use replication::{
    AppConfig, CopyJob, CopyOrchestrator, JobOutcome, JobReport, ReplicationConfig,
    ReplicationError,
};
