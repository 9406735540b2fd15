//! replication 模块 - 容器复制引擎
//!
//! 将源账号下一个容器（可限定前缀）中的对象通过服务端复制同步到目标账号的容器：
//!
//! - `CopyOrchestrator` 驱动整个作业：分页列举、有界并发复制、取消、汇总
//! - `BlobCopyExecutor` 处理单个对象：覆盖策略、重试、checkpoint 和进度记录
//! - `Checkpoint` 记录列举游标和每个对象的进度，可以保存到文件并用于恢复
//!
//! 单个对象的失败只会被记录，认证、权限、配置错误和对象类型不一致会中止作业。

mod checkpoint;
mod config;
mod copier;
mod error;
pub mod executor;
mod job;
mod lister;
mod orchestrator;
mod overwrite;
mod progress;
mod retry;

pub use checkpoint::{Checkpoint, ObjectProgress, TransferCheckpoint};
pub use config::{AppConfig, CheckpointConfig, FilterConfig, ReplicationConfig, RetryConfig};
pub use copier::{BlobCopyExecutor, CopyOutcome};
pub use error::ReplicationError;
pub use executor::{effective_concurrency, run_bounded, BoundedRun};
pub use job::CopyJob;
pub use lister::{DirectoryLister, ObjectFilter, ObjectPage, ObjectRef};
pub use orchestrator::{CopyOrchestrator, JobOutcome, JobReport, JobState};
pub use overwrite::should_overwrite;
pub use progress::{FailureRecord, ProgressEvent, ProgressObserver, ProgressRecorder, ProgressStats};
pub use retry::{JitteredBackoff, RetryPolicy};
