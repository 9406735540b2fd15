use std::sync::Arc;

use crate::log::{LogLevel, LogRecord, Logger};
use crate::oss::{ObjectStore, ObjectStoreError};
use crate::replication::{
    should_overwrite, Checkpoint, CopyJob, ObjectProgress, ObjectRef, ProgressRecorder,
    ReplicationError, RetryPolicy,
};

/// 单个对象的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied { bytes: u64 },
    Skipped,
    Failed { error_kind: String },
}

/// 单个对象的服务端复制
///
/// 依次检查 checkpoint、目标对象、覆盖策略，再在重试策略下执行复制，
/// 结果同时写入 checkpoint 和 `ProgressRecorder`。
/// 可恢复的失败以 `CopyOutcome::Failed` 返回，只有认证、权限、配置类错误
/// 和对象类型不一致会以 `Err` 返回并终止作业。
pub struct BlobCopyExecutor {
    job: Arc<CopyJob>,
    source: Arc<dyn ObjectStore>,
    destination: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    checkpoint: Arc<Checkpoint>,
    recorder: Arc<ProgressRecorder>,
    logger: Logger,
}

impl BlobCopyExecutor {
    pub fn new(
        job: Arc<CopyJob>,
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
        retry: RetryPolicy,
        checkpoint: Arc<Checkpoint>,
        recorder: Arc<ProgressRecorder>,
        logger: Logger,
    ) -> Self {
        Self {
            job,
            source,
            destination,
            retry,
            checkpoint,
            recorder,
            logger,
        }
    }

    pub async fn copy_one(&self, object: &ObjectRef) -> Result<CopyOutcome, ReplicationError> {
        if self.checkpoint.is_completed(&object.name) {
            self.recorder.record_skip();
            return Ok(CopyOutcome::Skipped);
        }

        self.checkpoint
            .record_object_progress(&object.name, ObjectProgress::InProgress);

        match self.transfer(object).await {
            Ok(outcome) => Ok(outcome),
            Err(ReplicationError::Storage(err)) if !err.is_fatal() => {
                Ok(self.record_failure(object, &err).await)
            }
            Err(err) => {
                self.checkpoint.record_object_progress(
                    &object.name,
                    ObjectProgress::Failed {
                        error_kind: "fatal".to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    async fn transfer(&self, object: &ObjectRef) -> Result<CopyOutcome, ReplicationError> {
        let container = &self.job.dest_container;
        let uri = self.destination.uri(container, &object.name);

        let existing = self
            .retry
            .run("head_object", &uri, || {
                self.destination.head_object(container, &object.name)
            })
            .await?;

        if let Some(existing) = existing {
            if existing.kind != object.kind {
                return Err(ReplicationError::KindMismatch {
                    key: object.name.clone(),
                    source_kind: object.kind,
                    destination_kind: existing.kind,
                });
            }

            if !should_overwrite(
                object.last_modified,
                Some(existing.last_modified),
                self.job.is_incremental,
            ) {
                self.checkpoint
                    .record_object_progress(&object.name, ObjectProgress::Skipped);
                self.recorder.record_skip();
                self.log(
                    LogRecord::new(LogLevel::Debug, "destination is up to date")
                        .with_metadata("object", object.name.as_str()),
                )
                .await;
                return Ok(CopyOutcome::Skipped);
            }
        }

        let account = (self.job.source_account != self.job.dest_account)
            .then_some(self.job.source_account.as_str());
        let source = object.copy_source(account, &self.job.source_container);

        let receipt = self
            .retry
            .run("copy_object", &uri, || {
                self.destination.copy_object(&source, container, &object.name)
            })
            .await?;

        self.checkpoint.record_object_progress(
            &object.name,
            ObjectProgress::Completed {
                bytes: receipt.bytes_copied,
            },
        );
        self.recorder.record_success(receipt.bytes_copied);
        self.log(
            LogRecord::new(LogLevel::Debug, "object copied")
                .with_metadata("object", object.name.as_str())
                .with_metadata("bytes", receipt.bytes_copied),
        )
        .await;

        Ok(CopyOutcome::Copied {
            bytes: receipt.bytes_copied,
        })
    }

    async fn record_failure(&self, object: &ObjectRef, err: &ObjectStoreError) -> CopyOutcome {
        let error_kind = err.kind().to_string();
        let message = err.to_string();

        self.recorder
            .record_failure(&object.name, &error_kind, &message);
        self.checkpoint.record_object_progress(
            &object.name,
            ObjectProgress::Failed {
                error_kind: error_kind.clone(),
            },
        );
        self.log(
            LogRecord::new(LogLevel::Error, "object copy failed")
                .with_metadata("object", object.name.as_str())
                .with_metadata("error_kind", error_kind.as_str())
                .with_metadata("error", message)
                .with_metadata(
                    "resource_uri",
                    self.source.uri(&self.job.source_container, &object.name),
                ),
        )
        .await;

        CopyOutcome::Failed { error_kind }
    }

    async fn log(&self, record: LogRecord) {
        let _ = self.logger.log(record.with_module(module_path!())).await;
    }
}
