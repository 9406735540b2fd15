use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cfg::expand_path;
use crate::log::{LogLevel, LogRecord, Logger};
use crate::oss::ObjectStoreManager;
use crate::replication::{
    run_bounded, BlobCopyExecutor, Checkpoint, CopyJob, DirectoryLister, ObjectFilter,
    ProgressObserver, ProgressRecorder, ProgressStats, ReplicationConfig, ReplicationError,
    RetryPolicy, TransferCheckpoint,
};

/// 作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Starting,
    Listing,
    Dispatching,
    Completing,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Starting => "starting",
            JobState::Listing => "listing",
            JobState::Dispatching => "dispatching",
            JobState::Completing => "completing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

/// 作业结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// 所有对象都已复制或跳过
    Completed,
    /// 列举完成，但有对象复制失败
    CompletedWithErrors,
    /// 被取消，只完成了一部分
    Cancelled,
    /// 不可恢复的错误导致作业中止
    Failed { reason: String },
}

impl JobOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed => f.write_str("completed"),
            JobOutcome::CompletedWithErrors => f.write_str("completed with errors"),
            JobOutcome::Cancelled => f.write_str("cancelled"),
            JobOutcome::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// 作业报告
#[derive(Debug, Clone)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub stats: ProgressStats,
    /// 结束时的 checkpoint，可用于恢复
    pub checkpoint: TransferCheckpoint,
    /// 最后一条日志的内容
    pub summary: String,
}

enum Flow {
    Finished,
    Cancelled,
}

/// 作业运行时上下文
struct JobRun {
    job: Arc<CopyJob>,
    checkpoint: Arc<Checkpoint>,
    recorder: Arc<ProgressRecorder>,
    state: JobState,
}

/// 复制作业编排
///
/// 状态流转：Starting → Listing → Dispatching →（循环）→ Completing → Done，
/// 任意状态遇到不可恢复错误进入 Failed。日志的最后一行总是作业汇总。
///
/// ```no_run
/// # async fn demo(manager: std::sync::Arc<blobsync::oss::ObjectStoreManager>, logger: blobsync::log::Logger) {
/// use blobsync::replication::{CopyJob, CopyOrchestrator, ReplicationConfig};
///
/// let job = CopyJob::from_message(r#"{"jobName":"nightly","sourceAccount":"a","destAccount":"b","sourceContainer":"x","destContainer":"y"}"#).unwrap();
/// let orchestrator = CopyOrchestrator::new(ReplicationConfig::default(), manager, logger);
/// let report = orchestrator.run(job).await;
/// println!("{}", report.summary);
/// # }
/// ```
pub struct CopyOrchestrator {
    config: ReplicationConfig,
    stores: Arc<ObjectStoreManager>,
    logger: Logger,
    cancel: CancellationToken,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl CopyOrchestrator {
    pub fn new(config: ReplicationConfig, stores: Arc<ObjectStoreManager>, logger: Logger) -> Self {
        Self {
            config,
            stores,
            logger,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 取消后不再列举新页，正在复制的对象完成后作业以 Cancelled 结束
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 从头运行作业
    pub async fn run(&self, job: CopyJob) -> JobReport {
        let checkpoint = Checkpoint::new(&job);
        self.execute(job, checkpoint).await
    }

    /// 从已保存的 checkpoint 恢复作业
    ///
    /// checkpoint 必须属于同一个作业，否则作业以 Failed 结束。
    pub async fn resume(&self, job: CopyJob, snapshot: TransferCheckpoint) -> JobReport {
        match Checkpoint::resume(&job, snapshot) {
            Ok(checkpoint) => self.execute(job, checkpoint).await,
            Err(err) => {
                let checkpoint = Checkpoint::new(&job);
                let mut run = self.job_run(job, checkpoint);
                self.transition(&mut run, JobState::Failed).await;
                self.finish(run, JobOutcome::Failed { reason: err.to_string() })
                    .await
            }
        }
    }

    fn job_run(&self, job: CopyJob, checkpoint: Checkpoint) -> JobRun {
        let recorder = match &self.observer {
            Some(observer) => ProgressRecorder::with_observer(observer.clone()),
            None => ProgressRecorder::new(),
        };
        JobRun {
            job: Arc::new(job),
            checkpoint: Arc::new(checkpoint),
            recorder: Arc::new(recorder),
            state: JobState::Starting,
        }
    }

    async fn execute(&self, job: CopyJob, checkpoint: Checkpoint) -> JobReport {
        let mut run = self.job_run(job, checkpoint);

        self.log(
            LogRecord::new(LogLevel::Info, format!("job '{}' started", run.job.job_name))
                .with_metadata("job", run.job.job_name.as_str())
                .with_metadata("source", run.job.source_ref())
                .with_metadata("destination", run.job.destination_ref())
                .with_metadata("mode", run.job.mode())
                .with_metadata("concurrency", self.config.effective_concurrency())
                .with_metadata("resumed_cursor", run.checkpoint.cursor().unwrap_or_default()),
        )
        .await;

        let outcome = match self.drive(&mut run).await {
            Ok(Flow::Cancelled) => JobOutcome::Cancelled,
            Ok(Flow::Finished) => {
                if run.recorder.snapshot().failures.is_empty() {
                    JobOutcome::Completed
                } else {
                    JobOutcome::CompletedWithErrors
                }
            }
            Err(err) => {
                self.log(
                    LogRecord::new(LogLevel::Error, format!("job '{}' aborted", run.job.job_name))
                        .with_metadata("state", run.state.as_str())
                        .with_metadata("error", err.to_string()),
                )
                .await;
                self.transition(&mut run, JobState::Failed).await;
                JobOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };

        self.persist(&run).await;
        self.finish(run, outcome).await
    }

    async fn drive(&self, run: &mut JobRun) -> Result<Flow, ReplicationError> {
        let job = run.job.clone();
        let source = self.stores.get_store(&job.source_account)?;
        let destination = self.stores.get_store(&job.dest_account)?;

        let retry = RetryPolicy::new(self.config.retry.clone(), self.logger.clone());
        let container_uri = destination.uri(&job.dest_container, "");
        let created = retry
            .run("create_container", &container_uri, || {
                destination.create_container_if_absent(&job.dest_container)
            })
            .await?;
        if created {
            self.log(
                LogRecord::new(LogLevel::Info, "destination container created")
                    .with_metadata("container", job.dest_container.as_str()),
            )
            .await;
        }

        let lister = DirectoryLister::new(
            source.clone(),
            job.source_container.clone(),
            job.prefix.clone(),
            self.config.page_size,
            retry.clone(),
        )
        .with_filter(ObjectFilter::new(&self.config.filter)?);

        let executor = Arc::new(BlobCopyExecutor::new(
            job.clone(),
            source,
            destination,
            retry,
            run.checkpoint.clone(),
            run.recorder.clone(),
            self.logger.clone(),
        ));
        let concurrency = self.config.effective_concurrency();

        loop {
            if self.cancel.is_cancelled() {
                self.transition(run, JobState::Completing).await;
                return Ok(Flow::Cancelled);
            }

            self.transition(run, JobState::Listing).await;
            let cursor = run.checkpoint.cursor();
            let page = lister.next_page(cursor.as_deref()).await?;

            self.transition(run, JobState::Dispatching).await;
            let names: Vec<String> = page.objects.iter().map(|o| o.name.clone()).collect();
            // 致命错误只取消本页剩余对象，不影响调用方持有的作业 token
            let page_cancel = self.cancel.child_token();
            let executor = executor.clone();
            let worker_cancel = page_cancel.clone();
            let result = run_bounded(page.objects, concurrency, &page_cancel, move |object| {
                let executor = executor.clone();
                let cancel = worker_cancel.clone();
                async move {
                    let outcome = executor.copy_one(&object).await;
                    if outcome.is_err() {
                        cancel.cancel();
                    }
                    outcome
                }
            })
            .await?;

            self.log(
                LogRecord::new(LogLevel::Debug, "page settled")
                    .with_metadata("objects", names.len())
                    .with_metadata("abandoned", result.abandoned),
            )
            .await;

            // 同一页内的致命错误只报告第一个
            if let Some(err) = result.outcomes.into_iter().find_map(Result::err) {
                return Err(err);
            }

            if result.abandoned > 0 {
                self.transition(run, JobState::Completing).await;
                return Ok(Flow::Cancelled);
            }

            match page.next_cursor {
                Some(next) => {
                    run.checkpoint.advance_cursor(Some(next));
                    run.checkpoint.forget_objects(names.iter().map(String::as_str));
                    self.persist(run).await;
                }
                None => {
                    self.transition(run, JobState::Completing).await;
                    return Ok(Flow::Finished);
                }
            }
        }
    }

    async fn finish(&self, mut run: JobRun, outcome: JobOutcome) -> JobReport {
        let summary = format!(
            "job '{}' {}: {}",
            run.job.job_name,
            outcome,
            run.recorder.summary()
        );

        if !outcome.is_failed() {
            self.transition(&mut run, JobState::Done).await;
        }
        let _ = self.logger.write_line(&summary).await;

        JobReport {
            outcome,
            stats: run.recorder.snapshot(),
            checkpoint: run.checkpoint.snapshot(),
            summary,
        }
    }

    async fn transition(&self, run: &mut JobRun, state: JobState) {
        if run.state == state {
            return;
        }
        self.log(
            LogRecord::new(LogLevel::Debug, format!("job state {} -> {}", run.state.as_str(), state.as_str()))
                .with_metadata("job", run.job.job_name.as_str()),
        )
        .await;
        run.state = state;
    }

    /// 写入 checkpoint 文件，失败只记录警告
    async fn persist(&self, run: &JobRun) {
        let Some(path) = &self.config.checkpoint.path else {
            return;
        };
        let path: PathBuf = expand_path(path);

        if let Err(err) = run.checkpoint.snapshot().save(&path).await {
            self.log(
                LogRecord::new(LogLevel::Warn, "failed to persist checkpoint")
                    .with_metadata("path", path.display().to_string())
                    .with_metadata("error", err.to_string()),
            )
            .await;
        }
    }

    async fn log(&self, record: LogRecord) {
        let _ = self.logger.log(record.with_module(module_path!())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{MemoryAppender, TextFormatter, TextFormatterConfig};
    use crate::oss::{BlobKind, Fault, FaultKind, FaultOp, MemoryCluster, MemoryObjectStore};
    use crate::replication::RetryConfig;
    use bytes::Bytes;
    use chrono::Utc;
    use std::time::Duration;

    fn setup(cluster: &MemoryCluster) -> (CopyOrchestrator, MemoryAppender) {
        setup_with(cluster, 2, 2)
    }

    fn setup_with(
        cluster: &MemoryCluster,
        max_concurrency: usize,
        page_size: usize,
    ) -> (CopyOrchestrator, MemoryAppender) {
        let stores = Arc::new(ObjectStoreManager::new(Default::default()));
        stores.insert("src", Arc::new(MemoryObjectStore::with_cluster(cluster.clone(), "src")));
        stores.insert("dst", Arc::new(MemoryObjectStore::with_cluster(cluster.clone(), "dst")));

        let appender = MemoryAppender::default();
        let logger = Logger::from_parts(
            LogLevel::Debug,
            Arc::new(TextFormatter::new(TextFormatterConfig::default())),
            Arc::new(appender.clone()),
        );
        let config = ReplicationConfig {
            max_concurrency,
            page_size,
            retry: RetryConfig {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                ..Default::default()
            },
            ..Default::default()
        };
        (CopyOrchestrator::new(config, stores, logger), appender)
    }

    fn job() -> CopyJob {
        CopyJob {
            job_name: "nightly".to_string(),
            source_account: "src".to_string(),
            dest_account: "dst".to_string(),
            source_container: "photos".to_string(),
            dest_container: "backup".to_string(),
            is_incremental: false,
            prefix: None,
        }
    }

    fn seed(cluster: &MemoryCluster, n: usize) {
        cluster.create_container("src", "photos");
        for i in 0..n {
            cluster.put_object(
                "src",
                "photos",
                &format!("img-{:02}", i),
                Bytes::from(vec![0u8; 4]),
                Utc::now(),
                BlobKind::Block,
            );
        }
    }

    #[tokio::test]
    async fn test_run_creates_destination_and_copies_all_pages() {
        let cluster = MemoryCluster::new();
        seed(&cluster, 5);
        let (orchestrator, appender) = setup(&cluster);

        let report = orchestrator.run(job()).await;

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.stats.objects_transferred, 5);
        assert_eq!(report.stats.bytes_transferred, 20);
        assert_eq!(cluster.keys("dst", "backup").len(), 5);
        // 前两页在游标越过后被丢弃，只剩最后一页
        assert_eq!(report.checkpoint.objects.len(), 1);
        assert_eq!(report.checkpoint.completed_objects(), 1);

        let lines = appender.lines();
        assert_eq!(lines.last(), Some(&report.summary));
        assert!(report.summary.starts_with("job 'nightly' completed: 5 copied"));
        assert!(lines.iter().any(|l| l.contains("job state listing -> dispatching")));
    }

    #[tokio::test]
    async fn test_unknown_account_fails_job() {
        let cluster = MemoryCluster::new();
        seed(&cluster, 1);
        let (orchestrator, appender) = setup(&cluster);
        let mut job = job();
        job.dest_account = "nowhere".to_string();

        let report = orchestrator.run(job).await;

        assert!(matches!(report.outcome, JobOutcome::Failed { ref reason } if reason.contains("nowhere")));
        assert_eq!(appender.lines().last(), Some(&report.summary));
        assert_eq!(cluster.copy_calls(), 0);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_job() {
        let cluster = MemoryCluster::new();
        seed(&cluster, 3);
        cluster.inject_fault(Fault::new(FaultOp::List, FaultKind::ServerError));
        let (orchestrator, _) = setup(&cluster);

        let report = orchestrator.run(job()).await;

        assert!(report.outcome.is_failed());
        assert_eq!(report.stats.objects_processed(), 0);
    }

    #[tokio::test]
    async fn test_fatal_copy_error_stops_job() {
        let cluster = MemoryCluster::new();
        seed(&cluster, 6);
        cluster.inject_fault(Fault::new(FaultOp::Copy, FaultKind::PermissionDenied).on_key("img-00"));
        let (orchestrator, _) = setup(&cluster);

        let report = orchestrator.run(job()).await;

        assert!(report.outcome.is_failed());
        // 第一页之后不再列举
        assert!(report.stats.objects_processed() <= 2);
        assert!(report.checkpoint.enumeration_cursor.is_none());
    }

    #[tokio::test]
    async fn test_fatal_copy_error_abandons_rest_of_page() {
        let cluster = MemoryCluster::new();
        seed(&cluster, 50);
        cluster.inject_fault(Fault::new(FaultOp::Copy, FaultKind::Authentication));
        let (orchestrator, _) = setup_with(&cluster, 1, 100);

        let report = orchestrator.run(job()).await;

        assert!(report.outcome.is_failed());
        assert_eq!(cluster.copy_calls(), 1);
        assert_eq!(report.stats.objects_processed(), 0);
        assert!(!orchestrator.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_checkpoint_keeps_only_unsettled_page() {
        let cluster = MemoryCluster::new();
        cluster.create_container("src", "photos");
        for i in 0..200 {
            cluster.put_object(
                "src",
                "photos",
                &format!("img-{:03}", i),
                Bytes::from(vec![0u8; 4]),
                Utc::now(),
                BlobKind::Block,
            );
        }
        let (orchestrator, _) = setup_with(&cluster, 4, 10);

        let report = orchestrator.run(job()).await;

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.stats.objects_transferred, 200);
        assert!(report.checkpoint.objects.len() <= 10);
        assert!(report
            .checkpoint
            .objects
            .keys()
            .all(|name| Some(name.as_str()) > report.checkpoint.enumeration_cursor.as_deref()));
    }

    #[tokio::test]
    async fn test_cancel_after_last_page_settled_completes() {
        struct CancelOnThird {
            token: CancellationToken,
            seen: std::sync::atomic::AtomicUsize,
        }
        impl ProgressObserver for CancelOnThird {
            fn on_event(&self, _event: crate::replication::ProgressEvent<'_>) {
                if self.seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1 == 3 {
                    self.token.cancel();
                }
            }
        }

        let cluster = MemoryCluster::new();
        seed(&cluster, 3);
        let (orchestrator, appender) = setup_with(&cluster, 2, 10);
        let observer = Arc::new(CancelOnThird {
            token: orchestrator.cancellation_token(),
            seen: Default::default(),
        });
        let orchestrator = orchestrator.with_observer(observer);

        let report = orchestrator.run(job()).await;

        assert!(orchestrator.cancellation_token().is_cancelled());
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.stats.objects_transferred, 3);
        assert!(appender.lines().last().unwrap().starts_with("job 'nightly' completed: 3 copied"));
    }

    #[tokio::test]
    async fn test_resume_rejects_foreign_checkpoint() {
        let cluster = MemoryCluster::new();
        seed(&cluster, 1);
        let (orchestrator, _) = setup(&cluster);

        let mut other = job();
        other.job_name = "weekly".to_string();
        let snapshot = Checkpoint::new(&other).snapshot();

        let report = orchestrator.resume(job(), snapshot).await;
        assert!(report.outcome.is_failed());
        assert_eq!(cluster.copy_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cluster = MemoryCluster::new();
        seed(&cluster, 3);
        let (orchestrator, appender) = setup(&cluster);
        orchestrator.cancellation_token().cancel();

        let report = orchestrator.run(job()).await;

        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(cluster.copy_calls(), 0);
        assert!(appender.lines().last().unwrap().contains("cancelled"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(JobOutcome::CompletedWithErrors.to_string(), "completed with errors");
        assert_eq!(
            JobOutcome::Failed {
                reason: "boom".to_string()
            }
            .to_string(),
            "failed (boom)"
        );
    }
}
