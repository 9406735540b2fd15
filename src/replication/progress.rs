use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// 一次失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub object_name: String,
    pub error_kind: String,
    pub message: String,
}

/// 进度统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressStats {
    pub bytes_transferred: u64,
    pub objects_transferred: u64,
    pub objects_skipped: u64,
    /// 按记录顺序
    pub failures: Vec<FailureRecord>,
}

impl ProgressStats {
    /// 已处理的对象总数（成功 + 跳过 + 失败）
    pub fn objects_processed(&self) -> u64 {
        self.objects_transferred + self.objects_skipped + self.failures.len() as u64
    }
}

/// 单个对象处理结束的事件
#[derive(Debug, Clone, Copy)]
pub enum ProgressEvent<'a> {
    Copied { bytes: u64 },
    Skipped,
    Failed { object_name: &'a str, error_kind: &'a str },
}

/// 进度观察者，如命令行进度条
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent<'_>);
}

/// 线程安全的进度累加器
///
/// 计数使用原子变量，失败列表使用互斥锁追加，任意数量的 worker 可以并发调用。
#[derive(Default)]
pub struct ProgressRecorder {
    bytes_transferred: AtomicU64,
    objects_transferred: AtomicU64,
    objects_skipped: AtomicU64,
    failures: Mutex<Vec<FailureRecord>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            observer: Some(observer),
            ..Default::default()
        }
    }

    pub fn record_success(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::SeqCst);
        self.objects_transferred.fetch_add(1, Ordering::SeqCst);
        self.notify(ProgressEvent::Copied { bytes });
    }

    pub fn record_skip(&self) {
        self.objects_skipped.fetch_add(1, Ordering::SeqCst);
        self.notify(ProgressEvent::Skipped);
    }

    pub fn record_failure(&self, object_name: &str, error_kind: &str, message: &str) {
        // 某个 worker 持锁时 panic 不应让后续失败记录丢失
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FailureRecord {
                object_name: object_name.to_string(),
                error_kind: error_kind.to_string(),
                message: message.to_string(),
            });
        self.notify(ProgressEvent::Failed {
            object_name,
            error_kind,
        });
    }

    fn notify(&self, event: ProgressEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }

    pub fn snapshot(&self) -> ProgressStats {
        ProgressStats {
            bytes_transferred: self.bytes_transferred.load(Ordering::SeqCst),
            objects_transferred: self.objects_transferred.load(Ordering::SeqCst),
            objects_skipped: self.objects_skipped.load(Ordering::SeqCst),
            failures: self
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// 人类可读的汇总，不会重置状态
    ///
    /// ```text
    /// 3 copied, 1 skipped, 1 failed, 60 bytes transferred
    ///   failed b.txt [batch_transfer]: 批量传输中的子任务失败: part 2
    /// ```
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        let mut out = format!(
            "{} copied, {} skipped, {} failed, {} bytes transferred",
            stats.objects_transferred,
            stats.objects_skipped,
            stats.failures.len(),
            stats.bytes_transferred
        );
        for failure in &stats.failures {
            let _ = write!(
                out,
                "\n  failed {} [{}]: {}",
                failure.object_name, failure.error_kind, failure.message
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_summary_is_deterministic() {
        let recorder = ProgressRecorder::new();
        recorder.record_success(10);
        recorder.record_success(20);
        recorder.record_skip();
        recorder.record_failure("b.txt", "network", "reset");

        let expected = "2 copied, 1 skipped, 1 failed, 30 bytes transferred\n  failed b.txt [network]: reset";
        assert_eq!(recorder.summary(), expected);
        assert_eq!(recorder.summary(), expected);
        assert_eq!(recorder.snapshot().objects_processed(), 4);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(
            ProgressRecorder::new().summary(),
            "0 copied, 0 skipped, 0 failed, 0 bytes transferred"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let recorder = Arc::new(ProgressRecorder::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let recorder = recorder.clone();
                tokio::spawn(async move {
                    for i in 0..250u64 {
                        match i % 5 {
                            0 => recorder.record_skip(),
                            1 => recorder.record_failure(&format!("w{}-{}", worker, i), "timeout", "slow"),
                            _ => recorder.record_success(i),
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = recorder.snapshot();
        assert_eq!(stats.objects_skipped, 8 * 50);
        assert_eq!(stats.failures.len(), 8 * 50);
        assert_eq!(stats.objects_transferred, 8 * 150);
        let per_worker: u64 = (0..250u64).filter(|i| i % 5 >= 2).sum();
        assert_eq!(stats.bytes_transferred, 8 * per_worker);
        assert_eq!(stats.objects_processed(), 8 * 250);
    }

    #[test]
    fn test_failures_survive_poisoned_lock() {
        let recorder = ProgressRecorder::new();
        recorder.record_failure("a.txt", "network", "reset");
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = recorder.failures.lock().unwrap();
            panic!("worker died while holding the failure list");
        }));
        assert!(recorder.failures.is_poisoned());

        recorder.record_failure("b.txt", "timeout", "slow");

        let stats = recorder.snapshot();
        assert_eq!(stats.failures.len(), 2);
        assert_eq!(stats.failures[1].object_name, "b.txt");
        assert!(recorder.summary().starts_with("0 copied, 0 skipped, 2 failed"));
    }

    #[test]
    fn test_observer_receives_events() {
        #[derive(Default)]
        struct Counting {
            copied: AtomicUsize,
            failed: AtomicUsize,
        }
        impl ProgressObserver for Counting {
            fn on_event(&self, event: ProgressEvent<'_>) {
                match event {
                    ProgressEvent::Copied { .. } => self.copied.fetch_add(1, Ordering::SeqCst),
                    ProgressEvent::Failed { .. } => self.failed.fetch_add(1, Ordering::SeqCst),
                    ProgressEvent::Skipped => 0,
                };
            }
        }

        let observer = Arc::new(Counting::default());
        let recorder = ProgressRecorder::with_observer(observer.clone());
        recorder.record_success(1);
        recorder.record_failure("x", "io", "disk");
        recorder.record_skip();

        assert_eq!(observer.copied.load(Ordering::SeqCst), 1);
        assert_eq!(observer.failed.load(Ordering::SeqCst), 1);
    }
}
