use backon::{BackoffBuilder, Retryable};
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::log::{LogLevel, LogRecord, Logger};
use crate::oss::ObjectStoreError;
use crate::replication::RetryConfig;

/// 指数退避序列（带抖动）
///
/// 产生 `max_attempts - 1` 个延迟，第 k 个为 `base_delay * factor^k`，
/// 不超过 `max_delay`，再乘以 `[1 - jitter, 1 + jitter]` 内的随机系数。
#[derive(Debug, Clone)]
pub struct JitteredBackoff {
    base_delay: Duration,
    factor: f64,
    max_delay: Duration,
    jitter: f64,
    step: u32,
    remaining: usize,
}

impl JitteredBackoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            factor: config.factor,
            max_delay: config.max_delay,
            jitter: config.jitter,
            step: 0,
            remaining: config.max_attempts.saturating_sub(1),
        }
    }

    /// 第 `step` 次等待的名义延迟（不含抖动）
    pub fn nominal_delay(&self, step: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(step as i32);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

impl BackoffBuilder for RetryConfig {
    type Backoff = JitteredBackoff;

    fn build(self) -> JitteredBackoff {
        JitteredBackoff::new(&self)
    }
}

impl Iterator for JitteredBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let nominal = self.nominal_delay(self.step);
        self.step += 1;

        if self.jitter <= 0.0 {
            return Some(nominal);
        }
        let scale = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Some(nominal.mul_f64(scale).min(self.max_delay))
    }
}

/// 远程调用的重试策略
///
/// 只重试 `ObjectStoreError::is_retryable` 的错误，其它错误直接返回。
/// 每次决定重试时输出一条 WARN 日志：operation、attempt、error、resource_uri、retry_delay_ms。
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    logger: Logger,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, logger: Logger) -> Self {
        Self { config, logger }
    }

    pub fn max_attempts(&self) -> usize {
        self.config.max_attempts.max(1)
    }

    pub fn backoff(&self) -> JitteredBackoff {
        JitteredBackoff::new(&self.config)
    }

    /// 执行一次远程调用，失败时按退避序列重试
    ///
    /// 用尽所有尝试后返回最后一次的错误，不会影响作业中的其它调用。
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        resource_uri: &str,
        op: F,
    ) -> Result<T, ObjectStoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ObjectStoreError>>,
    {
        let attempts = AtomicUsize::new(1);

        op.retry(self.config.clone())
            .when(|err: &ObjectStoreError| err.is_retryable())
            .notify(|err: &ObjectStoreError, delay: Duration| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);

                let record = LogRecord::new(
                    LogLevel::Warn,
                    format!("retrying {} after attempt {}", operation, attempt),
                )
                .with_module(module_path!())
                .with_metadata("operation", operation)
                .with_metadata("attempt", attempt)
                .with_metadata("error", err.to_string())
                .with_metadata("resource_uri", resource_uri)
                .with_metadata("retry_delay_ms", delay.as_millis() as u64);

                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let logger = self.logger.clone();
                    handle.spawn(async move {
                        let _ = logger.log(record).await;
                    });
                }
            })
            .await
    }
}
