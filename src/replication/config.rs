use garde::Validate;
use serde::Deserialize;
use serde_with::serde_as;
use smart_default::SmartDefault;
use std::time::Duration;

use crate::cfg::HumanDur;
use crate::log::LoggerConfig;
use crate::oss::ObjectStoreManagerConfig;

/// 重试配置
///
/// `max_attempts` 是总尝试次数（含第一次），因此最多等待 `max_attempts - 1` 次，
/// 第 k 次等待为 `base_delay * factor^k`，不超过 `max_delay`，再叠加 ±`jitter` 的随机抖动。
#[serde_as]
#[derive(Debug, Clone, Deserialize, SmartDefault, Validate, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大尝试次数
    #[default = 5]
    #[garde(range(min = 1, max = 100))]
    pub max_attempts: usize,

    /// 初始延迟
    #[serde_as(as = "HumanDur")]
    #[default(Duration::from_millis(100))]
    #[garde(skip)]
    pub base_delay: Duration,

    /// 退避因子
    #[default = 2.0]
    #[garde(range(min = 1.0, max = 10.0))]
    pub factor: f64,

    /// 单次延迟上限
    #[serde_as(as = "HumanDur")]
    #[default(Duration::from_secs(30))]
    #[garde(skip)]
    pub max_delay: Duration,

    /// 抖动比例，0.2 表示 ±20%
    #[default = 0.2]
    #[garde(range(min = 0.0, max = 1.0))]
    pub jitter: f64,
}

/// 对象过滤配置（glob，匹配相对于作业前缀的对象名）
#[derive(Debug, Clone, Deserialize, Default, Validate, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// 非空时只复制匹配任一模式的对象
    #[garde(skip)]
    pub include: Vec<String>,

    /// 匹配任一模式的对象不复制，优先于 include
    #[garde(skip)]
    pub exclude: Vec<String>,
}

/// checkpoint 持久化配置
#[derive(Debug, Clone, Deserialize, Default, Validate, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    /// 设置后每处理完一页以及作业结束时写入该文件
    #[garde(skip)]
    pub path: Option<String>,
}

/// 复制引擎配置
#[derive(Debug, Clone, Deserialize, SmartDefault, Validate, PartialEq)]
#[serde(default)]
pub struct ReplicationConfig {
    /// 并发上限，实际并发为 min(8 × CPU 数, max_concurrency)
    #[default = 64]
    #[garde(range(min = 1, max = 4096))]
    pub max_concurrency: usize,

    /// 每页列举的对象数，超过存储服务上限时由存储实现截断
    #[default = 1000]
    #[garde(range(min = 1, max = 5000))]
    pub page_size: usize,

    #[garde(dive)]
    pub retry: RetryConfig,

    #[garde(dive)]
    pub filter: FilterConfig,

    #[garde(dive)]
    pub checkpoint: CheckpointConfig,
}

impl ReplicationConfig {
    /// 实际使用的并发数
    pub fn effective_concurrency(&self) -> usize {
        crate::replication::executor::effective_concurrency(self.max_concurrency)
    }
}

/// 应用配置
///
/// ```yaml
/// replication:
///   max_concurrency: 32
///   retry:
///     max_attempts: 5
///     base_delay: 100ms
///   checkpoint:
///     path: ~/.blobsync/nightly.checkpoint.json
/// logger:
///   level: info
/// stores:
///   accounts:
///     primary:
///       type: AwsS3ObjectStore
///       options:
///         region: us-west-2
/// ```
#[derive(Debug, Clone, Deserialize, Default, Validate, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    #[garde(dive)]
    pub replication: ReplicationConfig,

    #[garde(skip)]
    pub logger: LoggerConfig,

    #[garde(skip)]
    pub stores: ObjectStoreManagerConfig,
}
