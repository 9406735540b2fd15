use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::replication::ReplicationError;

/// 一次复制作业
///
/// 由作业消息反序列化得到，创建后不再修改。字段同时接受 snake_case 和 camelCase：
///
/// ```json
/// {
///   "jobName": "nightly-backup",
///   "sourceAccount": "primary",
///   "destAccount": "backup",
///   "sourceContainer": "photos",
///   "destContainer": "photos-replica",
///   "isIncremental": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CopyJob {
    #[serde(alias = "jobName")]
    #[garde(length(min = 1))]
    pub job_name: String,

    #[serde(alias = "sourceAccount", alias = "sourceAccountRef")]
    #[garde(length(min = 1))]
    pub source_account: String,

    #[serde(alias = "destAccount", alias = "destAccountRef")]
    #[garde(length(min = 1))]
    pub dest_account: String,

    #[serde(alias = "sourceContainer")]
    #[garde(length(min = 1))]
    pub source_container: String,

    #[serde(alias = "destContainer")]
    #[garde(length(min = 1))]
    pub dest_container: String,

    #[serde(default, alias = "isIncremental")]
    #[garde(skip)]
    pub is_incremental: bool,

    /// 只复制该前缀下的对象，目标对象名与源对象名保持一致
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub prefix: Option<String>,
}

impl CopyJob {
    /// 从作业消息（JSON）解析并校验
    pub fn from_message(message: &str) -> Result<Self, ReplicationError> {
        let job: CopyJob = serde_json::from_str(message)
            .map_err(|e| ReplicationError::Configuration(format!("invalid job message: {}", e)))?;
        job.validate()?;
        Ok(job)
    }

    /// 源位置标识，用于日志和 checkpoint 校验
    pub fn source_ref(&self) -> String {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}/{}", self.source_account, self.source_container, prefix)
            }
            _ => format!("{}/{}", self.source_account, self.source_container),
        }
    }

    /// 目标位置标识
    pub fn destination_ref(&self) -> String {
        format!("{}/{}", self.dest_account, self.dest_container)
    }

    pub fn mode(&self) -> &'static str {
        if self.is_incremental {
            "incremental"
        } else {
            "full"
        }
    }
}
