use thiserror::Error;

/// 对象存储统一错误类型
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("对象不存在: {key}")]
    NotFound { key: String },

    #[error("容器不存在: {container}")]
    ContainerNotFound { container: String },

    #[error("认证失败: {0}")]
    Authentication(String),

    #[error("权限不足: {0}")]
    PermissionDenied(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("无效参数: {0}")]
    InvalidInput(String),

    #[error("限流: {0}")]
    RateLimited(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("未配置的账号: {0}")]
    UnknownAccount(String),

    #[error("厂商错误 [{provider}]: {message}")]
    Provider {
        provider: String,
        message: String,
        /// HTTP 状态码（如果有）
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("批量传输中的子任务失败: {message}")]
    BatchTransfer { message: String },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectStoreError {
    /// 从厂商 SDK 错误转换
    pub fn from_provider<E>(err: E, provider: &str, context: &str, status: Option<u16>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ObjectStoreError::Provider {
            provider: provider.to_string(),
            message: context.to_string(),
            status,
            source: Some(Box::new(err)),
        }
    }

    /// 是否为可重试的临时错误（网络、超时、限流、5xx）
    pub fn is_retryable(&self) -> bool {
        match self {
            ObjectStoreError::Network(_)
            | ObjectStoreError::Timeout(_)
            | ObjectStoreError::RateLimited(_) => true,
            ObjectStoreError::Provider {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// 是否为必须终止整个作业的错误（凭证、配置）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::Authentication(_)
                | ObjectStoreError::PermissionDenied(_)
                | ObjectStoreError::Configuration(_)
                | ObjectStoreError::UnknownAccount(_)
        )
    }

    /// 错误类别，用于失败记录和日志
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectStoreError::NotFound { .. } => "not_found",
            ObjectStoreError::ContainerNotFound { .. } => "container_not_found",
            ObjectStoreError::Authentication(_) => "authentication",
            ObjectStoreError::PermissionDenied(_) => "permission_denied",
            ObjectStoreError::Network(_) => "network",
            ObjectStoreError::Timeout(_) => "timeout",
            ObjectStoreError::InvalidInput(_) => "invalid_input",
            ObjectStoreError::RateLimited(_) => "rate_limited",
            ObjectStoreError::Configuration(_) => "configuration",
            ObjectStoreError::UnknownAccount(_) => "unknown_account",
            ObjectStoreError::Provider { .. } => "provider",
            ObjectStoreError::BatchTransfer { .. } => "batch_transfer",
            ObjectStoreError::Serialization(_) => "serialization",
            ObjectStoreError::Io(_) => "io",
        }
    }
}
