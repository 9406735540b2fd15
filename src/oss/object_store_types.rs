use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 对象类型
///
/// 不同类型支持的写入方式不同（块、固定大小页、追加），复制时目标必须与源保持同一类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    #[default]
    Block,
    Page,
    Append,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Block => "block",
            BlobKind::Page => "page",
            BlobKind::Append => "append",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对象元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub kind: BlobKind,
    pub etag: Option<String>,
}

/// 一页列举结果
///
/// `next_cursor` 为 `None` 表示列举结束
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    pub next_cursor: Option<String>,
}

/// 服务端复制的源对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// 源账号名称，同账号复制时为 None
    pub account: Option<String>,
    pub container: String,
    pub key: String,
    /// 源对象大小，用于选择单次复制还是分片复制
    pub size: u64,
    pub kind: BlobKind,
}

/// 服务端复制的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReceipt {
    pub bytes_copied: u64,
    pub etag: Option<String>,
}
