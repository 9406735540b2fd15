use chrono::{DateTime, Utc};
use glob::Pattern;
use std::sync::Arc;

use crate::oss::{BlobKind, CopySource, ObjectMeta, ObjectStore, ObjectStoreError};
use crate::replication::{FilterConfig, ReplicationError, RetryPolicy};

/// 列举得到的源对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub kind: BlobKind,
}

impl ObjectRef {
    /// 作为服务端复制的源，`account` 仅在跨账号复制时设置
    pub fn copy_source(&self, account: Option<&str>, container: &str) -> CopySource {
        CopySource {
            account: account.map(str::to_string),
            container: container.to_string(),
            key: self.name.clone(),
            size: self.size,
            kind: self.kind,
        }
    }
}

impl From<ObjectMeta> for ObjectRef {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            name: meta.key,
            last_modified: meta.last_modified,
            size: meta.size,
            kind: meta.kind,
        }
    }
}

/// 对象名过滤器
///
/// 匹配相对于作业前缀的对象名，exclude 优先于 include，include 为空时不限制。
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl ObjectFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, ReplicationError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, ReplicationError> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| {
                        ReplicationError::Configuration(format!("invalid glob pattern '{}': {}", p, e))
                    })
                })
                .collect()
        };

        Ok(Self {
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, relative_name: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(relative_name)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(relative_name))
    }
}

/// 一页待复制的对象
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectRef>,
    /// None 表示没有更多页
    pub next_cursor: Option<String>,
}

/// 源容器的分页列举器
///
/// 每次只取一页，调用方持有游标。列举经过重试策略。
pub struct DirectoryLister {
    store: Arc<dyn ObjectStore>,
    container: String,
    prefix: Option<String>,
    page_size: usize,
    retry: RetryPolicy,
    filter: ObjectFilter,
}

impl DirectoryLister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        container: impl Into<String>,
        prefix: Option<String>,
        page_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            prefix: prefix.filter(|p| !p.is_empty()),
            page_size: page_size.max(1),
            retry,
            filter: ObjectFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: ObjectFilter) -> Self {
        self.filter = filter;
        self
    }

    /// 取下一页，`cursor` 为上一页的 `next_cursor`，首页传 None
    ///
    /// 被过滤掉的对象不会出现在结果中，因此一页可能为空但仍有后续页。
    pub async fn next_page(&self, cursor: Option<&str>) -> Result<ObjectPage, ObjectStoreError> {
        let prefix = self.prefix.as_deref();
        let uri = self.store.uri(&self.container, prefix.unwrap_or(""));

        let page = self
            .retry
            .run("list_objects", &uri, || {
                self.store
                    .list_objects_page(&self.container, prefix, cursor, self.page_size)
            })
            .await?;

        let objects = page
            .objects
            .into_iter()
            .filter(|meta| self.accepts(&meta.key))
            .map(ObjectRef::from)
            .collect();

        Ok(ObjectPage {
            objects,
            next_cursor: page.next_cursor,
        })
    }

    fn accepts(&self, key: &str) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        let relative = match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).unwrap_or(key),
            None => key,
        };
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            return false;
        }
        self.filter.matches(relative)
    }
}
