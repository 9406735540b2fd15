//! 内存对象存储
//!
//! 多个账号共享一个 `MemoryCluster`，从而可以模拟跨账号的服务端复制。
//! 列举按 key 排序，续页标记是上一页最后一个 key，因此在对象集合不变时是稳定的。
//! 支持按操作和 key 注入故障，以及为复制操作增加延迟，便于测试重试和并发上限。

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::oss::{
    BlobKind, CopyReceipt, CopySource, ListPage, ObjectMeta, ObjectStore, ObjectStoreError,
};

static CLUSTERS: Lazy<DashMap<String, MemoryCluster>> = Lazy::new(DashMap::new);

/// 可注入故障的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    List,
    Head,
    Copy,
    CreateContainer,
}

/// 注入的错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Network,
    Timeout,
    RateLimited,
    ServerError,
    Authentication,
    PermissionDenied,
    BatchTransfer,
    InvalidInput,
}

impl FaultKind {
    fn to_error(self, target: &str) -> ObjectStoreError {
        let message = format!("injected fault on {}", target);
        match self {
            FaultKind::Network => ObjectStoreError::Network(message),
            FaultKind::Timeout => ObjectStoreError::Timeout(message),
            FaultKind::RateLimited => ObjectStoreError::RateLimited(message),
            FaultKind::ServerError => ObjectStoreError::Provider {
                provider: "memory".to_string(),
                message,
                status: Some(500),
                source: None,
            },
            FaultKind::Authentication => ObjectStoreError::Authentication(message),
            FaultKind::PermissionDenied => ObjectStoreError::PermissionDenied(message),
            FaultKind::BatchTransfer => ObjectStoreError::BatchTransfer { message },
            FaultKind::InvalidInput => ObjectStoreError::InvalidInput(message),
        }
    }
}

/// 一条故障规则
#[derive(Debug, Clone)]
pub struct Fault {
    pub op: FaultOp,
    /// 只对该 key 生效，None 表示所有 key
    pub key: Option<String>,
    pub kind: FaultKind,
    /// 剩余触发次数，None 表示一直触发
    pub remaining: Option<u32>,
}

impl Fault {
    pub fn new(op: FaultOp, kind: FaultKind) -> Self {
        Self {
            op,
            key: None,
            kind,
            remaining: None,
        }
    }

    pub fn on_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    kind: BlobKind,
    etag: String,
}

type Containers = HashMap<String, BTreeMap<String, StoredObject>>;

#[derive(Default)]
struct ClusterInner {
    accounts: Mutex<HashMap<String, Containers>>,
    faults: Mutex<Vec<Fault>>,
    copy_delay: Mutex<Duration>,
    generation: AtomicU64,
    copy_calls: AtomicUsize,
    copies_in_flight: AtomicUsize,
    max_copies_in_flight: AtomicUsize,
}

/// 内存存储集群
///
/// clone 后共享同一份数据
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按名称获取全局共享的集群，不存在时创建
    pub fn shared(name: &str) -> Self {
        CLUSTERS.entry(name.to_string()).or_default().clone()
    }

    fn accounts(&self) -> Result<MutexGuard<'_, HashMap<String, Containers>>, ObjectStoreError> {
        self.inner
            .accounts
            .lock()
            .map_err(|_| ObjectStoreError::Configuration("memory cluster lock poisoned".into()))
    }

    fn next_etag(&self) -> String {
        format!("\"{:08x}\"", self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// 创建容器
    pub fn create_container(&self, account: &str, container: &str) {
        if let Ok(mut accounts) = self.accounts() {
            accounts
                .entry(account.to_string())
                .or_default()
                .entry(container.to_string())
                .or_default();
        }
    }

    /// 写入对象（容器不存在时自动创建），用于准备测试数据
    pub fn put_object(
        &self,
        account: &str,
        container: &str,
        key: &str,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
        kind: BlobKind,
    ) {
        let etag = self.next_etag();
        if let Ok(mut accounts) = self.accounts() {
            accounts
                .entry(account.to_string())
                .or_default()
                .entry(container.to_string())
                .or_default()
                .insert(
                    key.to_string(),
                    StoredObject {
                        data: data.into(),
                        last_modified,
                        kind,
                        etag,
                    },
                );
        }
    }

    /// 读取对象内容
    pub fn get_object(&self, account: &str, container: &str, key: &str) -> Option<Bytes> {
        self.accounts()
            .ok()?
            .get(account)?
            .get(container)?
            .get(key)
            .map(|o| o.data.clone())
    }

    /// 容器中的全部 key（有序）
    pub fn keys(&self, account: &str, container: &str) -> Vec<String> {
        self.accounts()
            .ok()
            .and_then(|accounts| {
                accounts
                    .get(account)
                    .and_then(|c| c.get(container))
                    .map(|objects| objects.keys().cloned().collect())
            })
            .unwrap_or_default()
    }

    pub fn container_exists(&self, account: &str, container: &str) -> bool {
        self.accounts()
            .map(|accounts| {
                accounts
                    .get(account)
                    .map(|c| c.contains_key(container))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn inject_fault(&self, fault: Fault) {
        if let Ok(mut faults) = self.inner.faults.lock() {
            faults.push(fault);
        }
    }

    /// 为每次复制增加固定延迟
    pub fn set_copy_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.inner.copy_delay.lock() {
            *d = delay;
        }
    }

    /// copy_object 被调用的总次数（包括失败的）
    pub fn copy_calls(&self) -> usize {
        self.inner.copy_calls.load(Ordering::SeqCst)
    }

    /// 观察到的最大同时进行的复制数
    pub fn max_copies_in_flight(&self) -> usize {
        self.inner.max_copies_in_flight.load(Ordering::SeqCst)
    }

    fn take_fault(&self, op: FaultOp, key: &str) -> Option<FaultKind> {
        let mut faults = self.inner.faults.lock().ok()?;
        let index = faults.iter().position(|f| {
            f.op == op
                && f.key.as_deref().map(|k| k == key).unwrap_or(true)
                && f.remaining != Some(0)
        })?;

        let fault = &mut faults[index];
        if let Some(n) = fault.remaining.as_mut() {
            *n -= 1;
        }
        Some(fault.kind)
    }

    fn copy_delay(&self) -> Duration {
        self.inner
            .copy_delay
            .lock()
            .map(|d| *d)
            .unwrap_or_default()
    }
}

/// MemoryObjectStore 配置
#[derive(Debug, Clone, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct MemoryObjectStoreConfig {
    /// 账号名称
    #[default = "default"]
    pub account: String,

    /// 集群名称，同名集群在进程内共享
    #[default = "default"]
    pub cluster: String,

    /// 单页最大条数
    #[default = 1000]
    pub max_page_size: usize,
}

/// 基于 `MemoryCluster` 的 ObjectStore 实现
pub struct MemoryObjectStore {
    cluster: MemoryCluster,
    account: String,
    max_page_size: usize,
}

impl MemoryObjectStore {
    pub fn new(config: MemoryObjectStoreConfig) -> Self {
        Self {
            cluster: MemoryCluster::shared(&config.cluster),
            account: config.account,
            max_page_size: config.max_page_size.max(1),
        }
    }

    /// 在指定集群上创建账号视图
    pub fn with_cluster(cluster: MemoryCluster, account: impl Into<String>) -> Self {
        Self {
            cluster,
            account: account.into(),
            max_page_size: 1000,
        }
    }

    pub fn cluster(&self) -> &MemoryCluster {
        &self.cluster
    }

    fn fault(&self, op: FaultOp, key: &str) -> Result<(), ObjectStoreError> {
        match self.cluster.take_fault(op, key) {
            Some(kind) => Err(kind.to_error(&format!("{}/{}", self.account, key))),
            None => Ok(()),
        }
    }

    async fn copy_inner(
        &self,
        source: &CopySource,
        container: &str,
        key: &str,
    ) -> Result<CopyReceipt, ObjectStoreError> {
        let delay = self.cluster.copy_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.fault(FaultOp::Copy, &source.key)?;

        let source_account = source.account.as_deref().unwrap_or(&self.account);
        let etag = self.cluster.next_etag();
        let mut accounts = self.cluster.accounts()?;

        let object = accounts
            .get(source_account)
            .and_then(|c| c.get(&source.container))
            .ok_or_else(|| ObjectStoreError::ContainerNotFound {
                container: source.container.clone(),
            })?
            .get(&source.key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound {
                key: source.key.clone(),
            })?;

        let destination = accounts
            .get_mut(&self.account)
            .and_then(|c| c.get_mut(container))
            .ok_or_else(|| ObjectStoreError::ContainerNotFound {
                container: container.to_string(),
            })?;

        if let Some(existing) = destination.get(key) {
            if existing.kind != object.kind {
                return Err(ObjectStoreError::InvalidInput(format!(
                    "cannot copy {} object over {} object {}",
                    object.kind, existing.kind, key
                )));
            }
        }

        let bytes_copied = object.data.len() as u64;
        destination.insert(
            key.to_string(),
            StoredObject {
                data: object.data,
                last_modified: Utc::now(),
                kind: object.kind,
                etag: etag.clone(),
            },
        );

        Ok(CopyReceipt {
            bytes_copied,
            etag: Some(etag),
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_objects_page(
        &self,
        container: &str,
        prefix: Option<&str>,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjectStoreError> {
        self.fault(FaultOp::List, cursor.unwrap_or(""))?;

        let accounts = self.cluster.accounts()?;
        let objects = accounts
            .get(&self.account)
            .and_then(|c| c.get(container))
            .ok_or_else(|| ObjectStoreError::ContainerNotFound {
                container: container.to_string(),
            })?;

        let lower = match cursor {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };
        let limit = max_keys.clamp(1, self.max_page_size);
        let prefix = prefix.unwrap_or("");

        let mut matching = objects
            .range::<String, _>((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectMeta {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
                kind: object.kind,
                etag: Some(object.etag.clone()),
            });

        let page: Vec<ObjectMeta> = matching.by_ref().take(limit).collect();
        let has_more = matching.next().is_some();
        let next_cursor = match page.last() {
            Some(last) if has_more => Some(last.key.clone()),
            _ => None,
        };

        Ok(ListPage {
            objects: page,
            next_cursor,
        })
    }

    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        self.fault(FaultOp::Head, key)?;

        let accounts = self.cluster.accounts()?;
        Ok(accounts
            .get(&self.account)
            .and_then(|c| c.get(container))
            .and_then(|objects| objects.get(key))
            .map(|object| ObjectMeta {
                key: key.to_string(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
                kind: object.kind,
                etag: Some(object.etag.clone()),
            }))
    }

    async fn copy_object(
        &self,
        source: &CopySource,
        container: &str,
        key: &str,
    ) -> Result<CopyReceipt, ObjectStoreError> {
        let inner = &self.cluster.inner;
        inner.copy_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = inner.copies_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner
            .max_copies_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let result = self.copy_inner(source, container, key).await;

        inner.copies_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn create_container_if_absent(&self, container: &str) -> Result<bool, ObjectStoreError> {
        self.fault(FaultOp::CreateContainer, container)?;

        let mut accounts = self.cluster.accounts()?;
        let containers = accounts.entry(self.account.clone()).or_default();
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    fn uri(&self, container: &str, key: &str) -> String {
        format!("mem://{}/{}/{}", self.account, container, key)
    }
}

crate::impl_from!(MemoryObjectStoreConfig => MemoryObjectStore);
crate::impl_box_from!(MemoryObjectStore => dyn ObjectStore);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn seeded() -> (MemoryCluster, MemoryObjectStore) {
        let cluster = MemoryCluster::new();
        for key in ["a/1", "a/2", "b/1", "b/2", "b/3"] {
            cluster.put_object("src", "data", key, key.as_bytes().to_vec(), at(100), BlobKind::Block);
        }
        let store = MemoryObjectStore::with_cluster(cluster.clone(), "src");
        (cluster, store)
    }

    #[tokio::test]
    async fn test_list_pages_are_stable_and_complete() -> anyhow::Result<()> {
        let (_, store) = seeded();

        let first = store.list_objects_page("data", None, None, 2).await?;
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("a/2"));

        let second = store
            .list_objects_page("data", None, first.next_cursor.as_deref(), 2)
            .await?;
        let third = store
            .list_objects_page("data", None, second.next_cursor.as_deref(), 2)
            .await?;
        assert_eq!(third.objects.len(), 1);
        assert!(third.next_cursor.is_none());

        let again = store
            .list_objects_page("data", None, first.next_cursor.as_deref(), 2)
            .await?;
        assert_eq!(again.objects, second.objects);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_with_prefix() -> anyhow::Result<()> {
        let (_, store) = seeded();
        let page = store.list_objects_page("data", Some("b/"), None, 10).await?;
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["b/1", "b/2", "b/3"]);
        assert!(page.next_cursor.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_missing_container() {
        let (_, store) = seeded();
        let result = store.list_objects_page("nope", None, None, 10).await;
        assert!(matches!(result, Err(ObjectStoreError::ContainerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_cross_account_copy() -> anyhow::Result<()> {
        let (cluster, _) = seeded();
        let dest = MemoryObjectStore::with_cluster(cluster.clone(), "dst");
        assert!(dest.create_container_if_absent("backup").await?);
        assert!(!dest.create_container_if_absent("backup").await?);

        let source = CopySource {
            account: Some("src".to_string()),
            container: "data".to_string(),
            key: "b/2".to_string(),
            size: 3,
            kind: BlobKind::Block,
        };
        let receipt = dest.copy_object(&source, "backup", "b/2").await?;
        assert_eq!(receipt.bytes_copied, 3);
        assert_eq!(
            cluster.get_object("dst", "backup", "b/2"),
            Some(Bytes::from_static(b"b/2"))
        );

        let meta = dest.head_object("backup", "b/2").await?.unwrap();
        assert!(meta.last_modified > at(100));
        assert_eq!(cluster.copy_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_fault_injection_times() -> anyhow::Result<()> {
        let (cluster, store) = seeded();
        cluster.inject_fault(Fault::new(FaultOp::Head, FaultKind::Timeout).on_key("a/1").times(2));

        assert!(matches!(
            store.head_object("data", "a/1").await,
            Err(ObjectStoreError::Timeout(_))
        ));
        assert!(store.head_object("data", "a/2").await?.is_some());
        assert!(store.head_object("data", "a/1").await.is_err());
        assert!(store.head_object("data", "a/1").await?.is_some());
        Ok(())
    }

    #[test]
    fn test_shared_cluster_by_name() {
        let a = MemoryObjectStore::new(MemoryObjectStoreConfig {
            account: "one".to_string(),
            cluster: "memory-store-shared-test".to_string(),
            ..Default::default()
        });
        a.cluster().create_container("one", "c");

        let b = MemoryCluster::shared("memory-store-shared-test");
        assert!(b.container_exists("one", "c"));
    }
}
