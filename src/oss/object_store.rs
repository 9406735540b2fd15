use async_trait::async_trait;

use crate::oss::{CopyReceipt, CopySource, ListPage, ObjectMeta, ObjectStoreError};

/// 对象存储统一接口
///
/// 一个实例对应一个存储账号，容器（bucket）作为参数传入，
/// 这样同一账号下的源容器和目标容器可以共享同一个客户端。
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 列举一页对象
    ///
    /// 递归列举 `prefix` 下的所有对象（不使用分隔符）。
    /// `cursor` 为上一页返回的 `next_cursor`，首页传 `None`。
    async fn list_objects_page(
        &self,
        container: &str,
        prefix: Option<&str>,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjectStoreError>;

    /// 获取对象元数据
    ///
    /// 返回 `Ok(Some(ObjectMeta))` 如果对象存在
    /// 返回 `Ok(None)` 如果对象不存在
    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, ObjectStoreError>;

    /// 服务端复制：数据不经过调用方
    async fn copy_object(
        &self,
        source: &CopySource,
        container: &str,
        key: &str,
    ) -> Result<CopyReceipt, ObjectStoreError>;

    /// 容器不存在时创建，返回是否新建
    async fn create_container_if_absent(&self, container: &str) -> Result<bool, ObjectStoreError>;

    /// 对象的 URI，用于日志
    fn uri(&self, container: &str, key: &str) -> String;
}
