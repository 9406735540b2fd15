//! oss 模块 - 对象存储
//!
//! `ObjectStore` 描述复制引擎需要的远程存储能力：分页列举、元数据、服务端复制、创建容器。
//! 内置 `AwsS3ObjectStore` 和 `MemoryObjectStore` 两个实现，通过 `ObjectStoreManager`
//! 按账号名称创建。

mod aws_s3_object_store;
mod error;
mod memory_object_store;
mod object_store;
mod object_store_manager;
mod object_store_types;

pub use aws_s3_object_store::{AwsS3ObjectStore, AwsS3ObjectStoreConfig, S3_MAX_KEYS};
pub use error::ObjectStoreError;
pub use memory_object_store::{
    Fault, FaultKind, FaultOp, MemoryCluster, MemoryObjectStore, MemoryObjectStoreConfig,
};
pub use object_store::ObjectStore;
pub use object_store_manager::{ObjectStoreManager, ObjectStoreManagerConfig};
pub use object_store_types::{BlobKind, CopyReceipt, CopySource, ListPage, ObjectMeta};

use crate::cfg::{register_trait, register_trait_fallible};
use std::sync::Once;

static REGISTER_ONCE: Once = Once::new();

/// 注册所有 ObjectStore 实现（只执行一次）
///
/// 注册后可以通过 `TypeOptions` 创建：
///
/// ```rust
/// use blobsync::cfg::{create_trait_from_type_options, TypeOptions};
/// use blobsync::oss::{register_object_store, ObjectStore};
///
/// register_object_store();
/// let options = TypeOptions::from_json(r#"{ type: "MemoryObjectStore", options: { account: "a" } }"#).unwrap();
/// let store: Box<dyn ObjectStore> = create_trait_from_type_options(&options).unwrap();
/// assert_eq!(store.uri("c", "k"), "mem://a/c/k");
/// ```
pub fn register_object_store() {
    REGISTER_ONCE.call_once(|| {
        // 只有 RwLock 中毒时才会失败，此时后续创建会返回未注册错误
        let _ = register_trait_fallible::<AwsS3ObjectStore, dyn ObjectStore, AwsS3ObjectStoreConfig, _>(
            "AwsS3ObjectStore",
            |config| Ok(AwsS3ObjectStore::new(config)?),
        );
        let _ = register_trait::<MemoryObjectStore, dyn ObjectStore, MemoryObjectStoreConfig>(
            "MemoryObjectStore",
        );
    });
}
