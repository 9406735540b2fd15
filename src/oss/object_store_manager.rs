//! 对象存储管理器
//!
//! 按账号名称解析并缓存 `ObjectStore` 实例。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cfg::{create_trait_from_type_options, TypeOptions};
use crate::oss::{register_object_store, ObjectStore, ObjectStoreError};

/// 对象存储管理器配置
///
/// ```yaml
/// accounts:
///   primary:
///     type: AwsS3ObjectStore
///     options:
///       region: us-west-2
///   backup:
///     type: AwsS3ObjectStore
///     options:
///       region: eu-west-1
///       access_key_id: ${BACKUP_AK}
///       secret_access_key: ${BACKUP_SK}
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ObjectStoreManagerConfig {
    /// 账号名称 -> 存储配置
    pub accounts: HashMap<String, TypeOptions>,
}

/// 对象存储管理器
///
/// - 首次访问某个账号时根据配置创建实例，之后复用
/// - 测试中可以通过 [`ObjectStoreManager::insert`] 直接注入实例
pub struct ObjectStoreManager {
    config: ObjectStoreManagerConfig,
    cache: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreManager {
    pub fn new(config: ObjectStoreManagerConfig) -> Self {
        register_object_store();

        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 直接注册一个账号的存储实例
    pub fn insert(&self, account: impl Into<String>, store: Arc<dyn ObjectStore>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(account.into(), store);
        }
    }

    /// 是否配置（或注入）了该账号
    pub fn has_account(&self, account: &str) -> bool {
        self.config.accounts.contains_key(account)
            || self
                .cache
                .lock()
                .map(|cache| cache.contains_key(account))
                .unwrap_or(false)
    }

    /// 获取账号对应的存储实例
    ///
    /// 未配置的账号返回 `UnknownAccount`，创建失败返回 `Configuration`
    pub fn get_store(&self, account: &str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| ObjectStoreError::Configuration("store cache lock poisoned".into()))?;

        if let Some(store) = cache.get(account) {
            return Ok(Arc::clone(store));
        }

        let options = self
            .config
            .accounts
            .get(account)
            .ok_or_else(|| ObjectStoreError::UnknownAccount(account.to_string()))?;

        let store: Box<dyn ObjectStore> = create_trait_from_type_options(options).map_err(|e| {
            ObjectStoreError::Configuration(format!("account '{}': {:#}", account, e))
        })?;
        let store: Arc<dyn ObjectStore> = Arc::from(store);

        cache.insert(account.to_string(), Arc::clone(&store));
        Ok(store)
    }
}
