//! cfg 模块 - 配置管理
//!
//! - `TypeOptions`：以 `{type, options}` 描述可插拔组件
//! - 注册表：按名称从 `TypeOptions` 构造 trait object
//! - `HumanDur`：人类可读的时间格式
//! - 配置文件加载（YAML / JSON5 / TOML，支持环境变量展开）

pub mod loader;
pub mod macros;
pub mod registry;
pub mod serde_duration;
pub mod type_options;

pub use loader::{expand_env_vars, expand_path, load_config, parse_config};
pub use registry::{create_trait_from_type_options, register_trait, register_trait_fallible};
pub use serde_duration::{format_duration, parse_duration, HumanDur};
pub use type_options::TypeOptions;
