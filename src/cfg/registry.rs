// Trait 注册表：按名称从 TypeOptions 构造 trait object

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::RwLock;

use super::type_options::TypeOptions;

// 构造函数返回 Box<dyn Any>，其内部实际是 Box<dyn Trait>
type TraitConstructor =
    Box<dyn Fn(JsonValue) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

// 外层 key 是 Trait 的 TypeId，内层 key 是实现名称
static TRAIT_REGISTRY: Lazy<RwLock<HashMap<TypeId, HashMap<String, TraitConstructor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// 为实现某个 Trait 的类型注册构造函数
///
/// 实现类型需要提供 `From<Config>`，配置从 `TypeOptions::options` 反序列化得到。
/// 构造本身可能失败（如 S3 客户端初始化），因此 `From` 实现内部的失败会以 panic 的形式暴露，
/// 需要可恢复错误的实现应使用 [`register_trait_fallible`]。
///
/// # 示例
/// ```ignore
/// register_trait::<TextFormatter, dyn LogFormatter, TextFormatterConfig>("TextFormatter")?;
/// let formatter: Box<dyn LogFormatter> = create_trait_from_type_options(&options)?;
/// ```
pub fn register_trait<T, Trait, Config>(type_name: &str) -> Result<()>
where
    T: Send + Sync + 'static,
    Trait: ?Sized + Send + Sync + 'static,
    Config: DeserializeOwned + Send + Sync + 'static,
    T: From<Config>,
    Box<T>: Into<Box<Trait>>,
{
    register_trait_fallible::<T, Trait, Config, _>(type_name, |config| Ok(T::from(config)))
}

/// 注册一个可能失败的构造函数
pub fn register_trait_fallible<T, Trait, Config, F>(type_name: &str, build: F) -> Result<()>
where
    T: Send + Sync + 'static,
    Trait: ?Sized + Send + Sync + 'static,
    Config: DeserializeOwned + Send + Sync + 'static,
    F: Fn(Config) -> Result<T> + Send + Sync + 'static,
    Box<T>: Into<Box<Trait>>,
{
    let constructor: TraitConstructor = Box::new(move |value| {
        let config: Config = serde_json::from_value(value)?;
        let trait_object: Box<Trait> = Box::new(build(config)?).into();
        Ok(Box::new(trait_object) as Box<dyn Any + Send + Sync>)
    });

    let mut registry = TRAIT_REGISTRY
        .write()
        .map_err(|_| anyhow!("trait registry lock poisoned"))?;
    registry
        .entry(TypeId::of::<Trait>())
        .or_default()
        .insert(type_name.to_string(), constructor);

    Ok(())
}

/// 根据 TypeOptions 创建 trait object
pub fn create_trait_from_type_options<Trait>(type_options: &TypeOptions) -> Result<Box<Trait>>
where
    Trait: ?Sized + Send + Sync + 'static,
{
    let registry = TRAIT_REGISTRY
        .read()
        .map_err(|_| anyhow!("trait registry lock poisoned"))?;

    let constructor = registry
        .get(&TypeId::of::<Trait>())
        .and_then(|implementations| implementations.get(&type_options.type_name))
        .ok_or_else(|| anyhow!("type '{}' is not registered", type_options.type_name))?;

    constructor(type_options.options.clone())?
        .downcast::<Box<Trait>>()
        .map(|boxed| *boxed)
        .map_err(|_| anyhow!("'{}' does not build the requested trait", type_options.type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Deserialize)]
    struct PoliteConfig {
        name: String,
    }

    struct Polite {
        name: String,
    }

    impl From<PoliteConfig> for Polite {
        fn from(config: PoliteConfig) -> Self {
            Self { name: config.name }
        }
    }

    impl Greeter for Polite {
        fn greet(&self) -> String {
            format!("hello, {}", self.name)
        }
    }

    crate::impl_box_from!(Polite => dyn Greeter);

    #[test]
    fn test_register_and_create() -> Result<()> {
        register_trait::<Polite, dyn Greeter, PoliteConfig>("Polite")?;

        let options = TypeOptions::from_json(r#"{ type: "Polite", options: { name: "bob" } }"#)?;
        let greeter: Box<dyn Greeter> = create_trait_from_type_options(&options)?;
        assert_eq!(greeter.greet(), "hello, bob");
        Ok(())
    }

    #[test]
    fn test_fallible_constructor_error_is_returned() -> Result<()> {
        register_trait_fallible::<Polite, dyn Greeter, PoliteConfig, _>("Picky", |config| {
            if config.name.is_empty() {
                Err(anyhow!("name required"))
            } else {
                Ok(Polite::from(config))
            }
        })?;

        let options = TypeOptions::from_json(r#"{ type: "Picky", options: { name: "" } }"#)?;
        let result = create_trait_from_type_options::<dyn Greeter>(&options);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_type() {
        let options = TypeOptions::from_json(r#"{ type: "Nobody" }"#).unwrap();
        assert!(create_trait_from_type_options::<dyn Greeter>(&options).is_err());
    }
}
