//! 组件注册相关的宏
//!
//! 注册表要求实现类型提供 `From<Config>`，以及 `Box<T>` 到 `Box<dyn Trait>` 的转换，
//! 这里的宏用于消除这两类样板代码。

/// 为配置类型实现 `From<Config> for T`，调用 `Type::new(config)`
///
/// 构造可能失败的类型不使用这个宏，改用 `register_trait_fallible` 注册。
#[macro_export]
macro_rules! impl_from {
    ($config_type:ty => $target_type:ty) => {
        impl From<$config_type> for $target_type {
            fn from(config: $config_type) -> Self {
                <$target_type>::new(config)
            }
        }
    };
}

/// 实现 `Box<T>` 到 `Box<dyn Trait>` 的转换
///
/// 用法：`impl_box_from!(Type => dyn TraitName)`
#[macro_export]
macro_rules! impl_box_from {
    ($source_type:ty => dyn $trait_name:path) => {
        impl From<Box<$source_type>> for Box<dyn $trait_name> {
            fn from(source: Box<$source_type>) -> Self {
                source as Box<dyn $trait_name>
            }
        }
    };
}

#[cfg(test)]
mod tests {
    struct LabelConfig {
        label: String,
    }

    struct Label {
        text: String,
    }

    impl Label {
        fn new(config: LabelConfig) -> Self {
            Self { text: config.label }
        }
    }

    trait Named {
        fn name(&self) -> &str;
    }

    impl Named for Label {
        fn name(&self) -> &str {
            &self.text
        }
    }

    impl_from!(LabelConfig => Label);
    impl_box_from!(Label => dyn Named);

    #[test]
    fn test_impl_from_and_box_from() {
        let label = Label::from(LabelConfig {
            label: "dest".to_string(),
        });
        let named: Box<dyn Named> = Box::new(label).into();
        assert_eq!(named.name(), "dest");
    }
}
