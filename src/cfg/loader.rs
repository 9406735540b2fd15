// 配置文件加载：按扩展名选择解析器，并展开 ${VAR} 环境变量

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// 展开路径中的 `~`
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// 展开 `${VAR_NAME}` 形式的环境变量，未定义的变量保持原样
pub fn expand_env_vars(content: &str) -> String {
    // 正则是常量，编译失败只可能是代码错误
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// 按格式名解析配置内容
///
/// 支持 `json`（按 JSON5 解析）、`yaml`/`yml`、`toml`
pub fn parse_config<T: DeserializeOwned>(content: &str, format: &str) -> Result<T> {
    let content = expand_env_vars(content);
    match format {
        "json" | "json5" => Ok(json5::from_str(&content)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        "toml" => Ok(toml::from_str(&content)?),
        other => Err(anyhow!("unsupported config format: {}", other)),
    }
}

/// 从文件加载配置
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(anyhow!("config file not found: {}", path.display()));
    }

    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .ok_or_else(|| anyhow!("config file has no extension: {}", path.display()))?;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    parse_config(&content, &format)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}
