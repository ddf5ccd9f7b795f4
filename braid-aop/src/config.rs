//! 代理配置
//!
//! 配置可以来自 TOML（`[aop]` 表）与环境变量，环境变量优先。
//!
//! ```toml
//! [aop]
//! expose-proxy = true
//! sort-by-precedence = true
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// 代理行为开关
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    /// 调用期间把代理发布给 [`crate::AopContext`]（默认：false）
    pub expose_proxy: bool,

    /// 顾问已按目标类型预先筛选，构建链时跳过类过滤（默认：false）
    pub pre_filtered: bool,

    /// 不在本地处理 `Advised` 自省操作（默认：false）
    pub opaque: bool,

    /// 冻结后不能再增删顾问（默认：false）
    pub frozen: bool,

    /// 构建代理时按优先级排序顾问（默认：true）
    pub sort_by_precedence: bool,

    /// 按 (操作, 目标类型) 缓存拦截器链（默认：true）
    pub cache_chains: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            expose_proxy: false,
            pre_filtered: false,
            opaque: false,
            frozen: false,
            sort_by_precedence: true,
            cache_chains: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    aop: ProxyConfig,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expose_proxy(mut self, expose: bool) -> Self {
        self.expose_proxy = expose;
        self
    }

    pub fn pre_filtered(mut self, pre_filtered: bool) -> Self {
        self.pre_filtered = pre_filtered;
        self
    }

    pub fn opaque(mut self, opaque: bool) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn sort_by_precedence(mut self, sort: bool) -> Self {
        self.sort_by_precedence = sort;
        self
    }

    pub fn cache_chains(mut self, cache: bool) -> Self {
        self.cache_chains = cache;
        self
    }

    /// 从 TOML 文本读取 `[aop]` 表；没有该表时使用默认值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).context("Failed to parse AOP configuration")?;
        Ok(file.aop)
    }

    /// 从 TOML 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid AOP configuration in {}", path.display()))
    }

    /// 用环境变量覆盖，例如前缀 `BRAID_AOP` 对应 `BRAID_AOP_EXPOSE_PROXY=true`
    pub fn apply_env(self, prefix: &str) -> Result<Self> {
        self.apply_vars(prefix, |key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flags: [(&str, &mut bool); 6] = [
            ("EXPOSE_PROXY", &mut self.expose_proxy),
            ("PRE_FILTERED", &mut self.pre_filtered),
            ("OPAQUE", &mut self.opaque),
            ("FROZEN", &mut self.frozen),
            ("SORT_BY_PRECEDENCE", &mut self.sort_by_precedence),
            ("CACHE_CHAINS", &mut self.cache_chains),
        ];

        for (suffix, flag) in flags {
            let key = format!("{}_{}", prefix, suffix);
            if let Some(raw) = lookup(&key) {
                *flag = parse_flag(&raw)
                    .with_context(|| format!("Invalid boolean in environment variable {}", key))?;
            }
        }

        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}
