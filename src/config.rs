use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "sitepress.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取 {} 失败：{source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("解析 sitepress.toml 失败：{0}")]
    Parse(#[from] toml::de::Error),

    #[error("缺少输出目录配置")]
    MissingOutput,

    #[error("worker 数量必须至少为 1，当前为 {0}")]
    InvalidWorkers(usize),

    #[error("未知的内置插件：{0}")]
    UnknownPlugin(String),
}

/// sitepress.toml 完整结构
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteInfo,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub bundle: BundleSettings,
    #[serde(default)]
    pub template: TemplateSettings,
    #[serde(default)]
    pub redirects: Vec<RedirectRule>,
    #[serde(default)]
    pub plugins: Vec<PluginDescriptor>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
    /// 未配置时取 CPU 核数
    #[serde(default)]
    pub max_workers: Option<usize>,
}

/// 打包器子配置：资源入口和公共路径前缀
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSettings {
    #[serde(default)]
    pub public_path: String,
    #[serde(default = "default_styles_dir")]
    pub styles_dir: String,
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSettings {
    /// 页面模板文件，相对项目根目录；为空时使用内置模板
    #[serde(default)]
    pub file: Option<String>,
    /// 透传给模板的附加变量
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRule {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    #[default]
    Builtin,
    Lua,
}

/// [[plugins]] 单个插件声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: PluginKind,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl SiteConfig {
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let config_path = project_root.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// 命令行等外部来源的覆盖项
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project_root: PathBuf,
    pub output_dir: Option<String>,
    pub max_workers: Option<usize>,
}

/// 单次构建的只读配置，由 [`resolve_config`] 生成后在各阶段间共享
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    pub project_root: PathBuf,
    pub output_dir: PathBuf,
    pub content_dir: PathBuf,
    pub max_workers: usize,
    pub site: SiteInfo,
    pub bundle: BundleSettings,
    pub template: TemplateSettings,
    pub redirects: Vec<RedirectRule>,
    pub plugins: Vec<PluginDescriptor>,
}

/// 合并配置文件默认值与覆盖项，整个构建只调用一次
pub fn resolve_config(
    defaults: SiteConfig,
    overrides: ConfigOverrides,
) -> Result<BuildConfig, ConfigError> {
    let root = overrides.project_root;

    let output = overrides.output_dir.unwrap_or(defaults.build.output_dir);
    if output.trim().is_empty() {
        return Err(ConfigError::MissingOutput);
    }

    let max_workers = match overrides.max_workers.or(defaults.build.max_workers) {
        Some(0) => return Err(ConfigError::InvalidWorkers(0)),
        Some(n) => n,
        None => default_workers(),
    };

    Ok(BuildConfig {
        output_dir: root.join(output),
        content_dir: root.join(&defaults.build.content_dir),
        project_root: root,
        max_workers,
        site: defaults.site,
        bundle: defaults.bundle,
        template: defaults.template,
        redirects: defaults.redirects,
        plugins: defaults.plugins,
    })
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// 默认值函数
fn default_title() -> String { "Untitled".into() }
fn default_language() -> String { "zh-CN".into() }
fn default_output_dir() -> String { "public".into() }
fn default_content_dir() -> String { "content".into() }
fn default_styles_dir() -> String { "assets/scss".into() }
fn default_scripts_dir() -> String { "assets/js".into() }
fn default_log_level() -> String { "info".into() }

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: String::new(),
            url: String::new(),
            language: default_language(),
        }
    }
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            content_dir: default_content_dir(),
            max_workers: None,
        }
    }
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            public_path: String::new(),
            styles_dir: default_styles_dir(),
            scripts_dir: default_scripts_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(root: &str) -> ConfigOverrides {
        ConfigOverrides {
            project_root: PathBuf::from(root),
            ..Default::default()
        }
    }

    #[test]
    fn empty_file_uses_defaults() {
        let site = SiteConfig::parse("").unwrap();
        let config = resolve_config(site, overrides("/srv/site")).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/site/public"));
        assert_eq!(config.content_dir, PathBuf::from("/srv/site/content"));
        assert!(config.max_workers >= 1);
        assert!(config.redirects.is_empty());
    }

    #[test]
    fn overrides_win_over_file() {
        let site = SiteConfig::parse(
            r#"
            [build]
            output_dir = "dist"
            max_workers = 8
            "#,
        )
        .unwrap();
        let config = resolve_config(
            site,
            ConfigOverrides {
                project_root: PathBuf::from("/p"),
                output_dir: Some("out".into()),
                max_workers: Some(2),
            },
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/p/out"));
        assert_eq!(config.max_workers, 2);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let site = SiteConfig::parse("[build]\nmax_workers = 0\n").unwrap();
        let err = resolve_config(site, overrides("/p")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkers(0)));
    }

    #[test]
    fn negative_workers_fail_to_parse() {
        let err = SiteConfig::parse("[build]\nmax_workers = -3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn blank_output_is_rejected() {
        let site = SiteConfig::parse("[build]\noutput_dir = \"\"\n").unwrap();
        let err = resolve_config(site, overrides("/p")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOutput));
    }

    #[test]
    fn parses_redirects_and_plugins_in_order() {
        let site = SiteConfig::parse(
            r#"
            [[redirects]]
            from = "/old/"
            to = "/new/"

            [[plugins]]
            name = "sitemap"

            [[plugins]]
            name = "rss"
            kind = "lua"
            options = { limit = 10 }
            "#,
        )
        .unwrap();
        assert_eq!(site.redirects.len(), 1);
        assert_eq!(site.plugins[0].kind, PluginKind::Builtin);
        assert_eq!(site.plugins[1].name, "rss");
        assert_eq!(site.plugins[1].kind, PluginKind::Lua);
        assert_eq!(site.plugins[1].options["limit"], serde_json::json!(10));
    }
}
