pub mod lua;
pub mod redirects;
pub mod sandbox;
pub mod sitemap;

use crate::build::bundle::PathIndex;
use crate::config::{BuildConfig, ConfigError, PluginDescriptor, PluginKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("插件 {plugin} 加载失败：{reason}")]
    Load { plugin: String, reason: String },

    #[error("插件 {plugin} 的 extra hook 执行失败：{reason}")]
    Hook { plugin: String, reason: String },
}

/// 内置插件名，`kind = "builtin"` 时只接受这些
pub const BUILTIN_PLUGINS: &[&str] = &[sitemap::NAME, redirects::NAME];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_PLUGINS.contains(&name)
}

/// 插件生成的附加文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraAsset {
    /// 相对输出目录的路径
    pub path: String,
    pub content: Vec<u8>,
}

/// 插件的 extra 能力：根据路径索引生成附加文件
pub trait ExtraAssetProvider {
    fn name(&self) -> &str;

    fn generate(
        &self,
        paths: &PathIndex,
        config: &BuildConfig,
    ) -> Result<Vec<ExtraAsset>, PluginError>;
}

/// 已注册的 extra 插件，按声明顺序排列
#[derive(Default)]
pub struct PluginRegistry {
    providers: Vec<Box<dyn ExtraAssetProvider>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置中的插件声明构建注册表
    pub fn from_config(config: &BuildConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for descriptor in &config.plugins {
            registry.register(load_provider(descriptor, config)?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Box<dyn ExtraAssetProvider>) {
        tracing::debug!("注册 extra 插件：{}", provider.name());
        self.providers.push(provider);
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn ExtraAssetProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn load_provider(
    descriptor: &PluginDescriptor,
    config: &BuildConfig,
) -> Result<Box<dyn ExtraAssetProvider>, ConfigError> {
    match descriptor.kind {
        PluginKind::Builtin => match descriptor.name.as_str() {
            sitemap::NAME => Ok(Box::new(sitemap::SitemapPlugin::from_options(&descriptor.options))),
            redirects::NAME => Ok(Box::new(redirects::RedirectsManifestPlugin)),
            other => Err(ConfigError::UnknownPlugin(other.to_string())),
        },
        PluginKind::Lua => Ok(Box::new(lua::LuaPlugin::new(
            &config.project_root,
            &descriptor.name,
            descriptor.options.clone(),
        ))),
    }
}
