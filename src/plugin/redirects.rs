use crate::build::bundle::PathIndex;
use crate::config::BuildConfig;
use crate::plugin::{ExtraAsset, ExtraAssetProvider, PluginError};

pub const NAME: &str = "redirects-manifest";

/// 内置插件：把重定向规则汇总为 Netlify 风格的 `_redirects` 文件
pub struct RedirectsManifestPlugin;

impl ExtraAssetProvider for RedirectsManifestPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn generate(
        &self,
        _paths: &PathIndex,
        config: &BuildConfig,
    ) -> Result<Vec<ExtraAsset>, PluginError> {
        if config.redirects.is_empty() {
            return Ok(Vec::new());
        }

        let body: String = config
            .redirects
            .iter()
            .map(|r| format!("{} {} 301\n", r.from, r.to))
            .collect();

        Ok(vec![ExtraAsset {
            path: "_redirects".into(),
            content: body.into_bytes(),
        }])
    }
}
