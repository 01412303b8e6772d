use crate::build::bundle::PathIndex;
use crate::config::BuildConfig;
use crate::plugin::{ExtraAsset, ExtraAssetProvider, PluginError};
use std::collections::HashMap;

pub const NAME: &str = "sitemap";

/// 内置插件：为路径索引中的每个页面生成 sitemap.xml
pub struct SitemapPlugin {
    change_freq: String,
    priority: f64,
}

impl SitemapPlugin {
    pub fn from_options(options: &HashMap<String, serde_json::Value>) -> Self {
        Self {
            change_freq: options
                .get("change_freq")
                .and_then(|v| v.as_str())
                .unwrap_or("weekly")
                .to_string(),
            priority: options
                .get("priority")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.8),
        }
    }
}

impl ExtraAssetProvider for SitemapPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn generate(
        &self,
        paths: &PathIndex,
        config: &BuildConfig,
    ) -> Result<Vec<ExtraAsset>, PluginError> {
        let base = config.site.url.trim_end_matches('/');

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");

        for (path, meta) in paths {
            // 首页优先级固定为 1.0
            let priority = if path == "/" { 1.0 } else { self.priority };
            xml.push_str(&format!("  <url>\n    <loc>{}{}</loc>\n", base, xml_escape(path)));
            if let Some(date) = &meta.date {
                xml.push_str(&format!("    <lastmod>{}</lastmod>\n", xml_escape(date)));
            }
            xml.push_str(&format!(
                "    <changefreq>{}</changefreq>\n    <priority>{:.1}</priority>\n  </url>\n",
                self.change_freq, priority
            ));
        }

        xml.push_str("</urlset>\n");
        tracing::debug!("已生成 sitemap.xml（{} 个地址）", paths.len());

        Ok(vec![ExtraAsset {
            path: "sitemap.xml".into(),
            content: xml.into_bytes(),
        }])
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
