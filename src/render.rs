pub mod postprocess;

use crate::build::bundle::SiteBundle;
use crate::build::error::ManifestLoadError;
use crate::build::task::PagePayload;
use crate::config::SiteInfo;
use minijinja::Environment;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Bundle(#[from] ManifestLoadError),

    #[error("bundle 中不存在页面 {0}")]
    UnknownPage(String),

    #[error("模板渲染失败：{0}")]
    Template(#[from] minijinja::Error),
}

/// 页面渲染契约：在 worker 中调用，输入页面描述，输出文件内容
pub trait Renderer: Send + Sync {
    fn render_page(&self, page: &PagePayload) -> Result<Vec<u8>, RenderError>;
}

/// 从中间 bundle 读取页面正文，套用页面模板渲染
pub struct BundleRenderer {
    site: SiteInfo,
    bundles: Mutex<HashMap<PathBuf, Arc<SiteBundle>>>,
}

impl BundleRenderer {
    pub fn new(site: SiteInfo) -> Self {
        Self {
            site,
            bundles: Mutex::new(HashMap::new()),
        }
    }

    /// 每个 bundle 只加载一次
    fn bundle(&self, entry: &Path) -> Result<Arc<SiteBundle>, ManifestLoadError> {
        if let Some(bundle) = self.bundles.lock().get(entry) {
            return Ok(Arc::clone(bundle));
        }
        let loaded = Arc::new(SiteBundle::load(entry)?);
        self.bundles
            .lock()
            .insert(entry.to_path_buf(), Arc::clone(&loaded));
        Ok(loaded)
    }
}

impl Renderer for BundleRenderer {
    fn render_page(&self, page: &PagePayload) -> Result<Vec<u8>, RenderError> {
        let bundle = self.bundle(&page.renderer_entry)?;
        let meta = bundle
            .paths
            .get(&page.path)
            .ok_or_else(|| RenderError::UnknownPage(page.path.clone()))?;
        let body = bundle.bodies.get(&page.path).map(String::as_str).unwrap_or("");

        let env = Environment::new();
        let tmpl = env.template_from_str(&page.template.source)?;

        let mut ctx: serde_json::Map<String, serde_json::Value> = page
            .template
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ctx.insert("site".into(), serde_json::json!(self.site));
        ctx.insert(
            "page".into(),
            serde_json::json!({
                "path": page.path,
                "title": meta.title,
                "date": meta.date,
                "extra": meta.extra,
            }),
        );
        ctx.insert("content".into(), serde_json::json!(body));
        ctx.insert("css_files".into(), serde_json::json!(page.template.css_files));
        ctx.insert("js_files".into(), serde_json::json!(page.template.js_files));

        let html = tmpl.render(minijinja::Value::from_serialize(&ctx))?;
        Ok(postprocess::apply(html).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::bundle::tests::meta;
    use crate::build::plan::DEFAULT_PAGE_TEMPLATE;
    use crate::build::task::PageTemplate;
    use tempfile::TempDir;

    fn write_bundle(dir: &Path) -> PathBuf {
        let mut bundle = SiteBundle::default();
        let mut about = meta("About");
        about.date = Some("2024-02-01".into());
        bundle.paths.insert("/about/".into(), about);
        bundle
            .bodies
            .insert("/about/".into(), "<p>hello</p><img src=\"x.png\">".into());
        let entry = dir.join("site.bundle.json");
        bundle.write(&entry).unwrap();
        entry
    }

    fn payload(entry: PathBuf, path: &str, source: &str) -> PagePayload {
        PagePayload {
            path: path.into(),
            renderer_entry: entry,
            template: PageTemplate {
                source: source.into(),
                css_files: vec!["/main.css".into()],
                js_files: vec!["/app.js".into()],
                context: HashMap::from([("tagline".to_string(), serde_json::json!("fast"))]),
            },
        }
    }

    #[test]
    fn renders_default_template() {
        let dir = TempDir::new().unwrap();
        let entry = write_bundle(dir.path());
        let renderer = BundleRenderer::new(SiteInfo::default());

        let out = renderer
            .render_page(&payload(entry, "/about/", DEFAULT_PAGE_TEMPLATE))
            .unwrap();
        let html = String::from_utf8(out).unwrap();

        assert!(html.contains("<title>About | Untitled</title>"));
        assert!(html.contains("<link rel=\"stylesheet\" href=\"/main.css\">"));
        assert!(html.contains("<script src=\"/app.js\"></script>"));
        assert!(html.contains("<p>hello</p>"));
        assert!(html.contains("<img src=\"x.png\" loading=\"lazy\" decoding=\"async\">"));
    }

    #[test]
    fn exposes_custom_context_and_meta() {
        let dir = TempDir::new().unwrap();
        let entry = write_bundle(dir.path());
        let renderer = BundleRenderer::new(SiteInfo::default());

        let out = renderer
            .render_page(&payload(entry, "/about/", "{{ tagline }}|{{ page.date }}|{{ page.path }}"))
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "fast|2024-02-01|/about/");
    }

    #[test]
    fn unknown_page_and_bad_template_fail() {
        let dir = TempDir::new().unwrap();
        let entry = write_bundle(dir.path());
        let renderer = BundleRenderer::new(SiteInfo::default());

        let err = renderer
            .render_page(&payload(entry.clone(), "/missing/", "x"))
            .unwrap_err();
        assert!(matches!(err, RenderError::UnknownPage(p) if p == "/missing/"));

        let err = renderer
            .render_page(&payload(entry, "/about/", "{% for %}"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn missing_bundle_is_reported() {
        let dir = TempDir::new().unwrap();
        let renderer = BundleRenderer::new(SiteInfo::default());
        let err = renderer
            .render_page(&payload(dir.path().join("nope.json"), "/", "x"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Bundle(_)));
    }
}
