pub mod content;
pub mod markdown;
pub mod styles;

use crate::build::bundle::{CompileOutput, Compiler, PageMeta, SITE_BUNDLE_FILE, SiteBundle};
use crate::build::error::CompilationError;
use crate::config::BuildConfig;
use std::path::Path;

/// 内置编译器：Markdown 内容、SCSS 样式和脚本 → 输出目录 + 渲染器 bundle
#[derive(Debug, Default)]
pub struct SiteCompiler;

impl SiteCompiler {
    pub fn new() -> Self {
        Self
    }

    fn compile_content(
        &self,
        content_dir: &Path,
        site: &mut SiteBundle,
        errors: &mut Vec<String>,
    ) -> Result<(), CompilationError> {
        let files = content::scan(content_dir).map_err(internal)?;

        for rel in files {
            let raw = std::fs::read_to_string(content_dir.join(&rel)).map_err(internal)?;
            let parsed = content::parse_content(&raw);
            let fm = parsed.front_matter;
            let source = rel.to_string_lossy().replace('\\', "/");

            if fm.draft.unwrap_or(false) {
                tracing::debug!("跳过草稿：{source}");
                continue;
            }

            let date = match fm.date.as_deref() {
                Some(raw) => match content::normalize_date(raw) {
                    Some(d) => Some(d),
                    None => {
                        errors.push(format!("{source}: 无法解析日期 {raw}"));
                        continue;
                    }
                },
                None => None,
            };

            let path = match fm.path.as_deref() {
                Some(p) => content::normalize_path(p),
                None => content::logical_path(&rel),
            };
            if let Some(existing) = site.paths.get(&path) {
                errors.push(format!(
                    "{source}: 路径 {path} 已被 {} 占用",
                    existing.source
                ));
                continue;
            }

            let title = fm.title.unwrap_or_else(|| {
                rel.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

            site.bodies.insert(path.clone(), markdown::render(&parsed.body));
            site.paths.insert(
                path,
                PageMeta {
                    title,
                    source,
                    date,
                    extra: fm.extra.into_iter().collect(),
                },
            );
        }
        Ok(())
    }
}

impl Compiler for SiteCompiler {
    fn compile(&self, config: &BuildConfig) -> Result<CompileOutput, CompilationError> {
        let output_dir = &config.output_dir;
        std::fs::create_dir_all(output_dir).map_err(internal)?;

        let mut out = CompileOutput::default();
        let mut site = SiteBundle::default();
        self.compile_content(&config.content_dir, &mut site, &mut out.errors)?;

        let styles_dir = config.project_root.join(&config.bundle.styles_dir);
        let scripts_dir = config.project_root.join(&config.bundle.scripts_dir);

        match styles::compile_scss(&styles_dir, output_dir).map_err(internal)? {
            Ok(Some(asset)) => out.assets.push(asset),
            Ok(None) => {}
            Err(reported) => out.errors.push(reported),
        }
        out.assets
            .extend(styles::copy_with_ext(&styles_dir, output_dir, "css").map_err(internal)?);
        out.assets
            .extend(styles::copy_with_ext(&scripts_dir, output_dir, "js").map_err(internal)?);

        if !out.errors.is_empty() {
            return Ok(out);
        }

        site.write(&output_dir.join(SITE_BUNDLE_FILE))
            .map_err(internal)?;
        tracing::info!("已编译 {} 个页面", site.paths.len());
        Ok(out)
    }
}

fn internal(e: std::io::Error) -> CompilationError {
    CompilationError::Internal(e.to_string())
}
