use crate::build::error::{BuildError, CompilationError, ManifestLoadError};
use crate::config::BuildConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 渲染器 bundle 在输出目录下的固定文件名
pub const SITE_BUNDLE_FILE: &str = "site.bundle.json";

/// 路径索引中单个页面的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub title: String,
    /// 源文件，相对内容目录
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// 逻辑路径 → 页面元数据，保持内容扫描顺序
pub type PathIndex = IndexMap<String, PageMeta>;

/// 中间渲染器 bundle：worker 通过它渲染页面
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SiteBundle {
    pub paths: PathIndex,
    /// 逻辑路径 → 正文 HTML
    pub bodies: IndexMap<String, String>,
}

impl SiteBundle {
    pub fn load(path: &Path) -> Result<Self, ManifestLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ManifestLoadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ManifestLoadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
    }
}

/// 编译器产出的单个资源文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedAsset {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct CompileOutput {
    pub assets: Vec<EmittedAsset>,
    /// 编译器报告的输入错误，非空即视为失败
    pub errors: Vec<String>,
}

/// 外部打包编译器
pub trait Compiler {
    fn compile(&self, config: &BuildConfig) -> Result<CompileOutput, CompilationError>;
}

/// 一次打包的全部产物
#[derive(Debug, Clone)]
pub struct Manifest {
    pub css_assets: Vec<PathBuf>,
    pub js_assets: Vec<PathBuf>,
    pub renderer_entry: PathBuf,
    pub path_index: PathIndex,
}

/// 调用编译器一次并加载产物清单，编译错误不重试
pub fn bundle(config: &BuildConfig, compiler: &dyn Compiler) -> Result<Manifest, BuildError> {
    let output = compiler.compile(config)?;

    if !output.errors.is_empty() {
        return Err(CompilationError::Reported {
            errors: output.errors,
        }
        .into());
    }

    let renderer_entry = config.output_dir.join(SITE_BUNDLE_FILE);
    let site = SiteBundle::load(&renderer_entry)?;

    let mut css_assets = Vec::new();
    let mut js_assets = Vec::new();
    for asset in output.assets {
        match asset.path.extension().and_then(|e| e.to_str()) {
            Some("css") => css_assets.push(asset.path),
            Some("js") => js_assets.push(asset.path),
            _ => tracing::debug!("忽略非样式/脚本资源：{}", asset.name),
        }
    }

    tracing::info!(
        "打包完成：{} 个页面，{} 个样式，{} 个脚本",
        site.paths.len(),
        css_assets.len(),
        js_assets.len()
    );

    Ok(Manifest {
        css_assets,
        js_assets,
        renderer_entry,
        path_index: site.paths,
    })
}
