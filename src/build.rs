pub mod bundle;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod finalize;
pub mod pipeline;
pub mod plan;
pub mod task;

pub use error::BuildError;

use crate::compiler::SiteCompiler;
use crate::config::BuildConfig;
use crate::plugin::PluginRegistry;
use crate::render::BundleRenderer;
use anyhow::Result;
use dispatch::SiteExecutor;
use events::LogSink;
use pipeline::{BuildSummary, Pipeline};
use std::sync::Arc;

/// 构建运行参数
pub struct BuildParams<'a> {
    pub clean: bool,
    pub sink: &'a dyn LogSink,
}

pub fn run(config: &BuildConfig, params: BuildParams<'_>) -> Result<BuildSummary> {
    let output_dir = &config.output_dir;

    if params.clean && output_dir.exists() {
        std::fs::remove_dir_all(output_dir)?;
        tracing::info!("已清除输出目录：{}", output_dir.display());
    }

    let plugins = PluginRegistry::from_config(config)?;
    tracing::debug!("已加载 {} 个插件", plugins.len());

    let compiler = SiteCompiler::new();
    let renderer = Arc::new(BundleRenderer::new(config.site.clone()));
    let executor = Arc::new(SiteExecutor::new(renderer));

    let summary = Pipeline::new(config, &compiler, &plugins, executor, params.sink)
        .run()
        .into_result()?;
    Ok(summary)
}
