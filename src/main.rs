use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod build;
mod check;
mod compiler;
mod config;
mod plugin;
mod render;

use build::events::{JsonLinesSink, LogSink, TracingSink};

#[derive(Parser)]
#[command(name = "sitepress", about = "静态站点构建器", version = long_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建静态站点
    Build {
        /// 项目根目录（默认当前目录）
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// 输出目录，覆盖配置文件
        #[arg(short, long)]
        output: Option<String>,

        /// 最大并行 worker 数，默认 CPU 核数
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// 构建前清空输出目录
        #[arg(long)]
        clean: bool,

        /// 以 JSON Lines 格式向 stdout 输出构建事件
        #[arg(long)]
        events_json: bool,
    },

    /// 检查项目完整性
    Check {
        /// 项目根目录（默认当前目录）
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let root = match &cli.command {
        Commands::Build { root, .. } | Commands::Check { root } => {
            root.canonicalize().unwrap_or_else(|_| root.clone())
        }
    };

    // 配置中的日志级别作为默认值，RUST_LOG 优先
    let default_level = config::SiteConfig::load(&root)
        .map(|c| c.log.level)
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            output,
            workers,
            clean,
            events_json,
            ..
        } => {
            let site_config = config::SiteConfig::load(&root)?;
            let build_config = config::resolve_config(
                site_config,
                config::ConfigOverrides {
                    project_root: root,
                    output_dir: output,
                    max_workers: workers,
                },
            )?;
            tracing::info!(
                "开始构建：输出到 {}，worker 上限 {}",
                build_config.output_dir.display(),
                build_config.max_workers
            );

            let sink: Box<dyn LogSink> = if events_json {
                Box::new(JsonLinesSink::new(std::io::stdout()))
            } else {
                Box::new(TracingSink)
            };

            if let Err(err) = build::run(
                &build_config,
                build::BuildParams {
                    clean,
                    sink: sink.as_ref(),
                },
            ) {
                if let Some(build_err) = err.downcast_ref::<build::BuildError>() {
                    tracing::error!(
                        kind = build_err.kind(),
                        task = build_err.task_id(),
                        "构建失败：{build_err}"
                    );
                }
                return Err(err);
            }
        }
        Commands::Check { .. } => {
            let result = check::run(&root);

            for w in &result.warnings {
                tracing::warn!("{w}");
            }
            for e in &result.errors {
                tracing::error!("{e}");
            }

            if result.errors.is_empty() {
                tracing::info!("检查通过（{} 个警告）", result.warnings.len());
            } else {
                anyhow::bail!(
                    "检查未通过：{} 个错误，{} 个警告",
                    result.errors.len(),
                    result.warnings.len()
                );
            }
        }
    }

    Ok(())
}

const fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\ncommit:  ",
        env!("SITEPRESS_GIT_COMMIT"),
        "\nbuild:   ",
        env!("SITEPRESS_BUILD_TIME"),
        "\ntarget:  ",
        env!("SITEPRESS_BUILD_TARGET"),
        "\nprofile: ",
        env!("SITEPRESS_BUILD_PROFILE"),
    )
}
