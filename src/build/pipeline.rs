use crate::build::bundle::{Compiler, bundle};
use crate::build::dispatch::{Dispatcher, TaskExecutor};
use crate::build::error::BuildError;
use crate::build::events::{LogEvent, LogSink};
use crate::build::finalize::finalize;
use crate::build::plan::plan;
use crate::build::task::TaskKind;
use crate::config::BuildConfig;
use crate::plugin::PluginRegistry;
use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 单次构建的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    Bundling,
    Planning,
    Dispatching,
    Finalizing,
    Done,
    Failed,
}

/// 构建统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub pages: usize,
    pub redirects: usize,
    pub extras: usize,
    pub workers: usize,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn tasks(&self) -> usize {
        self.pages + self.redirects + self.extras
    }
}

#[derive(Debug)]
pub enum BuildOutcome {
    Done(BuildSummary),
    /// 输出已完整写出，只有中间 bundle 清理失败
    CleanupFailed {
        summary: BuildSummary,
        error: BuildError,
    },
    Failed {
        during: BuildPhase,
        error: BuildError,
    },
}

impl BuildOutcome {
    pub fn phase(&self) -> BuildPhase {
        match self {
            BuildOutcome::Done(_) | BuildOutcome::CleanupFailed { .. } => BuildPhase::Done,
            BuildOutcome::Failed { .. } => BuildPhase::Failed,
        }
    }

    pub fn into_result(self) -> Result<BuildSummary, BuildError> {
        match self {
            BuildOutcome::Done(summary) => Ok(summary),
            BuildOutcome::CleanupFailed { error, .. } | BuildOutcome::Failed { error, .. } => {
                Err(error)
            }
        }
    }
}

/// 构建管道：打包 → 规划 → 分发 → 收尾，阶段之间严格串行
pub struct Pipeline<'a> {
    config: &'a BuildConfig,
    compiler: &'a dyn Compiler,
    plugins: &'a PluginRegistry,
    executor: Arc<dyn TaskExecutor>,
    sink: &'a dyn LogSink,
    phase: Cell<BuildPhase>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a BuildConfig,
        compiler: &'a dyn Compiler,
        plugins: &'a PluginRegistry,
        executor: Arc<dyn TaskExecutor>,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            config,
            compiler,
            plugins,
            executor,
            sink,
            phase: Cell::new(BuildPhase::Idle),
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase.get()
    }

    fn enter(&self, next: BuildPhase) {
        tracing::debug!("构建阶段：{:?} → {:?}", self.phase.get(), next);
        self.phase.set(next);
    }

    fn fail(&self, error: BuildError) -> BuildOutcome {
        let during = self.phase.get();
        self.enter(BuildPhase::Failed);
        self.sink.emit(&LogEvent::RunFailed {
            task_id: error.task_id().map(str::to_string),
            reason: error.to_string(),
        });
        BuildOutcome::Failed { during, error }
    }

    pub fn run(&self) -> BuildOutcome {
        let start = Instant::now();

        self.enter(BuildPhase::Bundling);
        let manifest = match bundle(self.config, self.compiler) {
            Ok(m) => m,
            Err(e) => return self.fail(e),
        };

        self.enter(BuildPhase::Planning);
        let tasks = match plan(&manifest, self.config, self.plugins) {
            Ok(t) => t,
            Err(e) => return self.fail(e),
        };
        let mut summary = BuildSummary::default();
        for task in &tasks {
            match task.kind() {
                TaskKind::Page => summary.pages += 1,
                TaskKind::Redirect => summary.redirects += 1,
                TaskKind::Extra => summary.extras += 1,
            }
        }

        self.enter(BuildPhase::Dispatching);
        let dispatcher = Dispatcher::new(self.config.max_workers, Arc::clone(&self.executor), self.sink);
        match dispatcher.dispatch(tasks) {
            Ok(report) => summary.workers = report.workers,
            Err(e) => return self.fail(e),
        }
        self.sink.emit(&LogEvent::RunComplete {
            tasks: summary.tasks(),
        });

        self.enter(BuildPhase::Finalizing);
        let cleanup = finalize(&self.config.output_dir);
        self.enter(BuildPhase::Done);
        summary.elapsed = start.elapsed();

        match cleanup {
            Ok(()) => {
                tracing::info!(
                    "构建完成，耗时 {:.2}s（页面 {}，重定向 {}，附加文件 {}）",
                    summary.elapsed.as_secs_f64(),
                    summary.pages,
                    summary.redirects,
                    summary.extras,
                );
                BuildOutcome::Done(summary)
            }
            Err(error) => {
                tracing::warn!("输出已完成，但清理中间产物失败：{error}");
                BuildOutcome::CleanupFailed { summary, error }
            }
        }
    }
}
