use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// 打包器报告的编译失败
#[derive(Debug, Error)]
pub enum CompilationError {
    /// 编译器自身出错（IO、内部错误等）
    #[error("打包器内部错误：{0}")]
    Internal(String),

    /// 编译器正常结束但报告了输入错误
    #[error("编译失败（{} 个错误）：\n{}", errors.len(), errors.join("\n"))]
    Reported { errors: Vec<String> },
}

/// 编译成功后找不到或无法解析约定的产物
#[derive(Debug, Error)]
#[error("加载 {} 失败：{reason}", .path.display())]
pub struct ManifestLoadError {
    pub path: PathBuf,
    pub reason: String,
}

/// 单个任务的失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("任务 {task_id} 失败：{reason}")]
pub struct TaskFailure {
    pub task_id: String,
    pub reason: String,
}

/// 构建过程中任一阶段的失败
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    ManifestLoad(#[from] ManifestLoadError),

    #[error("任务规划失败：{0}")]
    Planning(String),

    #[error("启动 worker 失败：{0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("worker 池在任务完成前断开")]
    WorkerLost,

    #[error(transparent)]
    Task(#[from] TaskFailure),

    #[error("清理中间产物 {} 失败：{source}", path.display())]
    Finalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BuildError {
    /// 稳定的错误类别名，用于日志和退出信息
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::Config(_) => "config",
            BuildError::Compilation(_) => "compilation",
            BuildError::ManifestLoad(_) => "manifest-load",
            BuildError::Planning(_) => "planning",
            BuildError::WorkerSpawn(_) | BuildError::WorkerLost => "worker-pool",
            BuildError::Task(_) => "task",
            BuildError::Finalize { .. } => "finalize",
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            BuildError::Task(failure) => Some(&failure.task_id),
            _ => None,
        }
    }
}
