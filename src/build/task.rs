use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Page,
    Redirect,
    Extra,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Page => "page",
            TaskKind::Redirect => "redirect",
            TaskKind::Extra => "extra",
        })
    }
}

/// 页面模板：模板源码和已解析为公共路径的资源引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTemplate {
    pub source: String,
    pub css_files: Vec<String>,
    pub js_files: Vec<String>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePayload {
    /// 逻辑路径，如 `/docs/intro/`
    pub path: String,
    /// 渲染器入口（中间 bundle 文件）
    pub renderer_entry: PathBuf,
    pub template: PageTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectPayload {
    pub from: String,
    pub to: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraPayload {
    pub plugin: String,
    pub bytes: Vec<u8>,
}

/// 任务负载，自包含，可跨 worker 传递
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskPayload {
    Page(PagePayload),
    Redirect(RedirectPayload),
    Extra(ExtraPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub payload: TaskPayload,
    pub destination: PathBuf,
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self.payload {
            TaskPayload::Page(_) => TaskKind::Page,
            TaskPayload::Redirect(_) => TaskKind::Redirect,
            TaskPayload::Extra(_) => TaskKind::Extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.outcome == TaskOutcome::Success
    }
}
