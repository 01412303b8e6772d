use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;

/// 构建日志事件，是编排核心唯一对外暴露的观测面
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LogEvent {
    TaskStart {
        task_id: String,
    },
    TaskEnd {
        task_id: String,
        ok: bool,
    },
    RunComplete {
        tasks: usize,
    },
    RunFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        reason: String,
    },
}

/// 外部注入的日志接收端，仅用于观测，不影响控制流
pub trait LogSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

/// 默认接收端：转发到 tracing
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        match event {
            LogEvent::TaskStart { task_id } => tracing::debug!("开始任务 {task_id}"),
            LogEvent::TaskEnd { task_id, ok: true } => tracing::debug!("完成任务 {task_id}"),
            LogEvent::TaskEnd { task_id, ok: false } => tracing::warn!("任务 {task_id} 失败"),
            LogEvent::RunComplete { tasks } => tracing::info!("全部任务完成，共 {tasks} 个"),
            LogEvent::RunFailed { task_id, reason } => match task_id {
                Some(id) => tracing::error!("构建失败（任务 {id}）：{reason}"),
                None => tracing::error!("构建失败：{reason}"),
            },
        }
    }
}

/// 每个事件输出一行 JSON
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl<W: Write + Send> LogSink for JsonLinesSink<W> {
    fn emit(&self, event: &LogEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{line}") {
            tracing::warn!("写入构建事件失败：{e}");
        }
    }
}

/// 记录全部事件，测试中用于断言调度行为
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                LogEvent::TaskStart { task_id } => Some(task_id.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl LogSink for RecordingSink {
    fn emit(&self, event: &LogEvent) {
        self.events.lock().push(event.clone());
    }
}
