use crate::build::error::{BuildError, TaskFailure};
use crate::build::events::{LogEvent, LogSink};
use crate::build::task::{Task, TaskOutcome, TaskPayload, TaskResult};
use crate::config::ConfigError;
use crate::render::Renderer;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

/// worker 中执行单个任务
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: &Task) -> Result<(), String>;
}

/// 默认执行器：页面交给渲染器，redirect/extra 直接写入已物化的内容
pub struct SiteExecutor {
    renderer: Arc<dyn Renderer>,
}

impl SiteExecutor {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

impl TaskExecutor for SiteExecutor {
    fn execute(&self, task: &Task) -> Result<(), String> {
        let bytes: Cow<'_, [u8]> = match &task.payload {
            TaskPayload::Page(page) => {
                Cow::Owned(self.renderer.render_page(page).map_err(|e| e.to_string())?)
            }
            TaskPayload::Redirect(redirect) => Cow::Borrowed(&redirect.bytes),
            TaskPayload::Extra(extra) => Cow::Borrowed(&extra.bytes),
        };
        write_output(&task.destination, &bytes)
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("创建目录 {} 失败：{e}", parent.display()))?;
    }
    std::fs::write(path, bytes).map_err(|e| format!("写入 {} 失败：{e}", path.display()))?;
    tracing::debug!("已写入：{}", path.display());
    Ok(())
}

/// 成功调度的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub admitted: usize,
    pub succeeded: usize,
    pub workers: usize,
}

/// 存活 worker 计数，worker 线程退出时减一
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 固定大小的 worker 池：每个 worker 一个容量为 1 的收件箱，共用一个结果通道
struct WorkerPool {
    inboxes: Vec<SyncSender<Task>>,
    handles: Vec<JoinHandle<()>>,
    results: Receiver<(usize, TaskResult)>,
}

impl WorkerPool {
    fn spawn(
        size: usize,
        executor: &Arc<dyn TaskExecutor>,
        live: &Arc<AtomicUsize>,
    ) -> std::io::Result<Self> {
        let (result_tx, results) = mpsc::channel();
        let mut pool = Self {
            inboxes: Vec::with_capacity(size),
            handles: Vec::with_capacity(size),
            results,
        };

        for index in 0..size {
            let (inbox_tx, inbox_rx) = mpsc::sync_channel::<Task>(1);
            let executor = Arc::clone(executor);
            let result_tx = result_tx.clone();
            let guard = LiveGuard::new(live);

            // 出错时 pool 被 drop，已启动的 worker 随之回收
            let handle = thread::Builder::new()
                .name(format!("sitepress-worker-{index}"))
                .spawn(move || worker_loop(index, inbox_rx, result_tx, executor, guard))?;

            pool.inboxes.push(inbox_tx);
            pool.handles.push(handle);
        }

        Ok(pool)
    }

    fn size(&self) -> usize {
        self.inboxes.len()
    }

    fn send(&self, worker: usize, task: Task) -> Result<(), Task> {
        self.inboxes[worker].send(task).map_err(|e| e.0)
    }

    /// 关闭收件箱并等待所有 worker 退出
    fn shutdown(&mut self) {
        self.inboxes.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker 线程异常退出");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    index: usize,
    inbox: Receiver<Task>,
    results: Sender<(usize, TaskResult)>,
    executor: Arc<dyn TaskExecutor>,
    _guard: LiveGuard,
) {
    while let Ok(task) = inbox.recv() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&task))) {
            Ok(Ok(())) => TaskOutcome::Success,
            Ok(Err(reason)) => TaskOutcome::Failure(reason),
            Err(payload) => TaskOutcome::Failure(format!("worker panic：{}", panic_message(&*payload))),
        };
        let result = TaskResult {
            task_id: task.id,
            outcome,
        };
        if results.send((index, result)).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown".to_string()
    }
}

/// 任务分发器：独占 worker 池，限制同时在途的任务数
pub struct Dispatcher<'a> {
    pool_size: usize,
    executor: Arc<dyn TaskExecutor>,
    sink: &'a dyn LogSink,
    live_workers: Arc<AtomicUsize>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(pool_size: usize, executor: Arc<dyn TaskExecutor>, sink: &'a dyn LogSink) -> Self {
        Self {
            pool_size,
            executor,
            sink,
            live_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 当前存活的 worker 数量
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// 按计划顺序分发任务
    ///
    /// 首个失败出现后不再接纳新任务，在途任务继续跑完，返回首个失败。
    /// 无论成败，返回前 worker 池都已回收。
    pub fn dispatch(&self, tasks: Vec<Task>) -> Result<DispatchReport, BuildError> {
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidWorkers(0).into());
        }
        if tasks.is_empty() {
            return Ok(DispatchReport::default());
        }

        let workers = self.pool_size.min(tasks.len());
        let mut pool = WorkerPool::spawn(workers, &self.executor, &self.live_workers)
            .map_err(BuildError::WorkerSpawn)?;
        tracing::info!("启动 {workers} 个 worker，共 {} 个任务", tasks.len());

        let mut pending = tasks.into_iter();
        let mut idle: VecDeque<usize> = (0..pool.size()).collect();
        let mut in_flight = 0usize;
        let mut report = DispatchReport {
            workers,
            ..Default::default()
        };
        let mut first_failure: Option<TaskFailure> = None;
        let mut pool_lost = false;

        loop {
            while first_failure.is_none() && !idle.is_empty() {
                let Some(task) = pending.next() else {
                    break;
                };
                let Some(worker) = idle.pop_front() else {
                    break;
                };
                self.sink.emit(&LogEvent::TaskStart {
                    task_id: task.id.clone(),
                });
                report.admitted += 1;
                match pool.send(worker, task) {
                    Ok(()) => in_flight += 1,
                    Err(task) => {
                        self.sink.emit(&LogEvent::TaskEnd {
                            task_id: task.id.clone(),
                            ok: false,
                        });
                        first_failure = Some(TaskFailure {
                            task_id: task.id,
                            reason: format!("worker {worker} 已退出"),
                        });
                    }
                }
            }

            if in_flight == 0 {
                break;
            }

            let Ok((worker, result)) = pool.results.recv() else {
                tracing::error!("worker 池意外断开，仍有 {in_flight} 个任务未返回");
                pool_lost = true;
                break;
            };
            in_flight -= 1;
            idle.push_back(worker);

            self.sink.emit(&LogEvent::TaskEnd {
                task_id: result.task_id.clone(),
                ok: result.is_success(),
            });

            match result.outcome {
                TaskOutcome::Success => report.succeeded += 1,
                TaskOutcome::Failure(reason) => {
                    if first_failure.is_none() {
                        tracing::error!("任务 {} 失败，停止接纳新任务：{reason}", result.task_id);
                        first_failure = Some(TaskFailure {
                            task_id: result.task_id,
                            reason,
                        });
                    } else {
                        tracing::warn!("在途任务 {} 也失败了：{reason}", result.task_id);
                    }
                }
            }
        }

        pool.shutdown();

        match first_failure {
            Some(failure) => Err(failure.into()),
            None if pool_lost => Err(BuildError::WorkerLost),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::events::RecordingSink;
    use crate::build::task::{ExtraPayload, PagePayload, PageTemplate};
    use crate::render::RenderError;
    use parking_lot::Mutex;
    use std::collections::{BTreeSet, HashSet};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn extra(id: &str, dest: PathBuf) -> Task {
        Task {
            id: id.into(),
            destination: dest,
            payload: TaskPayload::Extra(ExtraPayload {
                plugin: "test".into(),
                bytes: id.as_bytes().to_vec(),
            }),
        }
    }

    fn extras(dir: &Path, n: usize) -> Vec<Task> {
        (1..=n)
            .map(|i| extra(&format!("t{i}"), dir.join(format!("t{i}.txt"))))
            .collect()
    }

    /// 指定 ID 失败，其余写文件；记录最大并发数
    struct ScriptedExecutor {
        fail: HashSet<String>,
        panic_on: HashSet<String>,
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                fail: HashSet::new(),
                panic_on: HashSet::new(),
                delay: Duration::ZERO,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                order: Mutex::new(Vec::new()),
            }
        }

        fn failing(ids: &[&str]) -> Self {
            let mut ex = Self::new();
            ex.fail = ids.iter().map(|s| s.to_string()).collect();
            ex
        }
    }

    impl TaskExecutor for ScriptedExecutor {
        fn execute(&self, task: &Task) -> Result<(), String> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.order.lock().push(task.id.clone());
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on.contains(&task.id) {
                panic!("exploded on {}", task.id);
            }
            if self.fail.contains(&task.id) {
                return Err("render error".into());
            }
            let TaskPayload::Extra(extra) = &task.payload else {
                return Err("unexpected payload".into());
            };
            write_output(&task.destination, &extra.bytes)
        }
    }

    fn written(dir: &Path) -> BTreeSet<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn dispatch_order_does_not_change_output_set() {
        let dir = TempDir::new().unwrap();
        let forward = dir.path().join("forward");
        let backward = dir.path().join("backward");
        let sink = RecordingSink::default();

        let tasks = extras(&forward, 7);
        Dispatcher::new(3, Arc::new(ScriptedExecutor::new()), &sink)
            .dispatch(tasks)
            .unwrap();

        let mut tasks = extras(&backward, 7);
        tasks.reverse();
        tasks.swap(1, 4);
        Dispatcher::new(2, Arc::new(ScriptedExecutor::new()), &sink)
            .dispatch(tasks)
            .unwrap();

        assert_eq!(written(&forward).len(), 7);
        assert_eq!(written(&forward), written(&backward));
    }

    #[test]
    fn first_failure_stops_admission_with_single_worker() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let executor = Arc::new(ScriptedExecutor::failing(&["t3"]));
        let dispatcher = Dispatcher::new(1, executor.clone(), &sink);

        let err = dispatcher.dispatch(extras(dir.path(), 6)).unwrap_err();

        assert_eq!(err.task_id(), Some("t3"));
        assert_eq!(sink.started(), vec!["t1", "t2", "t3"]);
        assert_eq!(*executor.order.lock(), vec!["t1", "t2", "t3"]);
        assert_eq!(written(dir.path()).len(), 2);
    }

    #[test]
    fn in_flight_tasks_drain_after_failure() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let mut executor = ScriptedExecutor::failing(&["t1", "t2"]);
        executor.delay = Duration::from_millis(20);
        let executor = Arc::new(executor);

        let err = Dispatcher::new(3, executor.clone(), &sink)
            .dispatch(extras(dir.path(), 10))
            .unwrap_err();

        // 失败被观察到之前只可能接纳少量后续任务
        let started = sink.started();
        assert!(started.len() <= 3 + 2, "admitted too many: {started:?}");
        assert!(matches!(err, BuildError::Task(ref f) if f.reason == "render error"));

        let ended = sink
            .events()
            .iter()
            .filter(|e| matches!(e, LogEvent::TaskEnd { .. }))
            .count();
        assert_eq!(ended, started.len(), "every admitted task must report back");
    }

    #[test]
    fn never_exceeds_pool_size() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let mut executor = ScriptedExecutor::new();
        executor.delay = Duration::from_millis(5);
        let executor = Arc::new(executor);

        let report = Dispatcher::new(3, executor.clone(), &sink)
            .dispatch(extras(dir.path(), 12))
            .unwrap();

        assert_eq!(report.admitted, 12);
        assert_eq!(report.succeeded, 12);
        assert_eq!(report.workers, 3);
        assert!(executor.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn workers_are_gone_after_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();

        let ok = Dispatcher::new(4, Arc::new(ScriptedExecutor::new()), &sink);
        ok.dispatch(extras(&dir.path().join("ok"), 9)).unwrap();
        assert_eq!(ok.live_workers(), 0);

        let failing = Dispatcher::new(4, Arc::new(ScriptedExecutor::failing(&["t2"])), &sink);
        failing
            .dispatch(extras(&dir.path().join("bad"), 9))
            .unwrap_err();
        assert_eq!(failing.live_workers(), 0);
    }

    #[test]
    fn panicking_task_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let mut executor = ScriptedExecutor::new();
        executor.panic_on.insert("t2".into());
        let dispatcher = Dispatcher::new(1, Arc::new(executor), &sink);

        let err = dispatcher.dispatch(extras(dir.path(), 3)).unwrap_err();
        let BuildError::Task(failure) = err else {
            panic!("expected task failure");
        };
        assert_eq!(failure.task_id, "t2");
        assert!(failure.reason.contains("exploded on t2"));
        assert_eq!(dispatcher.live_workers(), 0);
    }

    #[test]
    fn zero_pool_is_config_error() {
        let sink = RecordingSink::default();
        let err = Dispatcher::new(0, Arc::new(ScriptedExecutor::new()), &sink)
            .dispatch(Vec::new())
            .unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn empty_plan_spawns_nothing() {
        let sink = RecordingSink::default();
        let report = Dispatcher::new(8, Arc::new(ScriptedExecutor::new()), &sink)
            .dispatch(Vec::new())
            .unwrap();
        assert_eq!(report, DispatchReport::default());
        assert!(sink.events().is_empty());
    }

    struct EchoRenderer;

    impl Renderer for EchoRenderer {
        fn render_page(&self, page: &PagePayload) -> Result<Vec<u8>, RenderError> {
            if page.path == "/bad/" {
                return Err(RenderError::UnknownPage(page.path.clone()));
            }
            Ok(format!("page {}", page.path).into_bytes())
        }
    }

    fn page(path: &str, dest: PathBuf) -> Task {
        Task {
            id: format!("page:{path}"),
            destination: dest,
            payload: TaskPayload::Page(PagePayload {
                path: path.into(),
                renderer_entry: PathBuf::from("site.bundle.json"),
                template: PageTemplate {
                    source: String::new(),
                    css_files: Vec::new(),
                    js_files: Vec::new(),
                    context: Default::default(),
                },
            }),
        }
    }

    #[test]
    fn site_executor_renders_pages_and_writes_bytes() {
        let dir = TempDir::new().unwrap();
        let executor = SiteExecutor::new(Arc::new(EchoRenderer));

        executor
            .execute(&page("/a/", dir.path().join("a/index.html")))
            .unwrap();
        executor
            .execute(&extra("robots", dir.path().join("robots.txt")))
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/index.html")).unwrap(),
            "page /a/"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("robots.txt")).unwrap(),
            "robots"
        );

        let err = executor
            .execute(&page("/bad/", dir.path().join("bad/index.html")))
            .unwrap_err();
        assert!(err.contains("/bad/"));
        assert!(!dir.path().join("bad/index.html").exists());
    }
}
