use crate::build::bundle::Manifest;
use crate::build::error::BuildError;
use crate::build::task::{
    ExtraPayload, PagePayload, PageTemplate, RedirectPayload, Task, TaskKind, TaskPayload,
};
use crate::config::{BuildConfig, RedirectRule};
use crate::plugin::PluginRegistry;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

/// 未配置 `[template] file` 时使用的页面模板
pub const DEFAULT_PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{ site.language }}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{% if page.title %}{{ page.title }} | {% endif %}{{ site.title }}</title>
{%- for href in css_files %}
  <link rel="stylesheet" href="{{ href }}">
{%- endfor %}
</head>
<body>
  <main>
{{ content | safe }}
  </main>
{%- for src in js_files %}
  <script src="{{ src }}"></script>
{%- endfor %}
</body>
</html>
"#;

/// 将打包产物和站点配置转换为有序任务列表：extra → page → redirect
///
/// 插件 hook 出错时整个规划失败，不产出部分任务。
pub fn plan(
    manifest: &Manifest,
    config: &BuildConfig,
    plugins: &PluginRegistry,
) -> Result<Vec<Task>, BuildError> {
    let mut ids = IdAllocator::default();
    let mut tasks = Vec::new();

    for provider in plugins.providers() {
        let extras = provider
            .generate(&manifest.path_index, config)
            .map_err(|e| BuildError::Planning(e.to_string()))?;
        for extra in extras {
            let id = ids.next(TaskKind::Extra, &extra.path);
            let destination = join_within(&config.output_dir, extra.path.trim_start_matches('/'))
                .ok_or_else(|| escaped(&id, &extra.path))?;
            tasks.push(Task {
                id,
                destination,
                payload: TaskPayload::Extra(ExtraPayload {
                    plugin: provider.name().to_string(),
                    bytes: extra.content,
                }),
            });
        }
    }

    let template = page_template(manifest, config)?;
    for path in manifest.path_index.keys() {
        let id = ids.next(TaskKind::Page, path);
        let destination =
            destination_for(&config.output_dir, path).ok_or_else(|| escaped(&id, path))?;
        tasks.push(Task {
            id,
            destination,
            payload: TaskPayload::Page(PagePayload {
                path: path.clone(),
                renderer_entry: manifest.renderer_entry.clone(),
                template: template.clone(),
            }),
        });
    }

    for rule in &config.redirects {
        let id = ids.next(TaskKind::Redirect, &rule.from);
        let destination = destination_for(&config.output_dir, &rule.from)
            .ok_or_else(|| escaped(&id, &rule.from))?;
        tasks.push(Task {
            id,
            destination,
            payload: TaskPayload::Redirect(RedirectPayload {
                from: rule.from.clone(),
                to: rule.to.clone(),
                bytes: redirect_html(rule).into_bytes(),
            }),
        });
    }

    warn_collisions(&tasks);

    tracing::info!(
        "规划了 {} 个任务（extra {}，page {}，redirect {}）",
        tasks.len(),
        tasks.iter().filter(|t| t.kind() == TaskKind::Extra).count(),
        manifest.path_index.len(),
        config.redirects.len()
    );

    Ok(tasks)
}

/// 读取页面模板并把资源路径解析为公共路径
fn page_template(manifest: &Manifest, config: &BuildConfig) -> Result<PageTemplate, BuildError> {
    let source = match &config.template.file {
        Some(file) => {
            let path = config.project_root.join(file);
            std::fs::read_to_string(&path).map_err(|e| {
                BuildError::Planning(format!("读取页面模板 {} 失败：{e}", path.display()))
            })?
        }
        None => DEFAULT_PAGE_TEMPLATE.to_string(),
    };

    let public_path = &config.bundle.public_path;
    let to_url = |asset: &PathBuf| {
        let name = asset
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{public_path}/{name}")
    };

    Ok(PageTemplate {
        source,
        css_files: manifest.css_assets.iter().map(to_url).collect(),
        js_files: manifest.js_assets.iter().map(to_url).collect(),
        context: config.template.context.clone(),
    })
}

/// 逻辑路径 → 输出文件：`/` 与目录式路径写入 index.html，带扩展名的保持原样
///
/// 路径落在输出目录之外时返回 `None`。
pub fn destination_for(output_dir: &Path, logical_path: &str) -> Option<PathBuf> {
    let trimmed = logical_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Some(output_dir.join("index.html"));
    }
    let has_extension = !logical_path.ends_with('/')
        && Path::new(trimmed).extension().is_some();
    let base = join_within(output_dir, trimmed.trim_end_matches('/'))?;
    if has_extension {
        Some(base)
    } else {
        Some(base.join("index.html"))
    }
}

/// 逐段拼接到输出目录下；含 `..`、根、盘符前缀或没有任何有效段时返回 `None`
fn join_within(output_dir: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = output_dir.to_path_buf();
    let mut segments = 0;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(segment) => {
                joined.push(segment);
                segments += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (segments > 0).then_some(joined)
}

fn escaped(task_id: &str, path: &str) -> BuildError {
    BuildError::Planning(format!("任务 {task_id} 的输出路径 {path} 不在输出目录内"))
}

fn redirect_html(rule: &RedirectRule) -> String {
    let to = html_escape(&rule.to);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  \
         <meta http-equiv=\"refresh\" content=\"0; url={to}\">\n  \
         <link rel=\"canonical\" href=\"{to}\">\n  <title>Redirecting…</title>\n</head>\n\
         <body>\n  <a href=\"{to}\">{to}</a>\n</body>\n</html>\n"
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 相同输出路径按调度顺序后写覆盖，这里只提示
fn warn_collisions(tasks: &[Task]) {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(&task.destination) {
            tracing::warn!(
                "任务 {} 的输出路径 {} 与其他任务重复，将以后完成者为准",
                task.id,
                task.destination.display()
            );
        }
    }
}

/// 生成 `kind:label` 形式的任务 ID，重复时追加 `#n`
#[derive(Default)]
struct IdAllocator {
    counts: HashMap<String, usize>,
}

impl IdAllocator {
    fn next(&mut self, kind: TaskKind, label: &str) -> String {
        let base = format!("{kind}:{label}");
        let count = self.counts.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}#{count}")
        }
    }
}
