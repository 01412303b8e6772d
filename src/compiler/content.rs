use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub date: Option<String>,
    pub draft: Option<bool>,
    /// 覆盖由文件位置推导的逻辑路径
    pub path: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

pub struct ParsedContent {
    pub front_matter: FrontMatter,
    pub body: String,
}

/// 分离 Front Matter 与正文，Front Matter 无法解析时整体当正文处理
pub fn parse_content(content: &str) -> ParsedContent {
    let matter = gray_matter::Matter::<gray_matter::engine::YAML>::new();
    match matter.parse_with_struct::<FrontMatter>(content) {
        Some(parsed) => ParsedContent {
            front_matter: parsed.data,
            body: parsed.content,
        },
        None => ParsedContent {
            front_matter: FrontMatter::default(),
            body: matter.parse(content).content,
        },
    }
}

/// 递归收集内容目录下的 Markdown 文件，按相对路径排序
pub fn scan(content_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if content_dir.is_dir() {
        collect(content_dir, content_dir, &mut files)?;
    } else {
        tracing::warn!("内容目录不存在：{}", content_dir.display());
    }
    files.sort();
    Ok(files)
}

fn collect(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(base, &path, out)?;
        } else if path.extension().is_some_and(|e| e == "md" || e == "markdown") {
            if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

/// 相对路径 → 逻辑路径：index.md → /，foo/index.md → /foo/，foo/bar.md → /foo/bar/
pub fn logical_path(rel: &Path) -> String {
    let mut segments: Vec<String> = rel
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    let stem = rel
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem != "index" {
        segments.push(stem);
    }

    if segments.is_empty() {
        "/".into()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

/// Front Matter 中的 path 统一为以 / 开头
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// 日期统一为 YYYY-MM-DD
pub fn normalize_date(raw: &str) -> Option<String> {
    let s = raw.trim();
    let date = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        dt.date_naive()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        dt.date()
    } else if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        d
    } else {
        NaiveDate::parse_from_str(s, "%Y/%m/%d").ok()?
    };
    Some(date.format("%Y-%m-%d").to_string())
}
