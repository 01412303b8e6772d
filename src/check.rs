use crate::config::{CONFIG_FILE, ConfigOverrides, PluginKind, SiteConfig, resolve_config};
use crate::plugin::is_builtin;
use crate::plugin::lua::script_path;
use std::path::Path;

pub struct CheckResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// 构建前的项目检查：配置、内容目录、页面模板和插件脚本
pub fn run(project_root: &Path) -> CheckResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(config) = check_config(project_root, &mut errors) else {
        return CheckResult { errors, warnings };
    };
    check_content(project_root, &config, &mut warnings);
    check_template(project_root, &config, &mut errors);
    check_plugins(project_root, &config, &mut errors);

    CheckResult { errors, warnings }
}

fn check_config(root: &Path, errors: &mut Vec<String>) -> Option<SiteConfig> {
    if !root.join(CONFIG_FILE).exists() {
        errors.push(format!("缺少 {CONFIG_FILE} 配置文件"));
        return None;
    }
    let config = match SiteConfig::load(root) {
        Ok(c) => c,
        Err(e) => {
            errors.push(e.to_string());
            return None;
        }
    };
    let overrides = ConfigOverrides {
        project_root: root.to_path_buf(),
        ..Default::default()
    };
    if let Err(e) = resolve_config(config.clone(), overrides) {
        errors.push(e.to_string());
    }
    Some(config)
}

fn check_content(root: &Path, config: &SiteConfig, warnings: &mut Vec<String>) {
    let content_dir = &config.build.content_dir;
    if !root.join(content_dir).is_dir() {
        warnings.push(format!("内容目录 {content_dir}/ 不存在"));
    }
}

fn check_template(root: &Path, config: &SiteConfig, errors: &mut Vec<String>) {
    if let Some(file) = &config.template.file
        && !root.join(file).is_file()
    {
        errors.push(format!("页面模板 {file} 不存在"));
    }
}

fn check_plugins(root: &Path, config: &SiteConfig, errors: &mut Vec<String>) {
    for plugin in &config.plugins {
        let name = &plugin.name;
        match plugin.kind {
            PluginKind::Builtin => {
                if !is_builtin(name) {
                    errors.push(format!("未知的内置插件：{name}"));
                }
            }
            PluginKind::Lua => {
                if !script_path(root, name).exists() {
                    errors.push(format!("插件 {name} 缺少 plugins/{name}/main.lua"));
                }
            }
        }
    }
}
