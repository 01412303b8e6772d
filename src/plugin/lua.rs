use crate::build::bundle::PathIndex;
use crate::config::BuildConfig;
use crate::plugin::{ExtraAsset, ExtraAssetProvider, PluginError, sandbox};
use mlua::{Lua, LuaSerdeExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 脚本 extra hook 的单个返回项
#[derive(Debug, Deserialize)]
struct LuaExtra {
    path: String,
    content: String,
}

/// Lua 插件：plugins/<name>/main.lua 需定义全局函数 `extra(paths, config)`
pub struct LuaPlugin {
    name: String,
    project_root: PathBuf,
    script: PathBuf,
    options: HashMap<String, serde_json::Value>,
}

impl LuaPlugin {
    pub fn new(
        project_root: &Path,
        name: &str,
        options: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            name: name.to_string(),
            project_root: project_root.to_path_buf(),
            script: script_path(project_root, name),
            options,
        }
    }

    fn load_err(&self, reason: impl ToString) -> PluginError {
        PluginError::Load {
            plugin: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn hook_err(&self, reason: impl ToString) -> PluginError {
        PluginError::Hook {
            plugin: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn init_vm(&self) -> Result<Lua, PluginError> {
        let source = std::fs::read_to_string(&self.script)
            .map_err(|e| self.load_err(format!("读取 {} 失败：{e}", self.script.display())))?;

        let lua = Lua::new();
        sandbox::apply(&lua, &self.project_root).map_err(|e| self.load_err(e))?;
        register_api(&lua, &self.options).map_err(|e| self.load_err(e))?;

        lua.load(&source)
            .set_name(format!("@{}", self.script.display()))
            .exec()
            .map_err(|e| self.load_err(e))?;

        Ok(lua)
    }
}

pub fn script_path(project_root: &Path, name: &str) -> PathBuf {
    project_root.join("plugins").join(name).join("main.lua")
}

impl ExtraAssetProvider for LuaPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        paths: &PathIndex,
        config: &BuildConfig,
    ) -> Result<Vec<ExtraAsset>, PluginError> {
        let lua = self.init_vm()?;

        let extra: mlua::Function = lua
            .globals()
            .get::<Option<mlua::Function>>("extra")
            .map_err(|e| self.load_err(e))?
            .ok_or_else(|| self.load_err("main.lua 未定义 extra 函数"))?;

        // Lua 表不保证遍历顺序，按数组传入
        let path_list: Vec<serde_json::Value> = paths
            .iter()
            .map(|(path, meta)| {
                serde_json::json!({
                    "path": path,
                    "title": meta.title,
                    "source": meta.source,
                    "date": meta.date,
                    "extra": meta.extra,
                })
            })
            .collect();

        let lua_paths = lua.to_value(&path_list).map_err(|e| self.hook_err(e))?;
        let lua_config = lua.to_value(config).map_err(|e| self.hook_err(e))?;

        let result: mlua::Value = extra
            .call((lua_paths, lua_config))
            .map_err(|e| self.hook_err(e))?;

        if result.is_nil() {
            return Ok(Vec::new());
        }

        let items: Vec<LuaExtra> = lua.from_value(result).map_err(|e| {
            self.hook_err(format!("返回值应为 {{path, content}} 数组：{e}"))
        })?;

        tracing::debug!("插件 {} 生成了 {} 个附加文件", self.name, items.len());

        Ok(items
            .into_iter()
            .map(|item| ExtraAsset {
                path: item.path,
                content: item.content.into_bytes(),
            })
            .collect())
    }
}

/// 注册 `sitepress` 全局表
fn register_api(lua: &Lua, options: &HashMap<String, serde_json::Value>) -> mlua::Result<()> {
    let api = lua.create_table()?;

    let version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("SITEPRESS_GIT_COMMIT"));
    api.set("version", lua.create_function(move |_, ()| Ok(version))?)?;

    // sitepress.slugify(text)
    api.set(
        "slugify",
        lua.create_function(|_, text: String| {
            let slug = text
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '-' })
                .collect::<String>()
                .split('-')
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("-");
            Ok(slug)
        })?,
    )?;

    // sitepress.json(table) -> string
    api.set(
        "json",
        lua.create_function(|lua, val: mlua::Value| {
            let json: serde_json::Value = lua.from_value(val)?;
            serde_json::to_string(&json)
                .map_err(|e| mlua::Error::external(format!("JSON 序列化失败：{e}")))
        })?,
    )?;

    api.set("options", lua.to_value(options)?)?;

    lua.globals().set("sitepress", api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::bundle::tests::{meta, test_config};
    use tempfile::TempDir;

    fn write_script(root: &Path, name: &str, source: &str) {
        let path = script_path(root, name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, source).unwrap();
    }

    fn sample_paths() -> PathIndex {
        let mut paths = PathIndex::new();
        paths.insert("/".into(), meta("Home"));
        paths.insert("/guide/".into(), meta("Guide"));
        paths
    }

    #[test]
    fn extra_hook_produces_assets() {
        let dir = TempDir::new().unwrap();
        write_script(
            dir.path(),
            "index",
            r#"
            function extra(paths, config)
              local lines = {}
              for _, p in ipairs(paths) do
                table.insert(lines, p.path .. " " .. p.title)
              end
              return {
                { path = "index.txt", content = table.concat(lines, "\n") },
                { path = "slug.txt", content = sitepress.slugify(config.site.title) .. sitepress.options.suffix },
              }
            end
            "#,
        );
        let mut config = test_config(dir.path(), 1);
        config.site.title = "My Site".into();
        let mut options = HashMap::new();
        options.insert("suffix".to_string(), serde_json::json!("!"));

        let plugin = LuaPlugin::new(dir.path(), "index", options);
        let assets = plugin.generate(&sample_paths(), &config).unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].path, "index.txt");
        assert_eq!(assets[0].content, b"/ Home\n/guide/ Guide".to_vec());
        assert_eq!(assets[1].content, b"my-site!".to_vec());
    }

    #[test]
    fn throwing_hook_is_hook_error() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "broken", r#"function extra() error("kaboom") end"#);
        let config = test_config(dir.path(), 1);

        let err = LuaPlugin::new(dir.path(), "broken", HashMap::new())
            .generate(&sample_paths(), &config)
            .unwrap_err();
        assert!(matches!(&err, PluginError::Hook { plugin, .. } if plugin == "broken"));
        assert!(err.to_string().contains("kaboom"));
    }

    #[test]
    fn missing_script_or_hook_is_load_error() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), 1);

        let err = LuaPlugin::new(dir.path(), "absent", HashMap::new())
            .generate(&sample_paths(), &config)
            .unwrap_err();
        assert!(matches!(err, PluginError::Load { .. }));

        write_script(dir.path(), "nohook", "local x = 1");
        let err = LuaPlugin::new(dir.path(), "nohook", HashMap::new())
            .generate(&sample_paths(), &config)
            .unwrap_err();
        assert!(matches!(err, PluginError::Load { .. }));
    }

    #[test]
    fn nil_result_means_no_assets() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "quiet", "function extra() return nil end");
        let config = test_config(dir.path(), 1);

        let assets = LuaPlugin::new(dir.path(), "quiet", HashMap::new())
            .generate(&sample_paths(), &config)
            .unwrap();
        assert!(assets.is_empty());
    }
}
