use mlua::{Lua, MultiValue, Value, Variadic};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// 插件中不可用的全局函数：外部命令、进程退出、删改文件、按任意路径加载代码
const REMOVED: &[(&str, &str)] = &[
    ("os", "execute"),
    ("os", "exit"),
    ("os", "remove"),
    ("os", "rename"),
    ("io", "popen"),
];
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile", "require", "package"];

/// 第一个参数是文件路径的 io 函数，统一限定在项目根目录内
const PATH_TAKING_IO: &[&str] = &["open", "lines"];

/// 限制插件脚本的能力：禁止执行外部命令，文件访问限定在项目根目录内
pub fn apply(lua: &Lua, project_root: &Path) -> mlua::Result<()> {
    let globals = lua.globals();

    for (table, name) in REMOVED {
        let table: mlua::Table = globals.get(*table)?;
        table.set(*name, Value::Nil)?;
    }
    for name in REMOVED_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }

    let root = Arc::new(
        project_root
            .canonicalize()
            .map_err(|e| mlua::Error::external(format!("项目根目录 canonicalize 失败：{e}")))?,
    );
    let io: mlua::Table = globals.get("io")?;
    for name in PATH_TAKING_IO {
        confine(lua, &io, name, Arc::clone(&root))?;
    }

    Ok(())
}

/// 用根目录检查包一层 io 函数，其余参数原样透传
fn confine(lua: &Lua, io: &mlua::Table, name: &str, root: Arc<PathBuf>) -> mlua::Result<()> {
    let inner: mlua::Function = io.get(name)?;
    let wrapped = lua.create_function(move |lua, (path, rest): (String, Variadic<Value>)| {
        let full = resolve_path(&root, &path)?;
        let mut args = MultiValue::new();
        args.push_back(Value::String(lua.create_string(full.to_string_lossy().as_bytes())?));
        for value in rest {
            args.push_back(value);
        }
        inner.call::<MultiValue>(args)
    })?;
    io.set(name, wrapped)
}

/// 脚本给出的相对路径 → 根目录下的绝对路径
///
/// 先按路径段做词法检查，再对已存在的目标取真实路径，挡住指向根目录外的符号链接。
fn resolve_path(root: &Path, requested: &str) -> mlua::Result<PathBuf> {
    let denied = || mlua::Error::external(format!("拒绝访问项目根目录之外的路径：{requested}"));

    let mut resolved = root.to_path_buf();
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(segment) => resolved.push(segment),
            Component::CurDir => {}
            Component::ParentDir if resolved.as_path() != root => {
                resolved.pop();
            }
            _ => return Err(denied()),
        }
    }

    if let Ok(real) = resolved.canonicalize()
        && !real.starts_with(root)
    {
        return Err(denied());
    }
    Ok(resolved)
}
