use crate::build::bundle::EmittedAsset;
use std::path::Path;

/// 编译 `<styles_dir>/main.scss` 到 `<output>/main.css`
///
/// 外层 `Err` 为 I/O 故障；内层 `Err` 为 SCSS 源码错误，由调用方作为输入错误上报。
pub fn compile_scss(
    styles_dir: &Path,
    output_dir: &Path,
) -> std::io::Result<Result<Option<EmittedAsset>, String>> {
    let main_scss = styles_dir.join("main.scss");
    if !main_scss.exists() {
        tracing::debug!("无 main.scss，跳过 SCSS 编译");
        return Ok(Ok(None));
    }

    let source = std::fs::read_to_string(&main_scss)?;
    let options = grass::Options::default().load_path(styles_dir);
    let css = match grass::from_string(source, &options) {
        Ok(css) => css,
        Err(e) => return Ok(Err(format!("{}: {e}", main_scss.display()))),
    };

    let dest = output_dir.join("main.css");
    std::fs::write(&dest, css)?;
    tracing::info!("已编译 main.scss → main.css");

    Ok(Ok(Some(EmittedAsset {
        name: "main.css".into(),
        path: dest,
    })))
}

/// 复制目录中指定扩展名的文件到输出目录，按文件名排序
pub fn copy_with_ext(
    src_dir: &Path,
    output_dir: &Path,
    ext: &str,
) -> std::io::Result<Vec<EmittedAsset>> {
    if !src_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = std::fs::read_dir(src_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == ext))
        .collect();
    files.sort();

    let mut emitted = Vec::with_capacity(files.len());
    for path in files {
        let Some(name) = path.file_name() else { continue };
        let dest = output_dir.join(name);
        std::fs::copy(&path, &dest)?;
        tracing::debug!("已复制资源：{}", path.display());
        emitted.push(EmittedAsset {
            name: name.to_string_lossy().into_owned(),
            path: dest,
        });
    }
    Ok(emitted)
}
