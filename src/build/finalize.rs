use crate::build::bundle::SITE_BUNDLE_FILE;
use crate::build::error::BuildError;
use std::path::Path;

/// 删除输出目录中的中间渲染器 bundle；文件不存在视为成功
pub fn finalize(output_dir: &Path) -> Result<(), BuildError> {
    let bundle = output_dir.join(SITE_BUNDLE_FILE);
    match std::fs::remove_file(&bundle) {
        Ok(()) => {
            tracing::debug!("已删除中间产物：{}", bundle.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BuildError::Finalize {
            path: bundle,
            source,
        }),
    }
}
