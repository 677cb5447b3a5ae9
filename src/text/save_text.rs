//! 保存文本
//!
//! 每张图片对应一个同名的 `.txt` 文件 (sidecar)

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::Error;

/// sidecar 文件扩展名
pub const SIDECAR_EXTENSION: &str = "txt";

/// 图片对应的 sidecar 路径: 同目录, 同名, 扩展名替换为 `.txt`
pub fn sidecar_path(image_path: impl AsRef<Path>) -> PathBuf {
    image_path.as_ref().with_extension(SIDECAR_EXTENSION)
}

/// 保存文本
///
/// 覆盖写入, 已有内容会被整体替换而不是追加
pub fn save_text(path: impl AsRef<Path>, captions: &str) -> Result<(), Error> {
    let path = path.as_ref();
    let persistence_err = |source| Error::Persistence {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(persistence_err)?;
    file.write_all(captions.as_bytes())
        .map_err(persistence_err)?;
    file.flush().map_err(persistence_err)?;
    Ok(())
}
