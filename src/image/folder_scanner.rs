//! 扫描文件夹中的图片
//!
//! 只扫描一层目录, 扩展名不区分大小写

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::Error;

/// 支持的图片扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// 图片文件夹扫描器
#[derive(Debug, Clone)]
pub struct FolderScanner {
    file_extensions: Vec<String>,
}

impl Default for FolderScanner {
    fn default() -> Self {
        Self {
            file_extensions: SUPPORTED_EXTENSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl FolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 自定义扩展名, 可带或不带前导 `.`
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.file_extensions = extensions
            .into_iter()
            .map(|v| v.as_ref().trim_start_matches('.').to_string())
            .filter(|v| !v.is_empty())
            .collect();
        self
    }

    pub fn file_extensions(&self) -> &[String] {
        &self.file_extensions
    }

    /// 单层扫描
    ///
    /// 按解析后的真实路径去重, 在大小写不敏感的文件系统上同一个文件只会出现一次
    pub fn scan(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::DirectoryNotFound(dir.to_path_buf()));
        }

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter();

        let mut seen = BTreeSet::new();
        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skip unreadable entry in {}, {e}", dir.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.is_img_file(entry.path()) {
                continue;
            }

            let resolved =
                fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
            if !seen.insert(resolved) {
                debug!("duplicate image entry, {}", entry.path().display());
                continue;
            }
            files.push(entry.into_path());
        }

        files.sort();
        Ok(files)
    }

    /// 图像文件检测
    pub fn is_img_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                self.file_extensions
                    .iter()
                    .any(|e| ext.eq_ignore_ascii_case(e))
            })
            .unwrap_or(false)
    }
}
