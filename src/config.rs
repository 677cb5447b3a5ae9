//! 配置
//!
//! JSON 配置文件, 命令行参数会覆盖其中的值

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::{error::Error, joycaption::prompter::Style, model::GenerationParams};

/// 默认模型
pub const DEFAULT_MODEL: &str = "llama-joycaption-beta-one-hf-llava";

const GGUF_EXTENSION: &str = "gguf";
const MMPROJ_KEYWORD: &str = "mmproj";

/// 模型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// GGUF 模型文件, 或同时包含模型与 mmproj 的目录
    pub model_path: PathBuf,
    /// 多模态投影文件, 为空时在模型目录中查找
    pub mmproj_path: Option<PathBuf>,
    /// 卸载到 GPU 的层数
    pub n_gpu_layers: u32,
    /// 上下文大小
    pub n_ctx: u32,
    /// 批处理大小
    pub n_batch: u32,
    /// 线程数, 0 表示使用全部可用线程
    pub n_threads: i32,
    /// 图片占位符, 为空时使用 mtmd 默认值
    pub media_marker: Option<String>,
    pub verbose: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL),
            mmproj_path: None,
            n_gpu_layers: 999,
            n_ctx: 4096,
            n_batch: 2048,
            n_threads: 0,
            media_marker: None,
            verbose: false,
        }
    }
}

impl ModelConfig {
    pub fn n_threads(&self) -> i32 {
        if self.n_threads > 0 {
            self.n_threads
        } else {
            std::thread::available_parallelism()
                .map(|p| p.get() as i32)
                .unwrap_or(4)
        }
    }

    /// 解析模型与 mmproj 文件路径
    pub fn resolve(&self) -> Result<(PathBuf, PathBuf), Error> {
        let (model, dir) = if self.model_path.is_dir() {
            let model = list_gguf(&self.model_path)?
                .into_iter()
                .find(|v| !is_mmproj(v))
                .ok_or_else(|| {
                    Error::ModelNotFound(format!(
                        "no GGUF model file in {}",
                        self.model_path.display()
                    ))
                })?;
            (model, self.model_path.clone())
        } else if self.model_path.is_file() {
            let dir = self
                .model_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            (self.model_path.clone(), dir)
        } else {
            return Err(Error::ModelNotFound(
                self.model_path.to_string_lossy().to_string(),
            ));
        };

        let mmproj = match &self.mmproj_path {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => return Err(Error::ModelNotFound(path.to_string_lossy().to_string())),
            None => list_gguf(&dir)?
                .into_iter()
                .find(|v| is_mmproj(v))
                .ok_or_else(|| {
                    Error::ModelNotFound(format!("no mmproj file in {}", dir.display()))
                })?,
        };

        debug!("model: {}, mmproj: {}", model.display(), mmproj.display());
        Ok((model, mmproj))
    }
}

fn is_mmproj(path: &Path) -> bool {
    path.file_name()
        .map(|v| v.to_string_lossy().to_lowercase().contains(MMPROJ_KEYWORD))
        .unwrap_or(false)
}

fn list_gguf(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry?;
        let path = entry.path();
        let is_gguf = path
            .extension()
            .map(|v| v.eq_ignore_ascii_case(GGUF_EXTENSION))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_gguf {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// 批处理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub model: ModelConfig,
    pub style: Style,
    pub overwrite: bool,
    pub generation: GenerationParams,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            style: Style::Training,
            overwrite: false,
            generation: GenerationParams::default(),
        }
    }
}

impl CaptionConfig {
    /// 从 JSON 文件加载, 缺少的字段使用默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: CaptionConfig = serde_json::from_str(&content)?;
        config.generation.validate()?;
        Ok(config)
    }
}
