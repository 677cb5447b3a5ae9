//! joycaption-batch
//!
//! 为目录中的每张图片生成描述, 保存为同名 `.txt`

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, warn};

use joycaption_batch::{
    config::CaptionConfig,
    error::Error,
    joycaption::{BatchOptions, CaptionWorker, Style},
    model::JoyCaptionGGUF,
    utils::init_logger,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Caption images using JoyCaption", long_about = None)]
struct Args {
    /// Path to folder containing images
    folder: PathBuf,

    /// GGUF model file, or a directory holding the model and its mmproj file
    #[arg(long)]
    model: Option<PathBuf>,

    /// Multimodal projector file (mmproj), searched next to the model when omitted
    #[arg(long)]
    mmproj: Option<PathBuf>,

    /// Caption style
    #[arg(long, value_parser = ["descriptive", "straightforward", "training"])]
    style: Option<String>,

    /// Overwrite existing caption files
    #[arg(long, action)]
    overwrite: bool,

    /// JSON config file, command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of layers to offload to the GPU
    #[arg(long)]
    n_gpu_layers: Option<u32>,

    /// Context size
    #[arg(long)]
    n_ctx: Option<u32>,

    /// Max new tokens to generate per image
    #[arg(long)]
    max_new_tokens: Option<usize>,

    /// RNG seed for sampling, 0 means random
    #[arg(long)]
    seed: Option<u32>,

    /// Print debug logs
    #[arg(long, action)]
    verbose: bool,
}

impl Args {
    /// 合并配置文件与命令行参数
    fn caption_config(&self) -> Result<CaptionConfig, Error> {
        let mut config = match &self.config {
            Some(path) => CaptionConfig::load(path)?,
            None => CaptionConfig::default(),
        };

        if let Some(model) = &self.model {
            config.model.model_path = model.clone();
        }
        if let Some(mmproj) = &self.mmproj {
            config.model.mmproj_path = Some(mmproj.clone());
        }
        if let Some(style) = &self.style {
            config.style = Style::from_name(style);
        }
        if let Some(n_gpu_layers) = self.n_gpu_layers {
            config.model.n_gpu_layers = n_gpu_layers;
        }
        if let Some(n_ctx) = self.n_ctx {
            config.model.n_ctx = n_ctx;
        }
        if let Some(max_new_tokens) = self.max_new_tokens {
            config.generation.max_new_tokens = max_new_tokens;
        }
        if let Some(seed) = self.seed {
            config.generation.seed = seed;
        }
        config.overwrite |= self.overwrite;
        config.model.verbose |= self.verbose;

        config.generation.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let config = args.caption_config()?;
    if !args.folder.is_dir() {
        return Err(Error::DirectoryNotFound(args.folder.clone()).into());
    }
    info!("style: {}, overwrite: {}", config.style, config.overwrite);

    let model_config = config.model.clone();
    let worker = CaptionWorker::spawn(
        move || JoyCaptionGGUF::new(&model_config),
        args.folder.clone(),
        config.style,
        config.generation.clone(),
        BatchOptions::default().with_overwrite(config.overwrite),
    )?;

    ctrlc::set_handler({
        let token = worker.token().clone();
        move || {
            println!("Received Ctrl-C signal, stopping after the current image");
            token.cancel();
        }
    })?;

    for event in worker.events() {
        println!("{event}");
        if let Some(progress) = event.progress() {
            debug!("progress: {progress:.1}%");
        }
    }

    let report = worker.join()?;
    for (path, error) in &report.failures {
        warn!("failed: {}, {error}", path.display());
    }
    info!(
        "found: {}, captioned: {}, skipped: {}, failed: {}",
        report.found, report.captioned, report.skipped, report.failed
    );

    Ok(())
}
