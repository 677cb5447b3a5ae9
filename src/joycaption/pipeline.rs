//! 单张图片的描述生成流程

use std::path::Path;

use log::{debug, error};

use crate::{
    error::Error,
    image::load_rgb_image,
    joycaption::prompter::{conversation, Style},
    model::{Captioner, GenerationParams},
};

/// 描述生成流程
///
/// 加载图片 -> 构建对话 -> 渲染 -> 生成 -> 去除输入前缀 -> 解码 -> trim
pub struct CaptionPipeline<C: Captioner> {
    captioner: C,
    style: Style,
    params: GenerationParams,
}

impl<C: Captioner> CaptionPipeline<C> {
    pub fn new(captioner: C, style: Style) -> Self {
        Self {
            captioner,
            style,
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn captioner(&self) -> &C {
        &self.captioner
    }

    /// 生成描述, 失败时记录日志并返回错误
    pub fn caption(&mut self, path: &Path) -> Result<String, Error> {
        self.run(path).inspect_err(|e| {
            let name = path
                .file_name()
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            error!("Error processing {name}: {e}");
        })
    }

    fn run(&mut self, path: &Path) -> Result<String, Error> {
        let image = load_rgb_image(path)?;

        let messages = conversation(self.style);
        let rendered = self.captioner.apply_chat_template(&messages)?;
        debug!("rendered prompt: {rendered:?}");

        let generated = self.captioner.generate(&rendered, &image, &self.params)?;
        let new_tokens = generated.new_tokens();
        debug!(
            "prompt tokens: {}, new tokens: {}",
            generated.prompt_len,
            new_tokens.len()
        );

        let caption = self.captioner.decode(new_tokens, true)?;
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(Error::Generation("empty caption".to_string()));
        }

        Ok(caption.to_string())
    }
}
