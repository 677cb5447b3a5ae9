//! Captioner 接口
//!
//! 视觉语言模型作为外部协作者, 只需提供: 对话渲染, 生成, 解码

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    joycaption::prompter::{render_llama3, ChatMessage},
};

/// 生成参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// 最大生成 token 数
    pub max_new_tokens: usize,
    /// 是否采样, false 时为贪婪解码
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    /// None 表示不启用 top-k
    pub top_k: Option<u32>,
    /// 禁止生成的 token
    pub suppress_tokens: Option<Vec<u32>>,
    pub use_cache: bool,
    /// 随机种子, 0 表示随机
    pub seed: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            do_sample: true,
            temperature: 0.6,
            top_p: 0.9,
            top_k: None,
            suppress_tokens: None,
            use_cache: true,
            seed: 0,
        }
    }
}

impl GenerationParams {
    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn seed(&self) -> u32 {
        // 随机值
        if self.seed == 0 {
            rand::random::<u32>()
        } else {
            self.seed
        }
    }

    /// 采样步骤, 按执行顺序排列
    ///
    /// 先按温度缩放再做 top-p 截断, 与 transformers `generate` 的 logits 处理顺序一致
    pub fn sampler_stages(&self) -> Vec<SamplerStage> {
        if !self.do_sample {
            return vec![SamplerStage::Greedy];
        }

        let mut stages = Vec::with_capacity(4);
        if let Some(top_k) = self.top_k {
            stages.push(SamplerStage::TopK(top_k));
        }
        stages.push(SamplerStage::Temperature(self.temperature));
        stages.push(SamplerStage::TopP(self.top_p));
        stages.push(SamplerStage::Dist(self.seed()));
        stages
    }

    /// 参数校验
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_new_tokens == 0 {
            return Err(Error::InvalidParameter(
                "max_new_tokens must be positive".to_string(),
            ));
        }
        if self.do_sample && !(self.temperature > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "temperature must be positive when sampling, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

/// 采样步骤
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerStage {
    Greedy,
    TopK(u32),
    Temperature(f32),
    TopP(f32),
    /// 按种子随机抽样, 位于最后
    Dist(u32),
}

/// 生成结果
///
/// `sequence` 以渲染后的输入为前缀, 其后为新生成的 token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedTokens {
    pub sequence: Vec<u32>,
    pub prompt_len: usize,
}

impl GeneratedTokens {
    pub fn new(sequence: Vec<u32>, prompt_len: usize) -> Self {
        Self {
            sequence,
            prompt_len,
        }
    }

    /// 去除输入前缀后的 token
    pub fn new_tokens(&self) -> &[u32] {
        let start = self.prompt_len.min(self.sequence.len());
        &self.sequence[start..]
    }
}

/// 图像描述生成服务
pub trait Captioner {
    /// 将对话渲染为模型输入文本, 结尾为 assistant 生成提示
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String, Error> {
        Ok(render_llama3(messages, None))
    }

    /// 生成 token 序列
    fn generate(
        &mut self,
        rendered: &str,
        image: &RgbImage,
        params: &GenerationParams,
    ) -> Result<GeneratedTokens, Error>;

    /// token 解码为文本, 不做空白清理
    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, Error>;
}

impl<C: Captioner + ?Sized> Captioner for Box<C> {
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String, Error> {
        (**self).apply_chat_template(messages)
    }

    fn generate(
        &mut self,
        rendered: &str,
        image: &RgbImage,
        params: &GenerationParams,
    ) -> Result<GeneratedTokens, Error> {
        (**self).generate(rendered, image, params)
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, Error> {
        (**self).decode(tokens, skip_special_tokens)
    }
}
