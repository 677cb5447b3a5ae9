//! 测试用 Captioner
//!
//! token 即字符的 Unicode 标量值, 特殊 token 从 0x110000 开始

use image::RgbImage;

use crate::{
    error::Error,
    model::{Captioner, GeneratedTokens, GenerationParams},
};

pub const EOT_TOKEN: u32 = 0x110000;
const EOT_TEXT: &str = "<|eot_id|>";

/// 一次 generate 调用的记录
#[derive(Debug, Clone)]
pub struct MockCall {
    pub rendered: String,
    pub params: GenerationParams,
    pub dimensions: (u32, u32),
}

#[derive(Debug, Default)]
pub struct MockCaptioner {
    caption: String,
    fail: bool,
    pub calls: Vec<MockCall>,
}

impl MockCaptioner {
    /// 固定返回 `caption`, 前后带空白以验证 trim
    pub fn new(caption: &str) -> Self {
        Self {
            caption: caption.to_string(),
            ..Default::default()
        }
    }

    /// 每次生成都失败
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn tokenize(text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32).collect()
    }
}

impl Captioner for MockCaptioner {
    fn generate(
        &mut self,
        rendered: &str,
        image: &RgbImage,
        params: &GenerationParams,
    ) -> Result<GeneratedTokens, Error> {
        self.calls.push(MockCall {
            rendered: rendered.to_string(),
            params: params.clone(),
            dimensions: image.dimensions(),
        });

        if self.fail {
            return Err(Error::Generation("mock failure".to_string()));
        }

        let mut sequence = Self::tokenize(rendered);
        let prompt_len = sequence.len();
        sequence.extend(Self::tokenize(&format!("  {}\n", self.caption)));
        sequence.push(EOT_TOKEN);

        Ok(GeneratedTokens::new(sequence, prompt_len))
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, Error> {
        let mut text = String::new();
        for token in tokens {
            match char::from_u32(*token) {
                Some(c) => text.push(c),
                None if skip_special_tokens => {}
                None => text.push_str(EOT_TEXT),
            }
        }
        Ok(text)
    }
}
