//! JoyCaption 提示词
//!
//! 风格 -> 固定指令文本, 以及 system + user 两轮对话的构建与渲染

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// system 提示词
pub const SYSTEM_PROMPT: &str = "You are a helpful image captioner.";

const DESCRIPTIVE_PROMPT: &str = "Write a long detailed description for this image.";

const STRAIGHTFORWARD_PROMPT: &str = concat!(
    "Write a straightforward caption for this image. Begin with the main subject and medium. ",
    "Mention pivotal elements—people, objects, scenery—using confident, definite language. ",
    "Focus on concrete details like color, shape, texture, and spatial relationships. ",
    "Show how elements interact. Omit mood and speculative wording. If text is present, quote it exactly. ",
    "Note any watermarks, signatures, or compression artifacts. Never mention what's absent, ",
    "resolution, or unobservable details. Vary your sentence structure and keep the description concise, ",
    "without starting with 'This image is…' or similar phrasing.",
);

const TRAINING_PROMPT: &str = concat!(
    "Write a short, simple caption describing this image. Use only factual, concrete details. ",
    "Avoid atmospheric words, mood descriptions, or ambiguous language. Keep it brief and direct. ",
    "Focus on what is clearly visible: subjects, objects, actions, basic colors, and clear visual elements. ",
    "Do not use phrases like 'This image shows' or 'The photo depicts'. ",
    "Avoid words that could have multiple meanings or interpretations.",
);

/// 描述风格
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// 详细描述
    #[default]
    Descriptive,
    /// 简洁客观
    Straightforward,
    /// 训练集 (LoRA) 风格
    Training,
}

impl Style {
    pub const ALL: [Style; 3] = [Style::Descriptive, Style::Straightforward, Style::Training];

    /// 按名称解析, 无法识别的名称回退到 descriptive
    pub fn from_name(name: &str) -> Self {
        name.trim().parse().unwrap_or_default()
    }
}

/// 风格对应的指令文本
pub fn caption_prompt(style: Style) -> &'static str {
    match style {
        Style::Descriptive => DESCRIPTIVE_PROMPT,
        Style::Straightforward => STRAIGHTFORWARD_PROMPT,
        Style::Training => TRAINING_PROMPT,
    }
}

/// 按风格名称获取指令文本
pub fn caption_prompt_for(name: &str) -> &'static str {
    caption_prompt(Style::from_name(name))
}

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 对话消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// 构建对话: system + user
///
/// 图片不出现在文本中, 由 Captioner 作为单独的输入接收
pub fn conversation(style: Style) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(caption_prompt(style)),
    ]
}

/// Llama 3 对话模板
///
/// 以 assistant 头结尾, 模型从这里开始续写
/// `media_marker` 存在时放在第一条 user 消息的开头
pub fn render_llama3(messages: &[ChatMessage], media_marker: Option<&str>) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    let mut marker = media_marker.filter(|v| !v.is_empty());

    for message in messages {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(&message.role.to_string());
        prompt.push_str("<|end_header_id|>\n\n");

        if message.role == Role::User {
            if let Some(m) = marker.take() {
                prompt.push_str(m);
                prompt.push('\n');
            }
        }

        prompt.push_str(message.content.trim());
        prompt.push_str("<|eot_id|>");
    }

    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}
