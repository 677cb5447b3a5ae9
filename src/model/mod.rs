//! 模型
//!
//!

mod captioner;
pub use captioner::{Captioner, GeneratedTokens, GenerationParams, SamplerStage};

#[cfg(feature = "llama-cpp")]
pub mod joycaption_beta_one_gguf;
#[cfg(feature = "llama-cpp")]
pub use joycaption_beta_one_gguf::JoyCaptionGGUF;

#[cfg(test)]
pub(crate) mod mock;
