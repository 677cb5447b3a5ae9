//! JoyCaption 批量描述
//!
//!

pub mod batch;
pub mod pipeline;
pub mod prompter;
pub mod worker;

pub use batch::{run_batch, BatchEvent, BatchOptions, BatchReport, ItemOutcome};
pub use pipeline::CaptionPipeline;
pub use prompter::{caption_prompt, caption_prompt_for, conversation, render_llama3, ChatMessage, Role, Style};
pub use worker::CaptionWorker;
