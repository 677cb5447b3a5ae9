//! 取消标记
//!
//! 批处理循环在每张图片开始前检查一次, 正在进行的生成不会被中断

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// 协作式取消标记, clone 后共享同一个状态
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 是否已请求取消
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
