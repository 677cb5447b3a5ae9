//! 后台批处理线程
//!
//! 模型在工作线程内创建, 调用方只通过取消标记和事件通道与其交互

use std::{
    path::PathBuf,
    sync::mpsc::{self, Receiver},
    thread::{self, JoinHandle},
};

use log::{error, info};

use crate::{
    error::Error,
    joycaption::{
        batch::{run_batch, BatchEvent, BatchOptions, BatchReport},
        pipeline::CaptionPipeline,
        prompter::Style,
    },
    model::{Captioner, GenerationParams},
    utils::CancellationToken,
};

/// 后台批处理
pub struct CaptionWorker {
    token: CancellationToken,
    events: Receiver<BatchEvent>,
    handle: JoinHandle<Result<BatchReport, Error>>,
}

impl CaptionWorker {
    /// 启动工作线程
    ///
    /// `factory` 在工作线程中调用, Captioner 本身不需要 `Send`
    pub fn spawn<C, F>(
        factory: F,
        folder: PathBuf,
        style: Style,
        params: GenerationParams,
        options: BatchOptions,
    ) -> Result<Self, Error>
    where
        C: Captioner,
        F: FnOnce() -> Result<C, Error> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (tx, events) = mpsc::channel();

        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name("caption-worker".to_string())
            .spawn(move || -> Result<BatchReport, Error> {
                info!("Loading JoyCaption model...");
                let captioner = factory().inspect_err(|e| error!("Error loading model: {e}"))?;
                info!("Model loaded successfully!");

                let mut pipeline = CaptionPipeline::new(captioner, style).with_params(params);
                run_batch(&folder, &mut pipeline, &options, &worker_token, |event| {
                    // 接收端已关闭时继续处理, 结果仍由 join 返回
                    let _ = tx.send(event.clone());
                })
            })?;

        Ok(Self {
            token,
            events,
            handle,
        })
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 请求停止, 当前图片完成后生效
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 进度事件, 工作线程结束后通道关闭
    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    /// 等待工作线程结束
    pub fn join(self) -> Result<BatchReport, Error> {
        self.handle.join().map_err(|_| Error::WorkerPanicked)?
    }
}
