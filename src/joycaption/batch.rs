//! 批量生成描述
//!
//! 顺序处理目录中的图片, 每张图片写入同名 `.txt`

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{error, info, warn};

use crate::{
    error::Error,
    image::FolderScanner,
    joycaption::pipeline::CaptionPipeline,
    model::Captioner,
    text::{save_text, sidecar_path},
    utils::CancellationToken,
};

/// 批处理选项
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// 覆盖已有的描述文件
    pub overwrite: bool,
    pub scanner: FolderScanner,
}

impl BatchOptions {
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// 单张图片的处理结果
#[derive(Debug)]
pub enum ItemOutcome {
    Captioned { caption: String },
    Skipped,
    Failed { error: Error },
}

/// 批处理汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub found: usize,
    /// 已处理数量, 包含跳过和失败
    pub processed: usize,
    pub captioned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(PathBuf, String)>,
    pub cancelled: bool,
}

impl BatchReport {
    fn record(&mut self, path: &Path, outcome: &ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Captioned { .. } => self.captioned += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed { error } => {
                self.failed += 1;
                self.failures.push((path.to_path_buf(), error.to_string()));
            }
        }
    }
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    Skipped {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    Processing {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    Captioned {
        index: usize,
        total: usize,
        path: PathBuf,
        caption: String,
    },
    Failed {
        index: usize,
        total: usize,
        path: PathBuf,
        error: String,
        /// 描述已生成, 写入 sidecar 时失败
        saving: bool,
    },
    Cancelled {
        processed: usize,
        total: usize,
    },
    Finished {
        processed: usize,
        captioned: usize,
    },
}

impl BatchEvent {
    /// 进度百分比
    pub fn progress(&self) -> Option<f32> {
        match self {
            BatchEvent::Skipped { index, total, .. }
            | BatchEvent::Captioned { index, total, .. }
            | BatchEvent::Failed { index, total, .. } => {
                Some(*index as f32 / (*total).max(1) as f32 * 100.0)
            }
            _ => None,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchEvent::Started { total: 0 } => write!(f, "No image files found in the folder"),
            BatchEvent::Started { total } => write!(f, "Found {total} image files"),
            BatchEvent::Skipped { path, .. } => {
                write!(f, "Skipping {} caption already exists", file_name(path))
            }
            BatchEvent::Processing { index, total, path } => {
                write!(f, "Processing {index}/{total}: {}", file_name(path))
            }
            BatchEvent::Captioned { path, .. } => {
                write!(f, "Saved caption for {}", file_name(path))
            }
            BatchEvent::Failed {
                path,
                error,
                saving: true,
                ..
            } => write!(f, "Error saving caption for {}: {error}", file_name(path)),
            BatchEvent::Failed { path, error, .. } => {
                write!(f, "Error captioning {}: {error}", file_name(path))
            }
            BatchEvent::Cancelled { .. } => write!(f, "Captioning process stopped by user"),
            BatchEvent::Finished { captioned, .. } => {
                write!(f, "Processing completed! Captioned {captioned} images")
            }
        }
    }
}

/// 处理单张图片: `skip` 为 true 时不调用模型, 否则生成并写入
pub fn process_item<C: Captioner>(
    pipeline: &mut CaptionPipeline<C>,
    path: &Path,
    skip: bool,
) -> ItemOutcome {
    if skip {
        return ItemOutcome::Skipped;
    }

    let caption = match pipeline.caption(path) {
        Ok(v) => v,
        Err(e) => return ItemOutcome::Failed { error: e },
    };

    if let Err(e) = save_text(sidecar_path(path), &caption) {
        error!("Error saving caption for {}: {e}", file_name(path));
        return ItemOutcome::Failed { error: e };
    }

    ItemOutcome::Captioned { caption }
}

/// 批量处理目录
///
/// 每张图片开始前检查取消标志, 正在进行的生成不会被打断
/// 目录不存在时直接返回错误, 单张图片的错误记录到报告中
pub fn run_batch<C, F>(
    folder: impl AsRef<Path>,
    pipeline: &mut CaptionPipeline<C>,
    options: &BatchOptions,
    token: &CancellationToken,
    mut on_event: F,
) -> Result<BatchReport, Error>
where
    C: Captioner,
    F: FnMut(&BatchEvent),
{
    let images = options.scanner.scan(folder)?;
    let total = images.len();

    let mut report = BatchReport {
        found: total,
        ..Default::default()
    };

    on_event(&BatchEvent::Started { total });
    info!("found {total} image files, style: {}", pipeline.style());

    for (i, path) in images.iter().enumerate() {
        if token.is_cancelled() {
            warn!("batch cancelled after {} of {total} images", report.processed);
            report.cancelled = true;
            on_event(&BatchEvent::Cancelled {
                processed: report.processed,
                total,
            });
            return Ok(report);
        }

        let index = i + 1;
        let skip = sidecar_path(path).exists() && !options.overwrite;
        if !skip {
            on_event(&BatchEvent::Processing {
                index,
                total,
                path: path.clone(),
            });
        }

        let outcome = process_item(pipeline, path, skip);
        report.record(path, &outcome);

        let event = match outcome {
            ItemOutcome::Skipped => BatchEvent::Skipped {
                index,
                total,
                path: path.clone(),
            },
            ItemOutcome::Captioned { caption } => BatchEvent::Captioned {
                index,
                total,
                path: path.clone(),
                caption,
            },
            ItemOutcome::Failed { error } => BatchEvent::Failed {
                index,
                total,
                path: path.clone(),
                saving: matches!(error, Error::Persistence { .. }),
                error: error.to_string(),
            },
        };
        on_event(&event);
    }

    info!(
        "batch finished, captioned: {}, skipped: {}, failed: {}",
        report.captioned, report.skipped, report.failed
    );
    on_event(&BatchEvent::Finished {
        processed: report.processed,
        captioned: report.captioned,
    });

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::{joycaption::prompter::Style, model::mock::MockCaptioner};

    /// 按线程收集日志记录
    mod log_capture {
        use std::{cell::RefCell, sync::Once};

        use log::{Level, LevelFilter, Log, Metadata, Record};

        thread_local! {
            static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
        }

        struct CaptureLogger;

        impl Log for CaptureLogger {
            fn enabled(&self, _metadata: &Metadata) -> bool {
                true
            }

            fn log(&self, record: &Record) {
                RECORDS.with(|r| {
                    r.borrow_mut()
                        .push((record.level(), record.args().to_string()))
                });
            }

            fn flush(&self) {}
        }

        static LOGGER: CaptureLogger = CaptureLogger;
        static INIT: Once = Once::new();

        /// 安装 logger 并清空当前线程的记录
        pub fn start() {
            INIT.call_once(|| {
                let _ = log::set_logger(&LOGGER);
                log::set_max_level(LevelFilter::Trace);
            });
            RECORDS.with(|r| r.borrow_mut().clear());
        }

        pub fn errors() -> Vec<String> {
            RECORDS.with(|r| {
                r.borrow()
                    .iter()
                    .filter(|(level, _)| *level == Level::Error)
                    .map(|(_, msg)| msg.clone())
                    .collect()
            })
        }
    }

    fn write_png(path: &Path) -> anyhow::Result<()> {
        RgbImage::from_pixel(4, 4, Rgb([200, 100, 50])).save(path)?;
        Ok(())
    }

    fn pipeline(caption: &str) -> CaptionPipeline<MockCaptioner> {
        CaptionPipeline::new(MockCaptioner::new(caption), Style::Training)
    }

    fn run(
        folder: &Path,
        pipeline: &mut CaptionPipeline<MockCaptioner>,
        overwrite: bool,
    ) -> anyhow::Result<(BatchReport, Vec<BatchEvent>)> {
        let mut events = Vec::new();
        let options = BatchOptions::default().with_overwrite(overwrite);
        let report = run_batch(
            folder,
            pipeline,
            &options,
            &CancellationToken::new(),
            |e| events.push(e.clone()),
        )?;
        Ok((report, events))
    }

    #[test]
    fn test_second_run_is_noop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(&dir.path().join("a.png"))?;
        write_png(&dir.path().join("b.png"))?;

        let mut first = pipeline("first caption");
        let (report, _) = run(dir.path(), &mut first, false)?;
        assert_eq!(report.captioned, 2);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt"))?, "first caption");

        let mut second = pipeline("second caption");
        let (report, events) = run(dir.path(), &mut second, false)?;
        assert_eq!(report.captioned, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.processed, 2);
        assert!(second.captioner().calls.is_empty());
        assert!(!events
            .iter()
            .any(|e| matches!(e, BatchEvent::Processing { .. })));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt"))?, "first caption");
        assert_eq!(fs::read_to_string(dir.path().join("b.txt"))?, "first caption");
        Ok(())
    }

    #[test]
    fn test_overwrite_replaces_content() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(&dir.path().join("a.png"))?;
        fs::write(dir.path().join("a.txt"), "an old and much longer caption text")?;

        let mut p = pipeline("new");
        let (report, _) = run(dir.path(), &mut p, true)?;
        assert_eq!(report.captioned, 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt"))?, "new");
        Ok(())
    }

    #[test]
    fn test_corrupt_image_does_not_stop_batch() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a_broken.jpg"), b"garbage")?;
        write_png(&dir.path().join("b_valid.png"))?;

        let mut p = pipeline("valid caption");
        log_capture::start();
        let (report, events) = run(dir.path(), &mut p, false)?;
        let errors = log_capture::errors();

        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("a_broken.jpg"));

        assert_eq!(report.found, 2);
        assert_eq!(report.captioned, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].0, dir.path().join("a_broken.jpg"));
        assert!(!dir.path().join("a_broken.txt").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("b_valid.txt"))?,
            "valid caption"
        );

        let failed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        Ok(())
    }

    #[test]
    fn test_sidecar_write_failure_does_not_stop_batch() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(&dir.path().join("a.png"))?;
        write_png(&dir.path().join("b.png"))?;
        // 同名目录占据 sidecar 路径, 写入必然失败
        fs::create_dir(dir.path().join("a.txt"))?;

        let mut p = pipeline("caption");
        log_capture::start();
        let (report, events) = run(dir.path(), &mut p, true)?;
        let errors = log_capture::errors();

        assert_eq!(report.failed, 1);
        assert_eq!(report.captioned, 1);
        assert_eq!(report.processed, 2);
        assert_eq!(report.failures[0].0, dir.path().join("a.png"));
        assert!(dir.path().join("a.txt").is_dir());
        assert_eq!(fs::read_to_string(dir.path().join("b.txt"))?, "caption");

        let failed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0], BatchEvent::Failed { saving: true, .. }));
        assert!(failed[0]
            .to_string()
            .starts_with("Error saving caption for a.png: persistence error"));

        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("a.png"));
        Ok(())
    }

    #[test]
    fn test_generation_failure_writes_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(&dir.path().join("a.png"))?;

        let mut p = CaptionPipeline::new(MockCaptioner::failing(), Style::Descriptive);
        let (report, _) = run(dir.path(), &mut p, false)?;
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 1);
        assert!(!dir.path().join("a.txt").exists());
        Ok(())
    }

    #[test]
    fn test_empty_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("notes.md"), "not an image")?;

        let mut p = pipeline("unused");
        let (report, events) = run(dir.path(), &mut p, false)?;
        assert_eq!(report, BatchReport::default());
        assert_eq!(events.first(), Some(&BatchEvent::Started { total: 0 }));
        assert_eq!(
            events.first().map(|e| e.to_string()),
            Some("No image files found in the folder".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let mut p = pipeline("unused");
        let result = run_batch(
            "/definitely/not/here",
            &mut p,
            &BatchOptions::default(),
            &CancellationToken::new(),
            |_| {},
        );
        assert!(matches!(result, Err(Error::DirectoryNotFound(_))));
    }

    #[test]
    fn test_cancel_after_second_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["1.png", "2.png", "3.png", "4.png", "5.png"] {
            write_png(&dir.path().join(name))?;
        }

        let token = CancellationToken::new();
        let mut p = pipeline("caption");
        let mut captioned = 0;
        let mut started = Vec::new();
        let report = run_batch(
            dir.path(),
            &mut p,
            &BatchOptions::default(),
            &token,
            |e| match e {
                BatchEvent::Captioned { .. } => {
                    captioned += 1;
                    if captioned == 2 {
                        token.cancel();
                    }
                }
                BatchEvent::Processing { path, .. } => started.push(path.clone()),
                _ => {}
            },
        )?;

        assert!(report.cancelled);
        assert_eq!(report.captioned, 2);
        assert_eq!(p.captioner().calls.len(), 2);
        assert_eq!(started.len(), 2);
        assert!(dir.path().join("1.txt").exists());
        assert!(dir.path().join("2.txt").exists());
        for name in ["3.txt", "4.txt", "5.txt"] {
            assert!(!dir.path().join(name).exists());
        }
        Ok(())
    }

    #[test]
    fn test_event_messages() {
        let path = PathBuf::from("/data/cat.png");
        assert_eq!(
            BatchEvent::Started { total: 3 }.to_string(),
            "Found 3 image files"
        );
        assert_eq!(
            BatchEvent::Processing {
                index: 1,
                total: 3,
                path: path.clone()
            }
            .to_string(),
            "Processing 1/3: cat.png"
        );
        assert_eq!(
            BatchEvent::Skipped {
                index: 1,
                total: 3,
                path: path.clone()
            }
            .to_string(),
            "Skipping cat.png caption already exists"
        );
        assert_eq!(
            BatchEvent::Finished {
                processed: 3,
                captioned: 2
            }
            .to_string(),
            "Processing completed! Captioned 2 images"
        );

        assert_eq!(
            BatchEvent::Failed {
                index: 1,
                total: 3,
                path: path.clone(),
                error: "generation error, empty caption".to_string(),
                saving: false,
            }
            .to_string(),
            "Error captioning cat.png: generation error, empty caption"
        );

        let event = BatchEvent::Captioned {
            index: 2,
            total: 4,
            path,
            caption: "x".to_string(),
        };
        assert_eq!(event.progress(), Some(50.0));
    }
}
