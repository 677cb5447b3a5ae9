//! logging utilities

// 初始化日志
//
// 基于 tracing-subscriber, 同时接收 `log` 宏产生的记录
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let _ = tracing_subscriber::fmt()
        .with_ansi(true)
        .with_max_level(level)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .try_init();
}
