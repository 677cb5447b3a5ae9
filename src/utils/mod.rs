//! 工具

mod cancellation;
pub use cancellation::CancellationToken;

mod log;
pub use log::init_logger;
