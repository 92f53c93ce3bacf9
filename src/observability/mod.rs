//! 可观测性：tracing 日志初始化
//!
//! 控制台 fmt 层始终开启；配置了 `[app] log_dir` 时再叠加一层非阻塞文件日志（{log_dir}/finrag.log）。

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppSection;

const LOG_FILE_NAME: &str = "finrag.log";

/// 初始化全局 subscriber；返回的 guard 需在进程存活期间持有，否则文件日志会丢失尾部
///
/// RUST_LOG 优先，未设置时使用 `[app] log_level`。
pub fn init_logging(app: &AppSection) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&app.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = app.log_dir.as_ref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("finrag: failed to create log dir {}: {}", dir.display(), e);
            return None;
        }
        let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        Some((layer, guard))
    });

    let (file_layer, guard) = match file_layer {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        // 测试或重复初始化时已存在全局 subscriber
        eprintln!("finrag: logging already initialized: {}", e);
    }

    guard
}
