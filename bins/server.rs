use dotenvy::dotenv;
use tracing::{error, info};
use uuid::Uuid;

fn init_logging() {
    // 先加载 .env，LOG_FORMAT / RUST_LOG 才能生效
    dotenv().ok();
    common::utils::logging::init_logging_from_env();
}

/// config.toml first, then TOKIO_WORKER_THREADS via the env-only config.
/// A bad config file is reported by `server::run`; the runtime just uses defaults.
fn worker_threads() -> Option<usize> {
    server::startup::load_config().ok().and_then(|cfg| cfg.server.worker_threads)
}

fn main() -> std::process::ExitCode {
    init_logging();

    let instance = Uuid::new_v4();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(service = "book_catalog", event = "panic", %instance, message = %info, "unhandled panic");
    }));

    let threads = worker_threads();
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(w) = threads {
        builder.worker_threads(w);
    }
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "book_catalog", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    info!(
        service = "book_catalog",
        event = "start",
        %instance,
        version,
        threads = threads.unwrap_or_default(),
        "book catalog starting"
    );

    rt.block_on(async move {
        tokio::select! {
            res = server::run() => match res {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(e) => {
                    error!(service = "book_catalog", event = "run_failed", error = %e, "server exited with error");
                    std::process::ExitCode::FAILURE
                }
            },
            _ = tokio::signal::ctrl_c() => {
                // 两个存储都没有进程内缓冲，直接退出即可
                info!(service = "book_catalog", event = "shutdown_signal", %instance, "received Ctrl+C, shutting down");
                std::process::ExitCode::SUCCESS
            }
        }
    })
}
