//! The operational harness around [`bloomd_core::Manager`]: command-line
//! parsing, configuration loading, logging setup, wiring a concrete
//! [`bloomd_filter_fs::FsBackend`] to the manager, and a graceful shutdown
//! on SIGTERM/CTRL+C.
//!
//! There is no wire protocol here (§1, §13 of the design spec exclude it):
//! this binary starts the manager — which starts its own reaper thread and
//! runs the startup loader — and stops it cleanly. A future protocol crate
//! is the external collaborator that would expose `create`/`check_keys`/etc.
//! to remote clients.

mod config;

use bloomd_async::task_pool::TaskPool;
use std::sync::Arc;
use trace_err::TraceErrResult;
use tracing::info;

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

fn listen_for_cancel(pool: &TaskPool) {
    let cancel = pool.cancel_token().clone();
    pool.spawn(async move {
        #[cfg(unix)]
        {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .trace_expect("failed to register signal handlers");
            tokio::select! {
                _ = term.recv() => info!("received terminate signal, stopping..."),
                _ = tokio::signal::ctrl_c() => info!("received ctrl+c, stopping..."),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received ctrl+c, stopping...");
        }
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some((config, config_source)) = config::init() else {
        return Ok(());
    };

    let log_level = std::env::var("BLOOMD_LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse::<tracing::Level>().ok())
        .or(config.log_level)
        .unwrap_or(tracing::Level::ERROR);

    {
        use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
        let filter = EnvFilter::builder()
            .with_default_directive(tracing_subscriber::filter::LevelFilter::from_level(log_level).into())
            .from_env_lossy();
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(filter))
            .init();
    }

    info!("{PKG_NAME} version {PKG_VERSION} starting...");
    info!("{config_source}");

    inner_main(config).await.inspect_err(|e| tracing::error!("{e}"))
}

async fn inner_main(config: config::Config) -> anyhow::Result<()> {
    let fs_config = bloomd_filter_fs::Config {
        data_dir: config
            .data_dir
            .clone()
            .unwrap_or_else(|| bloomd_filter_fs::Config::default().data_dir),
        default_bits: config.default_bits,
        default_hashes: config.default_hashes,
    };
    let backend = Arc::new(bloomd_filter_fs::FsBackend::new(fs_config));

    let manager_config = bloomd_core::Config {
        data_dir: config.data_dir,
        default_filter: bloomd_core::FilterConfig {
            in_memory: config.in_memory,
            params: Default::default(),
        },
    };

    // `Manager::new` runs the startup loader and spawns the reaper thread.
    let manager = bloomd_core::Manager::new(manager_config, backend);

    let pool = TaskPool::new();
    listen_for_cancel(&pool);

    info!("started successfully");

    pool.shutdown().await;

    // Closes (never deletes) every filter still reachable from the
    // directory chain and joins the reaper thread.
    manager.shutdown();

    info!("stopped");
    Ok(())
}
