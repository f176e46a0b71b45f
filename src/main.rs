use std::net::SocketAddr;

use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formgate::config::{self, StorageBackend};
use formgate::db;
use formgate::state::{AppState, Backends};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging (stdout + daily rotated file under ./logs)
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "formgate.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Keep the guards alive so the non-blocking writers flush
    let _log_guards = (stdout_guard, file_guard);

    // Load configuration (embedded defaults -> formgate.toml -> env/.env)
    let app_cfg = config::load()?;

    let backends = match app_cfg.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; all data is lost on restart");
            Backends::in_memory()
        }
        StorageBackend::Sqlite => {
            let db_url = &app_cfg.storage.url;
            config::ensure_sqlite_parent_dir(db_url)?;
            let pool = db::connect(db_url, 16).await?;
            db::init_db(&pool).await?;
            info!("Using SQLite storage at {}", db_url);
            Backends::sqlite(pool)
        }
    };

    let sweep_every = app_cfg.storage.sweep_interval_secs;
    let state = AppState::new(app_cfg.clone(), backends)?;

    // Periodic sweep of expired revocations, sessions and CSRF tokens
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(TokioDuration::from_secs(sweep_every));
            loop {
                ticker.tick().await;
                match sessions.sweep().await {
                    Ok(0) => {}
                    Ok(n) => info!(removed = n, "swept expired credentials"),
                    Err(e) => warn!("credential sweep failed: {}", e),
                }
            }
        });
    }

    let app = formgate::build_router(state);

    let port: u16 = app_cfg.server.port;
    let host: String = app_cfg.server.host.clone();
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(scheme = ?app_cfg.policy.token_scheme, csrf = app_cfg.policy.enforce_csrf, "formgate listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
