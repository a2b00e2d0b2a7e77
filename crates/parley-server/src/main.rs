use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use parley_core::AppState;
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod tls;

fn parse_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Directory avatar/icon uploads land under: the parent of the sqlite file,
/// or `./data` when the db path has no parent component (e.g. `:memory:`).
fn data_dir_for(db_path: &str) -> PathBuf {
    let parent = PathBuf::from(db_path)
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    if parent.as_os_str().is_empty() {
        PathBuf::from("./data")
    } else {
        parent
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let ansi_default = if cfg!(windows) {
        false
    } else {
        std::io::stderr().is_terminal()
    };
    let use_ansi = parse_env_bool("PARLEY_LOG_ANSI", ansi_default);
    let default_log_filter =
        "parley=info,parley_ws=info,parley_core=info,parley_db=info,parley_api=info,tower_http=info,axum=warn";

    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_ansi(use_ansi)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_filter)),
        )
        .init();

    let args = cli::Args::parse();
    let cfg = config::Config::load(&args.config)?;

    let data_dir = data_dir_for(&cfg.database.db_path);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory '{}'", data_dir.display()))?;

    let db = parley_db::create_pool(&cfg.database.db_path)
        .await
        .context("opening database pool")?;
    parley_db::run_migrations(&db).await.context("running migrations")?;

    let default_server_id = parley_core::bootstrap::ensure_default_server(&db)
        .await
        .context("bootstrapping default server")?;
    tracing::info!(server_id = default_server_id, "default server ready");

    let tls_config = tls::load(&cfg.tls).await?;
    let scheme = if tls_config.is_some() { "wss" } else { "ws" };
    let public_address = format!("{scheme}://{}:{}/ws", cfg.server.host, cfg.server.port);

    let state = AppState::new(
        db,
        data_dir,
        cfg.admin.admin_token.clone(),
        cfg.admin.open_admin,
        cfg.network.trust_proxy,
        public_address,
    );

    let app: Router = Router::new()
        .merge(parley_ws::ws_router())
        .merge(parley_api::build_router())
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .context("invalid [server] host/port")?;

    let shutdown = state.shutdown.clone();
    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down (ctrl-c)");
            }
            _ = shutdown.notified() => {
                tracing::info!("shutting down (notified)");
            }
        }
    };

    match tls_config {
        Some(rustls_config) => {
            tracing::info!(%addr, "listening (tls)");
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                shutdown_signal.await;
                shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
            });
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .context("https server error")?;
        }
        None => {
            tracing::info!(%addr, "listening");
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal)
            .await
            .context("http server error")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_falls_back_when_path_has_no_parent() {
        assert_eq!(data_dir_for(":memory:"), PathBuf::from("./data"));
    }

    #[test]
    fn data_dir_uses_db_file_parent() {
        assert_eq!(data_dir_for("./state/parley.db"), PathBuf::from("./state"));
    }
}
