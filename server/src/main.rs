use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use inkroom_server::error::ServerError;
use inkroom_server::logic::evict_expired;
use inkroom_server::router;
use inkroom_server::state::{AppState, ServerConfig, DEFAULT_HISTORY_LIMIT};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    /// Operations kept per room for undo.
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,
    /// Evict strokes older than this many seconds. Unset keeps them.
    #[arg(long)]
    max_stroke_age_secs: Option<u64>,
    #[arg(long, default_value_t = 60)]
    eviction_interval_secs: u64,
    #[arg(long, default_value_t = 16)]
    cursor_interval_ms: u64,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            history_limit: self.history_limit,
            max_stroke_age: self.max_stroke_age_secs.map(Duration::from_secs),
            eviction_interval: Duration::from_secs(self.eviction_interval_secs.max(1)),
            cursor_interval: Duration::from_millis(self.cursor_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkroom_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    if let Err(error) = run(args).await {
        error!(%error, "server error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let state = AppState::new(args.config());

    if let Some(max_age) = state.config.max_stroke_age {
        let registry = state.registry.clone();
        let period = state.config.eviction_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                evict_expired(&registry, max_age).await;
            }
        });
    }

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "whiteboard authority listening, websocket at /ws");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;
    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
