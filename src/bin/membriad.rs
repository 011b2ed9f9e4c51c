//! The membria daemon: loads configuration, opens the graph store, and
//! supervises the background tasks that make up the running service — the
//! JSON-RPC tool server on stdio and the webhook HTTP server — each as an
//! explicit task with its own `CancellationToken` rather than a detached
//! fire-and-forget spawn (SPEC_FULL.md REDESIGN FLAGS).

use membria::rpc::{ExternalToolRegistry, ToolContext, ToolServer};
use membria::signal_queue::SignalQueue;
use membria::webhook::{WebhookServer, WebhookState};
use membria::{Config, GraphStore, SqliteGraphStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn config_path() -> std::path::PathBuf {
    std::env::var("MEMBRIA_CONFIG").map(std::path::PathBuf::from).unwrap_or_else(|_| std::path::PathBuf::from("membria.toml"))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = Config::load(config_path()).unwrap_or_else(|e| {
        eprintln!("failed to load configuration, falling back to defaults: {e}");
        Config::default()
    });
    init_logging(&config.daemon.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting membriad");

    let store: Arc<dyn GraphStore> = Arc::new(
        SqliteGraphStore::open(&config.falkordb.path).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to open graph store");
            std::process::exit(1);
        }),
    );

    let signal_queue = SignalQueue::open(signal_queue_path(&config.falkordb.path)).ok();

    let external = if config.mcp_discovery.enabled {
        Some(ExternalToolRegistry::with_timing(
            &config.mcp_discovery.allowlist_path,
            config.mcp_discovery.timeout_sec,
            config.mcp_discovery.refresh_sec,
        ))
    } else {
        None
    };

    let rpc_server = ToolServer::new(ToolContext::new(store.clone()), external);
    let webhook_state = WebhookState::new(store.clone(), signal_queue, config.webhook.github_secret.clone());
    let webhook_router = WebhookServer::new(webhook_state).router();
    let webhook_port = config.webhook.port;

    let supervisor_cancel = CancellationToken::new();

    let rpc_cancel = supervisor_cancel.child_token();
    let rpc_task = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        if let Err(e) = rpc_server.serve(stdin, stdout, rpc_cancel).await {
            tracing::error!(error = %e, "rpc server exited with error");
        }
    });

    let webhook_cancel = supervisor_cancel.child_token();
    let webhook_task = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(("0.0.0.0", webhook_port)).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, port = webhook_port, "failed to bind webhook listener");
                return;
            }
        };
        tracing::info!(port = webhook_port, "webhook server listening");
        let serve = axum::serve(listener, webhook_router).with_graceful_shutdown(async move {
            webhook_cancel.cancelled().await;
        });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "webhook server exited with error");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        _ = rpc_task => {
            tracing::warn!("rpc server task ended unexpectedly");
        }
    }

    supervisor_cancel.cancel();
    let _ = webhook_task.await;

    Ok(())
}

fn signal_queue_path(graph_path: &str) -> std::path::PathBuf {
    let path = std::path::Path::new(graph_path);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("membria");
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    match parent {
        Some(parent) => parent.join(format!("{stem}.signals.sqlite3")),
        None => std::path::PathBuf::from(format!("{stem}.signals.sqlite3")),
    }
}
