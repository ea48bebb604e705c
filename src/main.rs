//! Link Race Back binary entrypoint wiring REST, SSE, storage and the maintenance sweeper.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use link_race_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, memory::MemoryGameStore},
        storage::StorageError,
    },
    graph::{ArticleGraph, StaticArticleGraph},
    routes,
    services::{maintenance, storage_supervisor},
    state::{AppState, SharedState},
};

#[cfg(feature = "mongo-store")]
const DEFAULT_STORE: &str = "mongo";
#[cfg(not(feature = "mongo-store"))]
const DEFAULT_STORE: &str = "memory";

#[cfg(feature = "wiki-graph")]
const DEFAULT_GRAPH: &str = "wikipedia";
#[cfg(not(feature = "wiki-graph"))]
const DEFAULT_GRAPH: &str = "static";

const DEFAULT_GRAPH_PATH: &str = "config/graph.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let graph = build_graph()?;
    let app_state = AppState::new(config, graph);

    spawn_storage(app_state.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(maintenance::run(app_state.clone(), shutdown_rx));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = sweeper.await {
        warn!(error = %err, "maintenance sweeper did not stop cleanly");
    }
    Ok(())
}

/// Pick the link provider from `GRAPH` (`wikipedia` or `static`).
fn build_graph() -> anyhow::Result<Arc<dyn ArticleGraph>> {
    let kind = env::var("GRAPH").unwrap_or_else(|_| DEFAULT_GRAPH.into());
    match kind.as_str() {
        "static" => {
            let path = env::var("GRAPH_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_GRAPH_PATH));
            let graph = StaticArticleGraph::load(&path)
                .with_context(|| format!("loading link graph from {}", path.display()))?;
            if graph.is_empty() {
                bail!("link graph at {} has no topics", path.display());
            }
            Ok(Arc::new(graph))
        }
        #[cfg(feature = "wiki-graph")]
        "wikipedia" => {
            let api_url = env::var("WIKI_API_URL")
                .unwrap_or_else(|_| link_race_back::graph::wikipedia::DEFAULT_API_URL.into());
            info!(%api_url, "using MediaWiki link graph");
            let graph = link_race_back::graph::WikipediaGraph::new(api_url)
                .context("building MediaWiki client")?;
            Ok(Arc::new(graph))
        }
        other => bail!("unsupported GRAPH `{other}`"),
    }
}

/// Start the storage supervisor for the backend named by `STORE` (`mongo` or `memory`).
fn spawn_storage(state: SharedState) -> anyhow::Result<()> {
    let kind = env::var("STORE").unwrap_or_else(|_| DEFAULT_STORE.into());
    match kind.as_str() {
        "memory" => {
            warn!("using in-memory storage; data is lost on restart");
            let store = MemoryGameStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use link_race_back::dao::game_store::mongodb::{MongoConfig, MongoGameStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoGameStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
            }));
        }
        other => bail!("unsupported STORE `{other}`"),
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
}
