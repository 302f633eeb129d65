//! Tigerfire Back binary entrypoint wiring scene controllers, REST, SSE and storage layers.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::Router;
use futures::{FutureExt, future::BoxFuture};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tigerfire_back::{
    config::{AppConfig, StorageConfig},
    dao::{
        progress_store::{ProgressBackend, file::JsonFileBackend, memory::MemoryProgressBackend},
        storage::StorageResult,
    },
    routes,
    services::{sse_events, storage_supervisor},
    state::{AppState, SharedState},
};

/// Pending connection to a progress backend.
type Connection = BoxFuture<'static, StorageResult<Arc<dyn ProgressBackend>>>;
/// Opens a fresh connection to the configured backend on every call.
type Connector = Box<dyn FnMut() -> Connection + Send>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let connect = backend_connector(config.storage())?;

    let app_state = AppState::new(config);
    sse_events::spawn_public_forwarders(&app_state);
    tokio::spawn(storage_supervisor::run(app_state.clone(), connect));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    // A session still running at shutdown counts towards today's play time.
    app_state.session().stop().await;
    Ok(())
}

fn backend_connector(storage: &StorageConfig) -> anyhow::Result<Connector> {
    match storage.clone() {
        StorageConfig::Memory => {
            warn!("progress is kept in memory only and lost on restart");
            let backend = MemoryProgressBackend::new();
            Ok(Box::new(move || use_memory(backend.clone()).boxed()))
        }
        StorageConfig::File { path } => {
            info!(path = %path.display(), "using file storage");
            Ok(Box::new(move || open_file(path.clone()).boxed()))
        }
        StorageConfig::Couch => couch_connector(),
        StorageConfig::Mongo => mongo_connector(),
    }
}

async fn use_memory(backend: MemoryProgressBackend) -> StorageResult<Arc<dyn ProgressBackend>> {
    let backend: Arc<dyn ProgressBackend> = Arc::new(backend);
    Ok(backend)
}

async fn open_file(path: PathBuf) -> StorageResult<Arc<dyn ProgressBackend>> {
    let backend: Arc<dyn ProgressBackend> = Arc::new(JsonFileBackend::open(path).await?);
    Ok(backend)
}

#[cfg(feature = "couch-store")]
fn couch_connector() -> anyhow::Result<Connector> {
    use tigerfire_back::dao::progress_store::couchdb::{CouchConfig, CouchProgressStore};

    async fn connect(config: CouchConfig) -> StorageResult<Arc<dyn ProgressBackend>> {
        let store: Arc<dyn ProgressBackend> = Arc::new(CouchProgressStore::connect(config).await?);
        Ok(store)
    }

    let config = CouchConfig::from_env().context("reading CouchDB settings")?;
    Ok(Box::new(move || connect(config.clone()).boxed()))
}

#[cfg(not(feature = "couch-store"))]
fn couch_connector() -> anyhow::Result<Connector> {
    anyhow::bail!("CouchDB storage requested but the `couch-store` feature is disabled")
}

#[cfg(feature = "mongo-store")]
fn mongo_connector() -> anyhow::Result<Connector> {
    use tigerfire_back::dao::progress_store::mongodb::{MongoConfig, MongoProgressStore};

    async fn connect() -> StorageResult<Arc<dyn ProgressBackend>> {
        let config = MongoConfig::from_env().await?;
        let store: Arc<dyn ProgressBackend> = Arc::new(MongoProgressStore::connect(config).await?);
        Ok(store)
    }

    Ok(Box::new(|| connect().boxed()))
}

#[cfg(not(feature = "mongo-store"))]
fn mongo_connector() -> anyhow::Result<Connector> {
    anyhow::bail!("MongoDB storage requested but the `mongo-store` feature is disabled")
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

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
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
}
