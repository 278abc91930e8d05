use crate::config::{ConfigError, ServerConfig};
use crate::handlers;
use crate::hub::Hub;
use crate::sink::{MemorySink, ResultStore, Sink, SinkError, SinkHandle};
use crate::store::SqliteStore;
use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;
use warp::filters::BoxedFilter;
use warp::reply::Reply;
use warp::Filter;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("Store error: {0}")]
    StoreError(#[from] SinkError),
}

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppContext {
    config: ServerConfig,
    hub: Arc<Hub>,
    results: Arc<dyn ResultStore>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Open the configured SQLite store and build the hub on top of it.
    /// Must be called from within a tokio runtime.
    pub fn open(config: ServerConfig) -> Result<Self, ServerError> {
        let store = Arc::new(SqliteStore::open(&config.database)?);
        info!(database = %config.database.display(), "result store opened");
        Self::with_store(config, store)
    }

    pub fn with_store<S>(config: ServerConfig, store: Arc<S>) -> Result<Self, ServerError>
    where
        S: Sink + ResultStore + 'static,
    {
        config.validate()?;
        let opponent = fourline_ai::create_opponent(&config.opponent).ok_or_else(|| {
            ServerError::ConfigError(format!("unknown opponent `{}`", config.opponent))
        })?;
        let sink = SinkHandle::spawn(store.clone(), config.sink_capacity);
        let hub = Hub::new(config.hub.clone(), opponent, sink);

        Ok(Self {
            config,
            hub,
            results: store,
        })
    }

    /// Context over an in-memory store, returned alongside it for inspection.
    pub fn in_memory(config: ServerConfig) -> Result<(Self, Arc<MemorySink>), ServerError> {
        let store = Arc::new(MemorySink::new());
        let context = Self::with_store(config, Arc::clone(&store))?;
        Ok((context, store))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    pub fn results(&self) -> Arc<dyn ResultStore> {
        Arc::clone(&self.results)
    }
}

#[derive(Debug, Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let context = AppContext::open(config)?;
        Ok(Self { context })
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let bind_addr = Self::bind_addr(context.config())?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::routes(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        info!(%addr, "fourline server listening");

        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, context))
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host.as_str();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }

        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port));
        }

        let candidate = format!("{}:{}", host, config.port);
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;

        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
            source = cause.source();
        }

        ServerError::ConfigError(err.to_string())
    }

    /// Every route the server exposes; also used directly by in-process tests.
    pub fn routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let health = Self::health_route(context);
        let ws = Self::ws_route(context);
        let stats = Self::stats_routes(context);

        ws.or(health).unify().or(stats).unify().boxed()
    }

    fn ws_route(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        warp::path("ws")
            .and(warp::path::end())
            .and(warp::ws())
            .and(Self::with_hub(context.hub()))
            .map(|ws: warp::ws::Ws, hub: Arc<Hub>| {
                ws.on_upgrade(move |socket| handlers::serve_connection(socket, hub))
                    .into_response()
            })
            .boxed()
    }

    fn health_route(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        warp::path("health")
            .and(warp::get())
            .and(warp::path::end())
            .and(Self::with_hub(context.hub()))
            .map(|hub: Arc<Hub>| handlers::health(&hub).into_response())
            .boxed()
    }

    fn stats_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let results = context.results();

        let leaderboard = warp::path!("leaderboard")
            .and(warp::get())
            .and(Self::with_results(results.clone()))
            .and_then(|store: Arc<dyn ResultStore>| async move {
                Ok::<_, Infallible>(handlers::leaderboard(store).await)
            });

        let efficiency = warp::path!("efficiency")
            .and(warp::get())
            .and(Self::with_results(results.clone()))
            .and_then(|store: Arc<dyn ResultStore>| async move {
                Ok::<_, Infallible>(handlers::efficiency(store).await)
            });

        let totals = warp::path!("stats")
            .and(warp::get())
            .and(Self::with_results(results.clone()))
            .and_then(|store: Arc<dyn ResultStore>| async move {
                Ok::<_, Infallible>(handlers::totals(store).await)
            });

        let recent = warp::path!("game_results")
            .and(warp::get())
            .and(Self::with_results(results))
            .and_then(|store: Arc<dyn ResultStore>| async move {
                Ok::<_, Infallible>(handlers::recent_results(store).await)
            });

        leaderboard
            .or(efficiency)
            .unify()
            .or(totals)
            .unify()
            .or(recent)
            .unify()
            .boxed()
    }

    fn with_hub(hub: Arc<Hub>) -> impl Filter<Extract = (Arc<Hub>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&hub))
    }

    fn with_results(
        results: Arc<dyn ResultStore>,
    ) -> impl Filter<Extract = (Arc<dyn ResultStore>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&results))
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Stop accepting connections, wait for the listener, then drain the sink.
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }

        self.context.hub().sink().flush().await;
        info!("sink flushed");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
