//! # Engine
//!
//! The public entry point: route registration, middleware, pluggable
//! data-store and session registries, and the Hyper/Tokio serve loop with
//! graceful shutdown. Handlers are synchronous and run on the blocking
//! thread pool; the async side only does transport work.

use crate::config::Config;
use crate::dispatcher::{Dispatcher, PanicHandler};
use crate::error::{Error, Result};
use crate::middleware::{Handler, Middleware};
use crate::pool::ContextPool;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Method, Resource, METHODS};
use crate::session::{SessionManager, SessionProvider};
use crate::static_files::StaticDir;
use crate::store::StoreFactory;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;
use tracing::{error, info};

/// Engine-wide state reachable from every pooled context
///
/// Holds the configuration and the driver/provider registries. The session
/// manager is materialized lazily on the first `session_start` anywhere in
/// the engine and reused afterwards.
pub struct Shared {
    config: Config,
    stores: RwLock<HashMap<String, StoreFactory>>,
    session_providers: RwLock<HashMap<String, Arc<dyn SessionProvider>>>,
    session_manager: OnceLock<Arc<SessionManager>>,
}

impl Shared {
    pub(crate) fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            stores: RwLock::new(HashMap::new()),
            session_providers: RwLock::new(HashMap::new()),
            session_manager: OnceLock::new(),
        })
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn register_store_driver(&self, name: &str, factory: StoreFactory) {
        let mut stores = self.stores.write().unwrap_or_else(|e| e.into_inner());
        stores.insert(name.to_string(), factory);
    }

    pub(crate) fn register_session_provider(&self, name: &str, provider: Arc<dyn SessionProvider>) {
        let mut providers = self
            .session_providers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        providers.insert(name.to_string(), provider);
    }

    pub(crate) fn has_store_driver(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        stores.contains_key(name)
    }

    /// Factory for the configured data-store driver
    pub(crate) fn store_factory(&self) -> Result<StoreFactory> {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        stores
            .get(&self.config.store.driver)
            .cloned()
            .ok_or_else(|| Error::UnknownStoreDriver {
                driver: self.config.store.driver.clone(),
            })
    }

    /// The engine's session manager, built on first use from the provider
    /// registered under the configured name.
    pub(crate) fn session_manager(&self) -> Result<Arc<SessionManager>> {
        if let Some(manager) = self.session_manager.get() {
            return Ok(manager.clone());
        }

        let provider = {
            let providers = self
                .session_providers
                .read()
                .unwrap_or_else(|e| e.into_inner());
            providers
                .get(&self.config.session_provider)
                .cloned()
                .ok_or_else(|| Error::UnknownSessionProvider {
                    provider: self.config.session_provider.clone(),
                })?
        };

        let manager = Arc::new(SessionManager::new(provider, self.config.session.clone()));
        // a concurrent first call may have won the race; use whichever
        // instance landed in the cell
        Ok(self.session_manager.get_or_init(|| manager).clone())
    }

    /// The session manager if (and only if) one was already built
    pub(crate) fn session_manager_if_init(&self) -> Option<Arc<SessionManager>> {
        self.session_manager.get().cloned()
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Arc<Self> {
        Self::new(Config::default())
    }

    #[cfg(test)]
    pub(crate) fn for_tests_with(config: Config) -> Arc<Self> {
        Self::new(config)
    }
}

/// The web engine: routes, middleware, registries, and the serve loop
pub struct Engine {
    shared: Arc<Shared>,
    pool: Arc<ContextPool>,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Create an engine with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Create an engine from a YAML configuration file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::with_config(Config::from_file(path)?)
    }

    /// Create an engine from an in-memory configuration
    ///
    /// When `public_dir` is non-empty, a static file route for it is
    /// registered automatically.
    pub fn with_config(config: Config) -> Result<Self> {
        let public_dir = config.public_dir.clone();
        let shared = Shared::new(config);
        let pool = Arc::new(ContextPool::new(shared.clone()));
        let dispatcher = Dispatcher::new(pool.clone());

        let mut engine = Self {
            shared,
            pool,
            dispatcher,
        };
        if !public_dir.is_empty() {
            engine.static_dir(&public_dir)?;
        }
        Ok(engine)
    }

    /// Register a GET route
    pub fn get(&mut self, path: &str, h: Handler, middlewares: Vec<Middleware>) -> Result<()> {
        self.dispatcher.bind(Method::Get, path, h, middlewares)
    }

    /// Register a POST route
    pub fn post(&mut self, path: &str, h: Handler, middlewares: Vec<Middleware>) -> Result<()> {
        self.dispatcher.bind(Method::Post, path, h, middlewares)
    }

    /// Register a PUT route
    pub fn put(&mut self, path: &str, h: Handler, middlewares: Vec<Middleware>) -> Result<()> {
        self.dispatcher.bind(Method::Put, path, h, middlewares)
    }

    /// Register a DELETE route
    pub fn delete(&mut self, path: &str, h: Handler, middlewares: Vec<Middleware>) -> Result<()> {
        self.dispatcher.bind(Method::Delete, path, h, middlewares)
    }

    /// Register a PATCH route
    pub fn patch(&mut self, path: &str, h: Handler, middlewares: Vec<Middleware>) -> Result<()> {
        self.dispatcher.bind(Method::Patch, path, h, middlewares)
    }

    /// Register a HEAD route
    pub fn head(&mut self, path: &str, h: Handler, middlewares: Vec<Middleware>) -> Result<()> {
        self.dispatcher.bind(Method::Head, path, h, middlewares)
    }

    /// Register an OPTIONS route
    pub fn options(&mut self, path: &str, h: Handler, middlewares: Vec<Middleware>) -> Result<()> {
        self.dispatcher.bind(Method::Options, path, h, middlewares)
    }

    /// Register every verb a resource supports under one path
    pub fn resource(&mut self, path: &str, resource: &dyn Resource) -> Result<()> {
        for method in METHODS {
            if let Some(h) = resource.handler_for(method) {
                self.dispatcher.bind(method, path, h, Vec::new())?;
            }
        }
        Ok(())
    }

    /// Serve files from `dir` under the URL prefix `/dir/...`
    pub fn static_dir(&mut self, dir: &str) -> Result<()> {
        let trimmed = dir.trim_matches('/');
        let segments = trimmed.split('/').filter(|s| !s.is_empty()).count();
        let pattern = format!("/{trimmed}/*filepath");
        let h = StaticDir::new(trimmed).strip_segments(segments).into_handler();
        self.dispatcher.bind(Method::Get, &pattern, h, Vec::new())
    }

    /// Append a global middleware wrapping every route
    pub fn use_middleware(&mut self, mw: Middleware) {
        self.dispatcher.use_middleware(mw);
    }

    /// Replace the not-found handler
    pub fn set_not_found_handler(&mut self, h: Handler) {
        self.dispatcher.set_not_found_handler(h);
    }

    /// Replace the panic recovery hook
    pub fn set_panic_handler(&mut self, h: PanicHandler) {
        self.dispatcher.set_panic_handler(h);
    }

    /// Register a data-store factory under a driver name
    pub fn register_store_driver(&self, name: &str, factory: StoreFactory) {
        self.shared.register_store_driver(name, factory);
    }

    /// Register a session provider under a name
    pub fn register_session_provider(&self, name: &str, provider: Arc<dyn SessionProvider>) {
        self.shared.register_session_provider(name, provider);
    }

    /// The engine configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The context pool (test instrumentation)
    #[must_use]
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Run one request through the pipeline without the network stack
    pub fn dispatch(&self, request: Request) -> Response {
        self.dispatcher.dispatch(request)
    }

    /// Serve on the configured listen address until interrupted
    pub async fn run(self) -> Result<()> {
        let addr = self.shared.config.listen();
        self.run_addr(&addr).await
    }

    /// Serve on `addr` until interrupted, then drain open connections
    pub async fn run_addr(self, addr: &str) -> Result<()> {
        // a configured driver must resolve before the first request needs it
        let driver = &self.shared.config.store.driver;
        if !driver.is_empty() && !self.shared.has_store_driver(driver) {
            return Err(Error::UnknownStoreDriver {
                driver: driver.clone(),
            });
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind {
                address: addr.to_string(),
                source,
            })?;

        info!("Engine listening on http://{}", addr);

        let dispatcher = Arc::new(self.dispatcher);
        let max_body_size = self.shared.config.max_body_size;
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);

                    let dispatcher = dispatcher.clone();
                    let active = active.clone();

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service_fn(move |req| {
                                let dispatcher = dispatcher.clone();
                                async move {
                                    let method = req.method().clone();
                                    let path = req.uri().path().to_string();

                                    let response = handle_request(req, &dispatcher, max_body_size).await;

                                    info!("    {} - \"{} {}\" {}",
                                        remote_addr,
                                        method,
                                        path,
                                        response.status()
                                    );
                                    Ok::<_, std::convert::Infallible>(response)
                                }
                            }))
                            .await
                        {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, stopping engine...");
                    break;
                }
            }
        }

        let drain = async {
            loop {
                if active.load(Ordering::Relaxed) == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(30), drain).await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", err);
        // never resolve; the serve loop keeps running without the signal
        std::future::pending::<()>().await;
    }
}

/// Transport boundary: collect the request, hop to the blocking pool for
/// the synchronous pipeline, convert the buffered response back.
async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    dispatcher: &Arc<Dispatcher>,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let request = match Request::from_hyper(req, max_body_size).await {
        Ok(r) => r,
        Err(Error::PayloadTooLarge { .. }) => {
            return plain_status(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
        }
        Err(e) => {
            error!("Failed to parse request: {}", e);
            return plain_status(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    let dispatcher = dispatcher.clone();
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(request)).await {
        Ok(response) => response.into_hyper(),
        Err(err) => {
            error!("Dispatch task failed: {}", err);
            plain_status(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn plain_status(status: StatusCode, body: &'static str) -> hyper::Response<Full<Bytes>> {
    hyper::Response::builder()
        .status(status)
        .header("Content-Type", crate::response::TEXT_PLAIN_UTF8)
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| hyper::Response::new(Full::new(Bytes::from(body))))
}
