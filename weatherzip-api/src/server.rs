//! Minimal web server with an explicit lifecycle.
//!
//! Handlers are registered per `(path, method)` pair, compiled into an axum
//! [`Router`] by [`WebServer::prepare`], then served by [`WebServer::run`]
//! until [`WebServer::stop`] is called. Every request goes through
//! [`error_logger`].
//!
//! ```text
//! Unregistered --prepare--> Started --run--> Running --stop--> Stopped
//!                              \------------stop------------------^
//! ```

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::{
    Router,
    handler::Handler,
    http::Method,
    middleware,
    routing::{self, MethodFilter, MethodRouter},
};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use crate::middleware::{RequestLogger, error_logger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unregistered,
    Started,
    Running,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Unregistered => "unregistered",
            Lifecycle::Started => "started",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("web server lifecycle lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    path: String,
    method: Method,
}

type RouteFactory = Box<dyn Fn() -> MethodRouter + Send + Sync>;

pub struct WebServer {
    address: String,
    logger: Arc<dyn RequestLogger>,
    handlers: HashMap<RouteKey, RouteFactory>,
    app: Mutex<Option<Router>>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: watch::Sender<bool>,
    local_addr: OnceLock<SocketAddr>,
    launched: AtomicBool,
}

impl fmt::Debug for WebServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebServer")
            .field("address", &self.address)
            .field("handlers", &self.handlers.len())
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

impl WebServer {
    /// `address` is anything `TcpListener::bind` resolves, e.g. `0.0.0.0:8080`.
    pub fn new(address: impl Into<String>, logger: Arc<dyn RequestLogger>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            address: address.into(),
            logger,
            handlers: HashMap::new(),
            app: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::Unregistered),
            shutdown,
            local_addr: OnceLock::new(),
            launched: AtomicBool::new(false),
        }
    }

    /// Register `handler` for `method` on `path`, replacing any previous
    /// handler for the same pair. Takes effect at the next [`Self::prepare`].
    ///
    /// # Panics
    ///
    /// If axum cannot route `method` (custom extension methods).
    pub fn add_handler<H, T>(&mut self, path: &str, method: Method, handler: H)
    where
        H: Handler<T, ()> + Sync,
        T: 'static,
    {
        let filter = MethodFilter::try_from(method.clone())
            .unwrap_or_else(|err| panic!("cannot register {method} {path}: {err}"));

        let route_method = method.clone();
        let factory: RouteFactory =
            Box::new(move || method_router(&route_method, filter, handler.clone()));

        self.handlers.insert(RouteKey { path: path.to_string(), method }, factory);
    }

    pub fn has_handler(&self, path: &str, method: &Method) -> bool {
        self.handlers.contains_key(&RouteKey { path: path.to_string(), method: method.clone() })
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address actually bound, known once [`Self::run`] is listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Build the router from the registered handlers and wrap it in the
    /// failed-request logger.
    ///
    /// # Panics
    ///
    /// If the server is already running or stopped.
    pub fn prepare(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(*lifecycle, Lifecycle::Running | Lifecycle::Stopped) {
            panic!("cannot prepare a {lifecycle} web server");
        }

        let mut router = Router::new();
        for (key, factory) in &self.handlers {
            router = router.route(&key.path, factory());
        }
        let app = router.layer(middleware::from_fn_with_state(self.logger.clone(), error_logger));

        *self.app.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(app);
        *lifecycle = Lifecycle::Started;
    }

    /// The prepared router, for in-process dispatch.
    ///
    /// # Panics
    ///
    /// Before [`Self::prepare`].
    pub fn router(&self) -> Router {
        self.app
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| panic!("web server has no router before prepare()"))
    }

    /// Bind and serve until [`Self::stop`]. In-flight requests are drained
    /// before this returns. Returns at once, without binding, when stop was
    /// requested between [`Self::prepare`] and this call.
    ///
    /// # Panics
    ///
    /// Unless the server is in the `started` state, and when the address
    /// cannot be bound or the accept loop fails.
    pub async fn run(&self) {
        let Some((app, mut shutdown)) = self.begin_running() else {
            info!("web server stopped before it started serving");
            return;
        };

        let listener = match TcpListener::bind(&self.address).await {
            Ok(listener) => listener,
            Err(err) => panic!("web server failed to bind {}: {err}", self.address),
        };
        match listener.local_addr() {
            Ok(addr) => {
                let _ = self.local_addr.set(addr);
                info!(address = %addr, "web server listening");
            }
            Err(err) => warn!(address = %self.address, error = %err, "bound address unavailable"),
        }

        let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;

        if let Err(err) = served {
            panic!("web server failed: {err}");
        }
        info!("web server stopped");
    }

    /// Ask the server to shut down. A prepared server that is not running yet
    /// is stopped too, so a concurrent [`Self::run`] returns instead of
    /// serving. A no-op otherwise, so it is safe to call repeatedly.
    pub fn stop(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.lifecycle.lock().map_err(|_| ServerError::Poisoned)?;
        if matches!(*lifecycle, Lifecycle::Started | Lifecycle::Running) {
            info!(state = %*lifecycle, "web server shutting down");
            self.shutdown.send_replace(true);
            *lifecycle = Lifecycle::Stopped;
        }
        Ok(())
    }

    /// `None` when the server was stopped before any run() got this far.
    fn begin_running(&self) -> Option<(Router, watch::Receiver<bool>)> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let state = *lifecycle;
        if state == Lifecycle::Stopped && !self.launched.load(Ordering::SeqCst) {
            return None;
        }
        if state != Lifecycle::Started {
            // Release before panicking so stop() keeps working.
            drop(lifecycle);
            panic!("web server cannot run while {state}: call prepare() first");
        }

        let app = self.app.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let Some(app) = app else {
            drop(lifecycle);
            panic!("web server has no router before prepare()");
        };

        *lifecycle = Lifecycle::Running;
        self.launched.store(true, Ordering::SeqCst);
        Some((app, self.shutdown.subscribe()))
    }
}

fn method_router<H, T>(method: &Method, filter: MethodFilter, handler: H) -> MethodRouter
where
    H: Handler<T, ()>,
    T: 'static,
{
    match *method {
        Method::GET => routing::get(handler),
        Method::POST => routing::post(handler),
        Method::PUT => routing::put(handler),
        Method::PATCH => routing::patch(handler),
        Method::DELETE => routing::delete(handler),
        _ => routing::on(filter, handler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::CapturingLogger;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn server(address: &str) -> (WebServer, Arc<CapturingLogger>) {
        let logger = Arc::new(CapturingLogger::default());
        (WebServer::new(address, logger.clone()), logger)
    }

    async fn call(router: Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn starts_unregistered() {
        let (server, _) = server("127.0.0.1:0");
        assert_eq!(server.lifecycle(), Lifecycle::Unregistered);
        assert_eq!(server.handler_count(), 0);
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn same_path_and_method_is_replaced() {
        let (mut server, _) = server("127.0.0.1:0");
        server.add_handler("/test", Method::GET, || async { "first" });
        server.add_handler("/test", Method::GET, || async { "second" });
        server.add_handler("/test", Method::POST, || async { "posted" });

        assert_eq!(server.handler_count(), 2);
        assert!(server.has_handler("/test", &Method::GET));
        assert!(server.has_handler("/test", &Method::POST));
        assert!(!server.has_handler("/test", &Method::PUT));
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let (mut server, _) = server("127.0.0.1:0");
        server.add_handler("/test", Method::GET, || async { "first" });
        server.add_handler("/test", Method::GET, || async { "second" });
        server.prepare();

        assert_eq!(server.lifecycle(), Lifecycle::Started);
        let (status, body) = call(server.router(), Method::GET, "/test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "second");
    }

    #[tokio::test]
    async fn dispatches_by_method() {
        let (mut server, logger) = server("127.0.0.1:0");
        server.add_handler("/test", Method::GET, || async { "got" });
        server.add_handler("/test", Method::DELETE, || async { "deleted" });
        server.add_handler("/test", Method::OPTIONS, || async { "options" });
        server.prepare();

        assert_eq!(call(server.router(), Method::GET, "/test").await.1, "got");
        assert_eq!(call(server.router(), Method::DELETE, "/test").await.1, "deleted");
        assert_eq!(call(server.router(), Method::OPTIONS, "/test").await.1, "options");

        let (status, _) = call(server.router(), Method::POST, "/test").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (status, _) = call(server.router(), Method::GET, "/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let logged: Vec<u16> = logger.entries().iter().map(|e| e.status.as_u16()).collect();
        assert_eq!(logged, vec![405, 404]);
    }

    #[test]
    #[should_panic(expected = "cannot register")]
    fn unroutable_method_panics() {
        let (mut server, _) = server("127.0.0.1:0");
        let method = Method::from_bytes(b"BREW").unwrap();
        server.add_handler("/coffee", method, || async { "" });
    }

    #[test]
    #[should_panic(expected = "before prepare")]
    fn router_requires_prepare() {
        let (server, _) = server("127.0.0.1:0");
        let _ = server.router();
    }

    #[tokio::test]
    async fn run_without_prepare_panics_every_time() {
        let (server, _) = server("127.0.0.1:0");
        let server = Arc::new(server);

        for _ in 0..2 {
            let server = server.clone();
            let err = tokio::spawn(async move { server.run().await }).await.unwrap_err();
            assert!(err.is_panic());
        }
        assert_eq!(server.lifecycle(), Lifecycle::Unregistered);
    }

    #[test]
    fn stop_before_run_is_a_no_op() {
        let (server, _) = server("127.0.0.1:0");
        server.stop().unwrap();
        server.stop().unwrap();
        assert_eq!(server.lifecycle(), Lifecycle::Unregistered);
    }

    #[test]
    fn stop_after_prepare_stops() {
        let (mut server, _) = server("127.0.0.1:0");
        server.prepare();
        server.stop().unwrap();
        assert_eq!(server.lifecycle(), Lifecycle::Stopped);
        server.stop().unwrap();
        assert_eq!(server.lifecycle(), Lifecycle::Stopped);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stop_before_run_is_polled_keeps_server_down() {
        let (mut server, _) = server("127.0.0.1:0");
        server.add_handler("/test", Method::GET, || async { "live" });
        server.prepare();
        let server = Arc::new(server);

        // On a single-threaded runtime the task cannot start before stop().
        let running = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });
        server.stop().unwrap();

        tokio::time::timeout(Duration::from_secs(2), running).await.unwrap().unwrap();
        assert_eq!(server.lifecycle(), Lifecycle::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    #[should_panic(expected = "failed to bind")]
    async fn unbindable_address_panics() {
        let (mut server, _) = server("definitely-not-an-address");
        server.prepare();
        server.run().await;
    }

    #[tokio::test]
    async fn serves_until_stopped() {
        let (mut server, _) = server("127.0.0.1:0");
        server.add_handler("/test", Method::GET, || async { "live" });
        server.prepare();
        let server = Arc::new(server);

        let running = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });

        let mut addr = None;
        for _ in 0..200 {
            addr = server.local_addr();
            if addr.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let addr = addr.expect("server never bound");
        assert_eq!(server.lifecycle(), Lifecycle::Running);

        let body = reqwest::get(format!("http://{addr}/test")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "live");

        server.stop().unwrap();
        server.stop().unwrap();
        tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
        assert_eq!(server.lifecycle(), Lifecycle::Stopped);

        let err = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        })
        .await
        .unwrap_err();
        assert!(err.is_panic());
    }
}
