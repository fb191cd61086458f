//! Request dispatch and the HTTP server.
//!
//! [`App`] is the per-request entry point: it wraps the transport message,
//! runs the global tier, resolves a route, runs the scope and route tiers and
//! finally the handler. [`Server`] owns the accept loop and hands every
//! request on every connection to the shared `App`.
//!
//! # Graceful shutdown
//!
//! On SIGTERM (or Ctrl-C) the server stops accepting, lets every in-flight
//! connection task finish, then returns from [`Server::serve`].

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http_body::Body;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::{BoxError, Error};
use crate::handler::{BoxedMiddleware, Middleware};
use crate::pipeline::{Chain, Flow};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Match, Router};
use crate::status::Status;

// ── App ───────────────────────────────────────────────────────────────────────

/// A router plus the global middleware tier.
///
/// ```rust
/// use fcodex::{App, Next, Request, Response, Router};
///
/// async fn hello(_req: Request, res: Response) { res.text("hello") }
/// async fn stamp(_req: Request, res: Response, next: Next) {
///     res.set_header("x-powered-by", "fcodex");
///     next.proceed();
/// }
///
/// let app = App::new(Router::new().get("/", hello)).middleware(stamp);
/// ```
pub struct App {
    global: Vec<BoxedMiddleware>,
    router: Router,
}

impl App {
    pub fn new(router: Router) -> Self {
        Self { global: Vec::new(), router }
    }

    /// Adds global middleware, run for every request before route lookup.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.global.push(middleware.into_boxed_middleware());
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Routes one request and produces one response. Never fails: faults
    /// become a 500, unknown methods a 405, unmatched paths a 404.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let request = match Request::from_http(req) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejecting request");
                let res = Response::new();
                res.status(Status::MethodNotAllowed).send("Method Not Allowed");
                return res.into_http();
            }
        };
        let response = Response::new();

        if let Err(e) = self.run(&request, &response).await {
            error!(method = %request.method(), url = request.url(), error = %e, "request failed");
            if response.reset_body() {
                response
                    .status(Status::InternalServerError)
                    .json(&json!({ "error": "Internal Server Error" }));
            }
        }

        response.into_http()
    }

    async fn run(&self, req: &Request, res: &Response) -> Result<(), Error> {
        if guarded(Chain::new(&self.global).run(req, res)).await? == Flow::Halt {
            return Ok(());
        }

        let Some(Match { handler, scope, middlewares, params, .. }) =
            self.router.resolve(req.method(), req.path())
        else {
            res.status(Status::NotFound).send("Not Found");
            return Ok(());
        };
        req.set_params(params);

        for tier in [&scope, &middlewares] {
            if guarded(Chain::new(tier).run(req, res)).await? == Flow::Halt {
                return Ok(());
            }
        }

        guarded(handler.call(req.clone(), res.clone())).await
    }
}

/// Runs one tier, turning a panic into an ordinary [`Error`].
async fn guarded<T>(fut: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(Error::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

enum Bind {
    Addr(String),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
}

impl Server {
    /// Configures the server to bind to `addr` (a `host:port` string) when
    /// serving starts. An invalid address surfaces as [`Error::Addr`] then.
    ///
    /// ```rust,no_run
    /// use fcodex::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self { bind: Bind::Addr(addr.to_owned()) }
    }

    /// Serves on an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener) }
    }

    /// Accepts connections until SIGTERM or Ctrl-C, then drains in-flight
    /// connections and returns.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Like [`serve`](Self::serve), stopping when `shutdown` resolves.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr.parse::<SocketAddr>()?).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;

        // Shared by every connection task; the route table is read-only from here on.
        let app = Arc::new(app);

        info!(addr = %addr, routes = app.router().len(), "fcodex listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting immediately.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { Ok::<_, Infallible>(app.dispatch(req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set does not grow unbounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("fcodex stopped");
        Ok(())
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT the process receives. If a handler
/// cannot be installed, that signal simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
