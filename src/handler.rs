//! Handler and middleware traits, and their type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers and middleware of *different* types in one
//! route table, so each is hidden behind a trait object:
//!
//! ```text
//! async fn hello(req: Request, res: Response) { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                         ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                         ← stored as BoxedHandler
//!        ↓
//! handler.call(req, res)  at request time            ← one vtable dispatch
//! ```
//!
//! Middleware goes through the same dance with one extra argument, the
//! [`Next`] continuation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::{BoxError, Error};
use crate::request::Request;
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to the outcome of one
/// handler or middleware invocation.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, res: Response) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// What a handler or middleware may return.
///
/// `()` for infallible code, or `Result<(), E>` for anything that can fail;
/// an `Err` is caught by the dispatcher and answered with a 500.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<(), Error>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), Error> { Ok(()) }
}

impl<E: Into<BoxError>> IntoOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), Error> {
        self.map_err(|e| Error::Handler(e.into()))
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The continuation handed to every middleware.
///
/// Calling [`proceed`](Next::proceed) lets the pipeline advance; dropping
/// it halts the chain. `proceed` consumes the value, so it can be called at
/// most once. It need not be called before the middleware's future returns:
/// `Next` may be moved into a spawned task or a callback, and the pipeline
/// waits until it is either used or dropped.
#[must_use = "dropping `Next` without calling `proceed` halts the pipeline"]
pub struct Next {
    gate: oneshot::Sender<()>,
}

impl Next {
    pub(crate) fn new() -> (Self, oneshot::Receiver<()>) {
        let (gate, opened) = oneshot::channel();
        (Self { gate }, opened)
    }

    pub fn proceed(self) {
        // a closed receiver means the request is already gone
        let _ = self.gate.send(());
    }
}

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every valid route handler:
///
/// ```text
/// async fn name(req: Request, res: Response) -> impl IntoOutcome
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid middleware:
///
/// ```text
/// async fn name(req: Request, res: Response, next: Next) -> impl IntoOutcome
/// ```
///
/// Sealed like [`Handler`].
pub trait Middleware: private::SealedMiddleware + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

mod private {
    pub trait SealedHandler {}
    pub trait SealedMiddleware {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::SealedHandler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut, R> private::SealedMiddleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture {
        let fut = (self.0)(req, res);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut, R> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture {
        let fut = (self.0)(req, res, next);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Stack ─────────────────────────────────────────────────────────────────────

/// An ordered list of route-level middleware, for [`Router::route`](crate::Router::route).
///
/// ```rust
/// use fcodex::{Method, Next, Request, Response, Router, Stack};
///
/// async fn audit(_req: Request, _res: Response, next: Next) { next.proceed() }
/// async fn delete_user(_req: Request, res: Response) { res.end() }
///
/// let app = Router::new()
///     .route(Method::Delete, "/users/:id", delete_user, Stack::new().push(audit));
/// ```
#[derive(Clone, Default)]
pub struct Stack(pub(crate) Vec<BoxedMiddleware>);

impl Stack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(mut self, middleware: impl Middleware) -> Self {
        self.0.push(middleware.into_boxed_middleware());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
