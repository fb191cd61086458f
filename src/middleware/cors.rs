//! Cross-origin resource sharing.

use std::sync::Arc;

use tracing::debug;

use crate::handler::{Middleware, Next};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Origin policy for [`cors`].
///
/// An empty allow list admits every origin. Blocked origins are refused
/// outright, whatever the allow list says.
#[derive(Clone, Debug, Default)]
pub struct CorsOptions {
    allowed: Vec<String>,
    blocked: Vec<String>,
}

impl CorsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed.push(origin.into());
        self
    }

    pub fn block_origin(mut self, origin: impl Into<String>) -> Self {
        self.blocked.push(origin.into());
        self
    }

    fn is_blocked(&self, origin: &str) -> bool {
        self.blocked.iter().any(|o| o == origin)
    }

    fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|o| o == origin)
    }
}

/// Applies `options` to every request.
///
/// - a blocked `Origin` gets `403 Forbidden`
/// - `Access-Control-Allow-Origin` echoes an admitted origin and is empty otherwise
/// - `OPTIONS` preflights end with `204` and never reach the handler
pub fn cors(options: CorsOptions) -> impl Middleware {
    let options = Arc::new(options);
    move |req: Request, res: Response, next: Next| {
        let options = Arc::clone(&options);
        async move {
            let origin = req.header("origin");

            if let Some(origin) = origin {
                if options.is_blocked(origin) {
                    debug!(origin, "blocked origin");
                    res.status(Status::Forbidden).send("Forbidden");
                    return;
                }
                let allowed = if options.is_allowed(origin) { origin } else { "" };
                res.set_header("access-control-allow-origin", allowed);
            }
            res.set_header("access-control-allow-methods", ALLOW_METHODS)
                .set_header("access-control-allow-headers", ALLOW_HEADERS);

            if req.method() == Method::Options {
                res.status(Status::NoContent).end();
            } else {
                next.proceed();
            }
        }
    }
}
