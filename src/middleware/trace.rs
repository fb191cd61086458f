//! Per-request logging.

use std::time::Instant;

use tracing::{error, info, warn};

use crate::handler::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Logs every request as two `tracing` events.
///
/// The first is emitted on arrival at `info`. The second is emitted when the
/// response finishes, with the status and elapsed milliseconds; its level
/// follows the status class (5xx `error`, 4xx `warn`, anything else `info`).
///
/// Register it first among the global middleware so it times the whole pipeline.
pub fn trace() -> impl Middleware {
    |req: Request, res: Response, next: Next| async move {
        let started = Instant::now();
        let method = req.method();
        let url = req.url().to_owned();
        info!(%method, url = url.as_str(), "request started");

        res.on_finish(move |status| {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
            let reason = Status::from_code(status).map_or("", Status::reason);
            match status {
                500.. => error!(%method, url = url.as_str(), status, reason, elapsed_ms, "request finished"),
                400..=499 => warn!(%method, url = url.as_str(), status, reason, elapsed_ms, "request finished"),
                _ => info!(%method, url = url.as_str(), status, reason, elapsed_ms, "request finished"),
            }
        });
        next.proceed();
    }
}
