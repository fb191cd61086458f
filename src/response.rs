//! Outgoing HTTP response facade.
//!
//! A [`Response`] is a buffered, single-writer builder shared by every
//! middleware and the handler of one request. Its one governing rule is the
//! headers-sent state machine:
//!
//! ```text
//!   Open ──write_head──▶ HeadersSent ──end──▶ Finished
//!     └──────────────────end──────────────────▶┘
//! ```
//!
//! Once headers are sent, `status`, `set_header`, `write`, `write_head` and
//! `send` become logged no-ops. The state never moves backwards.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::status::Status;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// The shape of a body handed to [`Response::send`], which picks the
/// content type from it.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Empty,
    Text(String),
    Binary(Bytes),
    Json(Value),
}

impl From<()> for Payload {
    fn from(_: ()) -> Self { Self::Empty }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Payload {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self { Self::Binary(Bytes::from(b)) }
}

impl From<&'static [u8]> for Payload {
    fn from(b: &'static [u8]) -> Self { Self::Binary(Bytes::from_static(b)) }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self { Self::Binary(b) }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self { Self::Json(v) }
}

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Open,
    HeadersSent,
    Finished,
}

type FinishHook = Box<dyn FnOnce(u16) + Send + 'static>;

struct State {
    phase: Phase,
    status: u16,
    headers: HeaderMap,
    body: BytesMut,
    hooks: Vec<FinishHook>,
}

impl State {
    /// Checks that headers may still change; logs the dropped call otherwise.
    fn open(&self, op: &str) -> bool {
        if self.phase == Phase::Open {
            return true;
        }
        warn!(op, status = self.status, "response already sent; ignoring");
        false
    }
}

/// An outgoing HTTP response.
///
/// Clones share state: the dispatcher, every middleware and the handler all
/// hold the same response.
///
/// ```rust
/// use fcodex::{Response, Status};
///
/// let res = Response::new();
/// res.status(Status::NotFound).send("Not Found");
/// assert!(res.headers_sent());
///
/// res.set_header("x-late", "1"); // ignored
/// assert_eq!(res.header("x-late"), None);
/// ```
#[derive(Clone)]
pub struct Response {
    state: Arc<Mutex<State>>,
}

impl Response {
    /// A fresh `200 OK` response with no headers and an empty body.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                phase: Phase::Open,
                status: Status::Ok.code(),
                headers: HeaderMap::new(),
                body: BytesMut::new(),
                hooks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the pending status without flushing anything.
    pub fn status(&self, code: Status) -> &Self {
        let mut state = self.lock();
        if state.open("status") {
            state.status = code.code();
        }
        self
    }

    /// Sets a header, replacing any previous value under the same name.
    pub fn set_header(&self, name: &str, value: &str) -> &Self {
        let mut state = self.lock();
        if state.open("set_header") {
            insert_header(&mut state.headers, name, value);
        }
        self
    }

    /// Appends a chunk to the body. Returns `false` if the chunk was dropped
    /// because headers were already sent.
    pub fn write(&self, chunk: impl AsRef<[u8]>) -> bool {
        let mut state = self.lock();
        if !state.open("write") {
            return false;
        }
        state.body.extend_from_slice(chunk.as_ref());
        true
    }

    /// Sets the status and headers and commits them immediately.
    ///
    /// Only [`end`](Self::end) / [`end_with`](Self::end_with) remain valid afterwards.
    pub fn write_head(&self, code: Status, headers: &[(&str, &str)]) -> bool {
        let mut state = self.lock();
        if !state.open("write_head") {
            return false;
        }
        state.status = code.code();
        for (name, value) in headers {
            insert_header(&mut state.headers, name, value);
        }
        state.phase = Phase::HeadersSent;
        true
    }

    /// Finishes the response.
    pub fn end(&self) {
        self.finish(None);
    }

    /// Writes a final chunk and finishes the response.
    ///
    /// The chunk is still accepted after [`write_head`](Self::write_head);
    /// it is dropped only if the response has already finished.
    pub fn end_with(&self, chunk: impl AsRef<[u8]>) {
        self.finish(Some(chunk.as_ref()));
    }

    fn finish(&self, chunk: Option<&[u8]>) {
        let (status, hooks) = {
            let mut state = self.lock();
            if state.phase == Phase::Finished {
                warn!(op = "end", status = state.status, "response already finished; ignoring");
                return;
            }
            if let Some(chunk) = chunk {
                state.body.extend_from_slice(chunk);
            }
            state.phase = Phase::Finished;
            (state.status, std::mem::take(&mut state.hooks))
        };
        // hooks run unlocked so they may inspect the response
        for hook in hooks {
            hook(status);
        }
    }

    /// Sends `body`, inferring `content-type` from its shape unless one was
    /// already set, then finishes the response.
    pub fn send(&self, body: impl Into<Payload>) {
        let (content_type, bytes) = match body.into() {
            Payload::Empty => (None, Bytes::new()),
            Payload::Text(s) => (Some(ContentType::Text), Bytes::from(s)),
            Payload::Binary(b) => (Some(ContentType::OctetStream), b),
            Payload::Json(v) => (Some(ContentType::Json), Bytes::from(v.to_string())),
        };
        self.deliver(content_type, bytes, false);
    }

    /// Serializes `data` as JSON and sends it with `application/json`,
    /// overriding any content type set earlier.
    pub fn json<T: Serialize + ?Sized>(&self, data: &T) {
        match serde_json::to_vec(data) {
            Ok(bytes) => self.deliver(Some(ContentType::Json), Bytes::from(bytes), true),
            Err(e) => {
                error!(error = %e, "failed to serialize JSON response");
                self.status(Status::InternalServerError).end();
            }
        }
    }

    /// Sends a `text/plain` body.
    pub fn text(&self, body: impl Into<String>) {
        self.deliver(Some(ContentType::Text), Bytes::from(body.into()), true);
    }

    /// Sends a `text/html` body.
    pub fn html(&self, body: impl Into<String>) {
        self.deliver(Some(ContentType::Html), Bytes::from(body.into()), true);
    }

    /// Sends a body with an explicit content type. Use this for XML, CSV, binary, etc.
    pub fn bytes(&self, content_type: ContentType, body: impl Into<Bytes>) {
        self.deliver(Some(content_type), body.into(), true);
    }

    fn deliver(&self, content_type: Option<ContentType>, body: Bytes, force: bool) {
        {
            let mut state = self.lock();
            if !state.open("send") {
                return;
            }
            let replace = force || !state.headers.contains_key(http::header::CONTENT_TYPE);
            if let (Some(content_type), true) = (content_type, replace) {
                state.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type.as_str()),
                );
            }
        }
        self.end_with(body);
    }

    /// Drops whatever was written so far, as long as headers are unsent.
    pub(crate) fn reset_body(&self) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::Open {
            return false;
        }
        state.body.clear();
        true
    }

    /// Registers a hook fired exactly once, when the response finishes, with
    /// the final status code. Fires immediately if it already has.
    pub fn on_finish(&self, hook: impl FnOnce(u16) + Send + 'static) {
        let status = {
            let mut state = self.lock();
            if state.phase != Phase::Finished {
                state.hooks.push(Box::new(hook));
                return;
            }
            state.status
        };
        hook(status);
    }

    /// `true` once headers have been committed by `write_head` or `end`. Never reverts.
    pub fn headers_sent(&self) -> bool {
        self.lock().phase != Phase::Open
    }

    pub fn is_finished(&self) -> bool {
        self.lock().phase == Phase::Finished
    }

    pub fn status_code(&self) -> u16 {
        self.lock().status
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// A snapshot of the body written so far.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().body)
    }

    /// Finishes the response if nobody did, and converts it for the transport.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        if !self.is_finished() {
            self.end();
        }
        let mut state = self.lock();
        let body = std::mem::take(&mut state.body).freeze();
        let mut res = http::Response::new(Full::new(body));
        *res.status_mut() = http::StatusCode::from_u16(state.status)
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        *res.headers_mut() = std::mem::take(&mut state.headers);
        res
    }
}

impl Default for Response {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Response")
            .field("phase", &state.phase)
            .field("status", &state.status)
            .field("headers", &state.headers)
            .field("body_len", &state.body.len())
            .finish()
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!(name, "invalid header; ignoring"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn defaults_to_200_and_open() {
        let res = Response::new();
        assert_eq!(res.status_code(), 200);
        assert!(!res.headers_sent());
        assert!(res.body().is_empty());
    }

    #[test]
    fn send_infers_content_type() {
        let text = Response::new();
        text.send("Hello, world!");
        assert_eq!(text.header("content-type").as_deref(), Some("text/plain; charset=utf-8"));
        assert_eq!(&text.body()[..], b"Hello, world!");

        let binary = Response::new();
        binary.send(b"buffer data".to_vec());
        assert_eq!(binary.header("content-type").as_deref(), Some("application/octet-stream"));

        let json = Response::new();
        json.send(serde_json::json!({ "key": "value" }));
        assert_eq!(json.header("content-type").as_deref(), Some("application/json"));
        assert_eq!(&json.body()[..], br#"{"key":"value"}"#);
    }

    #[test]
    fn send_keeps_an_explicit_content_type() {
        let res = Response::new();
        res.set_header("Content-Type", "application/xml").send("<ok/>");
        assert_eq!(res.header("content-type").as_deref(), Some("application/xml"));
    }

    #[test]
    fn headers_are_last_write_wins() {
        let res = Response::new();
        res.set_header("x-a", "1").set_header("X-A", "2");
        assert_eq!(res.header("x-a").as_deref(), Some("2"));
    }

    #[test]
    fn status_then_send() {
        let res = Response::new();
        res.status(Status::NotFound).send("Not Found");
        assert_eq!(res.status_code(), 404);
        assert!(res.is_finished());
    }

    #[test]
    fn everything_after_end_is_a_noop() {
        let res = Response::new();
        res.text("done");
        res.status(Status::InternalServerError);
        res.set_header("x-late", "1");
        assert!(!res.write("more"));
        assert!(!res.write_head(Status::Created, &[]));
        res.send("again");
        res.end_with("again");

        assert!(res.headers_sent());
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.header("x-late"), None);
        assert_eq!(&res.body()[..], b"done");
    }

    #[test]
    fn write_head_commits_headers_but_end_may_still_append() {
        let res = Response::new();
        assert!(res.write("a"));
        assert!(res.write_head(Status::Accepted, &[("x-id", "7")]));
        assert!(res.headers_sent());
        assert!(!res.is_finished());

        assert!(!res.write("b"));
        res.set_header("x-id", "8");
        res.end_with("c");

        assert!(res.is_finished());
        assert_eq!(res.status_code(), 202);
        assert_eq!(res.header("x-id").as_deref(), Some("7"));
        assert_eq!(&res.body()[..], b"ac");
    }

    #[test]
    fn send_after_write_head_is_ignored() {
        let res = Response::new();
        res.write_head(Status::Accepted, &[]);
        res.send(());
        res.send("late");
        assert!(!res.is_finished());
        assert_eq!(res.header("content-type"), None);
        assert!(res.body().is_empty());
    }

    #[test]
    fn reset_body_only_while_open() {
        let res = Response::new();
        res.write("partial");
        assert!(res.reset_body());
        assert!(res.body().is_empty());

        res.write("kept");
        res.write_head(Status::Ok, &[]);
        assert!(!res.reset_body());
        assert_eq!(&res.body()[..], b"kept");
    }

    #[test]
    fn finish_hooks_fire_exactly_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let res = Response::new();
        let counter = Arc::clone(&fired);
        res.on_finish(move |status| {
            assert_eq!(status, 401);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        res.status(Status::Unauthorized).end();
        res.end();
        res.clone().into_http();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let late = Arc::clone(&fired);
        res.on_finish(move |_| {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn into_http_finalizes_an_open_response() {
        let res = Response::new();
        res.status(Status::Created).set_header("location", "/users/9");
        res.write("partial");
        let http = res.into_http();
        assert_eq!(http.status(), http::StatusCode::CREATED);
        assert_eq!(http.headers()["location"], "/users/9");
    }

    #[test]
    fn invalid_headers_are_ignored() {
        let res = Response::new();
        res.set_header("bad header", "x").set_header("x-ok", "line\nbreak");
        assert_eq!(res.header("bad header"), None);
        assert_eq!(res.header("x-ok"), None);
    }
}
