//! Incoming HTTP request facade.
//!
//! A [`Request`] is a cheap, clonable, read-only view over one transport
//! message. Everything derived from the message is computed lazily and at
//! most once: the query map on first lookup, the body on first read, the path
//! parameters at the moment a route matches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use bytes::Bytes;
use http::{HeaderMap, Uri};
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{BoxError, Error};
use crate::method::Method;
use crate::token::Claims;

/// The type-erased transport byte stream behind a [`Request`].
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// Why a request body could not be produced.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BodyError {
    /// The body was received but is not valid JSON.
    #[error("failed to parse JSON body: {0}")]
    Parse(String),

    /// The transport failed (or the peer went away) while the body was buffering.
    #[error("failed to read request body: {0}")]
    Transport(String),
}

/// An incoming HTTP request.
///
/// Clones share the same underlying message, so a middleware and the handler
/// after it observe the same memoized body and the same attached user.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: OnceLock<HashMap<String, String>>,
    query: OnceLock<HashMap<String, String>>,
    user: OnceLock<Claims>,
    source: Mutex<Option<RequestBody>>,
    raw: OnceCell<Result<Bytes, BodyError>>,
    parsed: OnceCell<Result<Option<Value>, BodyError>>,
}

impl Request {
    pub(crate) fn new(method: Method, uri: Uri, headers: HeaderMap, body: RequestBody) -> Self {
        Self {
            inner: Arc::new(Inner {
                method,
                uri,
                headers,
                params: OnceLock::new(),
                query: OnceLock::new(),
                user: OnceLock::new(),
                source: Mutex::new(Some(body)),
                raw: OnceCell::new(),
                parsed: OnceCell::new(),
            }),
        }
    }

    /// Wraps a transport-level request.
    ///
    /// Fails with [`Error::UnsupportedMethod`] for methods outside [`Method`].
    pub fn from_http<B>(req: http::Request<B>) -> Result<Self, Error>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let method = Method::try_from(&parts.method)?;
        let body = body.map_err(Into::<BoxError>::into).boxed_unsync();
        Ok(Self::new(method, parts.uri, parts.headers, body))
    }

    pub fn method(&self) -> Method { self.inner.method }
    pub fn headers(&self) -> &HeaderMap { &self.inner.headers }

    /// The raw request target: path plus query string, exactly as received.
    pub fn url(&self) -> &str {
        self.inner.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// The path portion of the URL (everything before `?`).
    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    /// Always `None` before a route has matched (i.e. inside global middleware).
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params()?.get(key).map(String::as_str)
    }

    /// All path parameters, or `None` if no route has matched yet.
    pub fn params(&self) -> Option<&HashMap<String, String>> {
        self.inner.params.get()
    }

    pub(crate) fn set_params(&self, params: HashMap<String, String>) {
        if self.inner.params.set(params).is_err() {
            debug!(url = self.url(), "path parameters already populated; keeping the first match");
        }
    }

    /// Query-string parameters, decoded on first access. Last occurrence wins.
    pub fn query(&self) -> &HashMap<String, String> {
        self.inner.query.get_or_init(|| parse_query(self.inner.uri.query().unwrap_or("")))
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query().get(key).map(String::as_str)
    }

    /// Claims attached by an authentication middleware.
    pub fn user(&self) -> Option<&Claims> {
        self.inner.user.get()
    }

    /// Attaches authenticated claims. Returns `false` if a user was already attached.
    pub fn set_user(&self, claims: Claims) -> bool {
        self.inner.user.set(claims).is_ok()
    }

    /// Buffers the whole transport body, once. Later calls return the same bytes.
    pub async fn bytes(&self) -> Result<&Bytes, BodyError> {
        let buffered = self
            .inner
            .raw
            .get_or_init(|| async {
                let source = self
                    .inner
                    .source
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match source {
                    Some(body) => body
                        .collect()
                        .await
                        .map(|collected| collected.to_bytes())
                        .map_err(|e| BodyError::Transport(e.to_string())),
                    None => Ok(Bytes::new()),
                }
            })
            .await;
        buffered.as_ref().map_err(Clone::clone)
    }

    /// The body parsed as JSON, memoized for the lifetime of the request.
    ///
    /// `Ok(None)` for methods that carry no body and for an empty body.
    pub async fn json(&self) -> Result<Option<&Value>, BodyError> {
        if !self.method().carries_body() {
            return Ok(None);
        }
        let parsed = self
            .inner
            .parsed
            .get_or_init(|| async {
                let raw = self.bytes().await?;
                if raw.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                serde_json::from_slice(raw)
                    .map(Some)
                    .map_err(|e| BodyError::Parse(e.to_string()))
            })
            .await;
        parsed.as_ref().map(Option::as_ref).map_err(Clone::clone)
    }

    /// The JSON body deserialized into `T`.
    pub async fn parse<T: DeserializeOwned>(&self) -> Result<Option<T>, BodyError> {
        match self.json().await? {
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| BodyError::Parse(e.to_string())),
            None => Ok(None),
        }
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use http_body::Frame;
    use http_body_util::Full;

    use super::*;

    /// Body that counts how often the transport is polled.
    struct Counted {
        chunks: VecDeque<Result<Bytes, std::io::Error>>,
        polls: Arc<AtomicUsize>,
    }

    impl Body for Counted {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(self.chunks.pop_front().map(|c| c.map(Frame::data)))
        }
    }

    fn counted(method: &str, chunks: Vec<Result<Bytes, std::io::Error>>) -> (Request, Arc<AtomicUsize>) {
        let polls = Arc::new(AtomicUsize::new(0));
        let body = Counted { chunks: chunks.into(), polls: Arc::clone(&polls) };
        let req = http::Request::builder().method(method).uri("/test").body(body).unwrap();
        (Request::from_http(req).unwrap(), polls)
    }

    fn full(method: &str, uri: &str, body: &'static str) -> Request {
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap();
        Request::from_http(req).unwrap()
    }

    #[tokio::test]
    async fn parses_json_body_for_post() {
        let req = full("POST", "/test", r#"{"key":"value"}"#);
        let body = req.json().await.unwrap().cloned();
        assert_eq!(body, Some(serde_json::json!({ "key": "value" })));
    }

    #[tokio::test]
    async fn empty_body_is_none() {
        let req = full("POST", "/test", "");
        assert_eq!(req.json().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_failure() {
        let req = full("POST", "/test", "invalid json");
        let err = req.json().await.unwrap_err();
        assert!(matches!(err, BodyError::Parse(_)));
        assert!(err.to_string().starts_with("failed to parse JSON"));
        // memoized: the same failure again, not an empty body
        assert_eq!(req.json().await.unwrap_err(), err);
    }

    #[tokio::test]
    async fn get_never_touches_the_transport() {
        let (req, polls) = counted("GET", vec![Ok(Bytes::from_static(b"{}"))]);
        assert_eq!(req.json().await.unwrap(), None);
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn body_is_buffered_once() {
        let (req, polls) = counted(
            "PUT",
            vec![Ok(Bytes::from_static(b"{\"a\":")), Ok(Bytes::from_static(b"1}"))],
        );
        let first = req.json().await.unwrap().cloned();
        let after_first = polls.load(Ordering::SeqCst);
        let second = req.json().await.unwrap().cloned();
        let clone_read = req.clone().bytes().await.unwrap().clone();

        assert_eq!(first, Some(serde_json::json!({ "a": 1 })));
        assert_eq!(first, second);
        assert_eq!(&clone_read[..], b"{\"a\":1}");
        assert_eq!(polls.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn transport_error_rejects_the_body() {
        let broken = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away");
        let (req, _) = counted("POST", vec![Ok(Bytes::from_static(b"{")), Err(broken)]);
        assert!(matches!(req.json().await, Err(BodyError::Transport(m)) if m.contains("peer went away")));
    }

    #[tokio::test]
    async fn typed_parse() {
        #[derive(serde::Deserialize)]
        struct User {
            name: String,
        }
        let req = full("PATCH", "/users/1", r#"{"name":"alice"}"#);
        let user: User = req.parse().await.unwrap().unwrap();
        assert_eq!(user.name, "alice");
    }

    #[test]
    fn query_is_split_from_path_and_last_occurrence_wins() {
        let req = full("GET", "/search?name=John&age=30&name=Jane&q=a%20b+c", "");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.url(), "/search?name=John&age=30&name=Jane&q=a%20b+c");
        assert_eq!(req.query_param("name"), Some("Jane"));
        assert_eq!(req.query_param("age"), Some("30"));
        assert_eq!(req.query_param("q"), Some("a b c"));
        assert_eq!(req.query().len(), 3);
    }

    #[test]
    fn params_are_set_once() {
        let req = full("GET", "/users/42", "");
        assert!(req.params().is_none());
        req.set_params(HashMap::from([("id".to_owned(), "42".to_owned())]));
        req.set_params(HashMap::from([("id".to_owned(), "7".to_owned())]));
        assert_eq!(req.param("id"), Some("42"));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = http::Request::builder()
            .uri("/")
            .header("Authorization", "Bearer abc")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let req = Request::from_http(req).unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
        assert_eq!(req.header("AUTHORIZATION"), Some("Bearer abc"));
        assert_eq!(req.header("x-missing"), None);
    }
}
