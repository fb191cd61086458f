//! Ordered route table.
//!
//! Routes are matched by a linear scan in registration order: the first route
//! whose method and path template fit wins, so an earlier registration can
//! intentionally shadow a later one. Templates are parsed into segments once,
//! at registration, and matched segment by segment.
//!
//! ```text
//! /users/:id          literal `users`, capture `id`
//! /users/{id}         same thing
//! /files/*path        capture everything after `/files/` into `path`
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::handler::{BoxedHandler, BoxedMiddleware, Handler, Middleware, Stack};
use crate::method::Method;

// ── Pattern ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// A parsed path template.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Eq, PartialEq)]
enum PatternError {
    EmptyName(String),
    CatchAllNotLast(String),
    DuplicateName(String),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName(seg) => write!(f, "segment `{seg}` has no parameter name"),
            Self::CatchAllNotLast(seg) => write!(f, "catch-all `{seg}` must be the last segment"),
            Self::DuplicateName(name) => write!(f, "parameter `{name}` appears twice"),
        }
    }
}

/// Splits a path into its non-empty segments, which collapses repeated
/// separators and ignores a trailing slash.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Pattern {
    fn parse(path: &str) -> Result<Self, PatternError> {
        let raw: Vec<&str> = segments(path).collect();
        let mut parsed = Vec::with_capacity(raw.len());
        let mut names: Vec<String> = Vec::new();

        for (i, seg) in raw.iter().enumerate() {
            let segment = if let Some(name) = seg
                .strip_prefix('*')
                .or_else(|| seg.strip_prefix("{*").and_then(|s| s.strip_suffix('}')))
            {
                if i + 1 != raw.len() {
                    return Err(PatternError::CatchAllNotLast((*seg).to_owned()));
                }
                Segment::CatchAll(if name.is_empty() { "*" } else { name }.to_owned())
            } else if let Some(name) = seg
                .strip_prefix(':')
                .or_else(|| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            {
                if name.is_empty() {
                    return Err(PatternError::EmptyName((*seg).to_owned()));
                }
                Segment::Param(name.to_owned())
            } else {
                Segment::Literal((*seg).to_owned())
            };

            if let Segment::Param(name) | Segment::CatchAll(name) = &segment {
                if names.contains(name) {
                    return Err(PatternError::DuplicateName(name.clone()));
                }
                names.push(name.clone());
            }
            parsed.push(segment);
        }

        Ok(Self { source: format!("/{}", raw.join("/")), segments: parsed })
    }

    /// Matches a full request path. Partial prefixes never match.
    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut rest = segments(path);

        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    if rest.next()? != lit.as_str() {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), rest.next()?.to_owned());
                }
                Segment::CatchAll(name) => {
                    let tail: Vec<&str> = rest.by_ref().collect();
                    if tail.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), tail.join("/"));
                }
            }
        }

        rest.next().is_none().then_some(params)
    }
}

fn parse_or_panic(path: &str) -> Pattern {
    Pattern::parse(path).unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"))
}

// ── Route table ───────────────────────────────────────────────────────────────

struct Route {
    method: Method,
    pattern: Pattern,
    handler: BoxedHandler,
    /// Scope middleware inherited from routers this route was mounted out of,
    /// outermost first.
    scope: Vec<BoxedMiddleware>,
    middlewares: Vec<BoxedMiddleware>,
}

/// A resolved route: the handler, both middleware tiers that guard it, and
/// the captured path parameters.
pub struct Match {
    pub(crate) handler: BoxedHandler,
    pub(crate) scope: Vec<BoxedMiddleware>,
    pub(crate) middlewares: Vec<BoxedMiddleware>,
    pub(crate) pattern: String,
    pub(crate) params: HashMap<String, String>,
}

impl Match {
    /// The normalized template that matched, e.g. `/api/users/:id`.
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// The application router.
///
/// Build it once at startup and hand it to an [`App`](crate::App). Each
/// registration returns `self`, so calls chain naturally:
///
/// ```rust
/// # use fcodex::{Method, Request, Response, Router};
/// # async fn get_user(_: Request, _: Response) {}
/// # async fn create_user(_: Request, _: Response) {}
/// let users = Router::new()
///     .get("/users/:id", get_user)
///     .post("/users", create_user);
///
/// let api = Router::new().mount("/api", users);
/// let found = api.resolve(Method::Get, "/api/users/42").unwrap();
/// assert_eq!(found.param("id"), Some("42"));
/// ```
pub struct Router {
    base: String,
    routes: Vec<Route>,
    middlewares: Vec<BoxedMiddleware>,
}

impl Router {
    pub fn new() -> Self {
        Self::at("")
    }

    /// A router whose routes all live under `base`.
    pub fn at(base: &str) -> Self {
        Self { base: base.to_owned(), routes: Vec::new(), middlewares: Vec::new() }
    }

    /// Registers a handler for a method + path pair.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid template (empty parameter name,
    /// repeated parameter name, catch-all before the last segment).
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(method, path, handler, Stack::new())
    }

    /// Registers a handler guarded by its own route-level middleware.
    pub fn route(mut self, method: Method, path: &str, handler: impl Handler, stack: Stack) -> Self {
        let pattern = parse_or_panic(&format!("{}/{}", self.base, path));
        self.routes.push(Route {
            method,
            pattern,
            handler: handler.into_boxed_handler(),
            scope: Vec::new(),
            middlewares: stack.0,
        });
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    /// Adds scope middleware: it runs for every route this router resolves,
    /// after global middleware and before route-level middleware.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(middleware.into_boxed_middleware());
        self
    }

    /// Moves every route of `child` under `prefix`.
    ///
    /// The child's scope middleware travels with its routes. Its routes are
    /// appended after the ones already registered here, preserving their order.
    pub fn mount(mut self, prefix: &str, child: Router) -> Self {
        let Router { routes, middlewares, .. } = child;
        for mut route in routes {
            route.pattern = parse_or_panic(&format!("{}/{}/{}", self.base, prefix, route.pattern.source));
            route.scope = middlewares.iter().cloned().chain(route.scope).collect();
            self.routes.push(route);
        }
        self
    }

    /// Finds the first route matching `method` and `path`. `None` means Not Found.
    ///
    /// `path` must not include the query string.
    pub fn resolve(&self, method: Method, path: &str) -> Option<Match> {
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                let params = route.pattern.matches(path)?;
                Some(Match {
                    handler: Arc::clone(&route.handler),
                    scope: self.middlewares.iter().chain(&route.scope).cloned().collect(),
                    middlewares: route.middlewares.clone(),
                    pattern: route.pattern.source.clone(),
                    params,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
