use std::sync::{Arc, Mutex};

use bytes::Bytes;
use fcodex::middleware::cors::{CorsOptions, cors};
use fcodex::middleware::validate::{Rule, Schema, validate};
use fcodex::middleware::{auth, trace};
use fcodex::token::{Algorithm, TokenCodec, TokenConfig};
use fcodex::{App, Method, Request, Response, Router, Stack};
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{Value, json};

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.to_str().unwrap())
    }
}

async fn call(app: &App, method: &str, uri: &str, headers: &[(&str, &str)], body: &'static str) -> Reply {
    let mut req = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    let res = app
        .dispatch(req.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap())
        .await;
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    Reply { status, headers, body }
}

async fn ok(_req: Request, res: Response) {
    res.text("ok");
}

async fn whoami(req: Request, res: Response) {
    res.json(&json!({ "user": req.user() }));
}

fn codec() -> Arc<TokenCodec> {
    Arc::new(TokenCodec::new(TokenConfig::new(Algorithm::HS256).secret("middleware-secret")).unwrap())
}

// ── auth ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bearer_attaches_claims() {
    let codec = codec();
    let token = codec.issue(&json!({ "sub": "alice" })).unwrap();
    let app = App::new(Router::new().get("/me", whoami).middleware(auth::bearer(codec)));

    let auth = format!("Bearer {token}");
    let reply = call(&app, "GET", "/me", &[("authorization", auth.as_str())], "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["user"]["sub"], "alice");
}

#[tokio::test]
async fn bearer_rejects_missing_and_bad_tokens() {
    let app = App::new(Router::new().get("/me", whoami).middleware(auth::bearer(codec())));

    let missing = call(&app, "GET", "/me", &[], "").await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.json(), json!({ "error": "Missing bearer token" }));

    let incomplete = call(&app, "GET", "/me", &[("authorization", "Bearer abc")], "").await;
    assert_eq!(incomplete.status, StatusCode::UNAUTHORIZED);
    assert_eq!(incomplete.json(), json!({ "error": "Incomplete token" }));

    let foreign = TokenCodec::new(TokenConfig::new(Algorithm::HS256).secret("other"))
        .unwrap()
        .issue(&json!({ "sub": "mallory" }))
        .unwrap();
    let auth = format!("Bearer {foreign}");
    let forged = call(&app, "GET", "/me", &[("authorization", auth.as_str())], "").await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.json(), json!({ "error": "Invalid signature" }));
}

#[tokio::test]
async fn bearer_only_guards_its_scope() {
    let private = Router::new().get("/me", whoami).middleware(auth::bearer(codec()));
    let app = App::new(Router::new().get("/public", ok).mount("/private", private));

    assert_eq!(call(&app, "GET", "/public", &[], "").await.status, StatusCode::OK);
    assert_eq!(call(&app, "GET", "/private/me", &[], "").await.status, StatusCode::UNAUTHORIZED);
}

// ── cors ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cors_echoes_any_origin_by_default() {
    let app = App::new(Router::new().get("/", ok)).middleware(cors(CorsOptions::new()));
    let reply = call(&app, "GET", "/", &[("origin", "https://a.example")], "").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("access-control-allow-origin"), Some("https://a.example"));
    assert_eq!(reply.header("access-control-allow-methods"), Some("GET, POST, PUT, DELETE, OPTIONS"));
    assert_eq!(reply.header("access-control-allow-headers"), Some("Content-Type, Authorization"));
    assert_eq!(&reply.body[..], b"ok");
}

#[tokio::test]
async fn cors_allow_list_and_block_list() {
    let options = CorsOptions::new()
        .allow_origin("https://app.example")
        .block_origin("https://evil.example");
    let app = App::new(Router::new().get("/", ok)).middleware(cors(options));

    let allowed = call(&app, "GET", "/", &[("origin", "https://app.example")], "").await;
    assert_eq!(allowed.header("access-control-allow-origin"), Some("https://app.example"));

    let unknown = call(&app, "GET", "/", &[("origin", "https://other.example")], "").await;
    assert_eq!(unknown.status, StatusCode::OK);
    assert_eq!(unknown.header("access-control-allow-origin"), Some(""));

    let blocked = call(&app, "GET", "/", &[("origin", "https://evil.example")], "").await;
    assert_eq!(blocked.status, StatusCode::FORBIDDEN);
    assert_eq!(&blocked.body[..], b"Forbidden");
    assert_eq!(blocked.header("access-control-allow-methods"), None);

    let no_origin = call(&app, "GET", "/", &[], "").await;
    assert_eq!(no_origin.status, StatusCode::OK);
    assert_eq!(no_origin.header("access-control-allow-origin"), None);
}

#[tokio::test]
async fn cors_answers_preflight_without_reaching_routes() {
    let app = App::new(Router::new().post("/items", ok)).middleware(cors(CorsOptions::new()));
    let reply = call(&app, "OPTIONS", "/items", &[("origin", "https://a.example")], "").await;

    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_empty());
    assert_eq!(reply.header("access-control-allow-origin"), Some("https://a.example"));
}

// ── validate ──────────────────────────────────────────────────────────────────

fn signup() -> App {
    let schema = Schema::new()
        .field("username", Rule::string().required().min_length(3).max_length(12))
        .field("email", Rule::email().required())
        .field("age", Rule::number().min(13.0));
    App::new(Router::new().route(Method::Post, "/signup", ok, Stack::new().push(validate(schema))))
}

#[tokio::test]
async fn valid_body_reaches_the_handler() {
    let body = r#"{"username":"alice","email":"alice@example.com","age":30}"#;
    let reply = call(&signup(), "POST", "/signup", &[], body).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(&reply.body[..], b"ok");
}

#[tokio::test]
async fn violations_are_listed_in_schema_order() {
    let body = r#"{"username":"al","age":9}"#;
    let reply = call(&signup(), "POST", "/signup", &[], body).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.json(),
        json!({ "errors": [
            { "field": "username", "message": "Must be at least 3 characters long." },
            { "field": "email", "message": "This field is required." },
            { "field": "age", "message": "Must be at least 13." },
        ]})
    );
}

#[tokio::test]
async fn unparsable_body_is_a_client_error() {
    let reply = call(&signup(), "POST", "/signup", &[], "{not json").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let errors = reply.json()["errors"].clone();
    assert_eq!(errors[0]["field"], "body");
    assert!(errors[0]["message"].as_str().unwrap().starts_with("failed to parse JSON body"));
}

#[tokio::test]
async fn empty_body_fails_required_fields() {
    let reply = call(&signup(), "POST", "/signup", &[], "").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["errors"].as_array().unwrap().len(), 2);
}

// ── trace ─────────────────────────────────────────────────────────────────────

/// Collects formatted log output so a test can inspect it.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn trace_logs_start_and_finish() {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = App::new(Router::new().get("/hello", ok)).middleware(trace::trace());
    call(&app, "GET", "/hello?x=1", &[], "").await;
    call(&app, "GET", "/missing", &[], "").await;

    let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = logs.lines().filter(|l| l.contains("request")).collect();
    assert_eq!(lines.len(), 4, "{logs}");
    assert!(lines[0].contains("INFO") && lines[0].contains("request started") && lines[0].contains("/hello?x=1"));
    assert!(lines[1].contains("INFO") && lines[1].contains("request finished") && lines[1].contains("status=200"));
    assert!(lines[3].contains("WARN") && lines[3].contains("status=404"));
}
