//! Minimal fcodex example: a login endpoint that issues tokens, a
//! token-protected user API, CORS and request tracing.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   TOKEN=$(curl -s -X POST http://localhost:3000/login \
//!        -H 'content-type: application/json' \
//!        -d '{"username":"alice"}' | jq -r .token)
//!   curl http://localhost:3000/api/users/42 -H "authorization: Bearer $TOKEN"
//!   curl -X POST http://localhost:3000/api/users \
//!        -H "authorization: Bearer $TOKEN" \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"bob","email":"bob@example.com"}'
//!   curl -X DELETE http://localhost:3000/api/users/42 -H "authorization: Bearer $TOKEN"

use std::sync::Arc;

use fcodex::middleware::validate::{Rule, Schema};
use fcodex::middleware::{auth, cors, trace, validate};
use fcodex::token::{Algorithm, Lifetime, TokenCodec, TokenConfig};
use fcodex::{App, Method, Request, Response, Router, Server, Stack, Status};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let secret = std::env::var("FCODEX_SECRET").unwrap_or_else(|_| "change-me".to_owned());
    let codec = Arc::new(TokenCodec::new(
        TokenConfig::new(Algorithm::HS256)
            .secret(secret)
            .expires_in(Lifetime::hours(1)),
    )?);

    let new_user = Schema::new()
        .field("name", Rule::string().required().min_length(2))
        .field("email", Rule::email().required());

    let users = Router::new()
        .get("/users/:id", get_user)
        .route(Method::Post, "/users", create_user, Stack::new().push(validate::validate(new_user)))
        .delete("/users/:id", delete_user)
        .middleware(auth::bearer(Arc::clone(&codec)));

    let login_codec = Arc::clone(&codec);
    let router = Router::new()
        .post("/login", move |req: Request, res: Response| {
            let codec = Arc::clone(&login_codec);
            async move { login(&codec, req, res).await }
        })
        .mount("/api", users);

    let app = App::new(router)
        .middleware(trace::trace())
        .middleware(cors::cors(cors::CorsOptions::new()));

    Server::bind("0.0.0.0:3000").serve(app).await?;
    Ok(())
}

// POST /login
async fn login(codec: &TokenCodec, req: Request, res: Response) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(username) = req.json().await?.and_then(|b| b["username"].as_str()) else {
        res.status(Status::BadRequest).json(&json!({ "error": "username is required" }));
        return Ok(());
    };
    let token = codec.issue(&json!({ "sub": username }))?;
    res.json(&json!({ "token": token }));
    Ok(())
}

// GET /api/users/:id
async fn get_user(req: Request, res: Response) {
    let id = req.param("id").unwrap_or("unknown");
    let caller = req.user().and_then(|claims| claims.get("sub")?.as_str()).unwrap_or("anonymous");
    res.json(&json!({ "id": id, "name": "alice", "requested_by": caller }));
}

// POST /api/users → 201 Created
async fn create_user(req: Request, res: Response) -> Result<(), fcodex::BodyError> {
    let body = req.json().await?.cloned().unwrap_or_default();
    res.status(Status::Created)
        .set_header("location", "/api/users/99")
        .json(&json!({ "id": "99", "name": body["name"] }));
    Ok(())
}

// DELETE /api/users/:id → 204 No Content
async fn delete_user(_req: Request, res: Response) {
    res.status(Status::NoContent).end();
}
