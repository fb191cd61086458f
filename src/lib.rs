//! # fcodex
//!
//! The request-dispatch core of a small HTTP framework: an ordered route
//! table with nested routers, a three-tier middleware pipeline with
//! short-circuit semantics, buffered request/response facades, and a
//! stateless bearer-token codec.
//!
//! ## Request lifecycle
//!
//! ```text
//! connection → App::dispatch
//!            → global middleware        (App::middleware)
//!            → route lookup             (first registered match wins; miss → 404)
//!            → scope middleware         (Router::middleware, inherited through mount)
//!            → route middleware         (Stack)
//!            → handler
//!            → response finalized       (fault → 500 if nothing was sent yet)
//! ```
//!
//! A middleware continues the pipeline by calling [`Next::proceed`]. Not
//! calling it, or sending a response, stops everything after it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use fcodex::{App, Next, Request, Response, Router, Server, Status};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fcodex::Error> {
//!     let users = Router::new()
//!         .get("/users/:id", get_user)
//!         .post("/users", create_user);
//!
//!     let app = App::new(Router::new().mount("/api", users)).middleware(fcodex::middleware::trace::trace());
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request, res: Response) {
//!     let id = req.param("id").unwrap_or("unknown");
//!     res.json(&serde_json::json!({ "id": id }));
//! }
//!
//! async fn create_user(req: Request, res: Response) -> Result<(), fcodex::BodyError> {
//!     match req.json().await? {
//!         Some(user) => res.status(Status::Created).json(user),
//!         None => res.status(Status::BadRequest).send("missing body"),
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod handler;
mod method;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod middleware;
pub mod token;

pub use error::{BoxError, Error};
pub use handler::{Handler, IntoOutcome, Middleware, Next, Stack};
pub use method::Method;
pub use request::{BodyError, Request, RequestBody};
pub use response::{ContentType, Payload, Response};
pub use router::{Match, Router};
pub use server::{App, Server};
pub use status::Status;
