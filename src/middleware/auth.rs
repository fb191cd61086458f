//! Bearer-token authentication.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::handler::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;
use crate::token::TokenCodec;

/// Rejects requests without a valid `Authorization: Bearer <token>` header.
///
/// On success the token's claims are attached with [`Request::set_user`] and
/// the pipeline proceeds. On failure the client gets
/// `401 {"error": "<reason>"}` and nothing after this middleware runs.
///
/// ```rust
/// use std::sync::Arc;
/// use fcodex::middleware::auth;
/// use fcodex::token::{Algorithm, TokenCodec, TokenConfig};
/// use fcodex::{Request, Response, Router};
///
/// async fn me(req: Request, res: Response) {
///     res.json(&req.user());
/// }
///
/// let codec = Arc::new(TokenCodec::new(TokenConfig::new(Algorithm::HS256).secret("s3cret")).unwrap());
/// let private = Router::new().get("/me", me).middleware(auth::bearer(codec));
/// ```
pub fn bearer(codec: Arc<TokenCodec>) -> impl Middleware {
    move |req: Request, res: Response, next: Next| {
        let codec = Arc::clone(&codec);
        async move {
            let Some(token) = req.header("authorization").and_then(bearer_token) else {
                debug!(url = req.url(), "missing bearer token");
                res.status(Status::Unauthorized).json(&json!({ "error": "Missing bearer token" }));
                return;
            };
            match codec.verify(token) {
                Ok(claims) => {
                    req.set_user(claims);
                    next.proceed();
                }
                Err(e) => {
                    debug!(url = req.url(), reason = %e, "bearer token rejected");
                    res.status(Status::Unauthorized).json(&json!({ "error": e.to_string() }));
                }
            }
        }
    }
}

/// The credentials of a `Bearer` authorization value. The scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_credentials() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   tok "), Some("tok"));
        assert_eq!(bearer_token("Basic dXNlcjpwdw=="), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer  "), None);
    }
}
