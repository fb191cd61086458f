//! Built-in middleware.
//!
//! Every item here is an ordinary [`Middleware`](crate::Middleware) value and
//! can be registered at any tier: globally with [`App::middleware`](crate::App::middleware),
//! per router with [`Router::middleware`](crate::Router::middleware), or per
//! route through a [`Stack`](crate::Stack).
//!
//! - [`auth::bearer`]: verifies `Authorization: Bearer` tokens, answers 401 on failure
//! - [`cors::cors`]: origin policy and preflight handling
//! - [`trace::trace`]: structured start/finish events per request
//! - [`validate::validate`]: JSON body schema checks, answers 400 on violation

pub mod auth;
pub mod cors;
pub mod trace;
pub mod validate;
