//! Sequential middleware execution.
//!
//! A [`Chain`] walks one tier of middleware with a cursor. Each middleware
//! runs to completion before the next one starts; the chain advances only if
//! the middleware called [`Next::proceed`] and the response is still open.
//! A middleware that hands its `Next` elsewhere is waited on until that
//! `Next` is used or dropped.

use crate::error::Error;
use crate::handler::{BoxedMiddleware, Next};
use crate::request::Request;
use crate::response::Response;

/// How a tier ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Flow {
    /// Every middleware proceeded and the response is still open.
    Continue,
    /// A middleware withheld `proceed`, or the response was sent.
    Halt,
}

pub(crate) struct Chain<'a> {
    middlewares: &'a [BoxedMiddleware],
    cursor: usize,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(middlewares: &'a [BoxedMiddleware]) -> Self {
        Self { middlewares, cursor: 0 }
    }

    pub(crate) async fn run(mut self, req: &Request, res: &Response) -> Result<Flow, Error> {
        while let Some(middleware) = self.middlewares.get(self.cursor) {
            if res.headers_sent() {
                return Ok(Flow::Halt);
            }
            self.cursor += 1;

            let (next, opened) = Next::new();
            middleware.call(req.clone(), res.clone(), next).await?;
            if opened.await.is_err() {
                return Ok(Flow::Halt);
            }
        }
        Ok(if res.headers_sent() { Flow::Halt } else { Flow::Continue })
    }
}
