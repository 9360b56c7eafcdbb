//! CSRF enforcement.

use http::{Method, StatusCode};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::CsrfToken;
use crate::config::HttpConfig;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::pipeline::{Middleware, Next};
use crate::request::Request;
use crate::response::{Response, ResponseFactory};

/// Header checked when the body carries no token.
pub const TOKEN_HEADER: &str = "x-csrf-token";

/// Rejects unsafe requests whose submitted token does not match the request's
/// [`CsrfToken`].
///
/// The token is looked for in a body field named after the CSRF cookie, then
/// in the `X-CSRF-Token` header. A mismatch answers `412 Precondition
/// Failed` without running the rest of the chain. Must run after
/// [`CsrfMiddleware`](super::CsrfMiddleware).
pub struct CsrfFirewall {
    field: String,
    allowed: Vec<Method>,
    factory: ResponseFactory,
}

impl CsrfFirewall {
    /// Lets `GET`, `HEAD` and `OPTIONS` through unchecked.
    pub fn new(config: &HttpConfig, factory: ResponseFactory) -> Self {
        Self {
            field: config.csrf.cookie.clone(),
            allowed: vec![Method::GET, Method::HEAD, Method::OPTIONS],
            factory,
        }
    }

    /// Checks every method.
    pub fn strict(config: &HttpConfig, factory: ResponseFactory) -> Self {
        Self::new(config, factory).allow_methods(Vec::new())
    }

    pub fn allow_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed = methods.into_iter().collect();
        self
    }

    fn is_valid(&self, req: &Request, expected: &CsrfToken) -> bool {
        let candidate = req
            .body_field(&self.field)
            .or_else(|| req.header(TOKEN_HEADER).map(str::to_owned));

        candidate.is_some_and(|candidate| {
            bool::from(candidate.as_bytes().ct_eq(expected.as_str().as_bytes()))
        })
    }
}

impl Middleware for CsrfFirewall {
    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            if self.allowed.contains(req.method()) {
                return next.run(req).await;
            }

            let Some(expected) = req.attribute::<CsrfToken>() else {
                return Err(Error::configuration(
                    "unable to apply CSRF firewall, no token attached (is the csrf middleware installed?)",
                ));
            };

            if !self.is_valid(&req, expected) {
                warn!(method = %req.method(), path = req.uri().path(), "CSRF token mismatch");
                return Ok(self.factory.create(StatusCode::PRECONDITION_FAILED));
            }
            next.run(req).await
        })
    }
}
