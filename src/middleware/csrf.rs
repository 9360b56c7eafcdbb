//! CSRF token issuance.

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::header::SET_COOKIE;
use http::{HeaderValue, Uri};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;

use crate::config::HttpConfig;
use crate::cookie::{Cookie, CookieValue};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::pipeline::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The CSRF token of the current request, attached as a request attribute.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(..)")
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of cryptographically secure random bytes.
pub trait SecureRandom: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand::Error>;
}

/// The operating system's random source.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

/// Attaches a [`CsrfToken`] to every request.
///
/// A non-empty token cookie is reused. Otherwise a fresh token is minted and
/// sent back in a `Set-Cookie` header once the rest of the chain has run.
/// If the random source fails the request fails with [`Error::Security`].
pub struct CsrfMiddleware {
    config: Arc<HttpConfig>,
    random: Arc<dyn SecureRandom>,
}

impl CsrfMiddleware {
    pub fn new(config: Arc<HttpConfig>) -> Self {
        Self { config, random: Arc::new(OsRandom) }
    }

    /// Replaces the random source.
    pub fn with_random(mut self, random: impl SecureRandom + 'static) -> Self {
        self.random = Arc::new(random);
        self
    }

    fn mint(&self) -> Result<CsrfToken, Error> {
        let length = self.config.csrf.length;
        let mut bytes = vec![0u8; length];
        self.random.fill(&mut bytes).map_err(Error::Security)?;

        let mut token = URL_SAFE_NO_PAD.encode(&bytes);
        token.truncate(length);
        Ok(CsrfToken(token))
    }

    fn cookie(&self, token: &CsrfToken, uri: &Uri) -> Cookie {
        let csrf = &self.config.csrf;
        Cookie::new(csrf.cookie.as_str(), token.as_str())
            .with_lifetime(csrf.lifetime)
            .with_path(Some(self.config.base_path.clone()))
            .with_domain(self.config.cookie_domain(uri))
            .with_secure(csrf.secure)
            .with_http_only(true)
    }
}

impl Middleware for CsrfMiddleware {
    fn process<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let existing = req
                .cookie(&self.config.csrf.cookie)
                .and_then(CookieValue::as_scalar)
                .filter(|token| !token.is_empty())
                .map(|token| CsrfToken(token.to_owned()));

            let (token, cookie) = match existing {
                Some(token) => (token, None),
                None => {
                    let token = self.mint()?;
                    debug!(cookie = %self.config.csrf.cookie, "issued new CSRF token");
                    let cookie = self.cookie(&token, req.uri());
                    (token, Some(cookie))
                }
            };

            req.insert_attribute(token);
            let mut response = next.run(req).await?;

            if let Some(cookie) = cookie {
                response
                    .headers_mut()
                    .append(SET_COOKIE, HeaderValue::from_str(&cookie.header())?);
            }
            Ok(response)
        })
    }
}
