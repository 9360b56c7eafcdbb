//! Cookie protection.
//!
//! Inbound cookies are decoded before the rest of the chain sees them;
//! cookies scheduled on the request's [`CookieQueue`] are encoded and emitted
//! as `Set-Cookie` headers once the response comes back.

use std::sync::Arc;

use http::HeaderValue;
use http::header::SET_COOKIE;
use tracing::debug;

use crate::config::{HttpConfig, Protection};
use crate::cookie::{Cookie, CookieCodec, CookieQueue};
use crate::crypto::Encrypter;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::pipeline::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::scope::{self, Bindings};

/// Decodes protected inbound cookies and emits scheduled outbound ones.
///
/// A cookie that fails to decrypt or verify is removed from the request; it
/// is never an error. Later steps schedule cookies through the queue, found
/// either as a request attribute or through [`scope::resolve`]:
///
/// ```rust,ignore
/// let queue = req.attribute::<CookieQueue>().cloned()
///     .or_else(scope::resolve::<CookieQueue>)
///     .unwrap();
/// queue.set("theme", "dark");
/// ```
pub struct CookiesMiddleware {
    config: Arc<HttpConfig>,
    codec: CookieCodec,
}

impl CookiesMiddleware {
    pub fn new(config: Arc<HttpConfig>, encrypter: Arc<dyn Encrypter>) -> Self {
        let codec = CookieCodec::new(config.cookies.method, encrypter);
        Self { config, codec }
    }

    fn is_protected(&self, name: &str) -> bool {
        self.codec.method() != Protection::Unprotected && !self.config.is_excluded(name)
    }

    fn unpack(&self, req: &mut Request) {
        req.cookies_mut().retain(|name, value| {
            if !self.is_protected(name) {
                return true;
            }
            match self.codec.decode(value) {
                Some(decoded) => {
                    *value = decoded;
                    true
                }
                None => {
                    debug!(cookie = %name, "dropping cookie that failed to decode");
                    false
                }
            }
        });
    }

    fn pack(&self, response: &mut Response, queue: &CookieQueue) -> Result<(), Error> {
        for cookie in queue.scheduled() {
            let cookie = self.protect(cookie)?;
            response
                .headers_mut()
                .append(SET_COOKIE, HeaderValue::from_str(&cookie.header())?);
        }
        Ok(())
    }

    fn protect(&self, cookie: Cookie) -> Result<Cookie, Error> {
        if cookie.value().is_empty() || !self.is_protected(cookie.name()) {
            return Ok(cookie);
        }
        let value = self.codec.encode_str(cookie.value())?;
        Ok(cookie.with_value(value))
    }
}

impl Middleware for CookiesMiddleware {
    fn process<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let secure = req.uri().scheme_str() == Some("https");
            let queue = CookieQueue::new(self.config.cookie_domain(req.uri()), secure);

            self.unpack(&mut req);
            req.insert_attribute(queue.clone());

            let bindings = Bindings::new().with(queue.clone());
            let mut response = scope::run(bindings, next.run(req)).await?;

            self.pack(&mut response, &queue)?;
            Ok(response)
        })
    }
}
