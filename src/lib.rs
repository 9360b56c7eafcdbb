//! # palisade
//!
//! A request-processing core for Rust services behind a reverse proxy: an
//! ordered middleware pipeline ending in your handler, with tamper-resistant
//! cookies and CSRF protection built in.
//!
//! ## The contract
//!
//! The proxy owns TLS, rate limiting and body-size limits; routing belongs to
//! whatever sits in front of, or inside, your handler. palisade owns what
//! happens between the request arriving and the response leaving:
//!
//! - **Pipeline**: ordered [`Middleware`] with explicit continuations
//!   ([`Next`]), per-request scoped values ([`scope`]) and captured
//!   incidental output ([`output`])
//! - **Cookies**: inbound values decrypted or verified, outbound values
//!   encrypted or signed ([`middleware::CookiesMiddleware`])
//! - **CSRF**: a per-request token issued as a cookie and enforced on unsafe
//!   methods ([`middleware::CsrfMiddleware`], [`middleware::CsrfFirewall`])
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use palisade::{HttpConfig, HttpCore, Request, Response, SecretEncrypter, Server, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), palisade::Error> {
//!     let config = HttpConfig::load_from("palisade.toml")?;
//!     let mut core = HttpCore::new(config, Arc::new(SecretEncrypter::generate()))?;
//!     core.set_handler(Target::callable(index));
//!
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(core).await
//! }
//!
//! async fn index(_req: Request, _res: Response) -> serde_json::Value {
//!     serde_json::json!({ "status": 200, "message": "hello" })
//! }
//! ```

mod error;
mod handler;
mod http_core;
mod pipeline;
mod request;
mod response;
mod server;

pub mod config;
pub mod cookie;
pub mod crypto;
pub mod middleware;
pub mod output;
pub mod scope;

pub use config::{HttpConfig, Protection};
pub use cookie::{Cookie, CookieCodec, CookieQueue, CookieValue};
pub use crypto::{Encrypter, SecretEncrypter};
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, CallableHandler, RequestHandler};
pub use http_core::HttpCore;
pub use pipeline::{Middleware, Next, Pipeline, Target};
pub use request::{Request, RequestBuilder};
pub use response::{Body, ContentType, IntoReply, Json, Reply, Response, ResponseBuilder, ResponseFactory};
pub use server::Server;
