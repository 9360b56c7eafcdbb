//! Built-in middleware.
//!
//! | id                     | type                           |
//! |------------------------|--------------------------------|
//! | `trace`                | [`TraceMiddleware`]            |
//! | `cookies`              | [`CookiesMiddleware`]          |
//! | `csrf`                 | [`CsrfMiddleware`]             |
//! | `csrf-firewall`        | [`CsrfFirewall::new`]          |
//! | `csrf-strict-firewall` | [`CsrfFirewall::strict`]       |
//!
//! The ids are what [`HttpConfig::middleware`](crate::HttpConfig) lists.
//! Order matters: `cookies` must precede `csrf`, and `csrf` must precede
//! either firewall.

mod cookies;
mod csrf;
mod firewall;
mod trace;

pub use cookies::CookiesMiddleware;
pub use csrf::{CsrfMiddleware, CsrfToken, OsRandom, SecureRandom};
pub use firewall::{CsrfFirewall, TOKEN_HEADER};
pub use trace::TraceMiddleware;
