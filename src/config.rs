//! Process-wide HTTP configuration.
//!
//! Loaded once at startup and shared read-only (`Arc<HttpConfig>`) by the
//! core and every middleware. Sources, lowest precedence first:
//!
//! 1. Built-in defaults ([`HttpConfig::default`])
//! 2. A TOML file
//! 3. Environment variables prefixed `PALISADE_`, `__` separating sections
//!    (`PALISADE_CSRF__LENGTH=32`)
//!
//! ```toml
//! base_path = "/"
//! middleware = ["cookies", "csrf", "csrf-firewall"]
//!
//! [headers]
//! "Content-Type" = "text/html; charset=UTF-8"
//!
//! [cookies]
//! domain = ".%s"
//! method = "encrypt"
//! excluded = ["PHPSESSID", "csrf-token"]
//!
//! [csrf]
//! cookie = "csrf-token"
//! length = 16
//! lifetime = 86400
//! ```

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use http::Uri;
use serde::{Deserialize, Serialize};

use crate::cookie::MAX_LIFETIME;
use crate::error::Error;

/// Placeholder in [`CookieSettings::domain`] replaced by the request host.
const HOST_MARKER: &str = "%s";

/// How cookie values are protected on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protection {
    Unprotected,
    #[default]
    Encrypt,
    Hmac,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Path used for framework-issued cookies.
    pub base_path: String,
    /// Headers every factory-created response starts with.
    pub headers: BTreeMap<String, String>,
    /// Middleware ids, outermost first.
    pub middleware: Vec<String>,
    pub cookies: CookieSettings,
    pub csrf: CsrfSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    /// Domain pattern; `%s` is replaced by the request host.
    pub domain: String,
    pub method: Protection,
    /// Cookies passed through without protection.
    pub excluded: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfSettings {
    pub cookie: String,
    /// Token length in characters (and random bytes drawn).
    pub length: usize,
    /// Cookie lifetime in seconds; `None` issues a session cookie.
    pub lifetime: Option<i64>,
    pub secure: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_path: "/".to_owned(),
            headers: BTreeMap::from([(
                "Content-Type".to_owned(),
                "text/html; charset=UTF-8".to_owned(),
            )]),
            middleware: vec!["cookies".to_owned(), "csrf".to_owned()],
            cookies: CookieSettings::default(),
            csrf: CsrfSettings::default(),
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            domain: ".%s".to_owned(),
            method: Protection::Encrypt,
            excluded: vec!["PHPSESSID".to_owned(), "csrf-token".to_owned()],
        }
    }
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            cookie: "csrf-token".to_owned(),
            length: 16,
            lifetime: Some(86_400),
            secure: false,
        }
    }
}

impl HttpConfig {
    /// Loads defaults, then `path` (if it exists), then the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("PALISADE_").split("__")),
        )
    }

    /// Parses a TOML document layered over the defaults.
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(source)))
    }

    fn extract(figment: Figment) -> Result<Self, Error> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the middleware cannot honor.
    pub fn validate(&self) -> Result<(), Error> {
        if self.csrf.length == 0 {
            return Err(Error::configuration("csrf.length must be at least 1"));
        }
        if let Some(lifetime) = self.csrf.lifetime.filter(|l| !(0..=MAX_LIFETIME).contains(l)) {
            return Err(Error::configuration(format!(
                "csrf.lifetime {lifetime} must be between 0 and {MAX_LIFETIME} seconds"
            )));
        }
        if self.cookies.domain.matches(HOST_MARKER).count() > 1 {
            return Err(Error::configuration(format!(
                "cookies.domain `{}` may contain at most one `{HOST_MARKER}`",
                self.cookies.domain
            )));
        }
        Ok(())
    }

    pub fn is_excluded(&self, cookie: &str) -> bool {
        self.cookies.excluded.iter().any(|name| name == cookie)
    }

    /// Domain attribute for cookies issued in response to a request for `uri`.
    ///
    /// `None` when the URI has no host. A pattern without `%s` is a forced
    /// domain and returned as-is. IP and `localhost` hosts cannot carry
    /// subdomain cookies, so leading dots are stripped for them.
    pub fn cookie_domain(&self, uri: &Uri) -> Option<String> {
        let host = uri.host().filter(|host| !host.is_empty())?;
        let pattern = self.cookies.domain.as_str();
        if !pattern.contains(HOST_MARKER) {
            return Some(pattern.to_owned());
        }

        let pattern = if is_ip_or_localhost(host) {
            pattern.trim_start_matches('.')
        } else {
            pattern
        };

        let host = match non_default_port(uri) {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        Some(pattern.replacen(HOST_MARKER, &host, 1))
    }
}

fn is_ip_or_localhost(host: &str) -> bool {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost") || bare.parse::<IpAddr>().is_ok()
}

fn non_default_port(uri: &Uri) -> Option<u16> {
    let port = uri.port_u16()?;
    match (uri.scheme_str(), port) {
        (Some("http"), 80) | (Some("https"), 443) => None,
        _ => Some(port),
    }
}
