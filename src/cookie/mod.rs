//! Cookie values, outbound cookie directives, and their wire format.

mod codec;
mod queue;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, SystemTime};

use url::form_urlencoded;

pub use codec::{CookieCodec, MAC_LENGTH};
pub use queue::CookieQueue;

/// Longest lifetime, in seconds, accepted for configured cookies (400 years).
pub const MAX_LIFETIME: i64 = 400 * 365 * 86_400;

/// Latest instant an HTTP date can express: 9999-12-31T23:59:59Z.
const LATEST_HTTP_DATE: Duration = Duration::from_secs(253_402_300_799);

// ── CookieValue ───────────────────────────────────────────────────────────────

/// An inbound cookie value.
///
/// Browsers submit `prefs[theme]=dark; prefs[lang]=en` as separate cookies;
/// the request parser folds them into one `Nested` value under `prefs`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CookieValue {
    Scalar(String),
    Nested(BTreeMap<String, CookieValue>),
}

impl CookieValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Nested(_) => None,
        }
    }

    /// Looks up a key of a nested value.
    pub fn get(&self, key: &str) -> Option<&CookieValue> {
        match self {
            Self::Scalar(_) => None,
            Self::Nested(map) => map.get(key),
        }
    }
}

impl From<&str> for CookieValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_owned())
    }
}

impl From<String> for CookieValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

/// Parses `Cookie` request headers into a cookie map.
pub(crate) fn parse_cookie_header(header: &str, cookies: &mut HashMap<String, CookieValue>) {
    for pair in header.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        insert_cookie(cookies, &decode_component(name), decode_component(value));
    }
}

fn decode_component(raw: &str) -> String {
    let mut encoded = String::from("k=");
    encoded.push_str(&raw.replace('&', "%26"));
    form_urlencoded::parse(encoded.as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

/// Inserts `name=value`, expanding `base[a][b]` names into nested values.
pub(crate) fn insert_cookie(cookies: &mut HashMap<String, CookieValue>, name: &str, value: String) {
    let Some((base, keys)) = split_nested_name(name) else {
        cookies.insert(name.to_owned(), CookieValue::Scalar(value));
        return;
    };

    let mut slot = cookies
        .entry(base.to_owned())
        .or_insert_with(|| CookieValue::Nested(BTreeMap::new()));
    for (depth, key) in keys.iter().enumerate() {
        if !matches!(slot, CookieValue::Nested(_)) {
            *slot = CookieValue::Nested(BTreeMap::new());
        }
        let CookieValue::Nested(map) = slot else { return };
        if depth + 1 == keys.len() {
            map.insert((*key).to_owned(), CookieValue::Scalar(value));
            return;
        }
        slot = map
            .entry((*key).to_owned())
            .or_insert_with(|| CookieValue::Nested(BTreeMap::new()));
    }
}

/// `prefs[theme][x]` → `("prefs", ["theme", "x"])`.
fn split_nested_name(name: &str) -> Option<(&str, Vec<&str>)> {
    let open = name.find('[')?;
    if open == 0 || !name.ends_with(']') {
        return None;
    }
    let (base, mut rest) = name.split_at(open);
    let mut keys = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        keys.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    rest.is_empty().then_some((base, keys))
}

// ── Cookie ────────────────────────────────────────────────────────────────────

/// An outbound cookie directive, rendered as one `Set-Cookie` header.
///
/// Immutable: every `with_*` method returns a new cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    lifetime: Option<i64>,
    path: Option<String>,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    /// Session cookie with no path or domain, `HttpOnly` enabled.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            lifetime: None,
            path: None,
            domain: None,
            secure: false,
            http_only: true,
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn value(&self) -> &str { &self.value }
    pub fn lifetime(&self) -> Option<i64> { self.lifetime }
    pub fn path(&self) -> Option<&str> { self.path.as_deref() }
    pub fn domain(&self) -> Option<&str> { self.domain.as_deref() }
    pub fn is_secure(&self) -> bool { self.secure }
    pub fn is_http_only(&self) -> bool { self.http_only }

    pub fn with_value(self, value: impl Into<String>) -> Self {
        Self { value: value.into(), ..self }
    }

    /// Lifetime in seconds. Negative values expire the cookie immediately.
    pub fn with_lifetime(self, lifetime: Option<i64>) -> Self {
        Self { lifetime, ..self }
    }

    pub fn with_path(self, path: Option<String>) -> Self {
        Self { path, ..self }
    }

    pub fn with_domain(self, domain: Option<String>) -> Self {
        Self { domain, ..self }
    }

    pub fn with_secure(self, secure: bool) -> Self {
        Self { secure, ..self }
    }

    pub fn with_http_only(self, http_only: bool) -> Self {
        Self { http_only, ..self }
    }

    /// Absolute expiry, if the cookie has a lifetime.
    ///
    /// Clamped to the range an HTTP date can express, 1970 through 9999.
    pub fn expires(&self) -> Option<SystemTime> {
        let lifetime = self.lifetime?;
        let now = SystemTime::now();
        let offset = Duration::from_secs(lifetime.unsigned_abs());
        let latest = SystemTime::UNIX_EPOCH + LATEST_HTTP_DATE;
        let expires = if lifetime >= 0 {
            now.checked_add(offset).map_or(latest, |at| at.min(latest))
        } else {
            now.checked_sub(offset)
                .map_or(SystemTime::UNIX_EPOCH, |at| at.max(SystemTime::UNIX_EPOCH))
        };
        Some(expires)
    }

    /// The `Set-Cookie` header value.
    pub fn header(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: String = form_urlencoded::byte_serialize(self.name.as_bytes()).collect();
        let value: String = form_urlencoded::byte_serialize(self.value.as_bytes()).collect();
        write!(f, "{name}={value}")?;

        if let (Some(lifetime), Some(expires)) = (self.lifetime, self.expires()) {
            write!(f, "; Expires={}", httpdate::fmt_http_date(expires))?;
            write!(f, "; Max-Age={}", lifetime.max(0))?;
        }
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            write!(f, "; Domain={domain}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_every_attribute() {
        let header = Cookie::new("session", "abc")
            .with_lifetime(Some(3600))
            .with_path(Some("/".into()))
            .with_domain(Some(".example.com".into()))
            .with_secure(true)
            .header();

        assert!(header.starts_with("session=abc; Expires="));
        assert!(header.contains("; Max-Age=3600; Path=/; Domain=.example.com; Secure; HttpOnly"));
    }

    #[test]
    fn header_session_cookie_is_minimal() {
        let header = Cookie::new("a", "b").with_http_only(false).header();
        assert_eq!(header, "a=b");
    }

    #[test]
    fn header_escapes_value() {
        let header = Cookie::new("a", "x y;z").with_http_only(false).header();
        assert_eq!(header, "a=x+y%3Bz");
    }

    #[test]
    fn negative_lifetime_expires_in_the_past() {
        let cookie = Cookie::new("a", "").with_lifetime(Some(-86400));
        assert!(cookie.expires().unwrap() < SystemTime::now());
        assert!(cookie.header().contains("Max-Age=0"));
    }

    #[test]
    fn far_future_expiry_stops_at_year_9999() {
        for lifetime in [400_000_000_000, i64::MAX] {
            let header = Cookie::new("a", "b").with_lifetime(Some(lifetime)).header();
            assert!(header.contains("; Expires=Fri, 31 Dec 9999 23:59:59 GMT;"), "{header}");
            assert!(header.contains(&format!("; Max-Age={lifetime}")));
        }
    }

    #[test]
    fn far_past_expiry_stops_at_the_epoch() {
        for lifetime in [-4_000_000_000, i64::MIN] {
            let header = Cookie::new("a", "").with_lifetime(Some(lifetime)).header();
            assert!(header.contains("; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0"), "{header}");
        }
    }

    #[test]
    fn parses_plain_and_escaped_cookies() {
        let mut cookies = HashMap::new();
        parse_cookie_header("a=1; b=x+y%3Bz;c; d=p&q=r", &mut cookies);
        assert_eq!(cookies["a"], CookieValue::from("1"));
        assert_eq!(cookies["b"], CookieValue::from("x y;z"));
        assert_eq!(cookies["c"], CookieValue::from(""));
        assert_eq!(cookies["d"], CookieValue::from("p&q=r"));
    }

    #[test]
    fn parses_nested_cookie_names() {
        let mut cookies = HashMap::new();
        parse_cookie_header("prefs[theme]=dark; prefs[lang]=en; deep[a][b]=1", &mut cookies);

        let prefs = &cookies["prefs"];
        assert_eq!(prefs.get("theme"), Some(&CookieValue::from("dark")));
        assert_eq!(prefs.get("lang"), Some(&CookieValue::from("en")));
        assert_eq!(
            cookies["deep"].get("a").and_then(|a| a.get("b")),
            Some(&CookieValue::from("1"))
        );
    }

    #[test]
    fn malformed_brackets_stay_scalar() {
        let mut cookies = HashMap::new();
        parse_cookie_header("[x]=1; y[=2; z[a]b=3", &mut cookies);
        assert_eq!(cookies["[x]"], CookieValue::from("1"));
        assert_eq!(cookies["y["], CookieValue::from("2"));
        assert_eq!(cookies["z[a]b"], CookieValue::from("3"));
    }
}
