//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HOST};
use http::{Extensions, HeaderMap, HeaderValue, Method, Uri};
use url::form_urlencoded;

use crate::cookie::{self, CookieValue};
use crate::error::Error;

/// An incoming HTTP request.
///
/// Requests move through the pipeline by value. A middleware that needs to
/// change what later steps see (decoded cookies, attributes) mutates its own
/// copy before handing it to the continuation.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    cookies: HashMap<String, CookieValue>,
    attributes: Extensions,
    body: Bytes,
}

impl Request {
    /// Builder for hand-made requests (tests, internal sub-requests).
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new(Method::GET)
    }

    pub fn get(uri: &str) -> RequestBuilder {
        RequestBuilder::new(Method::GET).uri(uri)
    }

    pub fn post(uri: &str) -> RequestBuilder {
        RequestBuilder::new(Method::POST).uri(uri)
    }

    /// Converts an `http` request, parsing its `Cookie` headers.
    ///
    /// Non-ASCII bytes are decoded lossily so one foreign pair does not hide
    /// the rest of the header.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        let mut cookies = HashMap::new();
        for value in parts.headers.get_all(COOKIE) {
            cookie::parse_cookie_header(&String::from_utf8_lossy(value.as_bytes()), &mut cookies);
        }
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            cookies,
            attributes: parts.extensions,
            body,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header lookup; `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookies(&self) -> &HashMap<String, CookieValue> { &self.cookies }

    pub fn cookies_mut(&mut self) -> &mut HashMap<String, CookieValue> { &mut self.cookies }

    pub fn cookie(&self, name: &str) -> Option<&CookieValue> {
        self.cookies.get(name)
    }

    /// Returns the attribute of type `T`, if one was attached.
    pub fn attribute<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.attributes.get::<T>()
    }

    pub fn insert_attribute<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.attributes.insert(value)
    }

    pub fn with_attribute<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.attributes.insert(value);
        self
    }

    /// Reads a field from a form-urlencoded or JSON body.
    pub fn body_field(&self, name: &str) -> Option<String> {
        let content_type = self.header(CONTENT_TYPE.as_str()).unwrap_or_default();
        if content_type.starts_with("application/x-www-form-urlencoded") {
            return form_urlencoded::parse(&self.body)
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned());
        }
        if content_type.starts_with("application/json") {
            let body: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
            return body.get(name)?.as_str().map(str::to_owned);
        }
        None
    }

    /// Rebuilds an absolute URI for proxied requests that carry only a path.
    ///
    /// The host comes from `Host`; the scheme from `X-Forwarded-Proto`
    /// (falling back to `http`), as set by the fronting proxy.
    pub(crate) fn absolutize(&mut self) {
        if self.uri.authority().is_some() {
            return;
        }
        let Some(host) = self.header(HOST.as_str()) else { return };
        let scheme = match self.header("x-forwarded-proto") {
            Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
            _ => "http",
        };
        let path = self.uri.path_and_query().map_or("/", |p| p.as_str());
        if let Ok(uri) = format!("{scheme}://{host}{path}").parse() {
            self.uri = uri;
        }
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`].
///
/// Errors (bad URI, invalid header) surface from [`build`](RequestBuilder::build).
pub struct RequestBuilder {
    inner: http::request::Builder,
    cookies: Vec<(String, String)>,
    body: Bytes,
}

impl RequestBuilder {
    fn new(method: Method) -> Self {
        Self {
            inner: http::Request::builder().method(method),
            cookies: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.inner = self.inner.method(method);
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        self.inner = self.inner.uri(uri);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    /// Adds an inbound cookie exactly as the client would have sent it.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Form-urlencoded body.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.inner = self.inner.header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = Bytes::from(encoded);
        self
    }

    /// JSON body.
    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.inner = self.inner.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Bytes::from(value.to_string());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, Error> {
        let mut req = Request::from_http(self.inner.body(self.body)?);
        for (name, value) in self.cookies {
            cookie::insert_cookie(&mut req.cookies, &name, value);
        }
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cookie_headers() {
        let req = Request::from_http(
            http::Request::builder()
                .header("cookie", "a=1; b=2")
                .header("cookie", "c=3")
                .body(Bytes::new())
                .unwrap(),
        );
        assert_eq!(req.cookie("a"), Some(&CookieValue::from("1")));
        assert_eq!(req.cookie("c"), Some(&CookieValue::from("3")));
    }

    #[test]
    fn non_ascii_pairs_keep_the_rest_of_the_header() {
        for raw in [&b"csrf-token=T0KEN; name=caf\xe9"[..], &b"csrf-token=T0KEN; name=caf\xc3\xa9"[..]] {
            let req = Request::from_http(
                http::Request::builder()
                    .header("cookie", http::HeaderValue::from_bytes(raw).unwrap())
                    .body(Bytes::new())
                    .unwrap(),
            );
            assert_eq!(req.cookie("csrf-token"), Some(&CookieValue::from("T0KEN")));
            assert!(req.cookie("name").is_some());
        }
    }

    #[test]
    fn builder_cookies_and_attributes() {
        #[derive(Clone)]
        struct Marker(u8);

        let req = Request::get("http://example.com/")
            .cookie("name", "value")
            .build()
            .unwrap()
            .with_attribute(Marker(3));

        assert_eq!(req.cookie("name").and_then(CookieValue::as_scalar), Some("value"));
        assert_eq!(req.attribute::<Marker>().map(|m| m.0), Some(3));
    }

    #[test]
    fn body_field_reads_form_and_json() {
        let form = Request::post("/").form(&[("token", "a b"), ("x", "1")]).build().unwrap();
        assert_eq!(form.body_field("token").as_deref(), Some("a b"));

        let json = Request::post("/")
            .json(&serde_json::json!({ "token": "t", "n": 1 }))
            .build()
            .unwrap();
        assert_eq!(json.body_field("token").as_deref(), Some("t"));
        assert_eq!(json.body_field("n"), None);

        let raw = Request::post("/").body("token=t").build().unwrap();
        assert_eq!(raw.body_field("token"), None);
    }

    #[test]
    fn absolutize_uses_host_and_forwarded_proto() {
        let mut req = Request::get("/a?b=1")
            .header("host", "example.com:8080")
            .header("x-forwarded-proto", "https")
            .build()
            .unwrap();
        req.absolutize();
        assert_eq!(req.uri().to_string(), "https://example.com:8080/a?b=1");
    }

    #[test]
    fn invalid_uri_fails_at_build() {
        assert!(Request::get("http://exa mple.com/").build().is_err());
    }
}
