//! Outgoing HTTP response type, the response factory, and the [`IntoReply`]
//! conversion trait.
//!
//! Build a [`Response`] in your handler and return it, or return something
//! simpler (text, a map, `Json<T>`) and let the pipeline build it for you.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::config::HttpConfig;
use crate::error::{BoxError, Error};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }

    fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// Response payload.
///
/// Only `Buffered` bodies accept writes; the pipeline appends captured
/// handler output to them. `Sealed` bodies (pre-rendered files, proxied
/// payloads) are passed through untouched.
#[derive(Clone, Debug)]
pub enum Body {
    Buffered(BytesMut),
    Sealed(Bytes),
}

impl Default for Body {
    fn default() -> Self {
        Self::Buffered(BytesMut::new())
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use palisade::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use palisade::Response;
/// use http::{HeaderValue, StatusCode, header::LOCATION};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header(LOCATION, HeaderValue::from_static("/users/42"))
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// Empty, writable response with no headers.
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Body::default() }
    }

    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::new(code)
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn set_status(&mut self, status: StatusCode) { self.status = status; }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// First value of `name`, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of `name`, in insertion order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn body(&self) -> &[u8] {
        match &self.body {
            Body::Buffered(buf) => &buf[..],
            Body::Sealed(bytes) => &bytes[..],
        }
    }

    /// Body as UTF-8 text, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(self.body()).into_owned()
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.body, Body::Buffered(_))
    }

    /// Appends to a writable body. Returns `false` for a sealed body.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> bool {
        match &mut self.body {
            Body::Buffered(buf) => {
                buf.extend_from_slice(data.as_ref());
                true
            }
            Body::Sealed(_) => false,
        }
    }

    /// Freezes the body so later writes are refused.
    pub fn sealed(mut self) -> Self {
        if let Body::Buffered(buf) = &mut self.body {
            self.body = Body::Sealed(buf.split().freeze());
        }
        self
    }

    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let body = match self.body {
            Body::Buffered(buf) => buf.freeze(),
            Body::Sealed(bytes) => bytes,
        };
        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Replaces the body with `value` serialized as JSON.
    ///
    /// A numeric top-level `status` field that is a valid status code
    /// becomes the response status.
    fn into_json(mut self, value: &serde_json::Value) -> Result<Self, Error> {
        if let Some(status) = value
            .get("status")
            .and_then(serde_json::Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .and_then(|code| StatusCode::from_u16(code).ok())
        {
            self.status = status;
        }
        self.headers.insert(CONTENT_TYPE, ContentType::Json.header_value());
        self.body = Body::Buffered(BytesMut::from(serde_json::to_vec(value)?.as_slice()));
        Ok(self)
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method, so the content type always matches.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header; repeated names keep every value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(ContentType::Json, body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, body.into().into_bytes())
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type, body)
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        Response { body: Body::default(), headers: self.headers, status: self.status }
    }

    fn finish(mut self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.headers.insert(CONTENT_TYPE, content_type.header_value());
        Response {
            body: Body::Buffered(BytesMut::from(body.as_slice())),
            headers: self.headers,
            status: self.status,
        }
    }
}

// ── ResponseFactory ───────────────────────────────────────────────────────────

/// Creates responses pre-populated with the configured base headers.
#[derive(Clone, Debug, Default)]
pub struct ResponseFactory {
    headers: Arc<HeaderMap>,
}

impl ResponseFactory {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers: Arc::new(headers) }
    }

    /// Factory seeded with `config.headers`.
    pub fn from_config(config: &HttpConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::configuration(format!("invalid base header `{name}`: {e}")))?;
            headers.append(name, HeaderValue::from_str(value)?);
        }
        Ok(Self::new(headers))
    }

    pub fn create(&self, status: StatusCode) -> Response {
        Response {
            status,
            headers: HeaderMap::clone(&self.headers),
            body: Body::default(),
        }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What a plain-function handler produced, before normalization.
#[derive(Debug)]
pub enum Reply {
    /// A finished response, used as-is.
    Response(Response),
    /// Structured data, rendered as a JSON response.
    Json(serde_json::Value),
    /// Raw text, written into the default response.
    Text(String),
}

impl Reply {
    /// Turns the reply into the final response.
    ///
    /// `default` is the factory response the handler was given; `output` is
    /// the text captured while the handler ran, always appended last.
    pub(crate) fn into_response(self, default: Response, output: &str) -> Result<Response, Error> {
        let mut response = match self {
            Self::Response(mut response) => {
                if !output.is_empty() {
                    response.write(output);
                }
                return Ok(response);
            }
            Self::Json(value) => default.into_json(&value)?,
            Self::Text(text) => {
                let mut response = default;
                response.write(text);
                response
            }
        };
        response.write(output);
        Ok(response)
    }
}

/// Serializes any `T: Serialize` into a JSON reply.
///
/// ```rust,ignore
/// async fn get_user(_req: Request, _res: Response) -> Json<User> {
///     Json(User { id: 1, name: "alice".into() })
/// }
/// ```
pub struct Json<T>(pub T);

/// Conversion of handler return values into a [`Reply`].
///
/// Implemented for responses, text, JSON-able values and `Result`s of those.
/// Implement it on your own types to return them directly from handlers.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, Error>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, Error> { Ok(self) }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Response(self)) }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Text(self)) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Text(self.to_owned())) }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Text(String::new())) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoReply for StatusCode {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Response(Response::status(self))) }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Json(self)) }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Json(serde_json::to_value(&self.0)?))
    }
}

impl<V: Serialize> IntoReply for HashMap<String, V> {
    fn into_reply(self) -> Result<Reply, Error> { Json(self).into_reply() }
}

impl<V: Serialize> IntoReply for BTreeMap<String, V> {
    fn into_reply(self) -> Result<Reply, Error> { Json(self).into_reply() }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<BoxError>,
{
    fn into_reply(self) -> Result<Reply, Error> {
        self.map_err(Error::handler)?.into_reply()
    }
}
