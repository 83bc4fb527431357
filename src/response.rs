//! Outgoing responses and the [`IntoReply`] conversion trait.
//!
//! A handler returns anything that implements [`IntoReply`]: a finished
//! [`Response`], a [`Template`] for the application's renderer, a [`Json`]
//! value, a bare [`StatusCode`], a string, or a `Result` of those.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Css,          // text/css
    Html,         // text/html; charset=utf-8
    JavaScript,   // text/javascript
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Css         => "text/css",
            Self::Html        => "text/html; charset=utf-8",
            Self::JavaScript  => "text/javascript",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response: status, headers, body.
///
/// ```rust
/// use kiri::{Response, ContentType};
/// use http::StatusCode;
///
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/user/42")
///     .bytes(ContentType::Json, br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().bytes(ContentType::Html, body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: Vec::new(), body: Bytes::new() }
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: StatusCode::OK, headers: Vec::new() }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }

    pub(crate) fn push_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.push((name, value));
    }

    /// The status's reason phrase as a plain-text body.
    pub(crate) fn error(status: StatusCode, detail: Option<String>) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error");
        let body = match detail {
            Some(detail) => format!("{reason}: {detail}"),
            None => reason.to_owned(),
        };
        Self::builder().status(status).text(body)
    }

    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            headers.append(name, value);
        }
        res
    }
}

/// `302 Found` to `url`.
pub fn redirect(url: &str) -> Response {
    redirect_with(StatusCode::FOUND, url)
}

/// `303 See Other` to `url`, for the POST-redirect-GET pattern.
pub fn redirect_see_other(url: &str) -> Response {
    redirect_with(StatusCode::SEE_OTHER, url)
}

fn redirect_with(status: StatusCode, url: &str) -> Response {
    let mut res = Response::status(status);
    match HeaderValue::from_str(url) {
        Ok(location) => res.push_header(LOCATION, location),
        Err(_) => {
            tracing::error!(%url, "redirect target is not a valid header value");
            return Response::error(StatusCode::INTERNAL_SERVER_ERROR, None);
        }
    }
    res
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Adds a header. Invalid names or values are logged and skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            _ => tracing::warn!(%name, "skipping invalid response header"),
        }
        self
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.bytes(ContentType::Text, body.into().into_bytes())
    }

    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(HeaderValue::from_static(content_type.as_str()), body)
    }

    /// Terminate with a body whose content type is given as a string.
    pub fn typed(self, content_type: &str, body: Vec<u8>) -> Response {
        let value = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(ContentType::OctetStream.as_str()));
        self.finish(value, body)
    }

    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }

    fn finish(self, content_type: HeaderValue, body: Vec<u8>) -> Response {
        let mut headers = vec![(CONTENT_TYPE, content_type)];
        headers.extend(self.headers);
        Response { status: self.status, headers, body: Bytes::from(body) }
    }
}

// ── Renderable values ─────────────────────────────────────────────────────────

/// A template name plus the data to render it with.
///
/// Rendered by the application's [`Renderer`](crate::Renderer) after the
/// context-setup hooks have filled in their entries; the data given here
/// wins on key collisions.
#[derive(Clone, Debug)]
pub struct Template {
    pub name: String,
    pub data: Map<String, Value>,
}

impl Template {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned(), data: Map::new() }
    }

    /// Adds one entry. Values that fail to serialize are logged and skipped.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.data.insert(key.to_owned(), v);
            }
            Err(e) => tracing::warn!(
                template = %self.name,
                %key,
                error = %e,
                "skipping unserializable template value"
            ),
        }
        self
    }
}

/// Shorthand for [`Template::new`].
pub fn html(template: &str) -> Template {
    Template::new(template)
}

/// A value serialized to an `application/json` response.
pub struct Json<T>(pub T);

/// `Json` with pretty-printed output.
pub struct PrettyJson<T>(pub T);

// ── Reply / IntoReply ─────────────────────────────────────────────────────────

/// What a handler produced: a finished response, a template still to be
/// rendered, or an error the application turns into a response.
pub enum Reply {
    Response(Response),
    Template(Template),
    Error(Error),
}

/// Conversion of handler return values into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply { self }
}

impl IntoReply for Response {
    fn into_reply(self) -> Reply { Reply::Response(self) }
}

impl IntoReply for Template {
    fn into_reply(self) -> Reply { Reply::Template(self) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply { Response::text(self).into_reply() }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply { Response::text(self).into_reply() }
}

impl IntoReply for StatusCode {
    fn into_reply(self) -> Reply { Response::status(self).into_reply() }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Reply {
        json_reply(serde_json::to_vec(&self.0))
    }
}

impl<T: Serialize> IntoReply for PrettyJson<T> {
    fn into_reply(self) -> Reply {
        json_reply(serde_json::to_vec_pretty(&self.0))
    }
}

fn json_reply(encoded: serde_json::Result<Vec<u8>>) -> Reply {
    match encoded {
        Ok(bytes) => Response::builder().bytes(ContentType::Json, bytes).into_reply(),
        Err(e) => {
            tracing::error!(error = %e, "json encoding failed");
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, None).into_reply()
        }
    }
}

/// Errors are answered by the application, which logs server-side ones and
/// adds their detail to the body in debug mode.
impl IntoReply for Error {
    fn into_reply(self) -> Reply { Reply::Error(self) }
}

impl Error {
    /// The boundary response for this error: status and reason phrase, plus
    /// `Allow` for `MethodNotAllowed`.
    pub(crate) fn into_response(self) -> Response {
        let mut res = Response::error(self.status(), None);
        if let Error::MethodNotAllowed { allowed, .. } = &self {
            if let Some(allow) = allow_header(allowed) {
                res.push_header(http::header::ALLOW, allow);
            }
        }
        res
    }
}

impl<T: IntoReply, E: IntoReply> IntoReply for Result<T, E> {
    fn into_reply(self) -> Reply {
        match self {
            Ok(v) => v.into_reply(),
            Err(e) => e.into_reply(),
        }
    }
}

pub(crate) fn allow_header(methods: &[http::Method]) -> Option<HeaderValue> {
    let list: Vec<&str> = methods.iter().map(http::Method::as_str).collect();
    HeaderValue::from_str(&list.join(", ")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(reply: Reply) -> Response {
        match reply {
            Reply::Response(r) => r,
            Reply::Template(t) => panic!("unexpected template {}", t.name),
            Reply::Error(e) => e.into_response(),
        }
    }

    #[test]
    fn redirect_sets_location() {
        let res = redirect("/user/foo");
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/user/foo"));
        assert_eq!(redirect_see_other("/").status_code(), StatusCode::SEE_OTHER);
    }

    #[test]
    fn json_reply_has_content_type() {
        let res = response(Json(serde_json::json!({"ok": true})).into_reply());
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body(), br#"{"ok":true}"#);
    }

    #[test]
    fn errors_map_to_status() {
        let res = response(Error::NotFound("/x".into()).into_reply());
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let res = response(Error::UnknownEndpoint("x".into()).into_reply());
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn handler_errors_stay_errors_until_answered() {
        let reply = Err::<&str, _>(Error::UnknownEndpoint("x".into())).into_reply();
        assert!(matches!(reply, Reply::Error(Error::UnknownEndpoint(_))));
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let e = Error::MethodNotAllowed {
            method: http::Method::GET,
            path: "/save".into(),
            allowed: vec![http::Method::POST, http::Method::PUT],
        };
        let res = e.into_response();
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("POST, PUT"));
    }

    #[test]
    fn template_data_collects_values() {
        let t = html("page.html").with("title", "Hi").with("n", 3);
        assert_eq!(t.data["title"], "Hi");
        assert_eq!(t.data["n"], 3);
    }
}
