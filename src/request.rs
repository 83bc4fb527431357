//! Incoming HTTP request type.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use crate::context::Context;
use crate::params::{Params, Value};

/// An incoming HTTP request, as seen by a handler.
///
/// Carries the raw request pieces, the path parameters extracted by the
/// match, and the request's [`Context`].
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    params: Params,
    context: Context,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: Bytes,
        params: Params,
        context: Context,
    ) -> Self {
        let query = parts
            .uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let form = if is_urlencoded(&parts.headers) {
            form_urlencoded::parse(&body).into_owned().collect()
        } else {
            Vec::new()
        };

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            query,
            form,
            params,
            context,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn params(&self) -> &Params { &self.params }
    pub fn context(&self) -> &Context { &self.context }

    /// Header lookup; names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/user/<username>`, `req.param("username")` on `/user/42`
    /// returns `Some(&Value::Str("42"))`; under `/post/<id:int>` the same
    /// segment yields `Value::Int(42)`.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// First query-string value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        lookup(&self.query, name)
    }

    /// First form field value for `name`. Only urlencoded bodies are parsed.
    pub fn form(&self, name: &str) -> Option<&str> {
        lookup(&self.form, name)
    }

    pub fn form_fields(&self) -> &[(String, String)] {
        &self.form
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Whether the body is `application/x-www-form-urlencoded`.
pub(crate) fn is_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}
