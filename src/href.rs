//! Reverse URL resolution.
//!
//! Handlers refer to routes by endpoint name and let [`Href`] produce the
//! path, so a rule can change without chasing literal URLs through the code:
//!
//! ```rust,ignore
//! async fn save(req: Request) -> Result<Response, kiri::Error> {
//!     let url = req.context().href().resolve("user", &Args::new().with("username", "foo"))?;
//!     Ok(redirect(&url))
//! }
//! ```

use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::params::Args;
use crate::router::Router;

/// A resolver bound to the application's route table.
///
/// Cheap to clone. The copy inside a request [`Context`] also knows the
/// request's `Host`, for [`external`](Href::external) URLs.
#[derive(Clone)]
pub struct Href {
    router: Arc<Router>,
    host: Option<String>,
}

impl Href {
    pub(crate) fn new(router: Arc<Router>, host: Option<String>) -> Self {
        Self { router, host }
    }

    /// The URL path (plus query) of `endpoint`.
    pub fn resolve(&self, endpoint: &str, args: &Args) -> Result<String, Error> {
        self.router.resolve(endpoint, args)
    }

    /// Like [`resolve`](Href::resolve), prefixed with `http://` and the
    /// request host. Falls back to `localhost` outside a request.
    pub fn external(&self, endpoint: &str, args: &Args) -> Result<String, Error> {
        let path = self.resolve(endpoint, args)?;
        let host = self.host.as_deref().unwrap_or("localhost");
        Ok(format!("http://{host}{path}"))
    }
}

/// Resolves `endpoint` against the current request's route table.
///
/// Outside a request there is no table to consult, so every endpoint is
/// unknown.
pub fn url_for(endpoint: &str, args: &Args) -> Result<String, Error> {
    match Context::current() {
        Some(ctx) => ctx.href().resolve(endpoint, args),
        None => Err(Error::UnknownEndpoint(endpoint.to_owned())),
    }
}
