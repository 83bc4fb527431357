//! Opening and closing request scopes.
//!
//! [`Scopes::open`] builds the [`Context`] for a request: it finds the
//! session named by the request cookie and moves any flashes waiting in it
//! into the context. [`Scopes::close`] does the reverse once teardown has
//! run: it parks undelivered flashes in the session, saves the session if it
//! changed, and hands back the `Set-Cookie` value to send.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::header::{COOKIE, HOST};
use http::{HeaderMap, HeaderValue};

use crate::context::Context;
use crate::flash::{self, Flash};
use crate::hooks::Phase;
use crate::href::Href;
use crate::router::Router;
use crate::session::{Session, SessionStore};

/// How the handler's reply reached the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// A template was rendered and showed the flashes queued so far.
    Rendered,
    /// Anything else: a redirect, a plain response, an error.
    Responded,
}

/// The request context manager.
pub struct Scopes {
    store: Arc<dyn SessionStore>,
    router: Arc<Router>,
    cookie_name: String,
    next_id: AtomicU64,
}

impl Scopes {
    pub fn new(
        store: Arc<dyn SessionStore>,
        router: Arc<Router>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            router,
            cookie_name: cookie_name.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Creates the context for one inbound request.
    pub fn open(&self, headers: &HeaderMap) -> Context {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut session = self.session_for(headers);

        let incoming = match session.remove(flash::SESSION_KEY) {
            None => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<Flash>>(value).unwrap_or_else(|e| {
                tracing::warn!(request = id, error = %e, "discarding unreadable flashes");
                Vec::new()
            }),
        };

        let host = headers.get(HOST).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let href = Href::new(Arc::clone(&self.router), host);
        tracing::debug!(request = id, session = session.id(), "scope opened");
        Context::new(id, href, session, incoming)
    }

    /// Closes a context after teardown, returning the cookie to set, if any.
    ///
    /// Flashes still queued are kept in the session for the next request:
    /// on a redirect that is all of them, after a render only those queued
    /// once the render had drained the queue. A session left empty is
    /// deleted from the store and its cookie expired.
    pub fn close(&self, ctx: Context, disposition: Disposition) -> Option<HeaderValue> {
        let queued = ctx.take_queued();
        if !queued.is_empty() {
            if disposition == Disposition::Rendered {
                tracing::debug!(
                    request = ctx.id(),
                    count = queued.len(),
                    "flashes queued after render kept for the next request"
                );
            }
            match serde_json::to_value(&queued) {
                Ok(value) => ctx.with_session(|s| s.insert(flash::SESSION_KEY, value)),
                Err(e) => {
                    tracing::error!(request = ctx.id(), error = %e, "could not store flashes")
                }
            }
        }

        let leftover = ctx.attribute_names();
        if !leftover.is_empty() {
            tracing::debug!(
                request = ctx.id(),
                attributes = ?leftover,
                "attributes left after teardown"
            );
        }
        ctx.enter(Phase::TornDown);

        let session = ctx.with_session(|s| s.clone());
        if !session.is_modified() {
            return None;
        }

        if session.data().is_empty() {
            if session.is_new() {
                return None;
            }
            if let Err(e) = self.store.delete(session.id()) {
                tracing::error!(request = ctx.id(), error = %e, "session delete failed");
            }
            return self.cookie(ctx.id(), "", "; Max-Age=0");
        }

        if let Err(e) = self.store.save(&session) {
            tracing::error!(request = ctx.id(), error = %e, "session save failed");
            return None;
        }
        self.cookie(ctx.id(), session.id(), "")
    }

    fn cookie(&self, request: u64, value: &str, attributes: &str) -> Option<HeaderValue> {
        let cookie = format!("{}={value}; Path=/; HttpOnly{attributes}", self.cookie_name);
        match HeaderValue::from_str(&cookie) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(request, error = %e, "session cookie is not a valid header");
                None
            }
        }
    }

    fn session_for(&self, headers: &HeaderMap) -> Session {
        cookie_value(headers, &self.cookie_name)
            .and_then(|sid| self.store.load(sid))
            .unwrap_or_else(|| self.store.create())
    }
}

/// Finds cookie `name` across every `Cookie` header.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}
