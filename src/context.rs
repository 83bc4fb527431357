//! Request-scoped context.
//!
//! Every request gets its own [`Context`], created when dispatch starts and
//! closed once teardown has run. Code deep inside a handler reaches it
//! through [`Context::current`], which reads a tokio task-local set for the
//! duration of that one request. Two requests never see the same context,
//! whatever threads their tasks land on.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::flash::{Flash, Level};
use crate::hooks::Phase;
use crate::href::Href;
use crate::params::{Args, Params};
use crate::session::Session;

tokio::task_local! {
    static CURRENT: Context;
}

/// Handle to one request's scoped state.
///
/// Cloning is cheap and yields a handle to the *same* context. The lock
/// inside is held only for the length of a single accessor call.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    href: Href,
    state: Mutex<State>,
}

struct State {
    phase: Phase,
    endpoint: Option<String>,
    params: Params,
    session: Session,
    incoming: Vec<Flash>,
    queued: Vec<Flash>,
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub(crate) fn new(id: u64, href: Href, session: Session, incoming: Vec<Flash>) -> Self {
        let state = State {
            phase: Phase::Idle,
            endpoint: None,
            params: Params::new(),
            session,
            incoming,
            queued: Vec::new(),
            attributes: HashMap::new(),
        };
        Self { inner: Arc::new(Inner { id, href, state: Mutex::new(state) }) }
    }

    /// The context of the request running on this task, if any.
    pub fn current() -> Option<Context> {
        CURRENT.try_with(Context::clone).ok()
    }

    /// Runs `fut` with this context as the current one.
    pub(crate) async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT.scope(self.clone(), fut).await
    }

    /// Runs `f` with this context as the current one.
    pub(crate) fn sync_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self.clone(), f)
    }

    /// Process-unique request number, for log correlation.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub(crate) fn enter(&self, phase: Phase) {
        let mut state = self.inner.state.lock();
        tracing::debug!(request = self.inner.id, from = ?state.phase, to = ?phase, "phase");
        state.phase = phase;
    }

    /// The endpoint the request matched, once matching has happened.
    pub fn endpoint(&self) -> Option<String> {
        self.inner.state.lock().endpoint.clone()
    }

    /// Path parameters of the match. Empty before matching.
    pub fn params(&self) -> Params {
        self.inner.state.lock().params.clone()
    }

    pub(crate) fn set_match(&self, endpoint: &str, params: &Params) {
        let mut state = self.inner.state.lock();
        state.endpoint = Some(endpoint.to_owned());
        state.params = params.clone();
    }

    pub fn href(&self) -> &Href {
        &self.inner.href
    }

    /// Shorthand for `self.href().resolve(endpoint, args)`.
    pub fn url_for(&self, endpoint: &str, args: &Args) -> Result<String, Error> {
        self.inner.href.resolve(endpoint, args)
    }

    // ── Attributes ──────────────────────────────────────────────────────────

    /// Stores `value` under `name`, replacing any earlier value.
    pub fn set<T: Any + Send + Sync>(&self, name: &str, value: T) {
        self.inner.state.lock().attributes.insert(name.to_owned(), Box::new(value));
    }

    /// A clone of the attribute `name`, if present and of type `T`.
    pub fn get<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.inner
            .state
            .lock()
            .attributes
            .get(name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes `name`. Returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.inner.state.lock().attributes.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.state.lock().attributes.contains_key(name)
    }

    /// Names of the attributes currently set.
    pub fn attribute_names(&self) -> Vec<String> {
        self.inner.state.lock().attributes.keys().cloned().collect()
    }

    // ── Session ─────────────────────────────────────────────────────────────

    /// Runs `f` against the request's session.
    ///
    /// The context is locked while `f` runs; do not call back into this
    /// context from inside `f`.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.inner.state.lock().session)
    }

    pub fn session_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.with_session(|s| s.get_as(key))
    }

    pub fn session_set<T: serde::Serialize>(&self, key: &str, value: T) -> serde_json::Result<()> {
        self.with_session(|s| s.set(key, value))
    }

    pub fn session_remove(&self, key: &str) -> Option<serde_json::Value> {
        self.with_session(|s| s.remove(key))
    }

    pub(crate) fn session_snapshot(&self) -> serde_json::Map<String, serde_json::Value> {
        self.with_session(|s| s.data().clone())
    }

    // ── Flash ───────────────────────────────────────────────────────────────

    /// Queues a flash message. See [`flash`](crate::flash()).
    pub fn flash(&self, message: impl Into<String>, level: Level) {
        self.inner.state.lock().queued.push(Flash::new(message, level));
    }

    /// Flashes visible to this request: those carried over from the previous
    /// request of this session, then those queued during this one.
    pub fn flashes(&self) -> Vec<Flash> {
        let state = self.inner.state.lock();
        state.incoming.iter().chain(&state.queued).cloned().collect()
    }

    /// Drains every flash, for a render that displays them.
    pub(crate) fn take_flashes(&self) -> Vec<Flash> {
        let mut state = self.inner.state.lock();
        let mut all = std::mem::take(&mut state.incoming);
        all.append(&mut state.queued);
        all
    }

    /// Drains only the flashes queued during this request.
    pub(crate) fn take_queued(&self) -> Vec<Flash> {
        std::mem::take(&mut self.inner.state.lock().queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;

    fn context() -> Context {
        let href = Href::new(Arc::new(Router::new()), None);
        Context::new(1, href, Session::new("s"), vec![Flash::new("old", Level::Info)])
    }

    #[test]
    fn attributes_are_typed() {
        let ctx = context();
        ctx.set("user", String::from("alice"));
        assert_eq!(ctx.get::<String>("user").as_deref(), Some("alice"));
        assert_eq!(ctx.get::<u32>("user"), None);
        assert!(ctx.remove("user"));
        assert!(!ctx.contains("user"));
    }

    #[test]
    fn flashes_list_incoming_first() {
        let ctx = context();
        ctx.flash("new", Level::Error);
        let messages: Vec<_> = ctx.flashes().into_iter().map(|f| f.message).collect();
        assert_eq!(messages, ["old", "new"]);

        assert_eq!(ctx.take_queued().len(), 1);
        assert_eq!(ctx.take_flashes().len(), 1);
        assert!(ctx.flashes().is_empty());
    }

    #[tokio::test]
    async fn current_is_scoped() {
        assert!(Context::current().is_none());
        let ctx = context();
        let id = ctx.scope(async { Context::current().map(|c| c.id()) }).await;
        assert_eq!(id, Some(1));
        assert!(Context::current().is_none());
    }
}
