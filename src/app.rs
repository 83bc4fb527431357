//! The application: route table, hooks and collaborators, and the dispatch
//! state machine that ties them together.
//!
//! One call to [`App::dispatch`] is one request:
//!
//! ```text
//! open ─▶ setup hooks ─▶ form token ─▶ match ─▶ handler ─▶ (render) ─▶ teardown ─▶ close
//!              │              │           │         │          │          ▲
//!              └─ fail ───────┴─ 400 ─────┴─ 404 ───┴─ panic ──┴─ fail ───┘
//! ```
//!
//! Teardown is reached on every path, including cancellation: if the
//! dispatch future is dropped half-way, a guard runs the teardown hooks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use http::header::SET_COOKIE;
use http_body_util::Full;
use serde_json::Value;

use crate::config::Config;
use crate::context::Context;
use crate::csrf;
use crate::error::{BoxError, Error};
use crate::hooks::{Hooks, Phase, TemplateContext, panic_message};
use crate::href::Href;
use crate::render::Renderer;
use crate::request::Request;
use crate::response::{IntoReply, Reply, Response, Template};
use crate::router::Router;
use crate::scope::{Disposition, Scopes};
use crate::session::{MemoryStore, SessionStore};
use crate::statics;

/// A fully assembled application, ready to serve.
pub struct App {
    router: Arc<Router>,
    hooks: Hooks,
    scopes: Scopes,
    renderer: Option<Arc<dyn Renderer>>,
    config: Config,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder {
            router: Router::new(),
            hooks: Hooks::new(),
            store: None,
            renderer: None,
            config: Config::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// A resolver usable outside any request (host: `localhost`).
    pub fn href(&self) -> Href {
        Href::new(Arc::clone(&self.router), None)
    }

    /// Serves one request.
    ///
    /// Never fails: every error is turned into a response here (404, 405,
    /// 500) and logged.
    pub async fn dispatch(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_owned();

        let ctx = self.scopes.open(&parts.headers);
        let teardown = TeardownGuard::new(&self.hooks, ctx.clone());

        let (mut response, disposition) = ctx.scope(self.handle(&ctx, parts, body)).await;

        let failures = teardown.finish();
        if !failures.is_empty() {
            tracing::warn!(
                request = ctx.id(),
                failed = failures.len(),
                "teardown finished with failures"
            );
        }

        let request_id = ctx.id();
        if let Some(cookie) = self.scopes.close(ctx, disposition) {
            response.push_header(SET_COOKIE, cookie);
        }

        tracing::debug!(
            request = request_id,
            %method,
            %path,
            status = response.status.as_u16(),
            "request served"
        );
        response.into_http()
    }

    /// `SettingUp` and `Handling`. Runs with `ctx` as the current context.
    async fn handle(
        &self,
        ctx: &Context,
        parts: http::request::Parts,
        body: Bytes,
    ) -> (Response, Disposition) {
        ctx.enter(Phase::SettingUp);
        if let Err(e) = self.hooks.run_setup(ctx) {
            return (self.server_error(&e), Disposition::Responded);
        }
        if self.config.csrf {
            if let Err(e) = csrf::verify(ctx, &parts, &body) {
                return (e.into_response(), Disposition::Responded);
            }
        }

        ctx.enter(Phase::Handling);
        let matched = match self.router.match_route(&parts.method, parts.uri.path()) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(request = ctx.id(), error = %e, "no route");
                return (e.into_response(), Disposition::Responded);
            }
        };
        ctx.set_match(&matched.endpoint, &matched.params);

        let handler = matched.handler;
        let req = Request::new(parts, body, matched.params, ctx.clone());
        let reply = AssertUnwindSafe(async move { handler.call(req).await })
            .catch_unwind()
            .await;

        match reply {
            Ok(Reply::Response(res)) => (res, Disposition::Responded),
            Ok(Reply::Error(e)) => {
                let res = self.error_response(ctx, &matched.endpoint, e);
                (res, Disposition::Responded)
            }
            Ok(Reply::Template(template)) => match self.render(ctx, template) {
                Ok(res) => (res, Disposition::Rendered),
                Err(e) => {
                    tracing::error!(request = ctx.id(), error = %e, "template render failed");
                    (self.server_error(&e), Disposition::Responded)
                }
            },
            Err(payload) => {
                let message = panic_message(payload);
                tracing::error!(
                    request = ctx.id(),
                    endpoint = %matched.endpoint,
                    %message,
                    "handler panicked"
                );
                (self.server_error(&message), Disposition::Responded)
            }
        }
    }

    /// Builds the template data and renders it.
    ///
    /// Built-in entries go in first, then each context-setup hook, then the
    /// handler's own data, so later layers win on key collisions.
    fn render(&self, ctx: &Context, template: Template) -> Result<Response, Error> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| Error::Render("no template renderer configured".into()))?;

        let mut data = TemplateContext::new();
        if self.config.csrf {
            data.insert("form_token".to_owned(), Value::String(csrf::issue(ctx)));
        }
        data.insert("flashes".to_owned(), serde_json::to_value(ctx.flashes()).unwrap_or_default());
        data.insert("session".to_owned(), Value::Object(ctx.session_snapshot()));
        data.insert("params".to_owned(), serde_json::to_value(ctx.params()).unwrap_or_default());
        data.insert("endpoint".to_owned(), ctx.endpoint().map_or(Value::Null, Value::String));
        data.insert("debug".to_owned(), Value::Bool(self.config.debug));

        self.hooks.run_context_setup(ctx, &mut data)?;
        data.extend(template.data);

        let body = renderer.render(&template.name, &data).map_err(Error::Render)?;
        ctx.take_flashes();
        Ok(Response::html(body))
    }

    /// An error returned by a handler. Server-side ones are logged and get
    /// the debug detail; the rest keep their bare status (and `Allow`).
    fn error_response(&self, ctx: &Context, endpoint: &str, e: Error) -> Response {
        if !e.status().is_server_error() {
            return e.into_response();
        }
        tracing::error!(request = ctx.id(), %endpoint, error = %e, "handler returned an error");
        self.server_error(&e)
    }

    fn server_error(&self, e: &dyn std::fmt::Display) -> Response {
        let detail = self.config.debug.then(|| e.to_string());
        Response::error(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

/// Runs the teardown hooks exactly once: through [`finish`](Self::finish) on
/// the normal path, or on drop if the request was cancelled.
struct TeardownGuard<'a> {
    hooks: &'a Hooks,
    ctx: Option<Context>,
}

impl<'a> TeardownGuard<'a> {
    fn new(hooks: &'a Hooks, ctx: Context) -> Self {
        Self { hooks, ctx: Some(ctx) }
    }

    fn finish(mut self) -> Vec<BoxError> {
        match self.ctx.take() {
            Some(ctx) => ctx.sync_scope(|| self.hooks.run_teardown(&ctx)),
            None => Vec::new(),
        }
    }
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            tracing::warn!(request = ctx.id(), "request cancelled, running teardown");
            ctx.sync_scope(|| self.hooks.run_teardown(&ctx));
            ctx.enter(Phase::TornDown);
        }
    }
}

/// Assembles an [`App`].
pub struct AppBuilder {
    router: Router,
    hooks: Hooks,
    store: Option<Arc<dyn SessionStore>>,
    renderer: Option<Arc<dyn Renderer>>,
    config: Config,
}

impl AppBuilder {
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Defaults to a [`MemoryStore`] that forgets sessions idle for
    /// `Config::session_idle_secs`.
    pub fn session_store(mut self, store: impl SessionStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn on_request_setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_request_setup(hook);
        self
    }

    pub fn on_request_teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_request_teardown(hook);
        self
    }

    pub fn on_context_setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, &mut TemplateContext) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_context_setup(hook);
        self
    }

    /// Finishes registration. Adds the `static` endpoint unless the router
    /// already has one.
    pub fn build(self) -> Result<App, Error> {
        let mut router = self.router;
        if router.get(statics::ENDPOINT).is_none() {
            router.register(statics::route(self.config.static_dir.clone()))?;
        }

        let router = Arc::new(router);
        let idle = self.config.session_idle();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::with_idle_timeout(idle)));
        let scopes = Scopes::new(store, Arc::clone(&router), self.config.cookie_name.clone());

        tracing::debug!(routes = router.len(), "application built");
        Ok(App {
            router,
            hooks: self.hooks,
            scopes,
            renderer: self.renderer,
            config: self.config,
        })
    }
}
