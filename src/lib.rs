//! # kiri
//!
//! A small request-dispatch layer for small web applications.
//!
//! - **Named routes.** Each route is an endpoint name, a rule such as
//!   `/user/<username>` or `/post/<id:int>`, and a handler. Routes are tried
//!   in registration order and the first match wins.
//! - **Reverse URLs.** Handlers build links from endpoint names with
//!   [`Href`] / [`url_for`], never from literal paths.
//! - **Request scope.** Each request gets a [`Context`]: path parameters, the
//!   session, flash messages and named attributes, reachable from anywhere in
//!   the request's task and from nowhere else.
//! - **Lifecycle hooks.** Setup hooks before the handler, teardown hooks after
//!   it (always), and context-setup hooks before every template render.
//!
//! Templates, session persistence and the HTTP wire are collaborators:
//! bring a [`Renderer`], optionally a [`SessionStore`], and let hyper speak
//! HTTP.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kiri::{App, Args, Json, Level, Request, Router, Server, expose, flash, redirect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kiri::Error> {
//!     let router = Router::new()
//!         .route(expose("index", index))
//!         .route(expose("user", user).rule("/user/<username:string>").param("username"))
//!         .route(expose("promote", promote).param("username"));
//!
//!     let app = App::builder().router(router).build()?;
//!     Server::bind("127.0.0.1:3000")?.serve(app).await
//! }
//!
//! async fn index(_req: Request) -> &'static str {
//!     "hello"
//! }
//!
//! async fn user(req: Request) -> Json<Vec<kiri::Flash>> {
//!     Json(req.context().flashes())
//! }
//!
//! async fn promote(req: Request) -> Result<kiri::Response, kiri::Error> {
//!     let username = req.param("username").and_then(|v| v.as_str()).unwrap_or_default();
//!     flash(format!("{username} promoted"), Level::Info);
//!     let url = req.context().url_for("user", &Args::new().with("username", username))?;
//!     Ok(redirect(&url))
//! }
//! ```

mod app;
mod config;
mod context;
mod csrf;
mod error;
mod flash;
mod handler;
mod hooks;
mod href;
mod params;
mod pattern;
mod render;
mod request;
mod response;
mod router;
mod scope;
mod server;
mod session;
mod statics;

pub mod health;

pub use app::{App, AppBuilder};
pub use config::{Config, DEFAULT_PORT, DEFAULT_SESSION_IDLE_SECS};
pub use context::Context;
pub use csrf::{FIELD as FORM_TOKEN_FIELD, form_token};
pub use error::{BoxError, Error};
pub use flash::{Flash, Level, flash};
pub use handler::Handler;
pub use hooks::{Hooks, Phase, TemplateContext};
pub use href::{Href, url_for};
pub use params::{Args, Params, Value};
pub use pattern::{Kind, Pattern};
pub use render::Renderer;
pub use request::Request;
pub use response::{
    ContentType, IntoReply, Json, PrettyJson, Reply, Response, ResponseBuilder, Template, html,
    redirect, redirect_see_other,
};
pub use router::{Expose, Match, Route, Router, expose};
pub use scope::{Disposition, Scopes};
pub use server::Server;
pub use session::{MemoryStore, Session, SessionStore};
pub use statics::{static_file, static_url};
