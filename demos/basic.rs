//! Minimal kiri app: named routes, flash-then-redirect, a toy renderer and
//! health checks.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i -c jar -b jar http://localhost:57005/user/alice
//!   curl -i -c jar -b jar -X POST http://localhost:57005/promote/alice
//!   curl -i -c jar -b jar http://localhost:57005/user/alice   # shows the flash once
//!   curl http://localhost:57005/healthz

use std::time::Instant;

use kiri::{
    App, Args, BoxError, Config, Context, Error, Level, Request, Response, Router, Server,
    Template, TemplateContext, expose, flash, health, html, redirect_see_other,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // RUST_LOG wins over the configured level.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let router = Router::new()
        .route(expose("index", index))
        .route(expose("user", user).rule("/user/<username:string>").param("username"))
        .route(
            expose("promote", promote)
                .param("username")
                .methods([http::Method::POST]),
        )
        .route(expose("healthz", health::liveness))
        .route(expose("readyz", health::readiness));

    let server = Server::from_config(&config)?;
    let app = App::builder()
        .config(config)
        .router(router)
        .renderer(render)
        .on_request_setup(|ctx| {
            ctx.set("started", Instant::now());
            Ok(())
        })
        .on_request_teardown(|ctx| {
            if let Some(started) = ctx.get::<Instant>("started") {
                tracing::info!(request = ctx.id(), elapsed = ?started.elapsed(), "done");
            }
            ctx.remove("started");
            Ok(())
        })
        .on_context_setup(|_, data| {
            data.insert("site".into(), "kiri demo".into());
        })
        .build()?;

    server.serve(app).await
}

async fn index(req: Request) -> Result<Response, Error> {
    let alice = req.context().url_for("user", &Args::new().with("username", "alice"))?;
    Ok(Response::text(format!("try {alice}\n")))
}

async fn user(req: Request) -> Template {
    html("user.html").with("username", req.param("username").map(ToString::to_string))
}

// POST /promote/<username> → 303 to the user's page, with a flash waiting.
async fn promote(req: Request) -> Result<Response, Error> {
    let username = req.param("username").map(ToString::to_string).unwrap_or_default();
    flash(format!("{username} is now an admin"), Level::Info);
    let url = current_url_for("user", &Args::new().with("username", username))?;
    Ok(redirect_see_other(&url))
}

/// Resolution through the ambient context, as a helper far from the handler
/// would do it.
fn current_url_for(endpoint: &str, args: &Args) -> Result<String, Error> {
    match Context::current() {
        Some(ctx) => ctx.url_for(endpoint, args),
        None => Err(Error::UnknownEndpoint(endpoint.to_owned())),
    }
}

/// Stand-in for a real template engine: a heading plus the flashes.
fn render(name: &str, data: &TemplateContext) -> Result<String, BoxError> {
    let mut out = format!(
        "<h1>{} : {}</h1>\n",
        data.get("site").and_then(|v| v.as_str()).unwrap_or_default(),
        name
    );
    if let Some(username) = data.get("username").and_then(|v| v.as_str()) {
        out.push_str(&format!("<p>hello {username}</p>\n"));
    }
    for flash in data.get("flashes").and_then(|v| v.as_array()).into_iter().flatten() {
        let message = flash["message"].as_str().unwrap_or_default();
        out.push_str(&format!("<p class=\"flash\">{message}</p>\n"));
    }
    Ok(out)
}
