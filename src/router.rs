//! The route table.
//!
//! Routes live in one ordered list and are tried in registration order; the
//! first one that matches wins. Register specific patterns before general
//! ones:
//!
//! ```rust
//! use kiri::{Request, Router, expose};
//! # async fn me(_: Request) -> &'static str { "" }
//! # async fn user(_: Request) -> &'static str { "" }
//! let router = Router::new()
//!     .route(expose("me", me).rule("/user/me"))
//!     .route(expose("user", user).rule("/user/<username>").param("username"));
//! ```
//!
//! Nothing here is locked. The table is built before serving and is only
//! read afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use url::form_urlencoded;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::params::{Args, Params};
use crate::pattern::{Pattern, normalize};

/// The endpoint whose rule is derived as `/` rather than `/index`.
const INDEX: &str = "index";

/// A registration request: endpoint name, handler and what is known about
/// the handler's parameters.
///
/// Created with [`expose`]. Without an explicit [`rule`](Expose::rule) the
/// path is `/` + the endpoint name (`index` becomes `/`), followed by one
/// string placeholder per required parameter.
pub struct Expose {
    endpoint: String,
    rule: Option<String>,
    required: Vec<String>,
    optional: Vec<String>,
    methods: Option<Vec<Method>>,
    build_only: bool,
    handler: Option<BoxedHandler>,
}

/// Starts a registration for `handler` under `endpoint`.
pub fn expose(endpoint: &str, handler: impl Handler) -> Expose {
    Expose {
        endpoint: endpoint.to_owned(),
        rule: None,
        required: Vec::new(),
        optional: Vec::new(),
        methods: None,
        build_only: false,
        handler: Some(handler.into_boxed_handler()),
    }
}

impl Expose {
    /// A route that is only ever used to build URLs, never matched.
    pub fn build_only(endpoint: &str, rule: &str) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            rule: Some(rule.to_owned()),
            required: Vec::new(),
            optional: Vec::new(),
            methods: None,
            build_only: true,
            handler: None,
        }
    }

    pub fn rule(mut self, rule: &str) -> Self {
        self.rule = Some(rule.to_owned());
        self
    }

    /// Declares a required handler parameter. It must appear in the rule.
    pub fn param(mut self, name: &str) -> Self {
        self.required.push(name.to_owned());
        self
    }

    /// Declares a parameter with a default. It may appear in the rule.
    pub fn optional(mut self, name: &str) -> Self {
        self.optional.push(name.to_owned());
        self
    }

    /// Restricts the route to `methods`. Unrestricted routes accept any.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    fn default_rule(&self) -> String {
        let mut rule = if self.endpoint == INDEX {
            String::new()
        } else {
            format!("/{}", self.endpoint)
        };
        for name in &self.required {
            rule.push_str(&format!("/<{name}>"));
        }
        if rule.is_empty() { "/".to_owned() } else { rule }
    }
}

/// A registered route.
pub struct Route {
    endpoint: String,
    pattern: Pattern,
    methods: Option<Vec<Method>>,
    handler: Option<BoxedHandler>,
}

impl Route {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn is_build_only(&self) -> bool {
        self.handler.is_none()
    }

    fn allows(&self, method: &Method) -> bool {
        match &self.methods {
            None => true,
            Some(list) => {
                list.contains(method) || (*method == Method::HEAD && list.contains(&Method::GET))
            }
        }
    }
}

/// The outcome of a successful match.
pub struct Match {
    pub(crate) endpoint: String,
    pub(crate) handler: BoxedHandler,
    pub params: Params,
}

impl Match {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// The application's route table.
pub struct Router {
    routes: Vec<Route>,
    by_endpoint: HashMap<String, usize>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new(), by_endpoint: HashMap::new() }
    }

    /// Registers a route, returning `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate endpoint or a malformed rule. Use
    /// [`register`](Router::register) to handle these yourself.
    pub fn route(mut self, expose: Expose) -> Self {
        if let Err(e) = self.register(expose) {
            panic!("invalid route: {e}");
        }
        self
    }

    /// Registers a route. On error the table is left unchanged.
    pub fn register(&mut self, expose: Expose) -> Result<(), Error> {
        if self.by_endpoint.contains_key(&expose.endpoint) {
            return Err(Error::DuplicateEndpoint(expose.endpoint));
        }

        let rule = expose.rule.clone().unwrap_or_else(|| expose.default_rule());
        let pattern = Pattern::parse(&rule)?;
        if !expose.build_only {
            check_params(&pattern, &expose.required, &expose.optional)?;
        }

        tracing::debug!(endpoint = %expose.endpoint, rule = %pattern, "route registered");
        self.by_endpoint.insert(expose.endpoint.clone(), self.routes.len());
        self.routes.push(Route {
            endpoint: expose.endpoint,
            pattern,
            methods: expose.methods,
            handler: expose.handler,
        });
        Ok(())
    }

    /// Looks up a route by endpoint name.
    pub fn get(&self, endpoint: &str) -> Option<&Route> {
        self.by_endpoint.get(endpoint).map(|&i| &self.routes[i])
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the first route matching `method` and `path`.
    ///
    /// Returns `NotFound` when no pattern matches the path and
    /// `MethodNotAllowed` when patterns match but none admit `method`.
    pub fn match_route(&self, method: &Method, path: &str) -> Result<Match, Error> {
        let path = normalize(path);
        let mut allowed: Vec<Method> = Vec::new();
        let mut path_matched = false;

        for route in &self.routes {
            let Some(handler) = &route.handler else { continue };
            let Some(params) = route.pattern.matches(path) else { continue };

            if route.allows(method) {
                return Ok(Match {
                    endpoint: route.endpoint.clone(),
                    handler: Arc::clone(handler),
                    params,
                });
            }
            path_matched = true;
            for m in route.methods.iter().flatten() {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if path_matched {
            Err(Error::MethodNotAllowed {
                method: method.clone(),
                path: path.to_owned(),
                allowed,
            })
        } else {
            Err(Error::NotFound(path.to_owned()))
        }
    }

    /// Builds the URL of `endpoint`.
    ///
    /// Arguments naming placeholders fill the path; the rest are appended as
    /// a query string, in the order they were given.
    pub fn resolve(&self, endpoint: &str, args: &Args) -> Result<String, Error> {
        let route = self
            .get(endpoint)
            .ok_or_else(|| Error::UnknownEndpoint(endpoint.to_owned()))?;

        let mut url = route.pattern.build(endpoint, args)?;

        let placeholders: Vec<&str> = route.pattern.placeholders().collect();
        let mut extras = args.iter().filter(|(k, _)| !placeholders.contains(k)).peekable();
        if extras.peek().is_some() {
            let mut query = form_urlencoded::Serializer::new(String::new());
            for (k, v) in extras {
                query.append_pair(k, &v.to_string());
            }
            url.push('?');
            url.push_str(&query.finish());
        }
        Ok(url)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Placeholders must be exactly the required parameters, plus any subset of
/// the defaulted ones.
fn check_params(pattern: &Pattern, required: &[String], optional: &[String]) -> Result<(), Error> {
    let placeholders: Vec<&str> = pattern.placeholders().collect();

    for name in required {
        if !placeholders.contains(&name.as_str()) {
            return Err(Error::malformed(
                pattern.as_str(),
                format!("handler parameter `{name}` has no placeholder"),
            ));
        }
    }
    for name in &placeholders {
        if !required.iter().chain(optional).any(|p| p == name) {
            return Err(Error::malformed(
                pattern.as_str(),
                format!("placeholder `{name}` is not a handler parameter"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Value;
    use crate::request::Request;

    async fn noop(_: Request) -> &'static str { "" }

    fn endpoint_of(router: &Router, method: Method, path: &str) -> Result<String, Error> {
        router.match_route(&method, path).map(|m| m.endpoint)
    }

    #[test]
    fn user_scenario() {
        let router = Router::new()
            .route(expose("user", noop).rule("/user/<username:string>").param("username"));

        let url = router.resolve("user", &Args::new().with("username", "foo")).unwrap();
        assert_eq!(url, "/user/foo");

        let m = router.match_route(&Method::GET, "/user/foo").unwrap();
        assert_eq!(m.endpoint(), "user");
        assert_eq!(m.params, Params::new().with("username", "foo"));

        assert!(matches!(router.match_route(&Method::GET, "/user/"), Err(Error::NotFound(_))));
    }

    #[test]
    fn first_registered_wins() {
        let router = Router::new()
            .route(expose("me", noop).rule("/user/me"))
            .route(expose("user", noop).rule("/user/<name>").param("name"));
        assert_eq!(endpoint_of(&router, Method::GET, "/user/me").unwrap(), "me");
        assert_eq!(endpoint_of(&router, Method::GET, "/user/bob").unwrap(), "user");

        let reversed = Router::new()
            .route(expose("user", noop).rule("/user/<name>").param("name"))
            .route(expose("me", noop).rule("/user/me"));
        assert_eq!(endpoint_of(&reversed, Method::GET, "/user/me").unwrap(), "user");
    }

    #[test]
    fn duplicate_endpoint_leaves_table_unchanged() {
        let mut router = Router::new();
        router.register(expose("a", noop).rule("/a")).unwrap();

        let err = router.register(expose("a", noop).rule("/b")).unwrap_err();
        assert!(matches!(err, Error::DuplicateEndpoint(name) if name == "a"));
        assert_eq!(router.len(), 1);
        assert_eq!(router.get("a").unwrap().pattern().as_str(), "/a");
        assert!(router.match_route(&Method::GET, "/b").is_err());
    }

    #[test]
    fn malformed_rule_leaves_table_unchanged() {
        let mut router = Router::new();
        let err = router.register(expose("a", noop).rule("/a/<id>")).unwrap_err();
        assert!(matches!(err, Error::MalformedPattern { .. }));
        assert!(router.is_empty());
    }

    #[test]
    fn required_params_need_placeholders() {
        let mut router = Router::new();
        let err = router.register(expose("a", noop).rule("/a").param("id")).unwrap_err();
        assert!(matches!(err, Error::MalformedPattern { .. }));
    }

    #[test]
    fn defaulted_params_are_optional_placeholders() {
        let mut router = Router::new();
        router.register(expose("list", noop).rule("/list").optional("page")).unwrap();
        router.register(expose("paged", noop).rule("/list/<page:int>").optional("page")).unwrap();
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn default_rules() {
        let router = Router::new()
            .route(expose("index", noop))
            .route(expose("about", noop))
            .route(expose("view", noop).param("username").optional("tab"));

        assert_eq!(router.get("index").unwrap().pattern().as_str(), "/");
        assert_eq!(router.get("about").unwrap().pattern().as_str(), "/about");
        assert_eq!(router.get("view").unwrap().pattern().as_str(), "/view/<username>");
    }

    #[test]
    fn extra_args_become_query_in_order() {
        let router = Router::new().route(expose("test", noop).rule("/test/<token>").param("token"));
        let args = Args::new().with("token", "foo").with("q", 10).with("a", "x y");
        assert_eq!(router.resolve("test", &args).unwrap(), "/test/foo?q=10&a=x+y");
    }

    #[test]
    fn resolve_errors() {
        let router = Router::new().route(expose("post", noop).rule("/post/<id:int>").param("id"));
        assert!(matches!(router.resolve("nope", &Args::new()), Err(Error::UnknownEndpoint(_))));
        assert!(matches!(
            router.resolve("post", &Args::new()),
            Err(Error::MissingParameter { .. })
        ));
        assert!(matches!(
            router.resolve("post", &Args::new().with("id", "abc")),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn resolve_then_match_round_trips() {
        let router = Router::new()
            .route(expose("post", noop).rule("/blog/<slug>/<id:int>").param("slug").param("id"));

        for (slug, id) in [("hello", 1_i64), ("a b/c", 42), ("ünï", 0)] {
            let args = Args::new().with("slug", slug).with("id", id);
            let url = router.resolve("post", &args).unwrap();
            let m = router.match_route(&Method::GET, &url).unwrap();
            assert_eq!(m.endpoint(), "post");
            assert_eq!(m.params.get("slug"), Some(&Value::from(slug)));
            assert_eq!(m.params.get("id"), Some(&Value::Int(id)));
        }
    }

    #[test]
    fn method_restrictions() {
        let router = Router::new()
            .route(expose("show", noop).rule("/item").methods([Method::GET]))
            .route(expose("save", noop).rule("/item").methods([Method::POST]));

        assert_eq!(endpoint_of(&router, Method::POST, "/item").unwrap(), "save");
        assert_eq!(endpoint_of(&router, Method::HEAD, "/item").unwrap(), "show");
        match router.match_route(&Method::DELETE, "/item") {
            Err(Error::MethodNotAllowed { allowed, .. }) => {
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            _ => panic!("expected MethodNotAllowed"),
        }
    }

    #[test]
    fn build_only_routes_never_match() {
        let router = Router::new().route(Expose::build_only("static", "/static/<file>"));
        assert_eq!(
            router.resolve("static", &Args::new().with("file", "app.css")).unwrap(),
            "/static/app.css"
        );
        assert!(matches!(
            router.match_route(&Method::GET, "/static/app.css"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn one_handler_many_endpoints() {
        let router = Router::new()
            .route(expose("home", noop).rule("/home"))
            .route(expose("start", noop).rule("/start"));
        assert_eq!(endpoint_of(&router, Method::GET, "/home").unwrap(), "home");
        assert_eq!(endpoint_of(&router, Method::GET, "/start").unwrap(), "start");
    }
}
