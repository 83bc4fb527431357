//! Form tokens against cross-site request forgery.
//!
//! With [`Config::csrf`](crate::Config::csrf) on, every session carries a
//! random token. Rendered templates receive it as `form_token`, forms send
//! it back in the `__FORM_TOKEN` field, and a `POST` whose field does not
//! match the session's token is answered `400 Bad Request` before routing.
//!
//! ```text
//! <form method="post">
//!   <input type="hidden" name="__FORM_TOKEN" value="{{ form_token }}">
//! </form>
//! ```

use http::Method;
use http::request::Parts;
use url::form_urlencoded;
use uuid::Uuid;

use crate::context::Context;
use crate::error::Error;
use crate::request::is_urlencoded;

/// Form field that carries the token.
pub const FIELD: &str = "__FORM_TOKEN";

pub(crate) const SESSION_KEY: &str = "_form_token";

/// The current request's form token, for handlers that write forms without
/// a template. `None` outside a request.
pub fn form_token() -> Option<String> {
    Context::current().map(|ctx| issue(&ctx))
}

/// The session's token, created on first use.
pub(crate) fn issue(ctx: &Context) -> String {
    ctx.with_session(|s| match s.get_as::<String>(SESSION_KEY) {
        Some(token) => token,
        None => {
            let token = Uuid::new_v4().simple().to_string();
            s.insert(SESSION_KEY, token.clone().into());
            token
        }
    })
}

/// Checks a `POST` against the session's token. Other methods pass.
pub(crate) fn verify(ctx: &Context, parts: &Parts, body: &[u8]) -> Result<(), Error> {
    if parts.method != Method::POST {
        return Ok(());
    }

    let expected = ctx.session_get::<String>(SESSION_KEY);
    let sent = submitted(parts, body);
    match (&expected, &sent) {
        (Some(expected), Some(sent)) if expected == sent => Ok(()),
        _ => {
            tracing::warn!(
                request = ctx.id(),
                path = %parts.uri.path(),
                has_session_token = expected.is_some(),
                has_form_token = sent.is_some(),
                "rejecting post with invalid form token"
            );
            Err(Error::InvalidFormToken)
        }
    }
}

fn submitted(parts: &Parts, body: &[u8]) -> Option<String> {
    if !is_urlencoded(&parts.headers) {
        return None;
    }
    form_urlencoded::parse(body)
        .find(|(k, _)| k == FIELD)
        .map(|(_, v)| v.into_owned())
}
