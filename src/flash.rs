//! One-time notifications carried to the next rendered page.

use serde::{Deserialize, Serialize};

use crate::context::Context;

/// Session key under which undelivered flashes wait for the next request.
pub(crate) const SESSION_KEY: &str = "_flashes";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    pub message: String,
    pub level: Level,
}

impl Flash {
    pub fn new(message: impl Into<String>, level: Level) -> Self {
        Self { message: message.into(), level }
    }
}

/// Queues a flash message on the current request.
///
/// If the handler renders a template, the message is shown by that render.
/// Otherwise (typically a redirect) it is stored in the session and shown by
/// the next request. Outside a request there is nothing to attach it to; the
/// message is logged and discarded.
pub fn flash(message: impl Into<String>, level: Level) {
    let message = message.into();
    match Context::current() {
        Some(ctx) => ctx.flash(message, level),
        None => tracing::warn!(%message, "flash() called outside a request"),
    }
}
