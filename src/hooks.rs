//! Lifecycle hooks and the per-request state machine.
//!
//! ```text
//!   Idle ──open──▶ SettingUp ──all setup hooks ok──▶ Handling ──▶ TornDown
//!                      │                                            ▲
//!                      └──────────── setup hook failed ─────────────┘
//! ```
//!
//! Three ordered lists, invoked in registration order:
//!
//! | List | Runs | On failure |
//! |---|---|---|
//! | request setup | before matching | later hooks and the handler are skipped; 500 |
//! | request teardown | always, last | logged; later teardown hooks still run |
//! | context setup | before a template render | 500 |
//!
//! A setup hook may be skipped when an earlier one fails, so nothing a
//! teardown hook does may assume its setup partner ran. Teardown hooks should
//! remove the context attributes their setup partners added.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{BoxError, Error};

/// Data handed to the template renderer.
pub type TemplateContext = Map<String, Value>;

type RequestHook = Arc<dyn Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static>;
type ContextHook = Arc<dyn Fn(&Context, &mut TemplateContext) + Send + Sync + 'static>;

/// Where a request is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Phase {
    #[default]
    Idle,
    SettingUp,
    Handling,
    TornDown,
}

/// The hook registry. Append-only; there is no removal.
#[derive(Clone, Default)]
pub struct Hooks {
    setup: Vec<RequestHook>,
    teardown: Vec<RequestHook>,
    context: Vec<ContextHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request_setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.setup.push(Arc::new(hook));
        self
    }

    pub fn on_request_teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.teardown.push(Arc::new(hook));
        self
    }

    /// Registers a hook that populates template data before every render.
    pub fn on_context_setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, &mut TemplateContext) + Send + Sync + 'static,
    {
        self.context.push(Arc::new(hook));
        self
    }

    /// Runs setup hooks in order, stopping at the first failure.
    pub(crate) fn run_setup(&self, ctx: &Context) -> Result<(), Error> {
        for (index, hook) in self.setup.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook(ctx)))
                .unwrap_or_else(|payload| Err(panic_message(payload).into()));
            if let Err(e) = outcome {
                tracing::error!(
                    request = ctx.id(),
                    hook = index,
                    error = %e,
                    "request setup hook failed"
                );
                return Err(Error::Hook(e));
            }
        }
        Ok(())
    }

    /// Runs every teardown hook in order and returns the failures.
    pub(crate) fn run_teardown(&self, ctx: &Context) -> Vec<BoxError> {
        let mut failures = Vec::new();
        for (index, hook) in self.teardown.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook(ctx)))
                .unwrap_or_else(|payload| Err(panic_message(payload).into()));
            if let Err(e) = outcome {
                tracing::error!(
                    request = ctx.id(),
                    hook = index,
                    error = %e,
                    "request teardown hook failed"
                );
                failures.push(e);
            }
        }
        failures
    }

    pub(crate) fn run_context_setup(
        &self,
        ctx: &Context,
        data: &mut TemplateContext,
    ) -> Result<(), Error> {
        for hook in &self.context {
            catch_unwind(AssertUnwindSafe(|| hook(ctx, data)))
                .map_err(|payload| Error::Render(panic_message(payload).into()))?;
        }
        Ok(())
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_owned()
    }
}
