//! The template-renderer collaborator.
//!
//! kiri has no template language. An application that returns
//! [`Template`](crate::Template) replies plugs its engine in through
//! [`Renderer`].

use crate::error::BoxError;
use crate::hooks::TemplateContext;

/// Turns a template name plus data into an HTML document.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, template: &str, context: &TemplateContext) -> Result<String, BoxError>;
}

/// Plain functions and closures are renderers.
impl<F> Renderer for F
where
    F: Fn(&str, &TemplateContext) -> Result<String, BoxError> + Send + Sync + 'static,
{
    fn render(&self, template: &str, context: &TemplateContext) -> Result<String, BoxError> {
        self(template, context)
    }
}
