//! Message composition for herald.
//!
//! Everything in this crate runs before any network activity and never
//! fails the run on I/O problems: unreadable templates, malformed template
//! data and missing attachment directories are logged and replaced by safe
//! empty values. The only hard failure is [`ValidationError`], raised by
//! [`validate`] once the payload is composed.

pub mod attachments;
mod compose;
mod error;
pub mod render;
mod validate;

pub use attachments::collect as collect_attachments;
pub use compose::compose;
pub use error::ValidationError;
pub use render::{
    PassthroughRenderer, Renderer, TemplateContext, html_to_plain_text, load_template, renderer,
};
#[cfg(feature = "templates")]
pub use render::TemplatingRenderer;
pub use validate::validate;
