//! Types shared by every stage of the herald pipeline.
//!
//! The [`MessagePayload`] is the single unit of work: it is composed once,
//! validated once and then handed read-only to the delivery engine.

pub mod logging;
pub mod payload;

pub use payload::{AttachmentDescriptor, Mailbox, MessagePayload, Overrides};
pub use tracing;
