//! Delivery of a composed message through an SMTP relay.
//!
//! This crate provides:
//! - The [`Transport`] seam and its SMTP implementation, [`SmtpTransport`]
//! - Classification of transport failures into transient and permanent
//! - The [`RetryPolicy`] and its exponential backoff
//! - Resolution of a scheduled send time into a delay
//! - The [`DeliveryEngine`], which ties these together for a single message

mod classify;
mod engine;
mod error;
pub mod policy;
pub mod schedule;
mod smtp_transaction;
mod transport;
mod types;

pub use classify::{ErrorClass, classify};
pub use engine::{
    AttemptOutcome, DeliveryAttempt, DeliveryEngine, DeliveryOutcome, DeliveryReport,
    EngineState, Preview,
};
pub use error::{DeliveryError, FaultCode, PolicyError, TransportError};
pub use policy::RetryPolicy;
pub use schedule::{planned_send_time, resolve_planned_delay};
pub use smtp_transaction::{
    Credentials, Security, SmtpSettings, SmtpTransport, UnknownSecurityMode,
};
pub use transport::{SendReceipt, Transport};
pub use types::SmtpTimeouts;
