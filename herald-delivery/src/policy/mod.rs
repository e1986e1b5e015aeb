//! Policy abstractions for delivery operations.
//!
//! - [`RetryPolicy`]: how many times a transient failure is retried and how
//!   long to back off between attempts

pub mod retry;

pub use retry::RetryPolicy;
