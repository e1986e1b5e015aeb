//! SMTP client for submitting a single message to a relay.
//!
//! This module provides:
//!
//! - Plain TCP, implicit TLS and STARTTLS connections
//! - AUTH PLAIN and AUTH LOGIN
//! - Response parsing with capability inspection
//! - A MIME [`MessageBuilder`] for text, HTML and attachments
//!
//! # Examples
//!
//! ```no_run
//! use herald_smtp::client::{MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("127.0.0.1:2525", "mail.example.com".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.mail_from("sender@example.com").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//!
//! let message = MessageBuilder::new()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Hello")
//!     .text("Hello World")
//!     .build()?;
//! let response = client.send_data(&message.content).await?;
//! assert!(response.is_success());
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::{Attachment, BuiltMessage, MessageBuilder, check_address};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
