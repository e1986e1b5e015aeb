//! Typed error handling for delivery operations.
//!
//! A failed send surfaces as a [`TransportError`], a flat record carrying an
//! optional fault code and an optional SMTP reply code. The engine classifies
//! it (see [`crate::classify`]) and, once no retry is left, wraps the last
//! one in [`DeliveryError::Exhausted`].

use std::{fmt, io};

use herald_smtp::client::ClientError;
use thiserror::Error;

use crate::DeliveryAttempt;

/// Connection-level fault reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCode {
    /// The relay actively refused the TCP connection.
    ConnectionRefused,
    /// Connecting, or waiting for a reply, took too long.
    TimedOut,
    /// The socket failed or closed mid-session.
    Socket,
    /// The relay host name could not be resolved.
    Dns,
    /// The relay rejected our credentials, or no common mechanism exists.
    Auth,
    /// The relay rejected the sender or a recipient.
    Envelope,
    /// The message could not be built or was rejected after DATA.
    Message,
    /// TLS negotiation failed.
    Tls,
    /// The relay spoke something we could not follow.
    Protocol,
}

impl FaultCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::TimedOut => "ETIMEDOUT",
            Self::Socket => "ESOCKET",
            Self::Dns => "EDNS",
            Self::Auth => "EAUTH",
            Self::Envelope => "EENVELOPE",
            Self::Message => "EMESSAGE",
            Self::Tls => "ETLS",
            Self::Protocol => "EPROTOCOL",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed send, as reported by a [`crate::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", fault_prefix(.code.as_ref(), .response_code.as_ref()))]
pub struct TransportError {
    pub code: Option<FaultCode>,
    pub response_code: Option<u16>,
    pub message: String,
}

/// `[CODE REPLY] `, `[CODE] `, `[REPLY] ` or nothing.
fn fault_prefix(code: Option<&FaultCode>, reply: Option<&u16>) -> String {
    match (code, reply) {
        (Some(code), Some(reply)) => format!("[{code} {reply}] "),
        (Some(code), None) => format!("[{code}] "),
        (None, Some(reply)) => format!("[{reply}] "),
        (None, None) => String::new(),
    }
}

impl TransportError {
    #[must_use]
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            response_code: None,
            message: message.into(),
        }
    }

    /// A relay reply that was not what the transaction step expected.
    #[must_use]
    pub fn rejected(code: FaultCode, response_code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            response_code: Some(response_code),
            message: message.into(),
        }
    }
}

/// Map SMTP client errors onto transport faults.
///
/// - refused / timed-out I/O → the matching fault
/// - any other I/O or a dropped connection → `Socket`
/// - TLS → `Tls`, builder → `Message`
impl From<ClientError> for TransportError {
    fn from(error: ClientError) -> Self {
        let message = error.to_string();

        match error {
            ClientError::Io(e) => match e.kind() {
                io::ErrorKind::ConnectionRefused => Self::new(FaultCode::ConnectionRefused, message),
                io::ErrorKind::TimedOut => Self::new(FaultCode::TimedOut, message),
                _ => Self::new(FaultCode::Socket, message),
            },
            ClientError::ConnectionClosed => Self::new(FaultCode::Socket, message),
            ClientError::TlsError(_) => Self::new(FaultCode::Tls, message),
            ClientError::BuilderError(_) => Self::new(FaultCode::Message, message),
            ClientError::ParseError(_) | ClientError::Utf8Error(_) => {
                Self::new(FaultCode::Protocol, message)
            }
        }
    }
}

/// The terminal failure of a delivery run.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport failed permanently, or every allowed retry failed.
    #[error("Delivery failed after {} attempt(s): {last}", .attempts.len())]
    Exhausted {
        attempts: Vec<DeliveryAttempt>,
        #[source]
        last: TransportError,
    },
}

impl DeliveryError {
    /// The error reported by the final attempt.
    #[must_use]
    pub const fn last_error(&self) -> &TransportError {
        match self {
            Self::Exhausted { last, .. } => last,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> &[DeliveryAttempt] {
        match self {
            Self::Exhausted { attempts, .. } => attempts,
        }
    }
}

/// A retry policy that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Base retry delay must be a positive number of milliseconds")]
    ZeroBaseDelay,
}
