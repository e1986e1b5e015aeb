//! Transient/permanent classification of transport failures.

use crate::{FaultCode, TransportError};

/// Whether a failed send is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Likely to succeed on retry.
    Transient,
    /// Will fail the same way again.
    Permanent,
}

impl ErrorClass {
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Classifies a transport failure.
///
/// Transient when the fault is a refused connection, a timeout, a socket
/// failure or a DNS failure, or when the relay answered with a 5xx code.
/// Everything else is permanent.
#[must_use]
pub const fn classify(error: &TransportError) -> ErrorClass {
    let transient_fault = matches!(
        error.code,
        Some(FaultCode::ConnectionRefused | FaultCode::TimedOut | FaultCode::Socket | FaultCode::Dns)
    );
    let server_error = matches!(error.response_code, Some(500..=599));

    if transient_fault || server_error {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(code: Option<FaultCode>, response_code: Option<u16>) -> TransportError {
        TransportError {
            code,
            response_code,
            message: "failure".to_string(),
        }
    }

    #[test]
    fn test_transient_fault_codes() {
        for code in [
            FaultCode::ConnectionRefused,
            FaultCode::TimedOut,
            FaultCode::Socket,
            FaultCode::Dns,
        ] {
            assert_eq!(classify(&error(Some(code), None)), ErrorClass::Transient, "{code}");
        }
    }

    #[test]
    fn test_permanent_fault_codes() {
        for code in [
            FaultCode::Auth,
            FaultCode::Envelope,
            FaultCode::Message,
            FaultCode::Tls,
            FaultCode::Protocol,
        ] {
            assert_eq!(classify(&error(Some(code), None)), ErrorClass::Permanent, "{code}");
        }
    }

    #[test]
    fn test_response_code_range() {
        assert!(classify(&error(None, Some(500))).is_transient());
        assert!(classify(&error(None, Some(503))).is_transient());
        assert!(classify(&error(None, Some(599))).is_transient());
        assert!(!classify(&error(None, Some(499))).is_transient());
        assert!(!classify(&error(None, Some(421))).is_transient());
        assert!(!classify(&error(None, Some(600))).is_transient());
        assert!(!classify(&error(None, None)).is_transient());
    }

    #[test]
    fn test_server_error_overrides_permanent_fault() {
        let rejected = error(Some(FaultCode::Envelope), Some(550));
        assert_eq!(classify(&rejected), ErrorClass::Transient);

        let rejected = error(Some(FaultCode::Envelope), Some(450));
        assert_eq!(classify(&rejected), ErrorClass::Permanent);
    }
}
