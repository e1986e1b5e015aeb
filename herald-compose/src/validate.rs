use herald_common::MessagePayload;

use crate::ValidationError;

/// Checks that `payload` has everything delivery needs: a sender address, at
/// least one recipient, a subject and a plain-text body.
///
/// # Errors
///
/// Returns [`ValidationError::MissingFields`] listing every missing field.
pub fn validate(payload: &MessagePayload) -> Result<(), ValidationError> {
    let checks = [
        ("sender", payload.sender.is_empty()),
        (
            "recipients",
            payload.recipients.iter().all(|r| r.trim().is_empty()),
        ),
        ("subject", payload.subject.trim().is_empty()),
        ("body_text", payload.body_text.trim().is_empty()),
    ];

    let missing: Vec<_> = checks
        .into_iter()
        .filter_map(|(field, is_missing)| is_missing.then_some(field))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingFields(missing))
    }
}
