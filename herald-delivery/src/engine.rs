//! The delivery engine: dry-run preview, the scheduled wait, and the bounded
//! retry loop around a [`Transport`].

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use herald_common::{
    MessagePayload, internal,
    tracing::{error, info, warn},
};

use crate::{
    DeliveryError, ErrorClass, RetryPolicy, SendReceipt, Transport, TransportError, classify,
    planned_send_time,
};

/// Where a delivery run currently is.
///
/// `Idle → (DryRun | Waiting) → Sending → (Succeeded | Exhausted)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    DryRun,
    Waiting,
    Sending,
    Succeeded,
    Exhausted,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::DryRun => "dry-run",
            Self::Waiting => "waiting",
            Self::Sending => "sending",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
        })
    }
}

/// How one send attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded {
        receipt: SendReceipt,
    },
    Failed {
        class: ErrorClass,
        error: TransportError,
        /// The backoff before the next attempt, or `None` if this was the
        /// last one.
        retry_in: Option<Duration>,
    },
}

/// One call to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    /// 1-based.
    pub number: u32,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

/// What a dry run would have sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// The payload, pretty-printed as JSON.
    pub payload_json: String,
    /// Set when the send was scheduled for later.
    pub would_send_at: Option<DateTime<Utc>>,
}

impl Preview {
    fn new(payload: &MessagePayload, now: DateTime<Utc>, planned_delay_ms: u64) -> Self {
        let payload_json = serde_json::to_string_pretty(payload).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to render payload preview");
            String::new()
        });

        Self {
            payload_json,
            would_send_at: (planned_delay_ms > 0)
                .then(|| planned_send_time(now, planned_delay_ms)),
        }
    }
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload_json)?;
        if let Some(at) = self.would_send_at {
            write!(f, "\nWould send at {}", at.to_rfc3339())?;
        }
        Ok(())
    }
}

/// A successful send and the attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub receipt: SendReceipt,
    pub attempts: Vec<DeliveryAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent(DeliveryReport),
    DryRun(Preview),
}

/// Sends a single validated payload, retrying transient failures.
pub struct DeliveryEngine {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `payload`, or describe it when `dry_run` is set.
    ///
    /// A positive `planned_delay_ms` is waited out once, before the first
    /// attempt. Backoff between attempts follows the [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Exhausted`] when an attempt fails permanently
    /// or the last allowed retry fails.
    pub async fn deliver(
        &self,
        payload: &MessagePayload,
        dry_run: bool,
        planned_delay_ms: u64,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let mut state = EngineState::Idle;

        if dry_run {
            transition(&mut state, EngineState::DryRun);
            let preview = Preview::new(payload, Utc::now(), planned_delay_ms);
            info!(
                would_send_at = ?preview.would_send_at,
                "Dry run, not sending:\n{}",
                preview.payload_json
            );
            return Ok(DeliveryOutcome::DryRun(preview));
        }

        if planned_delay_ms > 0 {
            transition(&mut state, EngineState::Waiting);
            info!(
                delay_ms = planned_delay_ms,
                send_at = %planned_send_time(Utc::now(), planned_delay_ms).to_rfc3339(),
                "Waiting until the scheduled send time"
            );
            tokio::time::sleep(Duration::from_millis(planned_delay_ms)).await;
        }

        transition(&mut state, EngineState::Sending);
        let mut attempts = Vec::new();
        let mut attempt: u32 = 1;

        loop {
            match self.transport.send(payload).await {
                Ok(receipt) => {
                    attempts.push(DeliveryAttempt {
                        number: attempt,
                        outcome: AttemptOutcome::Succeeded {
                            receipt: receipt.clone(),
                        },
                        at: Utc::now(),
                    });

                    transition(&mut state, EngineState::Succeeded);
                    info!(
                        id = %receipt.id,
                        attempts = attempt,
                        response = %receipt.response,
                        "Message sent"
                    );
                    return Ok(DeliveryOutcome::Sent(DeliveryReport { receipt, attempts }));
                }
                Err(failure) => {
                    let class = classify(&failure);
                    let will_retry = self.policy.should_retry(class, attempt);
                    let retry_in = will_retry.then(|| self.policy.backoff(attempt));

                    warn!(
                        attempt,
                        class = ?class,
                        will_retry,
                        backoff = ?retry_in,
                        error = %failure,
                        "Send attempt failed"
                    );

                    attempts.push(DeliveryAttempt {
                        number: attempt,
                        outcome: AttemptOutcome::Failed {
                            class,
                            error: failure.clone(),
                            retry_in,
                        },
                        at: Utc::now(),
                    });

                    let Some(backoff) = retry_in else {
                        transition(&mut state, EngineState::Exhausted);
                        error!(
                            attempts = attempts.len(),
                            error = %failure,
                            "Delivery failed"
                        );
                        return Err(DeliveryError::Exhausted {
                            attempts,
                            last: failure,
                        });
                    };

                    tokio::time::sleep(backoff).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

fn transition(state: &mut EngineState, next: EngineState) {
    internal!(level = DEBUG, "Delivery state {state} -> {next}");
    *state = next;
}
