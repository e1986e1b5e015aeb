//! herald: compose one email notification and deliver it through an SMTP
//! relay, retrying transient failures.
//!
//! The pipeline runs once per process:
//! render template → collect attachments → compose → validate → resolve the
//! send time → deliver.

pub mod config;

use std::{process::ExitCode, sync::Arc};

use chrono::Utc;
use herald_common::{MessagePayload, internal};
use herald_compose::{
    TemplateContext, ValidationError, collect_attachments, compose, load_template, renderer,
    validate,
};
use herald_delivery::{
    DeliveryEngine, DeliveryError, DeliveryOutcome, SmtpTransport, Transport,
    resolve_planned_delay,
};
use thiserror::Error;

pub use config::{Cli, ConfigError, FileConfig, Settings};

/// Why a run did not deliver its message.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    InvalidPayload(#[from] ValidationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl RunError {
    /// Both failure classes end the process with status 1.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidPayload(_) | Self::Delivery(_) => ExitCode::FAILURE,
        }
    }
}

/// Exit status for a configuration problem.
pub const CONFIG_ERROR_EXIT: u8 = 2;

/// Builds the payload from the configured defaults, template, attachments
/// and overrides.
#[must_use]
pub fn compose_payload(settings: &Settings) -> MessagePayload {
    let template_html = load_template(settings.template.as_deref()).map(|source| {
        let context = TemplateContext::load(settings.template_data.as_deref());
        renderer().render(&source, &context)
    });

    let attachments = collect_attachments(settings.attachments_dir.as_deref());
    internal!(
        level = DEBUG,
        "Collected {} attachment(s), template: {}",
        attachments.len(),
        template_html.is_some()
    );

    compose(
        settings.base_payload().with_attachments(attachments),
        template_html.as_deref(),
        &settings.overrides,
    )
}

/// The SMTP transport for the configured relay.
#[must_use]
pub fn smtp_transport(settings: &Settings) -> Arc<dyn Transport> {
    Arc::new(SmtpTransport::new(settings.smtp.clone()))
}

/// Compose, validate and deliver one message through `transport`.
///
/// # Errors
///
/// Returns [`RunError::InvalidPayload`] before any wait or network activity
/// if the composed payload is incomplete, and [`RunError::Delivery`] once
/// delivery has failed for good.
pub async fn run(
    settings: &Settings,
    transport: Arc<dyn Transport>,
) -> Result<DeliveryOutcome, RunError> {
    let payload = compose_payload(settings);
    validate(&payload)?;

    let planned_delay_ms = resolve_planned_delay(
        Utc::now(),
        settings.send_at.as_deref(),
        settings.delay_ms.as_deref(),
    );

    let engine = DeliveryEngine::new(transport, settings.retry);
    Ok(engine
        .deliver(&payload, settings.dry_run, planned_delay_ms)
        .await?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use herald_common::{AttachmentDescriptor, Mailbox, Overrides};
    use herald_delivery::{
        FaultCode, RetryPolicy, SendReceipt, SmtpSettings, SmtpTimeouts, TransportError,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<MessagePayload>>,
        fail_with: Option<TransportError>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, payload: &MessagePayload) -> Result<SendReceipt, TransportError> {
            self.sent.lock().push(payload.clone());
            self.fail_with.clone().map_or_else(
                || {
                    Ok(SendReceipt {
                        id: "id@example.com".to_string(),
                        response: "OK".to_string(),
                    })
                },
                Err,
            )
        }
    }

    fn settings() -> Settings {
        Settings {
            sender: Mailbox::new("herald", "ruby@example.com"),
            recipients: vec!["to@example.com".to_string()],
            cc_recipients: Vec::new(),
            bcc_recipients: Vec::new(),
            overrides: Overrides::default(),
            template: None,
            template_data: None,
            attachments_dir: None,
            retry: RetryPolicy::default(),
            dry_run: false,
            send_at: None,
            delay_ms: None,
            smtp: SmtpSettings {
                host: "localhost".to_string(),
                port: 2525,
                security: herald_delivery::Security::Plain,
                credentials: None,
                helo_name: "localhost".to_string(),
                accept_invalid_certs: false,
                timeouts: SmtpTimeouts::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_sends_default_content() {
        let transport = Arc::new(RecordingTransport::default());

        let outcome = run(&settings(), transport.clone()).await.unwrap();

        assert!(matches!(outcome, DeliveryOutcome::Sent(_)));
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hello ✔");
        assert_eq!(sent[0].body_text, "Hello world?");
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let mut settings = settings();
        settings.recipients.clear();
        settings.sender.address.clear();

        let error = run(&settings, transport.clone()).await.unwrap_err();

        let RunError::InvalidPayload(invalid) = &error else {
            panic!("expected an invalid payload, got {error:?}");
        };
        assert_eq!(invalid.missing_fields(), &["sender", "recipients"]);
        assert_eq!(error.exit_code(), ExitCode::FAILURE);
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_skips_scheduled_wait() {
        let transport = Arc::new(RecordingTransport::default());
        let mut settings = settings();
        settings.recipients.clear();
        settings.delay_ms = Some("60000".to_string());
        let start = tokio::time::Instant::now();

        let error = run(&settings, transport.clone()).await.unwrap_err();

        assert!(matches!(error, RunError::InvalidPayload(_)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_template_and_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("report.html");
        std::fs::write(&template, "<p>Hi {{ name }}</p>").unwrap();
        let attachments = dir.path().join("files");
        std::fs::create_dir(&attachments).unwrap();
        std::fs::write(attachments.join("report.csv"), "a,b").unwrap();

        let mut settings = settings();
        settings.template = Some(template);
        settings.template_data = Some(r#"{"name": "Ruby"}"#.to_string());
        settings.attachments_dir = Some(attachments.clone());
        settings.overrides.subject = Some("Report".to_string());

        let payload = compose_payload(&settings);

        assert_eq!(payload.subject, "Report");
        assert_eq!(payload.body_html.as_deref(), Some("<p>Hi Ruby</p>"));
        assert_eq!(payload.body_text, "Hi Ruby");
        assert_eq!(
            payload.attachments,
            vec![AttachmentDescriptor {
                filename: "report.csv".to_string(),
                content_locator: attachments.join("report.csv"),
            }]
        );
    }

    #[tokio::test]
    async fn test_dry_run_skips_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let mut settings = settings();
        settings.dry_run = true;
        settings.delay_ms = Some("60000".to_string());

        let outcome = run(&settings, transport.clone()).await.unwrap();

        let DeliveryOutcome::DryRun(preview) = outcome else {
            panic!("expected a dry run");
        };
        assert!(preview.would_send_at.is_some());
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_delivery() {
        let transport = Arc::new(RecordingTransport {
            fail_with: Some(TransportError::new(FaultCode::Socket, "reset")),
            ..RecordingTransport::default()
        });
        let mut settings = settings();
        settings.retry = RetryPolicy::new(1, 10).unwrap();
        let start = tokio::time::Instant::now();

        let error = run(&settings, transport.clone()).await.unwrap_err();

        assert!(matches!(error, RunError::Delivery(_)));
        assert_eq!(transport.sent.lock().len(), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(10));
    }
}
