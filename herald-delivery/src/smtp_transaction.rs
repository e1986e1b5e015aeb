//! SMTP transaction execution
//!
//! [`SmtpTransport`] is built once from [`SmtpSettings`]; every call to
//! [`Transport::send`] runs one complete [`SmtpTransaction`] on a fresh
//! session:
//! - host resolution and connection (implicit TLS for [`Security::Tls`])
//! - greeting, EHLO (falling back to HELO)
//! - STARTTLS for [`Security::StartTls`], then EHLO again
//! - AUTH PLAIN, or AUTH LOGIN when that is all the relay offers
//! - MAIL FROM, RCPT TO for every envelope recipient
//! - DATA and the message content
//! - QUIT, whose failure is ignored

use std::{fmt, future::Future, str::FromStr, time::Duration};

use async_trait::async_trait;
use herald_common::MessagePayload;
use herald_smtp::client::{self, BuiltMessage, MessageBuilder, Response, SmtpClient};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{FaultCode, SendReceipt, SmtpTimeouts, Transport, TransportError};

/// How the session with the relay is protected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No TLS at all.
    Plain,
    /// Plain connection upgraded with STARTTLS, which must succeed.
    #[default]
    StartTls,
    /// TLS from the first byte.
    Tls,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown SMTP security mode {0:?}, expected one of plain, starttls, tls")]
pub struct UnknownSecurityMode(pub String);

impl FromStr for Security {
    type Err = UnknownSecurityMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "none" => Ok(Self::Plain),
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" => Ok(Self::Tls),
            _ => Err(UnknownSecurityMode(s.to_string())),
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::StartTls => "starttls",
            Self::Tls => "tls",
        })
    }
}

/// Login for the relay.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to reach and log in to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub security: Security,
    pub credentials: Option<Credentials>,
    /// Name announced in EHLO/HELO.
    pub helo_name: String,
    /// Skip certificate validation. Only for test relays.
    pub accept_invalid_certs: bool,
    pub timeouts: SmtpTimeouts,
}

/// A [`Transport`] that talks SMTP to a single relay.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    settings: SmtpSettings,
}

impl SmtpTransport {
    #[must_use]
    pub fn new(settings: SmtpSettings) -> Self {
        if settings.accept_invalid_certs {
            warn!(
                host = %settings.host,
                "SECURITY WARNING: TLS certificate validation is disabled for this relay"
            );
        }

        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &SmtpSettings {
        &self.settings
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, payload: &MessagePayload) -> Result<SendReceipt, TransportError> {
        SmtpTransaction::new(&self.settings, payload).execute().await
    }
}

/// A single SMTP session delivering one payload.
struct SmtpTransaction<'a> {
    settings: &'a SmtpSettings,
    payload: &'a MessagePayload,
}

impl<'a> SmtpTransaction<'a> {
    const fn new(settings: &'a SmtpSettings, payload: &'a MessagePayload) -> Self {
        Self { settings, payload }
    }

    async fn execute(self) -> Result<SendReceipt, TransportError> {
        // Attachments are read before any network traffic so an unreadable
        // file does not cost a session.
        let message = self.build_message().await?;

        let mut client = self.connect_and_greet().await?;
        let capabilities = self.negotiate(&mut client).await?;
        self.authenticate(&mut client, &capabilities).await?;
        self.send_envelope(&mut client).await?;
        let accepted = self.send_message_data(&mut client, &message).await?;

        let quit_timeout = self.settings.timeouts.quit();
        match tokio::time::timeout(quit_timeout, client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(error = %e, "QUIT failed after successful delivery"),
            Err(_) => debug!(
                timeout = ?quit_timeout,
                "QUIT timed out after successful delivery"
            ),
        }

        Ok(SendReceipt {
            id: message.message_id,
            response: accepted.message(),
        })
    }

    async fn build_message(&self) -> Result<BuiltMessage, TransportError> {
        let payload = self.payload;
        let sender = &payload.sender;

        // Bcc never reaches the builder
        for address in &payload.bcc_recipients {
            client::check_address(address)?;
        }

        let builder = if sender.display_name.is_empty() {
            MessageBuilder::new().from(sender.address.as_str())
        } else {
            MessageBuilder::new().from_named(&sender.display_name, &sender.address)
        };

        let mut builder = builder
            .to_multiple(&payload.recipients)
            .cc_multiple(&payload.cc_recipients)
            .subject(payload.subject.as_str())
            .text(payload.body_text.as_str());

        if let Some(html) = &payload.body_html {
            builder = builder.html(html.as_str());
        }

        for attachment in &payload.attachments {
            builder = builder
                .attach_file(&attachment.filename, &attachment.content_locator)
                .await?;
        }

        Ok(builder.build()?)
    }

    /// Resolve the relay, connect and read the greeting.
    async fn connect_and_greet(&self) -> Result<SmtpClient, TransportError> {
        let settings = self.settings;
        let address = resolve(&settings.host, settings.port).await?;
        let connect_timeout = settings.timeouts.connect();

        let mut client = match settings.security {
            Security::Tls => {
                within(
                    connect_timeout,
                    "Connect",
                    SmtpClient::connect_tls(
                        &address,
                        settings.host.clone(),
                        settings.accept_invalid_certs,
                    ),
                )
                .await?
            }
            Security::Plain | Security::StartTls => within(
                connect_timeout,
                "Connect",
                SmtpClient::connect(&address, settings.host.clone()),
            )
            .await?
            .accept_invalid_certs(settings.accept_invalid_certs),
        };

        let greeting = within(connect_timeout, "Greeting", client.read_greeting()).await?;
        check(&greeting, FaultCode::Protocol, "connection")?;

        debug!(relay = %address, tls = client.is_tls(), "Connected to relay");
        Ok(client)
    }

    /// EHLO (or HELO), plus STARTTLS when required. Returns the reply whose
    /// capabilities apply to the rest of the session.
    async fn negotiate(&self, client: &mut SmtpClient) -> Result<Response, TransportError> {
        let capabilities = self.greet(client).await?;

        if self.settings.security != Security::StartTls {
            return Ok(capabilities);
        }

        if !capabilities.supports("STARTTLS") {
            return Err(TransportError::new(
                FaultCode::Tls,
                "Relay does not advertise STARTTLS",
            ));
        }

        let starttls = within(self.settings.timeouts.starttls(), "STARTTLS", client.starttls())
            .await
            .map_err(|e| match e.code {
                Some(FaultCode::TimedOut) => e,
                _ => TransportError {
                    code: Some(FaultCode::Tls),
                    ..e
                },
            })?;
        check(&starttls, FaultCode::Tls, "STARTTLS")?;

        debug!("TLS negotiated via STARTTLS");

        // RFC 3207: forget everything learnt before the upgrade
        self.greet(client).await
    }

    async fn greet(&self, client: &mut SmtpClient) -> Result<Response, TransportError> {
        let timeout = self.settings.timeouts.ehlo();
        let name = &self.settings.helo_name;

        let ehlo = within(timeout, "EHLO", client.ehlo(name)).await?;
        if ehlo.is_success() {
            return Ok(ehlo);
        }

        debug!(reply = ehlo.code, "EHLO rejected, falling back to HELO");
        let helo = within(timeout, "HELO", client.helo(name)).await?;
        check(&helo, FaultCode::Protocol, "HELO")?;

        Ok(helo)
    }

    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        capabilities: &Response,
    ) -> Result<(), TransportError> {
        let Some(credentials) = &self.settings.credentials else {
            return Ok(());
        };

        let mechanisms = capabilities.auth_mechanisms();
        let offers = |name: &str| mechanisms.iter().any(|m| m == name);
        let timeout = self.settings.timeouts.auth();

        let response = if offers("PLAIN") || mechanisms.is_empty() {
            within(
                timeout,
                "AUTH",
                client.auth_plain(&credentials.username, &credentials.password),
            )
            .await?
        } else if offers("LOGIN") {
            within(
                timeout,
                "AUTH",
                client.auth_login(&credentials.username, &credentials.password),
            )
            .await?
        } else {
            return Err(TransportError::new(
                FaultCode::Auth,
                format!(
                    "No supported authentication mechanism (relay offers {})",
                    mechanisms.join(" ")
                ),
            ));
        };

        check(&response, FaultCode::Auth, "authentication")?;
        debug!(user = %credentials.username, "Authenticated with relay");
        Ok(())
    }

    async fn send_envelope(&self, client: &mut SmtpClient) -> Result<(), TransportError> {
        let timeouts = &self.settings.timeouts;

        let sender = &self.payload.sender.address;
        let response = within(timeouts.mail_from(), "MAIL FROM", client.mail_from(sender)).await?;
        check(&response, FaultCode::Envelope, "MAIL FROM")?;

        for recipient in self.payload.envelope_recipients() {
            let response =
                within(timeouts.rcpt_to(), "RCPT TO", client.rcpt_to(recipient)).await?;
            check(
                &response,
                FaultCode::Envelope,
                &format!("RCPT TO {recipient}"),
            )?;
        }

        Ok(())
    }

    async fn send_message_data(
        &self,
        client: &mut SmtpClient,
        message: &BuiltMessage,
    ) -> Result<Response, TransportError> {
        let data_timeout = self.settings.timeouts.data();

        let response = within(data_timeout, "DATA", client.data()).await?;
        if !response.is_intermediate() {
            return Err(rejection(&response, FaultCode::Message, "DATA"));
        }

        let response = within(
            data_timeout,
            "Message data",
            client.send_data(&message.content),
        )
        .await?;
        check(&response, FaultCode::Message, "message data")?;

        Ok(response)
    }
}

async fn resolve(host: &str, port: u16) -> Result<String, TransportError> {
    let dns_error =
        |detail: String| TransportError::new(FaultCode::Dns, format!("Failed to resolve {host}: {detail}"));

    let mut addresses = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| dns_error(e.to_string()))?;

    addresses
        .next()
        .map(|address| address.to_string())
        .ok_or_else(|| dns_error("no addresses found".to_string()))
}

/// Run one session step under a timeout, mapping client errors to faults.
async fn within<T>(
    limit: Duration,
    step: &str,
    future: impl Future<Output = client::Result<T>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| {
            TransportError::new(FaultCode::TimedOut, format!("{step} timed out after {limit:?}"))
        })?
        .map_err(TransportError::from)
}

fn check(response: &Response, fault: FaultCode, step: &str) -> Result<(), TransportError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(rejection(response, fault, step))
    }
}

fn rejection(response: &Response, fault: FaultCode, step: &str) -> TransportError {
    TransportError::rejected(
        fault,
        response.code,
        format!("Server rejected {step}: {}", response.message()),
    )
}
