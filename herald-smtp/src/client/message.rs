//! RFC 5322 message builder with MIME alternatives and attachments.

use std::{fmt::Write as _, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;

use super::error::{ClientError, Result};

/// Encoded line length for base64 bodies (RFC 2045).
const LINE_LENGTH: usize = 76;

/// Longest line RFC 5322 allows, excluding the CRLF.
const MAX_LINE_OCTETS: usize = 998;

/// A file attachment with filename, content type, and data.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A rendered message ready for the DATA phase.
#[derive(Debug, Clone)]
pub struct BuiltMessage {
    /// The generated `Message-ID`, without angle brackets.
    pub message_id: String,
    pub content: String,
}

/// Builder for constructing email messages with proper MIME formatting.
///
/// Bcc recipients are an envelope concern and are never written to the
/// headers; pass them to `RCPT TO` only.
///
/// Line breaks in the subject and display name are folded into spaces.
/// Addresses containing CR, LF or angle brackets are rejected by
/// [`MessageBuilder::build`].
///
/// ```
/// use herald_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from_named("Ruby", "ruby@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .text("Hello world?")
///     .html("<b>Hello world?</b>")
///     .build()
///     .unwrap();
/// assert!(message.content.contains("multipart/alternative"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<Sender>,
    to: Vec<String>,
    cc: Vec<String>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
    message_id: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From header to a bare address.
    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(Sender {
            name: None,
            address: email.into(),
        });
        self
    }

    /// Sets the From header to `"Name" <address>`, encoding the name when it
    /// is not plain ASCII.
    #[must_use]
    pub fn from_named(mut self, name: &str, email: &str) -> Self {
        self.from = Some(Sender {
            name: (!name.is_empty()).then(|| name.to_string()),
            address: email.to_string(),
        });
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(email.into());
        self
    }

    #[must_use]
    pub fn to_multiple(mut self, emails: &[impl AsRef<str>]) -> Self {
        self.to
            .extend(emails.iter().map(|email| email.as_ref().to_string()));
        self
    }

    #[must_use]
    pub fn cc_multiple(mut self, emails: &[impl AsRef<str>]) -> Self {
        self.cc
            .extend(emails.iter().map(|email| email.as_ref().to_string()));
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Plain-text body.
    #[must_use]
    pub fn text(mut self, content: impl Into<String>) -> Self {
        self.text = Some(content.into());
        self
    }

    /// HTML body, sent as a `multipart/alternative` sibling of the text body.
    #[must_use]
    pub fn html(mut self, content: impl Into<String>) -> Self {
        self.html = Some(content.into());
        self
    }

    /// Uses a fixed `Message-ID` instead of generating one.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn attach(
        mut self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// Attaches a file from disk, naming it `filename` and guessing its
    /// content type from the path's extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn attach_file(self, filename: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            ClientError::BuilderError(format!("Failed to read file {}: {e}", path.display()))
        })?;

        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(self.attach(filename, content_type, data))
    }

    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no From address, no To recipient, or an
    /// address that could break out of its header or SMTP command.
    pub fn build(self) -> Result<BuiltMessage> {
        let from = self
            .from
            .as_ref()
            .ok_or_else(|| ClientError::BuilderError("Missing From address".to_string()))?;
        if self.to.is_empty() {
            return Err(ClientError::BuilderError(
                "At least one To recipient is required".to_string(),
            ));
        }
        for address in std::iter::once(&from.address).chain(&self.to).chain(&self.cc) {
            check_address(address)?;
        }

        let message_id = self.message_id.clone().unwrap_or_else(|| {
            let domain = from
                .address
                .rsplit_once('@')
                .map_or("localhost", |(_, domain)| domain);
            format!("{}@{domain}", uuid::Uuid::new_v4().simple())
        });

        let mut message = String::with_capacity(2048);
        push_header(&mut message, "From", &from.header_value());
        push_header(&mut message, "To", &self.to.join(", "));
        if !self.cc.is_empty() {
            push_header(&mut message, "Cc", &self.cc.join(", "));
        }
        if let Some(subject) = &self.subject {
            push_header(&mut message, "Subject", &encode_word(&fold(subject)));
        }
        push_header(&mut message, "Date", &Utc::now().to_rfc2822());
        push_header(&mut message, "Message-ID", &format!("<{message_id}>"));
        push_header(&mut message, "MIME-Version", "1.0");

        if self.attachments.is_empty() {
            self.write_body(&mut message);
        } else {
            let boundary = generate_boundary();
            push_header(
                &mut message,
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{boundary}\""),
            );
            message.push_str("\r\n");

            let _ = write!(message, "--{boundary}\r\n");
            self.write_body(&mut message);

            for attachment in &self.attachments {
                let _ = write!(message, "\r\n--{boundary}\r\n");
                push_header(&mut message, "Content-Type", &attachment.content_type);
                push_header(&mut message, "Content-Transfer-Encoding", "base64");
                push_header(
                    &mut message,
                    "Content-Disposition",
                    &format!("attachment; filename={}", quote_filename(&attachment.filename)),
                );
                message.push_str("\r\n");
                message.push_str(&base64_lines(&attachment.data));
            }

            let _ = write!(message, "\r\n--{boundary}--\r\n");
        }

        Ok(BuiltMessage {
            message_id,
            content: message,
        })
    }

    /// Writes the content headers and body of the text (and optional html) part.
    fn write_body(&self, message: &mut String) {
        let text = self.text.as_deref().unwrap_or_default();

        match &self.html {
            None => write_text_part(message, "text/plain", text),
            Some(html) => {
                let boundary = generate_boundary();
                push_header(
                    message,
                    "Content-Type",
                    &format!("multipart/alternative; boundary=\"{boundary}\""),
                );
                message.push_str("\r\n");

                let _ = write!(message, "--{boundary}\r\n");
                write_text_part(message, "text/plain", text);
                let _ = write!(message, "\r\n--{boundary}\r\n");
                write_text_part(message, "text/html", html);
                let _ = write!(message, "\r\n--{boundary}--\r\n");
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Sender {
    name: Option<String>,
    address: String,
}

impl Sender {
    fn header_value(&self) -> String {
        match &self.name {
            None => self.address.clone(),
            Some(name) => format!("{} <{}>", encode_display_name(&fold(name)), self.address),
        }
    }
}

/// Rejects an address that would break out of a header or an SMTP command.
///
/// # Errors
///
/// Returns `ClientError::BuilderError` if `address` contains CR, LF, `<` or
/// `>`.
pub fn check_address(address: &str) -> Result<()> {
    if address.contains(['\r', '\n', '<', '>']) {
        return Err(ClientError::BuilderError(format!(
            "Invalid address {address:?}: must not contain line breaks or angle brackets"
        )));
    }
    Ok(())
}

fn push_header(message: &mut String, name: &str, value: &str) {
    let _ = write!(message, "{name}: {value}\r\n");
}

/// Replaces every run of CR/LF with a single space.
fn fold(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes one text part. Short-lined ASCII goes out as 7bit, ASCII with an
/// over-long line as quoted-printable, anything else as base64.
fn write_text_part(message: &mut String, mime: &str, content: &str) {
    push_header(message, "Content-Type", &format!("{mime}; charset=utf-8"));
    if !content.is_ascii() {
        push_header(message, "Content-Transfer-Encoding", "base64");
        message.push_str("\r\n");
        message.push_str(&base64_lines(content.as_bytes()));
    } else if content.lines().any(|line| line.len() > MAX_LINE_OCTETS) {
        push_header(message, "Content-Transfer-Encoding", "quoted-printable");
        message.push_str("\r\n");
        message.push_str(&quoted_printable::encode_to_str(content.as_bytes()));
    } else {
        push_header(message, "Content-Transfer-Encoding", "7bit");
        message.push_str("\r\n");
        message.push_str(content);
    }
}

/// A `filename` parameter value: quoted ASCII with `\` and `"` escaped, or
/// an RFC 2047 encoded-word.
fn quote_filename(filename: &str) -> String {
    let filename = fold(filename);
    if filename.is_ascii() {
        format!("\"{}\"", filename.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        format!("\"{}\"", encode_word(&filename))
    }
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

fn encode_display_name(name: &str) -> String {
    if name.is_ascii() {
        format!("\"{}\"", name.replace(['\\', '"'], ""))
    } else {
        encode_word(name)
    }
}

fn generate_boundary() -> String {
    format!("----=_Part_{}", uuid::Uuid::new_v4().simple())
}

/// Base64 with CRLF line breaks every 76 characters.
fn base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / LINE_LENGTH * 2 + 2);

    // base64 output is ASCII, so byte chunks are valid UTF-8
    for chunk in encoded.as_bytes().chunks(LINE_LENGTH) {
        result.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        result.push_str("\r\n");
    }

    result
}
