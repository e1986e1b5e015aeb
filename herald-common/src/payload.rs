//! The outbound message and the pieces it is assembled from.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// A sender identity: display name plus address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub address: String,
}

impl Mailbox {
    #[must_use]
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }

    /// `true` when no usable address is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.address.trim().is_empty()
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "<{}>", self.address)
        } else {
            write!(f, "\"{}\" <{}>", self.display_name, self.address)
        }
    }
}

/// A file to attach. The locator is a filesystem path the transport reads
/// when it builds the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub filename: String,
    pub content_locator: PathBuf,
}

/// The fully composed message handed to the delivery engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub sender: Mailbox,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc_recipients: Vec<String>,
    #[serde(default)]
    pub bcc_recipients: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
}

impl MessagePayload {
    /// Every envelope recipient, in To, Cc, Bcc order.
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &str> {
        self.recipients
            .iter()
            .chain(&self.cc_recipients)
            .chain(&self.bcc_recipients)
            .map(String::as_str)
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<AttachmentDescriptor>) -> Self {
        self.attachments.extend(attachments);
        self
    }
}

/// Explicit operator-supplied content. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

impl Overrides {
    pub fn subject(&self) -> Option<&str> {
        non_empty(self.subject.as_deref())
    }

    pub fn body_text(&self) -> Option<&str> {
        non_empty(self.body_text.as_deref())
    }

    pub fn body_html(&self) -> Option<&str> {
        non_empty(self.body_html.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
