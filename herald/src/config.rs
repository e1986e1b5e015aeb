//! Layered run configuration.
//!
//! Later layers win:
//! 1. built-in defaults
//! 2. the RON config file
//! 3. `.env`, loaded into the process environment before parsing
//! 4. environment variables, then command-line flags
//!
//! The result is a single immutable [`Settings`] value.

use std::{
    io,
    path::{Path, PathBuf},
};

use clap::Parser;
use herald_common::{Mailbox, MessagePayload, Overrides};
use herald_delivery::{
    Credentials, PolicyError, RetryPolicy, Security, SmtpSettings, SmtpTimeouts,
};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_HOST: &str = "smtp.gmail.com";
const DEFAULT_PORT: u16 = 587;
const DEFAULT_SENDER_NAME: &str = "herald";
const DEFAULT_SUBJECT: &str = "Hello ✔";
const DEFAULT_TEXT: &str = "Hello world?";
const DEFAULT_HTML: &str = "<b>Hello world?</b>";
const DEFAULT_HELO_NAME: &str = "localhost";

/// Config files tried, in order, when none is named explicitly.
pub const DEFAULT_CONFIG_PATHS: &[&str] =
    &["./herald.config.ron", "/etc/herald/herald.config.ron"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error(transparent)]
    Retry(#[from] PolicyError),
}

/// Send a single email notification.
#[derive(Debug, Default, Parser)]
#[command(name = "herald", version, about, long_about = None)]
pub struct Cli {
    /// RON config file
    #[arg(long, env = "HERALD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sender address (defaults to the SMTP user)
    #[arg(long, env = "MAIL_FROM")]
    pub from: Option<String>,

    /// Sender display name
    #[arg(long, env = "MAIL_FROM_NAME")]
    pub from_name: Option<String>,

    /// Comma separated recipients
    #[arg(long, env = "MAIL_TO")]
    pub to: Option<String>,

    /// Comma separated Cc recipients
    #[arg(long, env = "MAIL_CC")]
    pub cc: Option<String>,

    /// Comma separated Bcc recipients
    #[arg(long, env = "MAIL_BCC")]
    pub bcc: Option<String>,

    #[arg(long, env = "MAIL_SUBJECT")]
    pub subject: Option<String>,

    /// Plain-text body
    #[arg(long, env = "MAIL_TEXT")]
    pub text: Option<String>,

    /// HTML body
    #[arg(long, env = "MAIL_HTML")]
    pub html: Option<String>,

    /// HTML template file
    #[arg(long, env = "MAIL_TEMPLATE")]
    pub template: Option<PathBuf>,

    /// Template data: inline JSON, or a path to a JSON file
    #[arg(long, env = "MAIL_TEMPLATE_DATA")]
    pub template_data: Option<String>,

    /// Directory whose files are attached
    #[arg(long, env = "MAIL_ATTACHMENTS_DIR")]
    pub attachments_dir: Option<PathBuf>,

    /// Retries after a transient failure
    #[arg(long, env = "MAIL_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Base backoff in milliseconds, doubled after every failed attempt
    #[arg(long, env = "MAIL_RETRY_BASE_MS")]
    pub retry_base_ms: Option<u64>,

    /// Print the message instead of sending it
    #[arg(long, env = "MAIL_DRY_RUN", value_parser = clap::builder::BoolishValueParser::new())]
    pub dry_run: bool,

    /// Send at this time: epoch milliseconds or a date-time
    #[arg(long, env = "MAIL_SEND_AT")]
    pub send_at: Option<String>,

    /// Send after this many milliseconds
    #[arg(long, env = "MAIL_DELAY_MS")]
    pub delay_ms: Option<String>,

    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT")]
    pub smtp_port: Option<u16>,

    /// plain, starttls or tls
    #[arg(long, env = "SMTP_SECURITY")]
    pub smtp_security: Option<Security>,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Skip TLS certificate validation
    #[arg(long, env = "SMTP_ACCEPT_INVALID_CERTS", value_parser = clap::builder::BoolishValueParser::new())]
    pub accept_invalid_certs: bool,
}

/// The `mail` section of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailConfig {
    pub from: Option<String>,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub template: Option<PathBuf>,
    pub template_data: Option<String>,
    pub attachments_dir: Option<PathBuf>,
    pub send_at: Option<String>,
    pub delay_ms: Option<String>,
    pub dry_run: bool,
}

/// The `smtp` section of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub security: Option<Security>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub helo_name: Option<String>,
    pub accept_invalid_certs: bool,
    pub timeouts: SmtpTimeouts,
}

/// The `retry` section of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

/// Contents of a `herald.config.ron` file. Every field is optional.
///
/// ```ron
/// (
///     mail: (
///         from_name: "Ruby",
///         to: ["ops@example.com"],
///         template: "templates/report.html",
///     ),
///     smtp: (host: "smtp.example.com", port: 465, security: tls),
///     retry: (max_retries: 5),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub mail: MailConfig,
    pub smtp: SmtpConfig,
    pub retry: RetryConfig,
}

impl FileConfig {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid RON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses RON, allowing `Option` fields to be written without `Some(..)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid config.
    pub fn from_ron(content: &str) -> Result<Self, ron::error::SpannedError> {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(content)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit` (`--config` or `HERALD_CONFIG`), which must exist
/// 2. the first of `defaults` that exists
///
/// No file at all is fine; built-in defaults apply.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if `explicit` names a file that does not
/// exist.
pub fn find_config_file(
    explicit: Option<&Path>,
    defaults: &[&str],
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::Missing(path.to_path_buf()));
    }

    Ok(defaults.iter().map(PathBuf::from).find(|path| path.exists()))
}

/// Everything one run needs, resolved from all configuration layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sender: Mailbox,
    pub recipients: Vec<String>,
    pub cc_recipients: Vec<String>,
    pub bcc_recipients: Vec<String>,
    /// Explicitly configured content, applied over any template.
    pub overrides: Overrides,
    pub template: Option<PathBuf>,
    pub template_data: Option<String>,
    pub attachments_dir: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub dry_run: bool,
    pub send_at: Option<String>,
    pub delay_ms: Option<String>,
    pub smtp: SmtpSettings,
}

impl Settings {
    /// Loads the config file the command line points at (or a default one)
    /// and layers the command line over it.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or parsed, or if the
    /// result is unusable.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match find_config_file(cli.config.as_deref(), DEFAULT_CONFIG_PATHS)? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                FileConfig::from_file(&path)?
            }
            None => FileConfig::default(),
        };

        Self::resolve(cli, file)
    }

    /// Layers `cli` over `file` over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting retry policy is invalid.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig { mail, smtp, retry } = file;

        let retry = RetryPolicy::new(
            cli.max_retries
                .or(retry.max_retries)
                .unwrap_or(RetryPolicy::default().max_retries),
            cli.retry_base_ms
                .or(retry.base_delay_ms)
                .unwrap_or(RetryPolicy::default().base_delay_ms),
        )?;

        let user = non_blank(cli.smtp_user.or(smtp.user));
        let password = cli.smtp_password.or(smtp.password).unwrap_or_default();

        let sender = Mailbox::new(
            non_blank(cli.from_name.or(mail.from_name))
                .unwrap_or_else(|| DEFAULT_SENDER_NAME.to_string()),
            non_blank(cli.from.or(mail.from))
                .or_else(|| user.clone())
                .unwrap_or_default(),
        );

        let smtp = SmtpSettings {
            host: non_blank(cli.smtp_host.or(smtp.host))
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.smtp_port.or(smtp.port).unwrap_or(DEFAULT_PORT),
            security: cli.smtp_security.or(smtp.security).unwrap_or_default(),
            credentials: user.map(|username| Credentials { username, password }),
            helo_name: non_blank(smtp.helo_name)
                .unwrap_or_else(|| DEFAULT_HELO_NAME.to_string()),
            accept_invalid_certs: cli.accept_invalid_certs || smtp.accept_invalid_certs,
            timeouts: smtp.timeouts,
        };

        Ok(Self {
            sender,
            recipients: list_or(cli.to.as_deref(), mail.to),
            cc_recipients: list_or(cli.cc.as_deref(), mail.cc),
            bcc_recipients: list_or(cli.bcc.as_deref(), mail.bcc),
            overrides: Overrides {
                subject: cli.subject.or(mail.subject),
                body_text: cli.text.or(mail.text),
                body_html: cli.html.or(mail.html),
            },
            template: cli.template.or(mail.template),
            template_data: cli.template_data.or(mail.template_data),
            attachments_dir: cli.attachments_dir.or(mail.attachments_dir),
            retry,
            dry_run: cli.dry_run || mail.dry_run,
            send_at: cli.send_at.or(mail.send_at),
            delay_ms: cli.delay_ms.or(mail.delay_ms),
            smtp,
        })
    }

    /// The payload before any template or override is applied.
    #[must_use]
    pub fn base_payload(&self) -> MessagePayload {
        MessagePayload {
            sender: self.sender.clone(),
            recipients: self.recipients.clone(),
            cc_recipients: self.cc_recipients.clone(),
            bcc_recipients: self.bcc_recipients.clone(),
            subject: DEFAULT_SUBJECT.to_string(),
            body_text: DEFAULT_TEXT.to_string(),
            body_html: Some(DEFAULT_HTML.to_string()),
            attachments: Vec::new(),
        }
    }
}

/// Splits a comma separated address list, dropping blanks.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn list_or(value: Option<&str>, fallback: Vec<String>) -> Vec<String> {
    value.map_or_else(
        || {
            fallback
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        },
        split_list,
    )
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
