//! Template rendering and plain-text derivation.
//!
//! The template engine is optional. With the `templates` feature the
//! [`TemplatingRenderer`] evaluates Jinja-style templates against the
//! [`TemplateContext`]; without it the [`PassthroughRenderer`] treats the
//! template file as static HTML. [`renderer`] picks one at construction time.

use std::{path::Path, sync::LazyLock};

use herald_common::tracing::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};

/// Data made available to templates. Always a JSON document; an empty object
/// when nothing usable was supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateContext(Value);

impl Default for TemplateContext {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl From<Value> for TemplateContext {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl TemplateContext {
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.0
    }

    /// Loads template data given either inline JSON or the path of a JSON
    /// file. Input starting with `{` or `[` is parsed inline.
    ///
    /// Any failure is logged and degrades to an empty context.
    #[must_use]
    pub fn load(source: Option<&str>) -> Self {
        let Some(source) = source.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };

        let parsed = if source.starts_with('{') || source.starts_with('[') {
            serde_json::from_str(source).map_err(|e| format!("inline template data: {e}"))
        } else {
            std::fs::read_to_string(source)
                .map_err(|e| format!("template data file {source}: {e}"))
                .and_then(|content| {
                    serde_json::from_str(&content)
                        .map_err(|e| format!("template data file {source}: {e}"))
                })
        };

        match parsed {
            Ok(value) => Self(value),
            Err(error) => {
                warn!(%error, "Ignoring template data, rendering with an empty context");
                Self::default()
            }
        }
    }
}

/// Turns a template source and its data into HTML.
pub trait Renderer: Send + Sync {
    /// Renders `source`. Failures are logged and produce an empty string.
    fn render(&self, source: &str, context: &TemplateContext) -> String;
}

/// Returns the template source untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughRenderer;

impl Renderer for PassthroughRenderer {
    fn render(&self, source: &str, _context: &TemplateContext) -> String {
        source.to_string()
    }
}

/// Jinja-style renderer backed by `minijinja`. HTML auto-escaping is on for
/// interpolated values.
#[cfg(feature = "templates")]
#[derive(Debug, Default)]
pub struct TemplatingRenderer {
    env: minijinja::Environment<'static>,
}

#[cfg(feature = "templates")]
impl Renderer for TemplatingRenderer {
    fn render(&self, source: &str, context: &TemplateContext) -> String {
        // the .html name turns on auto-escaping
        let rendered = self
            .env
            .render_named_str("message.html", source, context.value());

        rendered.unwrap_or_else(|error| {
            warn!(%error, "Failed to render template, continuing without template output");
            String::new()
        })
    }
}

/// The best renderer this build supports.
#[must_use]
pub fn renderer() -> Box<dyn Renderer> {
    #[cfg(feature = "templates")]
    {
        debug!("Using template engine renderer");
        Box::new(TemplatingRenderer::default())
    }

    #[cfg(not(feature = "templates"))]
    {
        debug!("No template engine compiled in, templates are sent as static HTML");
        Box::new(PassthroughRenderer)
    }
}

/// Reads a template file. A missing or unreadable file is logged and
/// treated as no template.
#[must_use]
pub fn load_template(path: Option<&Path>) -> Option<String> {
    let path = path.filter(|p| !p.as_os_str().is_empty())?;

    match std::fs::read_to_string(path) {
        Ok(source) => Some(source),
        Err(error) => {
            warn!(path = %path.display(), %error, "Failed to read template, ignoring it");
            None
        }
    }
}

static STYLE_OR_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>|<script\b[^>]*>.*?</script\s*>")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap_or_else(|_| unreachable!("static pattern")));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap_or_else(|_| unreachable!("static pattern")));

/// Best-effort plain text from HTML.
///
/// Drops `<style>` and `<script>` blocks with their contents, strips the
/// remaining tags, turns `&nbsp;` into a space, collapses whitespace and
/// trims. No other entities are decoded.
#[must_use]
pub fn html_to_plain_text(html: &str) -> String {
    let text = STYLE_OR_SCRIPT.replace_all(html, "");
    let text = TAG.replace_all(&text, "");
    let text = text.replace("&nbsp;", " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
