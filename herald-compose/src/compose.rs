use herald_common::{MessagePayload, Overrides};

use crate::html_to_plain_text;

/// Builds the final payload from the defaults in `base`, the rendered
/// template and the explicit overrides.
///
/// Later layers win: template output replaces the default bodies, and any
/// non-empty override replaces both. A template never replaces an explicit
/// text override with its derived plain text.
#[must_use]
pub fn compose(
    base: MessagePayload,
    template_html: Option<&str>,
    overrides: &Overrides,
) -> MessagePayload {
    let mut payload = base;

    if let Some(html) = template_html.filter(|html| !html.is_empty()) {
        payload.body_html = Some(html.to_string());
        if overrides.body_text().is_none() {
            payload.body_text = html_to_plain_text(html);
        }
    }

    if let Some(subject) = overrides.subject() {
        payload.subject = subject.to_string();
    }
    if let Some(html) = overrides.body_html() {
        payload.body_html = Some(html.to_string());
    }
    if let Some(text) = overrides.body_text() {
        payload.body_text = text.to_string();
    }

    payload
}

#[cfg(test)]
mod tests {
    use herald_common::Mailbox;
    use pretty_assertions::assert_eq;

    use super::*;

    fn base() -> MessagePayload {
        MessagePayload {
            sender: Mailbox::new("Ruby", "ruby@example.com"),
            recipients: vec!["to@example.com".to_string()],
            subject: "Hello ✔".to_string(),
            body_text: "Hello world?".to_string(),
            body_html: Some("<b>Hello world?</b>".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_survive_without_template_or_overrides() {
        assert_eq!(compose(base(), None, &Overrides::default()), base());
        assert_eq!(compose(base(), Some(""), &Overrides::default()), base());
    }

    #[test]
    fn test_template_beats_defaults() {
        let composed = compose(
            base(),
            Some("<h1>Report</h1><p>All&nbsp;good</p>"),
            &Overrides::default(),
        );

        assert_eq!(
            composed.body_html.as_deref(),
            Some("<h1>Report</h1><p>All&nbsp;good</p>")
        );
        assert_eq!(
            composed.body_text,
            html_to_plain_text("<h1>Report</h1><p>All&nbsp;good</p>")
        );
        assert_eq!(composed.subject, "Hello ✔");
    }

    #[test]
    fn test_override_beats_template_beats_default() {
        let overrides = Overrides {
            body_html: Some("<p>explicit</p>".to_string()),
            ..Default::default()
        };

        let composed = compose(base(), Some("<p>templated</p>"), &overrides);

        assert_eq!(composed.body_html.as_deref(), Some("<p>explicit</p>"));
        // text still derives from the template, since no text override exists
        assert_eq!(composed.body_text, "templated");
    }

    #[test]
    fn test_text_override_is_not_clobbered_by_template() {
        let overrides = Overrides {
            subject: Some("Weekly report".to_string()),
            body_text: Some("See the HTML part".to_string()),
            body_html: None,
        };

        let composed = compose(base(), Some("<p>templated</p>"), &overrides);

        assert_eq!(composed.subject, "Weekly report");
        assert_eq!(composed.body_text, "See the HTML part");
        assert_eq!(composed.body_html.as_deref(), Some("<p>templated</p>"));
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let overrides = Overrides {
            subject: Some(String::new()),
            body_text: Some(String::new()),
            body_html: Some(String::new()),
        };

        assert_eq!(compose(base(), None, &overrides), base());
    }

    #[test]
    fn test_attachments_pass_through() {
        let payload = base().with_attachments(vec![herald_common::AttachmentDescriptor {
            filename: "a.txt".to_string(),
            content_locator: "/tmp/a.txt".into(),
        }]);

        let composed = compose(payload.clone(), Some("<p>x</p>"), &Overrides::default());
        assert_eq!(composed.attachments, payload.attachments);
    }
}
