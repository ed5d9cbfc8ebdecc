//! Template parsing, sender resolution, and per-recipient rendering.
//!
//! The template is parsed once and shared read-only; rendering clones it
//! and rewrites the copy, so tasks never touch shared mutable state.

use crate::config::Config;
use crate::error::{Error, RenderError, Result};
use crate::recipient::Recipient;
use mailfan_mime::encoding::{encode_base64_mime, encode_rfc2047};
use mailfan_mime::{Body, ContentType, Headers, Message, Part, TransferEncoding};
use rand::{Rng, distributions::Alphanumeric};

/// Literal placeholder replaced with the recipient display name.
pub const NAME_TOKEN: &str = "%To_Name%";

/// Length of the random Message-ID token.
const MESSAGE_ID_TOKEN_LEN: usize = 20;

/// Resolved sender identity, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct Sender {
    /// Sender email address.
    pub email: String,
    /// Sender display name, when configured.
    pub name: Option<String>,
}

impl Sender {
    /// Resolves the sender address, in priority order: the configured
    /// override, the template `From` header, the username when it is
    /// itself an address.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when no source yields an address or the
    /// resolved address is invalid.
    pub fn resolve(template: &Template, config: &Config) -> Result<Self> {
        let email = config
            .from_email
            .clone()
            .or_else(|| template.message.headers.get("from").and_then(mailbox_email))
            .or_else(|| config.username.contains('@').then(|| config.username.clone()))
            .ok_or(Error::MissingSender)?;

        if let Err(e) = mailfan_smtp::Address::new(&email) {
            return Err(Error::InvalidSender(e.to_string()));
        }

        Ok(Self {
            email,
            name: config.from_name.clone(),
        })
    }

    /// Returns the display name, falling back to the email address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }

    /// Returns the domain part of the sender address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.email.split('@').next_back().unwrap_or_default()
    }
}

/// Extracts the address from a `Name <email>` or bare mailbox value.
fn mailbox_email(value: &str) -> Option<String> {
    if let (Some(open), Some(close)) = (value.find('<'), value.rfind('>'))
        && open < close
    {
        let email = value[open + 1..close].trim();
        if email.contains('@') {
            return Some(email.to_string());
        }
    }

    let value = value.trim();
    value.contains('@').then(|| value.to_string())
}

/// The parsed MIME template, shared read-only across all tasks.
#[derive(Debug, Clone)]
pub struct Template {
    message: Message,
}

impl Template {
    /// Parses the raw template document.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the document is not parseable MIME.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self {
            message: Message::parse(raw)?,
        })
    }

    /// Checks the template can produce a message for *any* recipient.
    ///
    /// A structural problem here would fail identically for every
    /// recipient, so it aborts the run before dispatch.
    ///
    /// # Errors
    ///
    /// Returns a fatal error for a multipart template without a
    /// `multipart/related`/`multipart/alternative` section, or with a
    /// section holding neither a text/html nor a text/plain part.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.message.body, Body::Text(_)) {
            return Ok(());
        }

        let section = find_section(&self.message.headers, &self.message.body).ok_or_else(|| {
            Error::Structure(
                "multipart template has no multipart/related or multipart/alternative section"
                    .to_string(),
            )
        })?;

        if find_part(section, "html").is_none() && find_part(section, "plain").is_none() {
            return Err(Error::Structure(
                "section has neither a text/html nor a text/plain part".to_string(),
            ));
        }

        Ok(())
    }

    /// Renders a ready-to-send message for one recipient.
    ///
    /// Pure function of (template, sender, recipient, config): renders
    /// into a fresh copy, leaving the shared template untouched.
    ///
    /// # Errors
    ///
    /// Returns a terminal render error; the engine wraps it with the
    /// recipient context.
    pub fn render(
        &self,
        sender: &Sender,
        recipient: &Recipient,
        config: &Config,
    ) -> std::result::Result<Vec<u8>, RenderError> {
        let mut message = self.message.clone();

        rewrite_headers(&mut message.headers, sender, recipient, config)?;

        if matches!(message.body, Body::Multipart(_)) {
            render_multipart(&mut message, recipient.display_name(), config)?;
        } else {
            render_single_part(&mut message, recipient.display_name(), config)?;
        }

        Ok(message.to_bytes()?)
    }
}

/// Regenerates the envelope-facing headers on the message copy.
fn rewrite_headers(
    headers: &mut Headers,
    sender: &Sender,
    recipient: &Recipient,
    config: &Config,
) -> std::result::Result<(), RenderError> {
    if config.random_message_id {
        headers.remove_all("message-id");
        headers.append(
            "Message-ID",
            format!("<{}@{}>", random_token(), sender.domain()),
        );
    }

    // Trace headers never survive a fresh submission.
    headers.remove_all("received");
    if config.clean_headers {
        headers.remove_matching(|name| name.starts_with("x-") || name == "delivered-to");
    }

    let from_display = encode_rfc2047(sender.display_name(), "utf-8")?;
    headers.set("From", format!("{from_display} <{}>", sender.email));
    headers.set("Return-Path", format!("<{}>", sender.email));

    // Subject and Cc appear only when configured for this run.
    match &config.subject {
        Some(subject) => {
            let subject = if config.replace_tokens {
                subject.replace(NAME_TOKEN, recipient.display_name())
            } else {
                subject.clone()
            };
            headers.set("Subject", encode_rfc2047(&subject, "utf-8")?);
        }
        None => headers.remove_all("subject"),
    }

    match &config.cc {
        Some(cc) => headers.set("Cc", cc.clone()),
        None => headers.remove_all("cc"),
    }

    let to_display = encode_rfc2047(recipient.display_name(), "utf-8")?;
    headers.set("To", format!("{to_display} <{}>", recipient.email));

    Ok(())
}

/// Rewrites a single-part body: decode, substitute, store. No multipart
/// restructuring happens here.
fn render_single_part(
    message: &mut Message,
    display_name: &str,
    config: &Config,
) -> std::result::Result<(), RenderError> {
    if !config.replace_tokens && !config.encode_base64 {
        return Ok(());
    }

    let text = message.decoded_text()?;
    let text = if config.replace_tokens {
        text.replace(NAME_TOKEN, display_name)
    } else {
        text
    };

    if config.encode_base64 {
        message.body = Body::Text(encode_base64_mime(text.as_bytes()).into_bytes());
        message.headers.set(
            "Content-Transfer-Encoding",
            TransferEncoding::Base64.to_string(),
        );
    } else {
        let was_encoded = matches!(
            message.transfer_encoding(),
            TransferEncoding::Base64 | TransferEncoding::QuotedPrintable
        );
        message.body = Body::Text(text.into_bytes());
        if was_encoded {
            message.headers.set(
                "Content-Transfer-Encoding",
                TransferEncoding::EightBit.to_string(),
            );
        }
    }

    Ok(())
}

/// Rewrites the multipart body: locate the section, synthesize the
/// plaintext alternative when needed, substitute and re-encode the text
/// parts.
fn render_multipart(
    message: &mut Message,
    display_name: &str,
    config: &Config,
) -> std::result::Result<(), RenderError> {
    let section = find_section_mut(&message.headers, &mut message.body).ok_or_else(|| {
        RenderError::Structure(
            "no multipart/related or multipart/alternative section".to_string(),
        )
    })?;

    let html_text = match find_part(section, "html") {
        Some(part) => Some(part.decoded_text()?),
        None => None,
    };
    let has_plain = find_part(section, "plain").is_some();

    if html_text.is_none() && !has_plain {
        return Err(RenderError::Structure(
            "section has neither a text/html nor a text/plain part".to_string(),
        ));
    }

    if let Some(html) = &html_text
        && !has_plain
        && config.generate_plaintext
    {
        let text = htmd::convert(html)
            .map_err(|e| RenderError::Structure(format!("plaintext generation failed: {e}")))?;

        let mut part_headers = Headers::new();
        part_headers.append("Content-Type", ContentType::text_plain().to_string());
        part_headers.append(
            "Content-Transfer-Encoding",
            TransferEncoding::EightBit.to_string(),
        );
        // Least-faithful alternative first
        section.insert(0, Part::new(part_headers, Body::Text(text.into_bytes())));
    }

    if config.replace_tokens || config.encode_base64 {
        for sub_type in ["plain", "html"] {
            if let Some(part) = find_part_mut(section, sub_type) {
                rewrite_part(part, display_name, config)?;
            }
        }
    }

    Ok(())
}

/// Applies substitution and transfer-encoding policy to one text part.
fn rewrite_part(
    part: &mut Part,
    display_name: &str,
    config: &Config,
) -> std::result::Result<(), RenderError> {
    let text = part.decoded_text()?;
    let text = if config.replace_tokens {
        text.replace(NAME_TOKEN, display_name)
    } else {
        text
    };

    if config.encode_base64 {
        part.body = Body::Text(encode_base64_mime(text.as_bytes()).into_bytes());
        part.headers.set(
            "Content-Transfer-Encoding",
            TransferEncoding::Base64.to_string(),
        );
    } else {
        let was_encoded = matches!(
            part.transfer_encoding(),
            TransferEncoding::Base64 | TransferEncoding::QuotedPrintable
        );
        part.body = Body::Text(text.into_bytes());
        if was_encoded {
            part.headers.set(
                "Content-Transfer-Encoding",
                TransferEncoding::EightBit.to_string(),
            );
        }
    }

    Ok(())
}

/// Checks whether an entity is a `multipart/related` or
/// `multipart/alternative` container.
fn is_section(headers: &Headers) -> bool {
    headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok())
        .is_some_and(|ct| ct.is("multipart", "related") || ct.is("multipart", "alternative"))
}

/// Depth-first search for the first section container, root included.
fn find_section<'a>(headers: &Headers, body: &'a Body) -> Option<&'a Vec<Part>> {
    if is_section(headers) {
        if let Body::Multipart(parts) = body {
            return Some(parts);
        }
        return None;
    }

    if let Body::Multipart(parts) = body {
        for part in parts {
            if let Some(found) = find_section(&part.headers, &part.body) {
                return Some(found);
            }
        }
    }
    None
}

/// Mutable variant of [`find_section`].
fn find_section_mut<'a>(headers: &Headers, body: &'a mut Body) -> Option<&'a mut Vec<Part>> {
    if is_section(headers) {
        if let Body::Multipart(parts) = body {
            return Some(parts);
        }
        return None;
    }

    if let Body::Multipart(parts) = body {
        for part in parts {
            if let Some(found) = find_section_mut(&part.headers, &mut part.body) {
                return Some(found);
            }
        }
    }
    None
}

fn part_is_text(part: &Part, sub_type: &str) -> bool {
    matches!(part.body, Body::Text(_))
        && part
            .content_type()
            .is_ok_and(|ct| ct.is("text", sub_type))
}

/// Finds the first non-attachment text part of the given subtype.
fn find_part<'a>(parts: &'a [Part], sub_type: &str) -> Option<&'a Part> {
    for part in parts {
        if part.is_attachment() {
            continue;
        }
        if part_is_text(part, sub_type) {
            return Some(part);
        }
        if let Body::Multipart(children) = &part.body
            && let Some(found) = find_part(children, sub_type)
        {
            return Some(found);
        }
    }
    None
}

/// Mutable variant of [`find_part`].
fn find_part_mut<'a>(parts: &'a mut [Part], sub_type: &str) -> Option<&'a mut Part> {
    for part in parts {
        if part.is_attachment() {
            continue;
        }
        if part_is_text(part, sub_type) {
            return Some(part);
        }
        if let Body::Multipart(children) = &mut part.body
            && let Some(found) = find_part_mut(children, sub_type)
        {
            return Some(found);
        }
    }
    None
}

/// Random alphanumeric token for Message-ID synthesis.
///
/// `thread_rng` keeps each worker on an independently seeded source.
fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn recipient(email: &str, name: Option<&str>) -> Recipient {
        Recipient {
            email: email.to_string(),
            name: name.map(ToString::to_string),
        }
    }

    fn sender() -> Sender {
        Sender {
            email: "news@corp.example".to_string(),
            name: None,
        }
    }

    fn render_to_message(template: &Template, config: &Config, rcpt: &Recipient) -> Message {
        let bytes = template.render(&sender(), rcpt, config).unwrap();
        Message::parse(&String::from_utf8(bytes).unwrap()).unwrap()
    }

    const SINGLE_PART: &str = concat!(
        "From: Old Sender <old@other.example>\r\n",
        "Subject: Old subject\r\n",
        "Message-ID: <stale@other.example>\r\n",
        "Received: from a by b\r\n",
        "X-Mailer: AncientMailer 1.0\r\n",
        "Delivered-To: someone@other.example\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Hi %To_Name%, welcome!\r\n"
    );

    const HTML_ONLY: &str = concat!(
        "From: news@corp.example\r\n",
        "Subject: Weekly\r\n",
        "Content-Type: multipart/alternative; boundary=alt\r\n",
        "\r\n",
        "--alt\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "\r\n",
        "<h1>Hello %To_Name%</h1><p>First paragraph.</p><p>Second paragraph.</p>\r\n",
        "--alt--\r\n"
    );

    fn plain_config() -> Config {
        Config {
            encode_base64: false,
            ..Config::default()
        }
    }

    #[test]
    fn test_single_part_substitution() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let rendered =
            render_to_message(&template, &plain_config(), &recipient("jane@example.com", Some("Jane")));

        let body = rendered.decoded_text().unwrap();
        assert!(body.contains("Hi Jane, welcome!"));
        assert!(!body.contains(NAME_TOKEN));
    }

    #[test]
    fn test_substitution_disabled_keeps_token() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let config = Config {
            replace_tokens: false,
            encode_base64: false,
            ..Config::default()
        };
        let rendered =
            render_to_message(&template, &config, &recipient("jane@example.com", Some("Jane")));
        assert!(rendered.decoded_text().unwrap().contains(NAME_TOKEN));
    }

    #[test]
    fn test_header_rebuild() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let rendered =
            render_to_message(&template, &plain_config(), &recipient("jane@example.com", Some("Jane")));

        assert_eq!(
            rendered.headers.get("From"),
            Some("news@corp.example <news@corp.example>")
        );
        assert_eq!(rendered.headers.get("Return-Path"), Some("<news@corp.example>"));
        assert_eq!(rendered.headers.get("To"), Some("Jane <jane@example.com>"));
        assert_eq!(rendered.headers.get_all("From").len(), 1);
        assert_eq!(rendered.headers.get_all("To").len(), 1);
    }

    #[test]
    fn test_from_name_used_when_configured() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let config = plain_config();
        let named_sender = Sender {
            email: "news@corp.example".to_string(),
            name: Some("Corp News".to_string()),
        };
        let bytes = template
            .render(&named_sender, &recipient("a@b.example", None), &config)
            .unwrap();
        let rendered = Message::parse(&String::from_utf8(bytes).unwrap()).unwrap();
        assert_eq!(
            rendered.headers.get("From"),
            Some("Corp News <news@corp.example>")
        );
    }

    #[test]
    fn test_message_id_regenerated_and_unique() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let config = plain_config();

        let first = render_to_message(&template, &config, &recipient("a@example.com", None));
        let second = render_to_message(&template, &config, &recipient("b@example.com", None));

        let first_id = first.headers.get("Message-ID").unwrap().to_string();
        let second_id = second.headers.get("Message-ID").unwrap().to_string();

        assert_ne!(first_id, second_id);
        assert_ne!(first_id, "<stale@other.example>");
        assert!(first_id.starts_with('<'));
        assert!(first_id.ends_with("@corp.example>"));
        assert_eq!(first.headers.get_all("Message-ID").len(), 1);
    }

    #[test]
    fn test_message_id_kept_when_disabled() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let config = Config {
            random_message_id: false,
            encode_base64: false,
            ..Config::default()
        };
        let rendered = render_to_message(&template, &config, &recipient("a@example.com", None));
        assert_eq!(rendered.headers.get("Message-ID"), Some("<stale@other.example>"));
    }

    #[test]
    fn test_header_cleanup_enabled() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let rendered = render_to_message(&template, &plain_config(), &recipient("a@example.com", None));

        assert!(!rendered.headers.contains("X-Mailer"));
        assert!(!rendered.headers.contains("Delivered-To"));
        assert!(!rendered.headers.contains("Received"));
    }

    #[test]
    fn test_header_cleanup_disabled_keeps_x_headers() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let config = Config {
            clean_headers: false,
            encode_base64: false,
            ..Config::default()
        };
        let rendered = render_to_message(&template, &config, &recipient("a@example.com", None));

        assert_eq!(rendered.headers.get("X-Mailer"), Some("AncientMailer 1.0"));
        assert!(rendered.headers.contains("Delivered-To"));
        // Received goes away regardless
        assert!(!rendered.headers.contains("Received"));
    }

    #[test]
    fn test_subject_and_cc_rebuild() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let config = Config {
            subject: Some("Hello %To_Name%!".to_string()),
            cc: Some("archive@corp.example".to_string()),
            encode_base64: false,
            ..Config::default()
        };
        let rendered =
            render_to_message(&template, &config, &recipient("jane@example.com", Some("Jane")));

        assert_eq!(rendered.headers.get("Subject"), Some("Hello Jane!"));
        assert_eq!(rendered.headers.get("Cc"), Some("archive@corp.example"));
    }

    #[test]
    fn test_unconfigured_subject_and_cc_are_absent() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let rendered =
            render_to_message(&template, &plain_config(), &recipient("a@example.com", None));

        assert!(!rendered.headers.contains("Subject"));
        assert!(!rendered.headers.contains("Cc"));
    }

    #[test]
    fn test_single_part_encoding_flag() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let rendered = render_to_message(
            &template,
            &Config::default(),
            &recipient("jane@example.com", Some("Jane")),
        );

        assert_eq!(rendered.transfer_encoding(), TransferEncoding::Base64);
        assert!(rendered.decoded_text().unwrap().contains("Hi Jane, welcome!"));
    }

    #[test]
    fn test_plaintext_generated_for_html_only_template() {
        let template = Template::parse(HTML_ONLY).unwrap();
        let rendered =
            render_to_message(&template, &plain_config(), &recipient("jane@example.com", Some("Jane")));

        let Body::Multipart(parts) = &rendered.body else {
            panic!("expected multipart output");
        };
        assert_eq!(parts.len(), 2);

        let plain = parts
            .iter()
            .find(|p| p.content_type().unwrap().is("text", "plain"))
            .unwrap();
        let html = parts
            .iter()
            .find(|p| p.content_type().unwrap().is("text", "html"))
            .unwrap();

        let plain_text = plain.decoded_text().unwrap();
        assert!(plain_text.contains("Hello Jane"));
        assert!(plain_text.contains("First paragraph."));
        assert!(plain_text.contains("Second paragraph."));
        assert!(!plain_text.contains('<'));
        // Block-level breaks survive the conversion
        let first = plain_text.find("First paragraph.").unwrap();
        let second = plain_text.find("Second paragraph.").unwrap();
        assert!(plain_text[first..second].contains('\n'));

        assert!(html.decoded_text().unwrap().contains("Hello Jane"));
    }

    #[test]
    fn test_plaintext_generation_disabled() {
        let template = Template::parse(HTML_ONLY).unwrap();
        let config = Config {
            generate_plaintext: false,
            encode_base64: false,
            ..Config::default()
        };
        let rendered = render_to_message(&template, &config, &recipient("a@example.com", None));

        let Body::Multipart(parts) = &rendered.body else {
            panic!("expected multipart output");
        };
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_encoding_flag_base64_encodes_parts() {
        let template = Template::parse(HTML_ONLY).unwrap();
        let config = Config::default();
        let rendered =
            render_to_message(&template, &config, &recipient("jane@example.com", Some("Jane")));

        let Body::Multipart(parts) = &rendered.body else {
            panic!("expected multipart output");
        };
        for part in parts {
            assert_eq!(part.transfer_encoding(), TransferEncoding::Base64);
            assert!(part.decoded_text().unwrap().contains("Jane"));
        }
    }

    #[test]
    fn test_validate_rejects_missing_section() {
        let raw = concat!(
            "From: a@b.example\r\n",
            "Content-Type: multipart/mixed; boundary=m\r\n",
            "\r\n",
            "--m\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=x.pdf\r\n",
            "\r\n",
            "data\r\n",
            "--m--\r\n"
        );
        let template = Template::parse(raw).unwrap();
        assert!(matches!(template.validate(), Err(Error::Structure(_))));
    }

    #[test]
    fn test_validate_rejects_section_without_text_parts() {
        let raw = concat!(
            "From: a@b.example\r\n",
            "Content-Type: multipart/related; boundary=r\r\n",
            "\r\n",
            "--r\r\n",
            "Content-Type: image/png\r\n",
            "Content-Disposition: attachment; filename=i.png\r\n",
            "\r\n",
            "data\r\n",
            "--r--\r\n"
        );
        let template = Template::parse(raw).unwrap();
        assert!(matches!(template.validate(), Err(Error::Structure(_))));
    }

    #[test]
    fn test_nested_section_found_inside_mixed() {
        let raw = concat!(
            "From: a@b.example\r\n",
            "Content-Type: multipart/mixed; boundary=m\r\n",
            "\r\n",
            "--m\r\n",
            "Content-Type: multipart/alternative; boundary=alt\r\n",
            "\r\n",
            "--alt\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Hi %To_Name%\r\n",
            "--alt--\r\n",
            "--m--\r\n"
        );
        let template = Template::parse(raw).unwrap();
        template.validate().unwrap();

        let rendered =
            render_to_message(&template, &plain_config(), &recipient("jane@example.com", Some("Jane")));
        let bytes = rendered.to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Hi Jane"));
    }

    #[test]
    fn test_sender_resolution_order() {
        let template = Template::parse(SINGLE_PART).unwrap();

        // Template From header wins when no override is set
        let config = Config {
            username: "user".to_string(),
            ..Config::default()
        };
        let sender = Sender::resolve(&template, &config).unwrap();
        assert_eq!(sender.email, "old@other.example");

        // Explicit override wins over the template
        let config = Config {
            from_email: Some("boss@corp.example".to_string()),
            ..Config::default()
        };
        let sender = Sender::resolve(&template, &config).unwrap();
        assert_eq!(sender.email, "boss@corp.example");
        assert_eq!(sender.domain(), "corp.example");
    }

    #[test]
    fn test_sender_falls_back_to_username() {
        let template = Template::parse("Subject: x\r\n\r\nbody").unwrap();
        let config = Config {
            username: "login@corp.example".to_string(),
            ..Config::default()
        };
        let sender = Sender::resolve(&template, &config).unwrap();
        assert_eq!(sender.email, "login@corp.example");

        let config = Config {
            username: "plainlogin".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            Sender::resolve(&template, &config),
            Err(Error::MissingSender)
        ));
    }

    #[test]
    fn test_template_not_mutated_by_render() {
        let template = Template::parse(SINGLE_PART).unwrap();
        let config = plain_config();

        let _ = render_to_message(&template, &config, &recipient("a@example.com", Some("A")));
        // The shared instance still carries the original token and headers
        assert!(template.message.decoded_text().unwrap().contains(NAME_TOKEN));
        assert!(template.message.headers.contains("X-Mailer"));
    }

    proptest! {
        #[test]
        fn prop_substitution_replaces_every_occurrence(
            name in "[A-Za-z][A-Za-z ]{0,16}",
            prefix in "[a-z ]{0,16}",
            suffix in "[a-z ]{0,16}",
        ) {
            let raw = format!(
                "From: s@corp.example\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{prefix}%To_Name%{suffix}%To_Name%"
            );
            let template = Template::parse(&raw).unwrap();
            let config = plain_config();
            let rcpt = recipient("r@example.com", Some(name.trim()));

            let bytes = template.render(&sender(), &rcpt, &config).unwrap();
            let rendered = Message::parse(&String::from_utf8(bytes).unwrap()).unwrap();
            let body = rendered.decoded_text().unwrap();

            prop_assert!(!body.contains(NAME_TOKEN));
            let expected = format!("{prefix}{n}{suffix}{n}", n = name.trim());
            prop_assert!(body.starts_with(&expected));
        }
    }
}
