//! MIME decoding — raw RFC822 bytes to subject/sender/date/body.

use mail_parser::MessageParser;

use crate::error::DecodeError;

/// The parts of a message the pipeline cares about.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub subject: String,
    pub sender: String,
    /// `YYYY-MM-DD HH:MM:SS`, or empty when the header is absent.
    pub date: String,
    pub body: String,
}

/// Decode raw message bytes.
///
/// Text parts are preferred over HTML (HTML is stripped to text);
/// attachments are skipped by content disposition, which `mail-parser`
/// already separates out of the body parts.
pub fn decode(raw: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or(DecodeError::Unparseable)?;

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());

    let date = parsed
        .date()
        .map(|d| {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                d.year, d.month, d.day, d.hour, d.minute, d.second
            )
        })
        .unwrap_or_default();

    let body = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    Ok(DecodedMessage {
        subject,
        sender,
        date,
        body,
    })
}

/// Strip HTML tags from content (basic), keeping line structure so the
/// label-based extractor still sees one field per line.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Collapse runs of spaces/tabs but keep newlines.
    result
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}
