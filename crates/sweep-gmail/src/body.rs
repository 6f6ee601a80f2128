use crate::EmailError;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use mailparse::{parse_mail, ParsedMail};

/// Decodes a base64url `raw` payload and extracts a readable body from it.
pub fn readable_body(raw: &str) -> Result<String, EmailError> {
    let decoded = decode_gmail_raw(raw)?;
    let parsed = parse_mail(&decoded)?;

    if let Some(text) = extract_text_body(&parsed) {
        return Ok(text);
    }
    Ok(extract_html_body(&parsed)
        .map(|html| ammonia::clean(&html))
        .unwrap_or_default())
}

pub(crate) fn decode_gmail_raw(raw: &str) -> Result<Vec<u8>, EmailError> {
    URL_SAFE_NO_PAD
        .decode(raw.as_bytes())
        .or_else(|_| URL_SAFE.decode(raw.as_bytes()))
        .map_err(|err| EmailError::Data(format!("invalid Gmail raw payload: {err}")))
}

fn extract_text_body(mail: &ParsedMail<'_>) -> Option<String> {
    if mail.subparts.is_empty() {
        let content_type = mail.ctype.mimetype.to_ascii_lowercase();
        if content_type == "text/plain" {
            return mail.get_body().ok();
        }
        return None;
    }

    mail.subparts.iter().find_map(extract_text_body)
}

fn extract_html_body(mail: &ParsedMail<'_>) -> Option<String> {
    if mail.subparts.is_empty() {
        let content_type = mail.ctype.mimetype.to_ascii_lowercase();
        if content_type == "text/html" {
            return mail.get_body().ok();
        }
        return None;
    }

    mail.subparts.iter().find_map(extract_html_body)
}
