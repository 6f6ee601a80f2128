use crate::EmailError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use lettre::message::{header, Mailbox};
use lettre::Message;
use serde::{Deserialize, Serialize};

/// Plain-text message posted through the remote's send endpoint, e.g. a
/// `mailto:` unsubscribe request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body_text: String,
}

/// Builds the RFC 5322 message and encodes it as unpadded base64url.
pub fn encode_raw_message(mail: &OutgoingMail) -> Result<String, EmailError> {
    if mail.to.is_empty() {
        return Err(EmailError::Build("message has no recipients".to_string()));
    }

    let mut builder = Message::builder()
        .from(to_mailbox(&mail.from)?)
        .subject(mail.subject.clone());
    for recipient in &mail.to {
        builder = builder.to(to_mailbox(recipient)?);
    }

    let message = builder
        .header(header::ContentType::TEXT_PLAIN)
        .body(mail.body_text.clone())
        .map_err(|err| EmailError::Build(err.to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(message.formatted()))
}

fn to_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .trim()
        .parse()
        .map_err(|err| EmailError::Build(format!("invalid email {address}: {err}")))
}
