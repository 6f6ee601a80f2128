use crate::EngineError;
use serde::Serialize;
use sweep_gmail::{MailRemote, OutgoingMail};
use url::Url;

const DEFAULT_SUBJECT: &str = "Unsubscribe";
const REQUEST_BODY: &str = "Please unsubscribe me from this mailing list.";

/// Targets advertised by a `List-Unsubscribe` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsubscribeTargets {
    pub mailto: Option<Url>,
    pub http: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum UnsubscribeOutcome {
    /// An unsubscribe request was mailed on the user's behalf.
    MailSent { to: String },
    /// Only a web link was offered; the caller decides whether to open it.
    HttpLink { url: String },
}

/// Splits a header such as `<mailto:a@x.com?subject=stop>, <https://x.com/u>`.
/// Later entries of the same scheme win; unparsable entries are ignored.
pub fn parse_list_unsubscribe(header: &str) -> UnsubscribeTargets {
    let mut targets = UnsubscribeTargets::default();

    for part in header.split(',') {
        let candidate = part.trim().trim_matches(|c| c == '<' || c == '>').trim();
        let Ok(url) = Url::parse(candidate) else {
            continue;
        };
        match url.scheme() {
            "mailto" => targets.mailto = Some(url),
            "http" | "https" => targets.http = Some(url),
            _ => {}
        }
    }

    targets
}

/// Mails the unsubscribe request when the header offers an address,
/// otherwise hands back the web link.
pub(crate) async fn unsubscribe(
    remote: &dyn MailRemote,
    user_id: &str,
    header: &str,
) -> Result<UnsubscribeOutcome, EngineError> {
    let targets = parse_list_unsubscribe(header);

    if let Some(mailto) = targets.mailto {
        let to = mailto_recipient(&mailto)?;
        let subject = mailto
            .query_pairs()
            .find(|(key, _)| key.eq_ignore_ascii_case("subject"))
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        let mail = OutgoingMail {
            from: user_id.to_string(),
            to: vec![to.clone()],
            subject,
            body_text: REQUEST_BODY.to_string(),
        };
        remote.send(&mail).await?;
        tracing::info!(user = user_id, to = %to, "unsubscribe request sent");
        return Ok(UnsubscribeOutcome::MailSent { to });
    }

    match targets.http {
        Some(url) => Ok(UnsubscribeOutcome::HttpLink {
            url: url.to_string(),
        }),
        None => Err(EngineError::InvalidUnsubscribe(header.to_string())),
    }
}

/// Recipient of a `mailto:` link with percent escapes such as `%2B` decoded.
fn mailto_recipient(mailto: &Url) -> Result<String, EngineError> {
    let to = urlencoding::decode(mailto.path())
        .map_err(|_| EngineError::InvalidUnsubscribe(mailto.to_string()))?
        .trim()
        .to_string();
    if to.is_empty() {
        return Err(EngineError::InvalidUnsubscribe(mailto.to_string()));
    }
    Ok(to)
}
