use crate::{EmailError, GmailClient};

/// Position in a continuation-token page sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PageState {
    First,
    Next(String),
    Exhausted,
}

impl PageState {
    pub(crate) fn token(&self) -> Option<&str> {
        match self {
            Self::Next(token) => Some(token.as_str()),
            _ => None,
        }
    }

    /// State after a page that reported `next_token`. An absent or empty
    /// token ends the sequence.
    pub(crate) fn advance(next_token: Option<String>) -> Self {
        match next_token {
            Some(token) if !token.is_empty() => Self::Next(token),
            _ => Self::Exhausted,
        }
    }
}

/// Lazy walk over `messages.list` pages. Once exhausted it stays exhausted.
pub struct IdPager<'a> {
    client: &'a GmailClient,
    query: String,
    labels: Vec<String>,
    page_size: u32,
    state: PageState,
}

impl<'a> IdPager<'a> {
    pub fn new(client: &'a GmailClient, query: &str, labels: &[&str], page_size: u32) -> Self {
        Self {
            client,
            query: query.to_string(),
            labels: labels.iter().map(|label| label.to_string()).collect(),
            page_size: page_size.max(1),
            state: PageState::First,
        }
    }

    /// Next page of ids, or `None` once the remote stops handing out tokens.
    pub async fn next_page(&mut self) -> Result<Option<Vec<String>>, EmailError> {
        if self.state == PageState::Exhausted {
            return Ok(None);
        }

        let page = self
            .client
            .list_page(&self.query, &self.labels, self.page_size, self.state.token())
            .await?;
        self.state = PageState::advance(page.next_page_token);

        Ok(Some(page.ids))
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == PageState::Exhausted
    }
}
