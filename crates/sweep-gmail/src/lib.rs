mod batch;
mod body;
mod client;
mod compose;
mod error;
mod pager;
mod remote;

pub use batch::{fan_out, BatchLimits};
pub use body::readable_body;
pub use client::{GmailClient, DEFAULT_API_BASE};
pub use compose::{encode_raw_message, OutgoingMail};
pub use error::EmailError;
pub use pager::IdPager;
pub use remote::{labels, HistoryDelta, MailRemote, MessageHeader, RemoteMessage};
