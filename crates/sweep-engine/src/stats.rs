//! Dashboard counters for one mailbox.

use sweep_core::MailboxStats;
use sweep_gmail::{labels, MailRemote};
use sweep_storage::MailStore;

/// Gathers the synced, trash and archived counts concurrently. A counter
/// that cannot be read is logged and reported as zero.
pub async fn mailbox_stats(
    store: &dyn MailStore,
    remote: &dyn MailRemote,
    user_id: &str,
) -> MailboxStats {
    let (synced, trash, archived) = tokio::join!(
        store.count_messages(user_id),
        remote.label_count(labels::TRASH),
        remote.count_archived(),
    );

    MailboxStats {
        synced: synced.unwrap_or_else(|err| {
            tracing::warn!(user = user_id, error = %err, "failed to count synced messages");
            0
        }),
        trash: trash.unwrap_or_else(|err| {
            tracing::warn!(user = user_id, error = %err, "failed to count trash");
            0
        }),
        archived: archived.unwrap_or_else(|err| {
            tracing::warn!(user = user_id, error = %err, "failed to count archived messages");
            0
        }),
    }
}
