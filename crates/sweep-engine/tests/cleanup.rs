mod support;

use chrono::Utc;
use sweep_core::{RuleAction, RuleKind};
use sweep_engine::{
    archive_and_verify, ArchivePolicy, CleanupRequest, CleanupStatus, RestorePlacement,
    TrashOutcome, UnsubscribeOutcome,
};
use sweep_gmail::labels;
use sweep_storage::MailStore;
use support::{add_rule, cached, cached_ids, harness, remote_message, FakeRemote, USER};

fn trash_calls(calls: &[String]) -> usize {
    calls.iter().filter(|call| call.starts_with("trash:")).count()
}

#[tokio::test]
async fn earlier_rule_wins_over_later_match() {
    let h = harness().await;
    add_rule(&h.store, RuleKind::Sender, "deals@shop.io", RuleAction::Archive).await;
    add_rule(&h.store, RuleKind::Subject, "sale", RuleAction::Delete).await;
    h.store
        .upsert_messages(&[cached("m1", "deals@shop.io", "Big SALE", Utc::now())])
        .await
        .unwrap();
    h.remote.insert(remote_message("m1", "deals@shop.io", "Big SALE", 3));

    let outcome = h
        .engine
        .cleanup()
        .run(USER, &CleanupRequest::default())
        .await
        .unwrap();

    assert_eq!(outcome.affected[0].action, RuleAction::Archive);
    assert_eq!(outcome.processed_ids, vec!["m1"]);
    let calls = h.remote.calls();
    assert!(calls.contains(&"archive:m1".to_string()));
    assert_eq!(trash_calls(&calls), 0);
    assert!(!h.remote.labels_of("m1").unwrap().contains(&labels::INBOX.to_string()));
}

#[tokio::test]
async fn second_run_finds_nothing_left() {
    let h = harness().await;
    add_rule(&h.store, RuleKind::Keyword, "promo", RuleAction::MarkRead).await;
    h.store
        .upsert_messages(&[
            cached("m1", "a@x.com", "promo inside", Utc::now()),
            cached("m2", "b@x.com", "PROMO codes", Utc::now()),
        ])
        .await
        .unwrap();
    h.remote.insert(remote_message("m1", "a@x.com", "promo inside", 1));
    h.remote.insert(remote_message("m2", "b@x.com", "PROMO codes", 2));

    let first = h
        .engine
        .cleanup()
        .run(USER, &CleanupRequest::default())
        .await
        .unwrap();
    let second = h
        .engine
        .cleanup()
        .run(USER, &CleanupRequest::default())
        .await
        .unwrap();

    assert_eq!(first.processed_ids.len(), 2);
    assert_eq!(second.status, CleanupStatus::NoMatches);
    assert!(cached_ids(&h.store).await.is_empty());
    assert!(!h.remote.labels_of("m1").unwrap().contains(&labels::UNREAD.to_string()));

    let history = h.store.list_cleaning_history(USER).await.unwrap();
    assert_eq!(history.len(), 1);
    let mut recorded = history[0].affected_ids.clone();
    recorded.sort();
    assert_eq!(recorded, vec!["m1", "m2"]);
}

#[tokio::test]
async fn nothing_to_do_is_reported_distinctly() {
    let h = harness().await;

    let preview = h
        .engine
        .cleanup()
        .run(
            USER,
            &CleanupRequest {
                dry_run: true,
                ..CleanupRequest::default()
            },
        )
        .await
        .unwrap();
    let real = h
        .engine
        .cleanup()
        .run(USER, &CleanupRequest::default())
        .await
        .unwrap();
    assert_eq!(preview.status, CleanupStatus::NoRules);
    assert_eq!(real.status, CleanupStatus::NoRules);
    assert_ne!(preview.message, real.message);

    add_rule(&h.store, RuleKind::Sender, "x.com", RuleAction::Delete).await;
    h.store
        .upsert_messages(&[cached("m1", "a@x.com", "hi", Utc::now())])
        .await
        .unwrap();

    let unselected = h
        .engine
        .cleanup()
        .run(
            USER,
            &CleanupRequest {
                only_ids: Some(vec!["other".to_string()]),
                ..CleanupRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unselected.status, CleanupStatus::NoneSelected);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn delete_of_message_gone_remotely_still_clears_cache() {
    let h = harness().await;
    add_rule(&h.store, RuleKind::Sender, "x.com", RuleAction::Delete).await;
    h.store
        .upsert_messages(&[cached("ghost", "a@x.com", "hi", Utc::now())])
        .await
        .unwrap();

    let outcome = h
        .engine
        .cleanup()
        .run(USER, &CleanupRequest::default())
        .await
        .unwrap();

    assert_eq!(outcome.processed_ids, vec!["ghost"]);
    assert!(outcome.failures.is_empty());
    assert!(cached_ids(&h.store).await.is_empty());
}

#[tokio::test]
async fn permanent_delete_bypasses_trash() {
    let h = harness().await;
    add_rule(&h.store, RuleKind::Sender, "x.com", RuleAction::Delete).await;
    h.store
        .upsert_messages(&[cached("m1", "a@x.com", "hi", Utc::now())])
        .await
        .unwrap();
    h.remote.insert(remote_message("m1", "a@x.com", "hi", 1));

    h.engine
        .cleanup()
        .run(
            USER,
            &CleanupRequest {
                permanent: true,
                ..CleanupRequest::default()
            },
        )
        .await
        .unwrap();

    assert!(h.remote.labels_of("m1").is_none());
    assert_eq!(trash_calls(&h.remote.calls()), 0);
}

#[tokio::test]
async fn archive_is_reissued_until_inbox_label_clears() {
    let remote = FakeRemote::new();
    remote.insert(remote_message("m1", "a@x.com", "hi", 1));
    remote.state().sticky_inbox.insert("m1".to_string(), 2);
    let policy = ArchivePolicy {
        retries: 3,
        backoff: std::time::Duration::from_millis(1),
    };

    archive_and_verify(remote.as_ref(), "m1", &policy).await.unwrap();

    let archives = remote
        .calls()
        .iter()
        .filter(|call| call.as_str() == "archive:m1")
        .count();
    assert_eq!(archives, 3);
    assert!(!remote.labels_of("m1").unwrap().contains(&labels::INBOX.to_string()));
}

#[tokio::test]
async fn archive_verification_gives_up_quietly() {
    let remote = FakeRemote::new();
    remote.insert(remote_message("m1", "a@x.com", "hi", 1));
    remote.state().sticky_inbox.insert("m1".to_string(), 100);
    let policy = ArchivePolicy {
        retries: 3,
        backoff: std::time::Duration::from_millis(1),
    };

    archive_and_verify(remote.as_ref(), "m1", &policy).await.unwrap();

    let archives = remote
        .calls()
        .iter()
        .filter(|call| call.as_str() == "archive:m1")
        .count();
    assert_eq!(archives, 4);
    assert_eq!(remote.calls().last().map(String::as_str), Some("has_label:m1"));
    assert!(remote.labels_of("m1").unwrap().contains(&labels::INBOX.to_string()));
}

#[tokio::test]
async fn last_reissued_archive_is_checked() {
    let remote = FakeRemote::new();
    remote.insert(remote_message("m1", "a@x.com", "hi", 1));
    remote.state().sticky_inbox.insert("m1".to_string(), 3);
    let policy = ArchivePolicy {
        retries: 3,
        backoff: std::time::Duration::from_millis(1),
    };

    archive_and_verify(remote.as_ref(), "m1", &policy).await.unwrap();

    let calls = remote.calls();
    let archives = calls.iter().filter(|call| call.as_str() == "archive:m1").count();
    let checks = calls.iter().filter(|call| call.as_str() == "has_label:m1").count();
    assert_eq!(archives, 4);
    assert_eq!(checks, 4);
    assert_eq!(calls.last().map(String::as_str), Some("has_label:m1"));
    assert!(!remote.labels_of("m1").unwrap().contains(&labels::INBOX.to_string()));
}

#[tokio::test]
async fn restore_puts_archived_mail_back_in_the_archive() {
    let h = harness().await;
    let mut archived = remote_message("m1", "a@x.com", "hi", 1);
    archived.label_ids = vec![labels::UNREAD.to_string()];
    h.remote.insert(archived);
    h.store
        .upsert_messages(&[cached("m1", "a@x.com", "hi", Utc::now())])
        .await
        .unwrap();

    let trashed = h.engine.cleanup().trash_message(USER, "m1").await.unwrap();
    assert_eq!(trashed, TrashOutcome::Trashed { had_inbox: false });
    assert!(cached_ids(&h.store).await.is_empty());
    assert!(h.store.get_trash_origin(USER, "m1").await.unwrap().is_some());

    let placement = h.engine.cleanup().restore_message(USER, "m1").await.unwrap();
    assert_eq!(placement, RestorePlacement::Archived);
    let labels_now = h.remote.labels_of("m1").unwrap();
    assert!(!labels_now.contains(&labels::INBOX.to_string()));
    assert!(!labels_now.contains(&labels::TRASH.to_string()));
    assert!(h.store.get_trash_origin(USER, "m1").await.unwrap().is_none());
}

#[tokio::test]
async fn restore_returns_inbox_mail_to_the_inbox() {
    let h = harness().await;
    h.remote.insert(remote_message("m1", "a@x.com", "hi", 1));

    let trashed = h.engine.cleanup().trash_message(USER, "m1").await.unwrap();
    assert_eq!(trashed, TrashOutcome::Trashed { had_inbox: true });

    let placement = h.engine.cleanup().restore_message(USER, "m1").await.unwrap();
    assert_eq!(placement, RestorePlacement::Inbox);
    assert!(h.remote.labels_of("m1").unwrap().contains(&labels::INBOX.to_string()));
}

#[tokio::test]
async fn trashing_a_vanished_message_drops_it_from_cache() {
    let h = harness().await;
    h.store
        .upsert_messages(&[cached("gone", "a@x.com", "hi", Utc::now())])
        .await
        .unwrap();

    let outcome = h.engine.cleanup().trash_message(USER, "gone").await.unwrap();

    assert_eq!(outcome, TrashOutcome::AlreadyGone);
    assert!(cached_ids(&h.store).await.is_empty());
    assert!(h.store.get_trash_origin(USER, "gone").await.unwrap().is_none());
}

#[tokio::test]
async fn failed_trash_forgets_the_origin() {
    let h = harness().await;
    h.remote.insert(remote_message("m1", "a@x.com", "hi", 1));
    h.remote.state().failing.insert("m1".to_string());

    assert!(h.engine.cleanup().trash_message(USER, "m1").await.is_err());
    assert!(h.store.get_trash_origin(USER, "m1").await.unwrap().is_none());
}

#[tokio::test]
async fn stats_combine_cache_and_remote_counts() {
    let h = harness().await;
    h.store
        .upsert_messages(&[
            cached("m1", "a@x.com", "one", Utc::now()),
            cached("m2", "b@x.com", "two", Utc::now()),
        ])
        .await
        .unwrap();
    let mut trashed = remote_message("t1", "a@x.com", "old", 1);
    trashed.label_ids = vec![labels::TRASH.to_string()];
    let mut archived = remote_message("a1", "a@x.com", "kept", 2);
    archived.label_ids = Vec::new();
    h.remote.insert(trashed);
    h.remote.insert(archived);
    h.remote.insert(remote_message("i1", "a@x.com", "new", 3));

    let stats = h.engine.stats(USER).await.unwrap();

    assert_eq!(stats.synced, 2);
    assert_eq!(stats.trash, 1);
    assert_eq!(stats.archived, 1);
}

#[tokio::test]
async fn mailto_unsubscribe_sends_a_request() {
    let h = harness().await;

    let outcome = h
        .engine
        .unsubscribe(
            USER,
            "<https://list.example.com/leave>, <mailto:leave@list.example.com?subject=remove%20me>",
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        UnsubscribeOutcome::MailSent {
            to: "leave@list.example.com".to_string()
        }
    );
    let sent = h.remote.state().sent.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, USER);
    assert_eq!(sent[0].subject, "remove me");
}

#[tokio::test]
async fn web_only_unsubscribe_returns_the_link() {
    let h = harness().await;

    let outcome = h
        .engine
        .unsubscribe(USER, "<https://list.example.com/leave?u=1>")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        UnsubscribeOutcome::HttpLink {
            url: "https://list.example.com/leave?u=1".to_string()
        }
    );
    assert!(h.remote.state().sent.is_empty());
    assert!(h.engine.unsubscribe(USER, "nothing useful").await.is_err());
}
