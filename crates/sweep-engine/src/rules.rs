//! Rule matching against cached messages.

use chrono::{DateTime, Duration, Utc};
use sweep_core::{CachedMessage, Rule, RuleKind};

/// Whether `message` satisfies `rule` at instant `now`.
///
/// Text comparisons are case-insensitive substring tests. A positive
/// `age_days` additionally requires the message to be strictly older than
/// that many days. Unknown rule kinds never match.
pub fn matches(message: &CachedMessage, rule: &Rule, now: DateTime<Utc>) -> bool {
    let needle = rule.value.to_lowercase();
    let content_match = match &rule.kind {
        RuleKind::Sender => contains_folded(&message.sender, &needle),
        RuleKind::Subject => contains_folded(&message.subject, &needle),
        RuleKind::Keyword => {
            contains_folded(&message.subject, &needle)
                || contains_folded(&message.snippet, &needle)
        }
        RuleKind::Unknown(_) => return false,
    };

    if rule.age_days <= 0 {
        return content_match;
    }

    content_match && now.signed_duration_since(message.date) > Duration::days(i64::from(rule.age_days))
}

/// First rule in `rules` that matches; later rules are not evaluated.
pub fn first_match<'a>(
    message: &CachedMessage,
    rules: &'a [Rule],
    now: DateTime<Utc>,
) -> Option<&'a Rule> {
    rules.iter().find(|rule| matches(message, rule, now))
}

fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    haystack.to_lowercase().contains(folded_needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sweep_core::RuleAction;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn message(sender: &str, subject: &str, snippet: &str, age: Duration) -> CachedMessage {
        CachedMessage {
            id: "m1".to_string(),
            user_id: "u1".to_string(),
            sender: sender.to_string(),
            subject: subject.to_string(),
            snippet: snippet.to_string(),
            date: now() - age,
            read: false,
            was_in_inbox: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn rule(kind: RuleKind, value: &str, action: RuleAction, age_days: i32) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            kind,
            value: value.to_string(),
            action,
            age_days,
            position: 0,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn each_kind_checks_its_own_fields() {
        let msg = message(
            "News Letter <newsletter@x.com>",
            "Weekly DIGEST",
            "big summer sale inside",
            Duration::hours(1),
        );

        assert!(matches(&msg, &rule(RuleKind::Sender, "NEWSLETTER@x.com", RuleAction::Delete, 0), now()));
        assert!(!matches(&msg, &rule(RuleKind::Sender, "digest", RuleAction::Delete, 0), now()));
        assert!(matches(&msg, &rule(RuleKind::Subject, "digest", RuleAction::Delete, 0), now()));
        assert!(!matches(&msg, &rule(RuleKind::Subject, "sale", RuleAction::Delete, 0), now()));
        assert!(matches(&msg, &rule(RuleKind::Keyword, "SALE", RuleAction::Delete, 0), now()));
        assert!(matches(&msg, &rule(RuleKind::Keyword, "weekly", RuleAction::Delete, 0), now()));
        assert!(!matches(&msg, &rule(RuleKind::Keyword, "newsletter", RuleAction::Delete, 0), now()));
    }

    #[test]
    fn unknown_kind_never_matches() {
        let msg = message("a@x.com", "anything", "anything", Duration::days(400));
        let unknown = rule(RuleKind::from("regex"), "", RuleAction::Delete, 0);
        assert!(!matches(&msg, &unknown, now()));
    }

    #[test]
    fn zero_age_depends_only_on_content() {
        let senders = ["alice@x.com", "BOB@Y.ORG", "", "promo <deals@shop.io>"];
        let values = ["x.com", "bob", "", "DEALS", "nomatch"];
        let ages = [Duration::zero(), Duration::days(3), Duration::days(3650)];

        for sender in senders {
            for value in values {
                let expected = sender.to_lowercase().contains(&value.to_lowercase());
                for age in ages {
                    for age_days in [0, -5] {
                        let msg = message(sender, "s", "n", age);
                        let r = rule(RuleKind::Sender, value, RuleAction::Archive, age_days);
                        assert_eq!(
                            matches(&msg, &r, now()),
                            expected,
                            "sender={sender:?} value={value:?} age={age:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn positive_age_requires_strictly_older_messages() {
        let r = rule(RuleKind::Subject, "invoice", RuleAction::Archive, 7);

        for days in [8, 30, 365] {
            let old = message("a@x.com", "Invoice", "", Duration::days(days));
            assert!(matches(&old, &r, now()), "{days} days old should match");
        }
        for hours in [0, 1, 24 * 6, 24 * 7] {
            let young = message("a@x.com", "Invoice", "", Duration::hours(hours));
            assert!(!matches(&young, &r, now()), "{hours} hours old should not match");
        }

        let old_but_unrelated = message("a@x.com", "Receipt", "", Duration::days(30));
        assert!(!matches(&old_but_unrelated, &r, now()));
    }

    #[test]
    fn first_matching_rule_decides_the_action() {
        let msg = message("newsletter@x.com", "Weekly digest", "", Duration::days(1));
        let rules = vec![
            rule(RuleKind::Subject, "nothing", RuleAction::Delete, 0),
            rule(RuleKind::Sender, "newsletter", RuleAction::Archive, 0),
            rule(RuleKind::Subject, "digest", RuleAction::Delete, 0),
        ];

        let chosen = first_match(&msg, &rules, now()).unwrap();
        assert_eq!(chosen.action, RuleAction::Archive);

        let reversed: Vec<_> = rules.iter().rev().cloned().collect();
        let chosen = first_match(&msg, &reversed, now()).unwrap();
        assert_eq!(chosen.action, RuleAction::Delete);

        assert!(first_match(&msg, &[], now()).is_none());
    }
}
