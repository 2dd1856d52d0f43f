//! Inbox rule extractor.
//!
//! A rule is suspicious when it forwards or redirects messages, deletes them,
//! moves them to a Deleted-Items-like folder, or forwards to an address
//! outside the mailbox owner's domain. Any one condition marks the rule
//! (+15); all matched reasons are kept for the report.

use crate::config::AnalysisConfig;
use crate::extract::{Evidence, SourceTag};
use crate::records::InboxRuleRecord;
use serde_json::json;
use tracing::debug;

/// Folder names that behave like Deleted Items for hiding evidence.
const DELETED_FOLDER_MARKERS: [&str; 4] = ["deleted", "trash", "junk", "rss"];

/// Reasons a rule was flagged, in evaluation order.
pub fn suspicion_reasons(rule: &InboxRuleRecord, owner_domain: &str) -> Vec<String> {
    let mut reasons = Vec::new();

    if !rule.forward_to.is_empty() || !rule.redirect_to.is_empty() {
        reasons.push("Forwards or redirects messages".to_string());
    }

    if rule.delete_message {
        reasons.push("Deletes messages".to_string());
    }

    let folder = rule.move_to_folder.to_lowercase();
    if !folder.is_empty() && DELETED_FOLDER_MARKERS.iter().any(|m| folder.contains(m)) {
        reasons.push(format!("Moves messages to '{}'", rule.move_to_folder));
    }

    if !owner_domain.is_empty() && has_external_target(rule, owner_domain) {
        reasons.push("Forwards to external address".to_string());
    }

    reasons
}

/// True when any forward/redirect target's domain differs from the owner's.
fn has_external_target(rule: &InboxRuleRecord, owner_domain: &str) -> bool {
    split_addresses(&rule.forward_to)
        .chain(split_addresses(&rule.redirect_to))
        .any(|addr| {
            addr.rsplit_once('@')
                .map(|(_, domain)| !domain.trim().eq_ignore_ascii_case(owner_domain))
                .unwrap_or(false)
        })
}

fn split_addresses(list: &str) -> impl Iterator<Item = &str> {
    list.split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn extract(records: &[InboxRuleRecord], config: &AnalysisConfig) -> Vec<Evidence> {
    let mut evidence = Vec::new();

    for rule in records {
        let subject = rule.mailbox_owner.trim();
        if subject.is_empty() {
            debug!("skipping inbox rule with no mailbox owner");
            continue;
        }

        let owner_domain = subject
            .rsplit_once('@')
            .map(|(_, d)| d.trim().to_string())
            .unwrap_or_default();

        let reasons = suspicion_reasons(rule, &owner_domain);
        if reasons.is_empty() {
            continue;
        }

        evidence.push(Evidence::new(
            subject,
            SourceTag::SuspiciousInboxRule,
            config.weights.suspicious_inbox_rule,
            format!(
                "Suspicious inbox rule '{}': {}",
                if rule.rule_name.is_empty() {
                    "Unnamed"
                } else {
                    &rule.rule_name
                },
                reasons.join("; "),
            ),
            json!({
                "mailboxOwner": rule.mailbox_owner,
                "ruleName": rule.rule_name,
                "forwardTo": rule.forward_to,
                "redirectTo": rule.redirect_to,
                "moveToFolder": rule.move_to_folder,
                "deleteMessage": rule.delete_message,
                "enabled": rule.enabled,
                "reasons": reasons,
            }),
        ));
    }

    evidence
}
