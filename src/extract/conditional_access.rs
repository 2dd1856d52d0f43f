//! Conditional Access policy checks.
//!
//! CA findings are tenant-wide and carry no subject score; they surface in
//! the report's tenant findings section. A policy is flagged when it is
//! disabled, was modified within the last 7 days, or explicitly excludes
//! admin roles.

use crate::records::CaPolicyRecord;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Window after a modification during which a policy is considered recently
/// tampered with.
const RECENT_CHANGE_DAYS: i64 = 7;

/// One tenant-wide Conditional Access finding.
#[derive(Debug, Clone, Serialize)]
pub struct CaFinding {
    pub policy_name: String,
    pub reasons: Vec<String>,
}

pub fn extract(records: &[CaPolicyRecord]) -> Vec<CaFinding> {
    extract_at(records, Utc::now())
}

/// Evaluation against an explicit "now" so the 7-day window is testable.
pub fn extract_at(records: &[CaPolicyRecord], now: DateTime<Utc>) -> Vec<CaFinding> {
    let mut findings = Vec::new();

    for policy in records {
        let mut reasons = Vec::new();

        if policy.state.eq_ignore_ascii_case("disabled") {
            reasons.push("Policy is disabled".to_string());
        }

        if let Ok(modified) = DateTime::parse_from_rfc3339(&policy.modified_date_time) {
            if now.signed_duration_since(modified.with_timezone(&Utc))
                < Duration::days(RECENT_CHANGE_DAYS)
            {
                reasons.push(format!(
                    "Modified within the last {} days ({})",
                    RECENT_CHANGE_DAYS, policy.modified_date_time
                ));
            }
        }

        if policy.excluded_roles.to_lowercase().contains("admin") {
            reasons.push(format!(
                "Excludes admin roles ({})",
                policy.excluded_roles
            ));
        }

        if reasons.is_empty() {
            continue;
        }

        findings.push(CaFinding {
            policy_name: if policy.display_name.is_empty() {
                "Unnamed policy".to_string()
            } else {
                policy.display_name.clone()
            },
            reasons,
        });
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(name: &str, state: &str, modified: &str, excluded: &str) -> CaPolicyRecord {
        CaPolicyRecord {
            display_name: name.into(),
            state: state.into(),
            modified_date_time: modified.into(),
            excluded_roles: excluded.into(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn disabled_policy_flagged() {
        let findings = extract_at(
            &[policy("Require MFA", "disabled", "", "")],
            now(),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].reasons, vec!["Policy is disabled"]);
    }

    #[test]
    fn recent_modification_flagged() {
        let findings = extract_at(
            &[policy("Require MFA", "enabled", "2024-06-12T08:00:00Z", "")],
            now(),
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].reasons[0].contains("Modified within"));
    }

    #[test]
    fn old_modification_not_flagged() {
        let findings = extract_at(
            &[policy("Require MFA", "enabled", "2024-01-01T00:00:00Z", "")],
            now(),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn admin_role_exclusion_flagged() {
        let findings = extract_at(
            &[policy("Require MFA", "enabled", "", "Global Administrator")],
            now(),
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].reasons[0].contains("Excludes admin roles"));
    }

    #[test]
    fn unparseable_modified_date_ignored() {
        let findings = extract_at(
            &[policy("Require MFA", "enabled", "yesterday", "")],
            now(),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn multiple_reasons_accumulate() {
        let findings = extract_at(
            &[policy("Block legacy auth", "disabled", "2024-06-14T00:00:00Z", "Exchange Administrator")],
            now(),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].reasons.len(), 3);
    }
}
