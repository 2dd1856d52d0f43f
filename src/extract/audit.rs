//! Admin audit log extractor.
//!
//! Pattern-matches activity names for high-risk directory operations:
//! adding/removing permissions and adding/removing role members. Each hit
//! contributes +10 to the initiating account.

use crate::config::AnalysisConfig;
use crate::extract::{Evidence, SourceTag};
use crate::records::AuditRecord;
use serde_json::json;
use tracing::debug;

/// Activity-name fragments that mark a directory operation as high-risk.
const HIGH_RISK_PATTERNS: [&str; 8] = [
    "add member to role",
    "remove member from role",
    "add app role assignment",
    "remove app role assignment",
    "add delegated permission grant",
    "remove delegated permission grant",
    "add application permission",
    "remove application permission",
];

/// True when the activity name matches a high-risk operation pattern.
pub fn is_high_risk_operation(activity: &str) -> bool {
    let activity = activity.to_lowercase();
    if HIGH_RISK_PATTERNS.iter().any(|p| activity.contains(p)) {
        return true;
    }
    // Generic fallback for export variants that shorten the activity name.
    let verb = activity.contains("add") || activity.contains("remove");
    let target = activity.contains("permission") || activity.contains("role member");
    verb && target
}

pub fn extract(records: &[AuditRecord], config: &AnalysisConfig) -> Vec<Evidence> {
    let mut evidence = Vec::new();

    for record in records {
        let subject = record.initiated_by.trim();
        if subject.is_empty() {
            debug!("skipping audit record with no initiator");
            continue;
        }

        if !is_high_risk_operation(&record.activity) {
            continue;
        }

        evidence.push(Evidence::new(
            subject,
            SourceTag::HighRiskAdminOp,
            config.weights.high_risk_admin_op,
            format!("High-risk admin operation: {}", record.activity),
            json!({
                "activity": record.activity,
                "initiatedBy": record.initiated_by,
                "target": record.target,
                "activityDateTime": record.activity_date_time,
            }),
        ));
    }

    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(activity: &str, actor: &str) -> AuditRecord {
        AuditRecord {
            activity: activity.into(),
            initiated_by: actor.into(),
            ..Default::default()
        }
    }

    #[test]
    fn role_member_changes_are_high_risk() {
        assert!(is_high_risk_operation("Add member to role"));
        assert!(is_high_risk_operation("Remove member from role"));
        assert!(is_high_risk_operation("ADD MEMBER TO ROLE"));
    }

    #[test]
    fn permission_grants_are_high_risk() {
        assert!(is_high_risk_operation("Add delegated permission grant"));
        assert!(is_high_risk_operation("Add application permission"));
        assert!(is_high_risk_operation("Remove app role assignment"));
    }

    #[test]
    fn routine_operations_are_not() {
        assert!(!is_high_risk_operation("Update user"));
        assert!(!is_high_risk_operation("Reset password"));
        assert!(!is_high_risk_operation(""));
    }

    #[test]
    fn high_risk_op_scores_ten() {
        let config = AnalysisConfig::default();
        let records = vec![
            record("Add member to role", "admin@x.com"),
            record("Update user", "admin@x.com"),
        ];
        let evidence = extract(&records, &config);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].points, 10);
        assert_eq!(evidence[0].tag, SourceTag::HighRiskAdminOp);
        assert_eq!(evidence[0].subject, "admin@x.com");
    }

    #[test]
    fn missing_initiator_skipped() {
        let config = AnalysisConfig::default();
        let records = vec![record("Add member to role", "")];
        assert!(extract(&records, &config).is_empty());
    }
}
