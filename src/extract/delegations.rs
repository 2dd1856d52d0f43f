//! Mailbox delegation extractor.
//!
//! Flags delegations where the delegate's domain is neither the tenant's
//! onmicrosoft.com domain nor its primary verified domain, and delegations
//! granting FullAccess or SendAs. Either condition contributes +8 to the
//! mailbox owner.

use crate::config::AnalysisConfig;
use crate::extract::{Evidence, SourceTag};
use crate::records::DelegationRecord;
use serde_json::json;
use tracing::debug;

pub fn extract(records: &[DelegationRecord], config: &AnalysisConfig) -> Vec<Evidence> {
    let mut evidence = Vec::new();

    for record in records {
        let subject = record.mailbox.trim();
        if subject.is_empty() {
            debug!("skipping delegation record with no mailbox");
            continue;
        }

        let mut reasons = Vec::new();

        let delegate_domain = record.delegate_domain();
        if !delegate_domain.is_empty() && !config.is_tenant_domain(&delegate_domain) {
            reasons.push(format!("Delegate is outside the tenant ({})", delegate_domain));
        }

        let rights = record.access_rights.to_lowercase();
        if rights.contains("fullaccess") {
            reasons.push("Delegate holds FullAccess".to_string());
        }
        if rights.contains("sendas") {
            reasons.push("Delegate holds SendAs".to_string());
        }

        if reasons.is_empty() {
            continue;
        }

        evidence.push(Evidence::new(
            subject,
            SourceTag::SuspiciousDelegation,
            config.weights.suspicious_delegation,
            format!(
                "Suspicious delegation to {}: {}",
                if record.delegate.is_empty() {
                    "Unknown"
                } else {
                    &record.delegate
                },
                reasons.join("; "),
            ),
            json!({
                "mailbox": record.mailbox,
                "delegate": record.delegate,
                "accessRights": record.access_rights,
                "reasons": reasons,
            }),
        ));
    }

    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_config() -> AnalysisConfig {
        AnalysisConfig {
            onmicrosoft_domain: "contoso.onmicrosoft.com".into(),
            primary_domain: "contoso.com".into(),
            ..Default::default()
        }
    }

    fn record(mailbox: &str, delegate: &str, rights: &str) -> DelegationRecord {
        DelegationRecord {
            mailbox: mailbox.into(),
            delegate: delegate.into(),
            access_rights: rights.into(),
        }
    }

    #[test]
    fn external_delegate_flagged() {
        let config = tenant_config();
        let records = vec![record("ceo@contoso.com", "vendor@partner.io", "ReadPermission")];
        let evidence = extract(&records, &config);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].points, 8);
        assert!(evidence[0].description.contains("outside the tenant"));
    }

    #[test]
    fn full_access_flagged_even_for_tenant_delegate() {
        let config = tenant_config();
        let records = vec![record("ceo@contoso.com", "it@contoso.com", "FullAccess")];
        let evidence = extract(&records, &config);
        assert_eq!(evidence.len(), 1);
        assert!(evidence[0].description.contains("FullAccess"));
    }

    #[test]
    fn send_as_flagged() {
        let config = tenant_config();
        let records = vec![record("ceo@contoso.com", "it@contoso.com", "SendAs, ReadPermission")];
        let evidence = extract(&records, &config);
        assert_eq!(evidence.len(), 1);
        assert!(evidence[0].description.contains("SendAs"));
    }

    #[test]
    fn tenant_delegate_with_benign_rights_not_flagged() {
        let config = tenant_config();
        let records = vec![record("ceo@contoso.com", "ea@contoso.onmicrosoft.com", "ReadPermission")];
        assert!(extract(&records, &config).is_empty());
    }

    #[test]
    fn missing_mailbox_skipped() {
        let config = tenant_config();
        let records = vec![record("", "vendor@partner.io", "FullAccess")];
        assert!(extract(&records, &config).is_empty());
    }
}
