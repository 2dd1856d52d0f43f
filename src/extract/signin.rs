//! Sign-in log extractor.
//!
//! Flags successful sign-ins from countries outside the allow-list (+5) and
//! successful sign-ins Entra marked high-risk (+15); both can stack on one
//! record. Unusual locations on *failed* sign-ins are tracked for the report
//! but contribute zero points — inherited behavior, kept deliberately.

use crate::config::AnalysisConfig;
use crate::extract::{Evidence, SourceTag};
use crate::records::SignInRecord;
use serde_json::json;
use tracing::debug;

/// Result of the sign-in pass: evidence plus the unusual-location source IPs,
/// which feed the mail-trace risky-IP correlation pass.
#[derive(Debug, Default)]
pub struct SignInFindings {
    pub evidence: Vec<Evidence>,
    pub risky_ips: Vec<String>,
}

pub fn extract(records: &[SignInRecord], config: &AnalysisConfig) -> SignInFindings {
    let mut findings = SignInFindings::default();

    for record in records {
        let subject = record.user_principal_name.trim();
        if subject.is_empty() {
            debug!("skipping sign-in record with no user principal name");
            continue;
        }

        let payload = json!({
            "userPrincipalName": record.user_principal_name,
            "ipAddress": record.ip_address,
            "country": record.country,
            "riskLevel": record.risk_level,
            "status": record.status,
            "appDisplayName": record.app_display_name,
            "createdDateTime": record.created_date_time,
        });

        let unusual_location = !config.is_allowed_country(&record.country);

        if unusual_location {
            let ip = record.ip_address.trim();
            if !ip.is_empty() && !findings.risky_ips.iter().any(|r| r == ip) {
                findings.risky_ips.push(ip.to_string());
            }

            if record.succeeded() {
                findings.evidence.push(Evidence::new(
                    subject,
                    SourceTag::UnusualSignIn,
                    config.weights.unusual_signin,
                    format!(
                        "Successful sign-in from unusual location: {} ({})",
                        display_or_unknown(&record.country),
                        display_or_unknown(&record.ip_address),
                    ),
                    payload.clone(),
                ));
            } else {
                // Tracked but zero-weighted.
                findings.evidence.push(Evidence::new(
                    subject,
                    SourceTag::FailedSignIn,
                    0,
                    format!(
                        "Failed sign-in from unusual location: {} ({})",
                        display_or_unknown(&record.country),
                        display_or_unknown(&record.ip_address),
                    ),
                    payload.clone(),
                ));
            }
        }

        if record.risk_level.eq_ignore_ascii_case("high") && record.succeeded() {
            findings.evidence.push(Evidence::new(
                subject,
                SourceTag::UnusualSignIn,
                config.weights.high_risk_signin,
                format!(
                    "Successful sign-in flagged high-risk by identity protection ({})",
                    display_or_unknown(&record.ip_address),
                ),
                payload,
            ));
        }
    }

    findings
}

fn display_or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "Unknown"
    } else {
        value
    }
}
