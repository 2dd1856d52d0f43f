//! App registration extractor.
//!
//! Apps requiring a permission from the high-risk list contribute +20 to the
//! synthetic tenant-wide subject (app registrations have no per-user owner).
//! Apps with neither a homepage nor a publisher domain are tagged as Medium
//! findings with zero point contribution.

use crate::config::AnalysisConfig;
use crate::extract::{Evidence, SourceTag, TENANT_WIDE_SUBJECT};
use crate::records::AppRegistrationRecord;
use serde_json::json;

pub fn extract(records: &[AppRegistrationRecord], config: &AnalysisConfig) -> Vec<Evidence> {
    let mut evidence = Vec::new();

    for app in records {
        let name = if app.display_name.is_empty() {
            "Unknown"
        } else {
            &app.display_name
        };

        let payload = json!({
            "displayName": app.display_name,
            "appId": app.app_id,
            "requiredPermissionIds": app.required_permission_ids,
            "homepage": app.homepage,
            "publisherDomain": app.publisher_domain,
            "createdDateTime": app.created_date_time,
        });

        let risky_permissions: Vec<&String> = app
            .required_permission_ids
            .iter()
            .filter(|id| {
                config
                    .high_risk_permission_ids
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(id))
            })
            .collect();

        if !risky_permissions.is_empty() {
            evidence.push(Evidence::new(
                TENANT_WIDE_SUBJECT,
                SourceTag::HighRiskAppRegistration,
                config.weights.high_risk_app,
                format!(
                    "App '{}' requires {} high-risk permission(s)",
                    name,
                    risky_permissions.len(),
                ),
                payload,
            ));
        } else if app.homepage.is_empty() && app.publisher_domain.is_empty() {
            // Medium: tagged only, no score contribution.
            evidence.push(Evidence::new(
                TENANT_WIDE_SUBJECT,
                SourceTag::HighRiskAppRegistration,
                0,
                format!("App '{}' has no homepage and no publisher domain", name),
                payload,
            ));
        }
    }

    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> AppRegistrationRecord {
        AppRegistrationRecord {
            display_name: name.into(),
            homepage: "https://app.contoso.com".into(),
            publisher_domain: "contoso.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn high_risk_permission_attributed_tenant_wide() {
        let config = AnalysisConfig::default();
        let mut a = app("Mail Sync");
        // Mail.ReadWrite from the default high-risk list
        a.required_permission_ids = vec!["e2a3a72e-5f79-4c64-b1b1-878b674786c9".into()];

        let evidence = extract(&[a], &config);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].subject, TENANT_WIDE_SUBJECT);
        assert_eq!(evidence[0].points, 20);
        assert_eq!(evidence[0].tag, SourceTag::HighRiskAppRegistration);
    }

    #[test]
    fn anonymous_app_tagged_without_points() {
        let config = AnalysisConfig::default();
        let a = AppRegistrationRecord {
            display_name: "Mystery App".into(),
            ..Default::default()
        };

        let evidence = extract(&[a], &config);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].points, 0);
        assert!(evidence[0].description.contains("no homepage"));
    }

    #[test]
    fn benign_app_produces_nothing() {
        let config = AnalysisConfig::default();
        let mut a = app("Legit App");
        a.required_permission_ids = vec!["00000000-0000-0000-0000-000000000000".into()];
        assert!(extract(&[a], &config).is_empty());
    }

    #[test]
    fn risky_permission_wins_over_anonymous_tag() {
        let config = AnalysisConfig::default();
        let a = AppRegistrationRecord {
            display_name: "Shady".into(),
            required_permission_ids: vec!["b633e1c5-b582-4048-a93e-9f11b44c7e96".into()],
            ..Default::default()
        };
        let evidence = extract(&[a], &config);
        // one evidence item, the scored one
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].points, 20);
    }
}
