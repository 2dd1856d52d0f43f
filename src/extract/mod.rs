//! Per-source risk extractors.
//!
//! Each submodule is a pure pass over one source's normalized records and
//! produces [`Evidence`] items — `(subject, tag, points, payload)` tuples.
//! Extractors tolerate empty inputs (zero evidence, not an error) and never
//! let one bad record abort the rest of the batch.

pub mod app_registrations;
pub mod audit;
pub mod conditional_access;
pub mod delegations;
pub mod inbox_rules;
pub mod signin;

use serde::Serialize;

/// Synthetic subject for findings with no natural per-user owner
/// (app registrations, Conditional Access).
pub const TENANT_WIDE_SUBJECT: &str = "TENANT-WIDE";

/// Closed set of evidence source tags. Each evidence item carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceTag {
    UnusualSignIn,
    FailedSignIn,
    HighRiskAdminOp,
    SuspiciousInboxRule,
    SuspiciousDelegation,
    HighRiskAppRegistration,
    EtrSpamFinding,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::UnusualSignIn => "UnusualSignIn",
            SourceTag::FailedSignIn => "FailedSignIn",
            SourceTag::HighRiskAdminOp => "HighRiskAdminOp",
            SourceTag::SuspiciousInboxRule => "SuspiciousInboxRule",
            SourceTag::SuspiciousDelegation => "SuspiciousDelegation",
            SourceTag::HighRiskAppRegistration => "HighRiskAppRegistration",
            SourceTag::EtrSpamFinding => "ETRSpamFinding",
        }
    }

    /// All tags, in report column order.
    pub fn all() -> [SourceTag; 7] {
        [
            SourceTag::UnusualSignIn,
            SourceTag::FailedSignIn,
            SourceTag::HighRiskAdminOp,
            SourceTag::SuspiciousInboxRule,
            SourceTag::SuspiciousDelegation,
            SourceTag::HighRiskAppRegistration,
            SourceTag::EtrSpamFinding,
        ]
    }
}

/// One fact contributing to a subject's risk. Immutable once created and
/// attributed to exactly one subject for the lifetime of the run.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub subject: String,
    pub tag: SourceTag,
    pub points: i64,
    pub description: String,
    /// The original normalized record, retained for report rendering.
    pub payload: serde_json::Value,
}

impl Evidence {
    pub fn new(
        subject: impl Into<String>,
        tag: SourceTag,
        points: i64,
        description: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            subject: subject.into(),
            tag,
            points,
            description: description.into(),
            payload,
        }
    }
}
