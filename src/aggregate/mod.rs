//! Risk aggregation.
//!
//! Merges evidence from every available source into one ranked list of
//! subject risk records. Subjects are keyed by trimmed identifier with
//! case-sensitive equality, created lazily on first reference and never
//! deleted. The risk score is always recomputed as the sum of evidence
//! points — it is never stored or mutated independently.

use crate::config::TierThresholds;
use crate::extract::{Evidence, SourceTag};
use serde::Serialize;
use std::collections::HashMap;

/// Risk classification derived from the score. Boundaries are inclusive on
/// the lower end: score 50 is Critical, 49 is High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskTier {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskTier {
    pub fn from_score(score: i64, thresholds: &TierThresholds) -> Self {
        if score >= thresholds.critical {
            RiskTier::Critical
        } else if score >= thresholds.high {
            RiskTier::High
        } else if score >= thresholds.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Critical => "Critical",
            RiskTier::High => "High",
            RiskTier::Medium => "Medium",
            RiskTier::Low => "Low",
        }
    }

    /// Severity rank for ordering: lower is more severe.
    pub fn severity_rank(&self) -> u8 {
        match self {
            RiskTier::Critical => 0,
            RiskTier::High => 1,
            RiskTier::Medium => 2,
            RiskTier::Low => 3,
        }
    }
}

/// A subject with its accumulated evidence. Rebuilt from scratch on every
/// analysis run; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectRiskRecord {
    pub subject: String,
    /// All evidence in insertion (processing) order.
    pub evidence: Vec<Evidence>,
}

impl SubjectRiskRecord {
    /// Sum of evidence point values. Recomputed on demand — the invariant
    /// `score == sum(points)` holds by construction.
    pub fn score(&self) -> i64 {
        self.evidence.iter().map(|e| e.points).sum()
    }

    pub fn tier(&self, thresholds: &TierThresholds) -> RiskTier {
        RiskTier::from_score(self.score(), thresholds)
    }

    /// Evidence items for one tag, preserving insertion order.
    pub fn evidence_for(&self, tag: SourceTag) -> impl Iterator<Item = &Evidence> {
        self.evidence.iter().filter(move |e| e.tag == tag)
    }

    pub fn count_for(&self, tag: SourceTag) -> usize {
        self.evidence_for(tag).count()
    }
}

/// Merges evidence streams into ranked subject risk records.
///
/// Ordering: descending score, then ascending subject identifier. The
/// secondary key makes the ranking deterministic regardless of input file
/// ordering.
pub fn aggregate(evidence: Vec<Evidence>) -> Vec<SubjectRiskRecord> {
    let mut records: Vec<SubjectRiskRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in evidence {
        let key = item.subject.trim().to_string();
        if key.is_empty() {
            continue;
        }

        let idx = *index.entry(key.clone()).or_insert_with(|| {
            records.push(SubjectRiskRecord {
                subject: key,
                evidence: Vec::new(),
            });
            records.len() - 1
        });
        records[idx].evidence.push(item);
    }

    records.sort_by(|a, b| {
        b.score()
            .cmp(&a.score())
            .then_with(|| a.subject.cmp(&b.subject))
    });
    records
}

/// Per-tier counts for the report summary.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct TierCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

pub fn tier_counts(records: &[SubjectRiskRecord], thresholds: &TierThresholds) -> TierCounts {
    let mut counts = TierCounts::default();
    for record in records {
        match record.tier(thresholds) {
            RiskTier::Critical => counts.critical += 1,
            RiskTier::High => counts.high += 1,
            RiskTier::Medium => counts.medium += 1,
            RiskTier::Low => counts.low += 1,
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(subject: &str, tag: SourceTag, points: i64) -> Evidence {
        Evidence::new(subject, tag, points, "test", json!({}))
    }

    #[test]
    fn tier_boundaries_are_inclusive_lower() {
        let t = TierThresholds::default();
        assert_eq!(RiskTier::from_score(50, &t), RiskTier::Critical);
        assert_eq!(RiskTier::from_score(49, &t), RiskTier::High);
        assert_eq!(RiskTier::from_score(30, &t), RiskTier::High);
        assert_eq!(RiskTier::from_score(29, &t), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(15, &t), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(14, &t), RiskTier::Low);
        assert_eq!(RiskTier::from_score(0, &t), RiskTier::Low);
    }

    #[test]
    fn score_equals_sum_of_evidence_points() {
        let records = aggregate(vec![
            ev("a@x.com", SourceTag::UnusualSignIn, 5),
            ev("a@x.com", SourceTag::UnusualSignIn, 15),
            ev("a@x.com", SourceTag::SuspiciousInboxRule, 15),
            ev("a@x.com", SourceTag::FailedSignIn, 0),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score(), 35);
        assert_eq!(records[0].evidence.len(), 4);
    }

    #[test]
    fn subjects_keyed_trimmed_case_sensitive() {
        let records = aggregate(vec![
            ev("  a@x.com ", SourceTag::UnusualSignIn, 5),
            ev("a@x.com", SourceTag::UnusualSignIn, 5),
            ev("A@x.com", SourceTag::UnusualSignIn, 5),
        ]);
        // trimming merges the first two; case keeps the third distinct
        assert_eq!(records.len(), 2);
        let a = records.iter().find(|r| r.subject == "a@x.com").unwrap();
        assert_eq!(a.score(), 10);
    }

    #[test]
    fn ranking_score_desc_then_subject_asc() {
        let records = aggregate(vec![
            ev("b@x.com", SourceTag::HighRiskAdminOp, 10),
            ev("c@x.com", SourceTag::HighRiskAdminOp, 10),
            ev("a@x.com", SourceTag::UnusualSignIn, 5),
            ev("z@x.com", SourceTag::SuspiciousInboxRule, 15),
        ]);
        let order: Vec<&str> = records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(order, vec!["z@x.com", "b@x.com", "c@x.com", "a@x.com"]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let input = || {
            vec![
                ev("a@x.com", SourceTag::UnusualSignIn, 5),
                ev("b@x.com", SourceTag::SuspiciousDelegation, 8),
                ev("a@x.com", SourceTag::HighRiskAdminOp, 10),
            ]
        };
        let first = aggregate(input());
        let second = aggregate(input());
        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.subject, y.subject);
            assert_eq!(x.score(), y.score());
        }
    }

    #[test]
    fn per_tag_counts() {
        let records = aggregate(vec![
            ev("a@x.com", SourceTag::UnusualSignIn, 5),
            ev("a@x.com", SourceTag::UnusualSignIn, 5),
            ev("a@x.com", SourceTag::FailedSignIn, 0),
        ]);
        assert_eq!(records[0].count_for(SourceTag::UnusualSignIn), 2);
        assert_eq!(records[0].count_for(SourceTag::FailedSignIn), 1);
        assert_eq!(records[0].count_for(SourceTag::EtrSpamFinding), 0);
    }

    #[test]
    fn empty_subject_evidence_dropped() {
        let records = aggregate(vec![ev("   ", SourceTag::UnusualSignIn, 5)]);
        assert!(records.is_empty());
    }

    #[test]
    fn tier_counts_summary() {
        let t = TierThresholds::default();
        let records = aggregate(vec![
            ev("crit@x.com", SourceTag::HighRiskAppRegistration, 60),
            ev("high@x.com", SourceTag::SuspiciousInboxRule, 30),
            ev("low@x.com", SourceTag::UnusualSignIn, 5),
        ]);
        let counts = tier_counts(&records, &t);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.high, 1);
        assert_eq!(counts.medium, 0);
        assert_eq!(counts.low, 1);
    }
}
