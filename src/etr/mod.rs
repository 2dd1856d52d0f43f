//! ETR (mail-trace) spam pattern detection.
//!
//! Five independent passes over the outbound subset of a mail-trace export:
//! volume, identical subjects, keyword matches, risky-IP correlation, and
//! failed deliveries. Each pass emits [`SpamIndicator`]s; a sender with no
//! qualifying messages in a pass simply produces no indicator for it.
//!
//! Indicators are sorted most-severe-first (Critical, High, Medium, Low) and
//! by descending point contribution within a tier. Sample lists are capped to
//! bound report size; `message_count` always reflects the true total.

use crate::aggregate::RiskTier;
use crate::config::AnalysisConfig;
use crate::extract::{Evidence, SourceTag};
use crate::records::MailTraceRecord;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

const MESSAGE_ID_SAMPLE: usize = 10;
const RECIPIENT_SAMPLE: usize = 5;
const RECIPIENT_SAMPLE_WIDE: usize = 10;
const SUBJECT_SAMPLE: usize = 3;

/// Kind of spam pattern an indicator represents. Distinct kinds can co-occur
/// for the same sender; each is a separate indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpamRiskType {
    ExcessiveVolume,
    IdenticalSubjects,
    KeywordMatch,
    RiskyIpCorrelation,
    FailedDelivery,
}

impl SpamRiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamRiskType::ExcessiveVolume => "ExcessiveVolume",
            SpamRiskType::IdenticalSubjects => "IdenticalSubjects",
            SpamRiskType::KeywordMatch => "KeywordMatch",
            SpamRiskType::RiskyIpCorrelation => "RiskyIpCorrelation",
            SpamRiskType::FailedDelivery => "FailedDelivery",
        }
    }
}

/// Fixed point contribution per tier, so indicator ordering is stable.
fn tier_points(tier: RiskTier) -> i64 {
    match tier {
        RiskTier::Critical => 20,
        RiskTier::High => 15,
        RiskTier::Medium => 10,
        RiskTier::Low => 5,
    }
}

/// One detected spam pattern.
#[derive(Debug, Clone, Serialize)]
pub struct SpamIndicator {
    /// Sender address, or the IP itself for risky-IP correlation.
    pub subject: String,
    pub risk_type: SpamRiskType,
    pub tier: RiskTier,
    /// True total of qualifying messages, not the sample size.
    pub message_count: usize,
    pub description: String,
    pub sample_message_ids: Vec<String>,
    pub sample_recipients: Vec<String>,
    pub sample_subjects: Vec<String>,
    pub points: i64,
}

/// Groups records by key, preserving first-seen key order so output is
/// deterministic for identical inputs.
fn group_by<'a, F>(records: &[&'a MailTraceRecord], key_fn: F) -> Vec<(String, Vec<&'a MailTraceRecord>)>
where
    F: Fn(&MailTraceRecord) -> String,
{
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&'a MailTraceRecord>> = HashMap::new();

    for &record in records {
        let key = key_fn(record);
        if key.is_empty() {
            continue;
        }
        let members = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        members.push(record);
    }

    order
        .into_iter()
        .map(|k| {
            let members = groups.remove(&k).unwrap_or_default();
            (k, members)
        })
        .collect()
}

fn sample<'a, I>(values: I, cap: usize) -> Vec<String>
where
    I: Iterator<Item = &'a str>,
{
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if seen.iter().any(|s| s == value) {
            continue;
        }
        seen.push(value.to_string());
        if seen.len() == cap {
            break;
        }
    }
    seen
}

fn indicator(
    subject: &str,
    risk_type: SpamRiskType,
    tier: RiskTier,
    description: String,
    messages: &[&MailTraceRecord],
    recipient_cap: usize,
) -> SpamIndicator {
    SpamIndicator {
        subject: subject.to_string(),
        risk_type,
        tier,
        message_count: messages.len(),
        description,
        sample_message_ids: sample(
            messages.iter().map(|m| m.message_id.as_str()),
            MESSAGE_ID_SAMPLE,
        ),
        sample_recipients: sample(messages.iter().map(|m| m.recipient.as_str()), recipient_cap),
        sample_subjects: sample(messages.iter().map(|m| m.subject.as_str()), SUBJECT_SAMPLE),
        points: tier_points(tier),
    }
}

/// Runs all five passes and returns indicators sorted most-severe-first.
pub fn detect(
    records: &[MailTraceRecord],
    risky_ips: &[String],
    config: &AnalysisConfig,
) -> Vec<SpamIndicator> {
    let outbound: Vec<&MailTraceRecord> = records.iter().filter(|r| r.is_outbound()).collect();
    debug!(
        total = records.len(),
        outbound = outbound.len(),
        "classified mail-trace records"
    );

    let mut indicators = Vec::new();
    indicators.extend(detect_volume(&outbound, config));
    indicators.extend(detect_identical_subjects(&outbound, config));
    indicators.extend(detect_keywords(&outbound, config));
    indicators.extend(detect_risky_ips(&outbound, risky_ips));
    indicators.extend(detect_failed_deliveries(&outbound, config));

    indicators.sort_by(|a, b| {
        a.tier
            .severity_rank()
            .cmp(&b.tier.severity_rank())
            .then_with(|| b.points.cmp(&a.points))
    });
    indicators
}

/// Pass 1: per-sender outbound volume.
fn detect_volume(outbound: &[&MailTraceRecord], config: &AnalysisConfig) -> Vec<SpamIndicator> {
    group_by(outbound, |m| m.sender.trim().to_string())
        .into_iter()
        .filter(|(_, messages)| messages.len() > config.spam.max_messages_per_sender)
        .map(|(sender, messages)| {
            indicator(
                &sender,
                SpamRiskType::ExcessiveVolume,
                RiskTier::High,
                format!(
                    "{} sent {} outbound messages (threshold {})",
                    sender,
                    messages.len(),
                    config.spam.max_messages_per_sender,
                ),
                &messages,
                RECIPIENT_SAMPLE,
            )
        })
        .collect()
}

/// Pass 2: groups of identical (trimmed, lowercased) subjects per sender.
fn detect_identical_subjects(
    outbound: &[&MailTraceRecord],
    config: &AnalysisConfig,
) -> Vec<SpamIndicator> {
    group_by(outbound, |m| {
        let sender = m.sender.trim();
        let subject = m.normalized_subject();
        if sender.is_empty() || subject.len() < config.spam.min_subject_length {
            String::new()
        } else {
            format!("{}\u{1f}{}", sender, subject)
        }
    })
    .into_iter()
    .filter(|(_, messages)| messages.len() >= config.spam.max_same_subject_messages)
    .map(|(key, messages)| {
        let sender = key.split('\u{1f}').next().unwrap_or_default().to_string();
        indicator(
            &sender,
            SpamRiskType::IdenticalSubjects,
            RiskTier::Critical,
            format!(
                "{} sent {} messages with the identical subject \"{}\"",
                sender,
                messages.len(),
                messages
                    .first()
                    .map(|m| m.subject.trim())
                    .unwrap_or_default(),
            ),
            &messages,
            RECIPIENT_SAMPLE,
        )
    })
    .collect()
}

/// Pass 3: spam keyword matches. Only runs per keyword when the tenant-wide
/// match count exceeds the gate; flags senders above the per-sender limit.
/// Each (sender, keyword) pair is a separate indicator.
fn detect_keywords(outbound: &[&MailTraceRecord], config: &AnalysisConfig) -> Vec<SpamIndicator> {
    let mut indicators = Vec::new();

    for keyword in &config.spam.keywords {
        let keyword_lower = keyword.to_lowercase();
        let matching: Vec<&MailTraceRecord> = outbound
            .iter()
            .copied()
            .filter(|m| m.subject.to_lowercase().contains(&keyword_lower))
            .collect();

        if matching.len() <= config.spam.keyword_total_gate {
            continue;
        }

        for (sender, messages) in group_by(&matching, |m| m.sender.trim().to_string()) {
            if messages.len() <= config.spam.keyword_per_sender {
                continue;
            }
            indicators.push(indicator(
                &sender,
                SpamRiskType::KeywordMatch,
                RiskTier::Medium,
                format!(
                    "{} sent {} messages with spam keyword \"{}\" in the subject",
                    sender,
                    messages.len(),
                    keyword,
                ),
                &messages,
                RECIPIENT_SAMPLE,
            ));
        }
    }

    indicators
}

/// Pass 4: correlation with IPs already flagged as unusual-location sources.
/// One indicator per risky IP with at least one match, regardless of how many
/// senders the matching messages have.
fn detect_risky_ips(outbound: &[&MailTraceRecord], risky_ips: &[String]) -> Vec<SpamIndicator> {
    let mut indicators = Vec::new();

    for ip in risky_ips {
        let ip = ip.trim();
        if ip.is_empty() {
            continue;
        }

        let matching: Vec<&MailTraceRecord> = outbound
            .iter()
            .copied()
            .filter(|m| m.from_ip.trim() == ip || m.to_ip.trim() == ip)
            .collect();

        if matching.is_empty() {
            continue;
        }

        let senders = sample(matching.iter().map(|m| m.sender.as_str()), RECIPIENT_SAMPLE);
        indicators.push(indicator(
            ip,
            SpamRiskType::RiskyIpCorrelation,
            RiskTier::Critical,
            format!(
                "{} outbound message(s) correlate with risky IP {} (senders: {})",
                matching.len(),
                ip,
                if senders.is_empty() {
                    "Unknown".to_string()
                } else {
                    senders.join(", ")
                },
            ),
            &matching,
            RECIPIENT_SAMPLE_WIDE,
        ));
    }

    indicators
}

/// Pass 5: failed/bounced/rejected/blocked deliveries per sender.
fn detect_failed_deliveries(
    outbound: &[&MailTraceRecord],
    config: &AnalysisConfig,
) -> Vec<SpamIndicator> {
    let failed: Vec<&MailTraceRecord> = outbound
        .iter()
        .copied()
        .filter(|m| {
            let status = m.status.to_lowercase();
            status.contains("failed")
                || status.contains("bounce")
                || status.contains("reject")
                || status.contains("blocked")
        })
        .collect();

    group_by(&failed, |m| m.sender.trim().to_string())
        .into_iter()
        .filter(|(_, messages)| messages.len() > config.spam.max_failed_deliveries)
        .map(|(sender, messages)| {
            indicator(
                &sender,
                SpamRiskType::FailedDelivery,
                RiskTier::Medium,
                format!(
                    "{} had {} outbound messages fail delivery",
                    sender,
                    messages.len(),
                ),
                &messages,
                RECIPIENT_SAMPLE,
            )
        })
        .collect()
}

/// Folds indicators into evidence items, one per indicator, attributed to
/// the indicator's subject (sender address, or IP for pass 4).
pub fn to_evidence(indicators: &[SpamIndicator]) -> Vec<Evidence> {
    indicators
        .iter()
        .map(|ind| {
            Evidence::new(
                ind.subject.clone(),
                SourceTag::EtrSpamFinding,
                ind.points,
                ind.description.clone(),
                serde_json::to_value(ind).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect()
}

/// Message-recall rows: Critical/High indicators carrying at least one
/// message ID, one row per sampled message ID.
#[derive(Debug, Clone, Serialize)]
pub struct RecallRow {
    pub subject: String,
    pub risk_type: &'static str,
    pub tier: &'static str,
    pub message_id: String,
}

pub fn recall_rows(indicators: &[SpamIndicator]) -> Vec<RecallRow> {
    indicators
        .iter()
        .filter(|ind| matches!(ind.tier, RiskTier::Critical | RiskTier::High))
        .filter(|ind| !ind.sample_message_ids.is_empty())
        .flat_map(|ind| {
            ind.sample_message_ids.iter().map(move |id| RecallRow {
                subject: ind.subject.clone(),
                risk_type: ind.risk_type.as_str(),
                tier: ind.tier.as_str(),
                message_id: id.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str, subject: &str) -> MailTraceRecord {
        MailTraceRecord {
            sender: sender.into(),
            recipient: "victim@other.com".into(),
            subject: subject.into(),
            direction: "Outbound".into(),
            status: "Delivered".into(),
            message_id: format!("<{}-{}>", sender, subject.len()),
            ..Default::default()
        }
    }

    #[test]
    fn identical_subjects_at_threshold_flags_once() {
        let config = AnalysisConfig::default();
        let records: Vec<MailTraceRecord> = (0..50)
            .map(|i| {
                let mut m = msg("a@x.com", "  Act Now!!!  ");
                m.message_id = format!("<id-{}>", i);
                m
            })
            .collect();

        let indicators = detect(&records, &[], &config);
        let identical: Vec<&SpamIndicator> = indicators
            .iter()
            .filter(|i| i.risk_type == SpamRiskType::IdenticalSubjects)
            .collect();

        assert_eq!(identical.len(), 1);
        assert_eq!(identical[0].subject, "a@x.com");
        assert_eq!(identical[0].tier, RiskTier::Critical);
        assert_eq!(identical[0].message_count, 50);
        // samples are capped, count is not
        assert_eq!(identical[0].sample_message_ids.len(), 10);
        assert_eq!(identical[0].sample_subjects.len(), 1);
    }

    #[test]
    fn identical_subjects_below_threshold_produces_none() {
        let config = AnalysisConfig::default();
        let records: Vec<MailTraceRecord> =
            (0..49).map(|_| msg("a@x.com", "Act Now!!!")).collect();
        let indicators = detect(&records, &[], &config);
        assert!(indicators
            .iter()
            .all(|i| i.risk_type != SpamRiskType::IdenticalSubjects));
    }

    #[test]
    fn short_subjects_excluded_from_identical_grouping() {
        let config = AnalysisConfig::default();
        let records: Vec<MailTraceRecord> = (0..60).map(|_| msg("a@x.com", "hi")).collect();
        let indicators = detect(&records, &[], &config);
        assert!(indicators
            .iter()
            .all(|i| i.risk_type != SpamRiskType::IdenticalSubjects));
    }

    #[test]
    fn keyword_four_matches_flags_three_does_not() {
        let config = AnalysisConfig::default();

        // 4 from one sender + 2 from another: total 6 > gate of 5
        let mut records: Vec<MailTraceRecord> =
            (0..4).map(|i| msg("a@x.com", &format!("buy bitcoin now {}", i))).collect();
        records.push(msg("b@x.com", "bitcoin tips"));
        records.push(msg("b@x.com", "more bitcoin tips"));

        let indicators = detect(&records, &[], &config);
        let keyword: Vec<&SpamIndicator> = indicators
            .iter()
            .filter(|i| i.risk_type == SpamRiskType::KeywordMatch)
            .collect();
        assert_eq!(keyword.len(), 1);
        assert_eq!(keyword[0].subject, "a@x.com");
        assert_eq!(keyword[0].message_count, 4);
        assert_eq!(keyword[0].tier, RiskTier::Medium);

        // exactly 3 per-sender matches: below the per-sender limit
        let mut records: Vec<MailTraceRecord> =
            (0..3).map(|i| msg("a@x.com", &format!("bitcoin {}", i))).collect();
        records.extend((0..3).map(|i| msg("b@x.com", &format!("bitcoin again {}", i))));
        let indicators = detect(&records, &[], &config);
        assert!(indicators
            .iter()
            .all(|i| i.risk_type != SpamRiskType::KeywordMatch));
    }

    #[test]
    fn keyword_gate_requires_total_above_five() {
        let config = AnalysisConfig::default();
        // 4 total matches: sender exceeds per-sender limit but gate fails
        let records: Vec<MailTraceRecord> =
            (0..4).map(|i| msg("a@x.com", &format!("bitcoin {}", i))).collect();
        let indicators = detect(&records, &[], &config);
        assert!(indicators
            .iter()
            .all(|i| i.risk_type != SpamRiskType::KeywordMatch));
    }

    #[test]
    fn sender_matching_multiple_keywords_gets_one_indicator_each() {
        let config = AnalysisConfig::default();
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(msg("a@x.com", &format!("bitcoin offer {}", i)));
            records.push(msg("a@x.com", &format!("lottery winner {}", i)));
        }
        let indicators = detect(&records, &[], &config);
        let kinds: Vec<&str> = indicators
            .iter()
            .filter(|i| i.risk_type == SpamRiskType::KeywordMatch)
            .map(|i| i.description.as_str())
            .collect();
        // "lottery" and "winner" both match the second batch, plus "bitcoin"
        assert!(kinds.len() >= 2);
        assert!(kinds.iter().any(|d| d.contains("\"bitcoin\"")));
        assert!(kinds.iter().any(|d| d.contains("\"lottery\"")));
    }

    #[test]
    fn risky_ip_one_indicator_per_ip() {
        let config = AnalysisConfig::default();
        let mut m1 = msg("a@x.com", "anything here");
        m1.from_ip = "1.2.3.4".into();
        let mut m2 = msg("b@x.com", "something else");
        m2.from_ip = "1.2.3.4".into();

        let indicators = detect(
            &[m1, m2],
            &["1.2.3.4".to_string()],
            &config,
        );
        let risky: Vec<&SpamIndicator> = indicators
            .iter()
            .filter(|i| i.risk_type == SpamRiskType::RiskyIpCorrelation)
            .collect();
        assert_eq!(risky.len(), 1);
        assert_eq!(risky[0].subject, "1.2.3.4");
        assert_eq!(risky[0].message_count, 2);
        assert_eq!(risky[0].tier, RiskTier::Critical);
    }

    #[test]
    fn risky_ip_without_matches_produces_nothing() {
        let config = AnalysisConfig::default();
        let records = vec![msg("a@x.com", "hello world")];
        let indicators = detect(&records, &["9.9.9.9".to_string()], &config);
        assert!(indicators
            .iter()
            .all(|i| i.risk_type != SpamRiskType::RiskyIpCorrelation));
    }

    #[test]
    fn volume_threshold_is_strictly_greater() {
        let mut config = AnalysisConfig::default();
        config.spam.max_messages_per_sender = 3;

        let records: Vec<MailTraceRecord> =
            (0..3).map(|i| msg("a@x.com", &format!("n{}", i))).collect();
        let indicators = detect(&records, &[], &config);
        assert!(indicators
            .iter()
            .all(|i| i.risk_type != SpamRiskType::ExcessiveVolume));

        let records: Vec<MailTraceRecord> =
            (0..4).map(|i| msg("a@x.com", &format!("n{}", i))).collect();
        let indicators = detect(&records, &[], &config);
        let vol: Vec<&SpamIndicator> = indicators
            .iter()
            .filter(|i| i.risk_type == SpamRiskType::ExcessiveVolume)
            .collect();
        assert_eq!(vol.len(), 1);
        assert_eq!(vol[0].tier, RiskTier::High);
        assert_eq!(vol[0].message_count, 4);
    }

    #[test]
    fn failed_delivery_threshold() {
        let mut config = AnalysisConfig::default();
        config.spam.max_failed_deliveries = 2;

        let mut records: Vec<MailTraceRecord> = (0..3)
            .map(|i| {
                let mut m = msg("a@x.com", &format!("n{}", i));
                m.status = "Failed".into();
                m
            })
            .collect();
        records.push(msg("a@x.com", "delivered fine"));

        let indicators = detect(&records, &[], &config);
        let failed: Vec<&SpamIndicator> = indicators
            .iter()
            .filter(|i| i.risk_type == SpamRiskType::FailedDelivery)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].message_count, 3);
    }

    #[test]
    fn inbound_messages_ignored() {
        let config = AnalysisConfig::default();
        let records: Vec<MailTraceRecord> = (0..60)
            .map(|_| {
                let mut m = msg("a@x.com", "Act Now!!! Special");
                m.direction = "Inbound".into();
                m
            })
            .collect();
        assert!(detect(&records, &[], &config).is_empty());
    }

    #[test]
    fn indicators_sorted_most_severe_first() {
        let mut config = AnalysisConfig::default();
        config.spam.max_messages_per_sender = 5;
        config.spam.max_failed_deliveries = 2;

        let mut records: Vec<MailTraceRecord> = Vec::new();
        // volume (High) for a@, failed delivery (Medium) for b@,
        // identical subjects (Critical) for c@
        records.extend((0..6).map(|i| msg("a@x.com", &format!("different {}", i))));
        records.extend((0..3).map(|i| {
            let mut m = msg("b@x.com", &format!("bounce {}", i));
            m.status = "bounced".into();
            m
        }));
        records.extend((0..50).map(|_| msg("c@x.com", "identical subject line")));

        let indicators = detect(&records, &[], &config);
        let tiers: Vec<RiskTier> = indicators.iter().map(|i| i.tier).collect();
        let mut sorted = tiers.clone();
        sorted.sort_by_key(|t| t.severity_rank());
        assert_eq!(tiers, sorted);
        assert_eq!(indicators[0].tier, RiskTier::Critical);
    }

    #[test]
    fn recall_rows_only_critical_and_high_with_ids() {
        let config = AnalysisConfig::default();
        let mut records: Vec<MailTraceRecord> =
            (0..50).map(|i| {
                let mut m = msg("a@x.com", "identical subject line");
                m.message_id = format!("<{}>", i);
                m
            }).collect();
        // medium keyword noise from another sender
        records.extend((0..6).map(|i| msg("b@x.com", &format!("bitcoin {}", i))));

        let indicators = detect(&records, &[], &config);
        let rows = recall_rows(&indicators);
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.tier == "Critical" || r.tier == "High"));
        assert!(rows.iter().all(|r| !r.message_id.is_empty()));
    }

    #[test]
    fn to_evidence_attributes_indicator_subject() {
        let config = AnalysisConfig::default();
        let records: Vec<MailTraceRecord> =
            (0..50).map(|_| msg("a@x.com", "identical subject line")).collect();
        let indicators = detect(&records, &[], &config);
        let evidence = to_evidence(&indicators);
        assert_eq!(evidence.len(), indicators.len());
        assert_eq!(evidence[0].subject, "a@x.com");
        assert_eq!(evidence[0].tag, SourceTag::EtrSpamFinding);
        assert_eq!(evidence[0].points, 20);
    }

    #[test]
    fn empty_trace_produces_no_indicators() {
        let config = AnalysisConfig::default();
        assert!(detect(&[], &["1.2.3.4".to_string()], &config).is_empty());
    }
}
