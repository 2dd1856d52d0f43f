//! Report rendering.
//!
//! Produces the HTML compromise report plus the CSV exports: the risk
//! summary, the spam analysis, the message-recall list, and the risky-IP
//! list. All rendering works from already-aggregated data; nothing here
//! recomputes scores beyond asking each record for its tier.

use crate::aggregate::{tier_counts, RiskTier, SubjectRiskRecord};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::etr::{recall_rows, SpamIndicator};
use crate::extract::conditional_access::CaFinding;
use crate::extract::SourceTag;
use chrono::{DateTime, Local};
use std::path::Path;

/// Hex color per tier, matching the report stylesheet.
pub fn tier_color(tier: RiskTier) -> &'static str {
    match tier {
        RiskTier::Critical => "#dc2626",
        RiskTier::High => "#ea580c",
        RiskTier::Medium => "#ca8a04",
        RiskTier::Low => "#2563eb",
    }
}

/// Everything the HTML report needs, borrowed from the analysis run.
pub struct ReportContext<'a> {
    pub records: &'a [SubjectRiskRecord],
    pub ca_findings: &'a [CaFinding],
    pub indicators: &'a [SpamIndicator],
    pub contributing_sources: &'a [&'static str],
    pub config: &'a AnalysisConfig,
    pub generated_at: DateTime<Local>,
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn or_placeholder(value: &str) -> String {
    if value.trim().is_empty() {
        "N/A".to_string()
    } else {
        escape(value)
    }
}

/// Generate the complete HTML report.
pub fn render_html(ctx: &ReportContext) -> String {
    let css = get_css_styles();
    let header = generate_header(ctx);
    let summary = generate_summary_section(ctx);
    let table = generate_ranked_table(ctx);
    let details = generate_detail_sections(ctx);
    let spam = generate_spam_section(ctx);
    let tenant = generate_tenant_section(ctx);
    let footer = generate_footer(ctx);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Compromise Assessment</title>
    <style>
{css}
    </style>
</head>
<body>
    <div class="container">
{header}
{summary}
{table}
{details}
{spam}
{tenant}
{footer}
    </div>
</body>
</html>"#,
        css = css,
        header = header,
        summary = summary,
        table = table,
        details = details,
        spam = spam,
        tenant = tenant,
        footer = footer,
    )
}

fn get_css_styles() -> &'static str {
    r#"
        :root {
            --primary: #1e40af;
            --secondary: #64748b;
            --critical: #dc2626;
            --high: #ea580c;
            --medium: #ca8a04;
            --low: #2563eb;
            --light: #f8fafc;
            --dark: #1e293b;
            --border: #e2e8f0;
        }

        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
            line-height: 1.6;
            color: var(--dark);
            background: var(--light);
        }

        .container {
            max-width: 1200px;
            margin: 0 auto;
            padding: 2rem;
            background: white;
            min-height: 100vh;
        }

        .header {
            text-align: center;
            padding: 2rem 0;
            border-bottom: 3px solid var(--primary);
            margin-bottom: 2rem;
        }

        .header h1 {
            color: var(--primary);
            font-size: 2rem;
            font-weight: 600;
            margin-bottom: 0.5rem;
        }

        .header .metadata {
            display: flex;
            justify-content: center;
            gap: 2rem;
            margin-top: 1rem;
            font-size: 0.9rem;
            color: var(--secondary);
        }

        .section {
            margin-bottom: 2rem;
        }

        .section-title {
            font-size: 1.25rem;
            font-weight: 600;
            color: var(--primary);
            margin-bottom: 1rem;
            padding-bottom: 0.5rem;
            border-bottom: 2px solid var(--border);
        }

        .tier-grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 1rem;
        }

        .tier-card {
            padding: 1.25rem;
            border-radius: 8px;
            color: white;
            text-align: center;
        }

        .tier-card .count {
            font-size: 2.5rem;
            font-weight: bold;
        }

        .tier-card .label {
            font-size: 0.9rem;
            text-transform: uppercase;
            opacity: 0.9;
        }

        .tier-critical { background: var(--critical); }
        .tier-high { background: var(--high); }
        .tier-medium { background: var(--medium); }
        .tier-low { background: var(--low); }

        .risk-table {
            width: 100%;
            border-collapse: collapse;
        }

        .risk-table th,
        .risk-table td {
            padding: 0.75rem;
            text-align: left;
            border-bottom: 1px solid var(--border);
        }

        .risk-table th {
            background: var(--light);
            font-weight: 600;
            color: var(--secondary);
            font-size: 0.85rem;
            text-transform: uppercase;
        }

        .risk-table tr:hover {
            background: var(--light);
        }

        .tier-badge {
            padding: 0.25rem 0.75rem;
            border-radius: 9999px;
            font-size: 0.75rem;
            font-weight: 600;
            text-transform: uppercase;
            color: white;
        }

        details {
            border: 1px solid var(--border);
            border-radius: 8px;
            padding: 1rem;
            margin-bottom: 1rem;
            border-left: 4px solid;
        }

        details.critical { border-left-color: var(--critical); }
        details.high { border-left-color: var(--high); }

        details summary {
            cursor: pointer;
            font-weight: 600;
        }

        .evidence-item {
            background: var(--light);
            padding: 0.75rem;
            border-radius: 6px;
            font-size: 0.9rem;
            margin-top: 0.75rem;
        }

        .evidence-tag {
            font-size: 0.75rem;
            font-weight: 600;
            color: var(--secondary);
            text-transform: uppercase;
        }

        .footer {
            text-align: center;
            padding: 2rem 0;
            margin-top: 2rem;
            border-top: 1px solid var(--border);
            color: var(--secondary);
            font-size: 0.85rem;
        }

        @media print {
            body {
                background: white;
            }
            .container {
                padding: 0;
                max-width: none;
            }
            details,
            .tier-card {
                break-inside: avoid;
            }
        }
    "#
}

fn generate_header(ctx: &ReportContext) -> String {
    let sources = if ctx.contributing_sources.is_empty() {
        "None".to_string()
    } else {
        ctx.contributing_sources.join(", ")
    };

    format!(
        r#"        <header class="header">
            <h1>Compromise Assessment</h1>
            <div class="metadata">
                <span><strong>Generated:</strong> {date}</span>
                <span><strong>Subjects:</strong> {subjects}</span>
            </div>
            <div class="metadata">
                <span><strong>Sources analyzed:</strong> {sources}</span>
            </div>
        </header>"#,
        date = ctx.generated_at.format("%Y-%m-%d %H:%M:%S"),
        subjects = ctx.records.len(),
        sources = escape(&sources),
    )
}

fn generate_summary_section(ctx: &ReportContext) -> String {
    let counts = tier_counts(ctx.records, &ctx.config.tiers);
    format!(
        r#"        <section class="section">
            <h2 class="section-title">Risk Summary</h2>
            <div class="tier-grid">
                <div class="tier-card tier-critical"><div class="count">{critical}</div><div class="label">Critical</div></div>
                <div class="tier-card tier-high"><div class="count">{high}</div><div class="label">High</div></div>
                <div class="tier-card tier-medium"><div class="count">{medium}</div><div class="label">Medium</div></div>
                <div class="tier-card tier-low"><div class="count">{low}</div><div class="label">Low</div></div>
            </div>
        </section>"#,
        critical = counts.critical,
        high = counts.high,
        medium = counts.medium,
        low = counts.low,
    )
}

fn generate_ranked_table(ctx: &ReportContext) -> String {
    if ctx.records.is_empty() {
        return r#"        <section class="section">
            <h2 class="section-title">Ranked Subjects</h2>
            <p>No subjects produced any evidence.</p>
        </section>"#
            .to_string();
    }

    let rows: String = ctx
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let tier = record.tier(&ctx.config.tiers);
            format!(
                r#"                <tr>
                    <td>{rank}</td>
                    <td>{subject}</td>
                    <td>{score}</td>
                    <td><span class="tier-badge" style="background: {color}">{tier}</span></td>
                    <td>{findings}</td>
                </tr>"#,
                rank = i + 1,
                subject = or_placeholder(&record.subject),
                score = record.score(),
                color = tier_color(tier),
                tier = tier.as_str(),
                findings = record.evidence.len(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"        <section class="section">
            <h2 class="section-title">Ranked Subjects ({count})</h2>
            <table class="risk-table">
                <thead>
                    <tr>
                        <th>#</th>
                        <th>Subject</th>
                        <th>Score</th>
                        <th>Tier</th>
                        <th>Findings</th>
                    </tr>
                </thead>
                <tbody>
{rows}
                </tbody>
            </table>
        </section>"#,
        count = ctx.records.len(),
        rows = rows,
    )
}

/// Detail sections exist only for Critical and High subjects. Critical
/// sections render pre-expanded; High sections start collapsed.
fn generate_detail_sections(ctx: &ReportContext) -> String {
    let sections: String = ctx
        .records
        .iter()
        .filter_map(|record| {
            let tier = record.tier(&ctx.config.tiers);
            let (class, open) = match tier {
                RiskTier::Critical => ("critical", " open"),
                RiskTier::High => ("high", ""),
                _ => return None,
            };

            let evidence_html: String = record
                .evidence
                .iter()
                .map(|e| {
                    format!(
                        r#"                <div class="evidence-item">
                    <div class="evidence-tag">{tag} (+{points})</div>
                    <div>{description}</div>
                </div>"#,
                        tag = e.tag.as_str(),
                        points = e.points,
                        description = or_placeholder(&e.description),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");

            Some(format!(
                r#"            <details class="{class}"{open}>
                <summary>{subject} &mdash; score {score} ({tier})</summary>
{evidence}
            </details>"#,
                class = class,
                open = open,
                subject = or_placeholder(&record.subject),
                score = record.score(),
                tier = tier.as_str(),
                evidence = evidence_html,
            ))
        })
        .collect::<Vec<_>>()
        .join("\n");

    if sections.is_empty() {
        return String::new();
    }

    format!(
        r#"        <section class="section">
            <h2 class="section-title">Subject Details</h2>
{sections}
        </section>"#,
        sections = sections,
    )
}

fn generate_spam_section(ctx: &ReportContext) -> String {
    if ctx.indicators.is_empty() {
        return String::new();
    }

    let rows: String = ctx
        .indicators
        .iter()
        .map(|ind| {
            format!(
                r#"                <tr>
                    <td>{subject}</td>
                    <td>{risk_type}</td>
                    <td><span class="tier-badge" style="background: {color}">{tier}</span></td>
                    <td>{count}</td>
                    <td>{description}</td>
                </tr>"#,
                subject = or_placeholder(&ind.subject),
                risk_type = ind.risk_type.as_str(),
                color = tier_color(ind.tier),
                tier = ind.tier.as_str(),
                count = ind.message_count,
                description = or_placeholder(&ind.description),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"        <section class="section">
            <h2 class="section-title">Outbound Spam Indicators ({count})</h2>
            <table class="risk-table">
                <thead>
                    <tr>
                        <th>Subject</th>
                        <th>Pattern</th>
                        <th>Tier</th>
                        <th>Messages</th>
                        <th>Description</th>
                    </tr>
                </thead>
                <tbody>
{rows}
                </tbody>
            </table>
        </section>"#,
        count = ctx.indicators.len(),
        rows = rows,
    )
}

fn generate_tenant_section(ctx: &ReportContext) -> String {
    if ctx.ca_findings.is_empty() {
        return String::new();
    }

    let rows: String = ctx
        .ca_findings
        .iter()
        .map(|f| {
            format!(
                r#"                <tr>
                    <td>{policy}</td>
                    <td>{reasons}</td>
                </tr>"#,
                policy = or_placeholder(&f.policy_name),
                reasons = or_placeholder(&f.reasons.join("; ")),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"        <section class="section">
            <h2 class="section-title">Conditional Access Findings ({count})</h2>
            <table class="risk-table">
                <thead>
                    <tr>
                        <th>Policy</th>
                        <th>Reasons</th>
                    </tr>
                </thead>
                <tbody>
{rows}
                </tbody>
            </table>
        </section>"#,
        count = ctx.ca_findings.len(),
        rows = rows,
    )
}

fn generate_footer(ctx: &ReportContext) -> String {
    format!(
        r#"        <footer class="footer">
            <p>Generated by sift365 on {date}</p>
            <p>Scores are recomputed from evidence on every run; tiers reflect current thresholds.</p>
        </footer>"#,
        date = ctx.generated_at.format("%Y-%m-%d %H:%M:%S %Z"),
    )
}

/// Risk summary CSV: subject, score, tier, one count column per source tag.
pub fn write_risk_summary_csv(
    path: &Path,
    records: &[SubjectRiskRecord],
    config: &AnalysisConfig,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["Subject".to_string(), "Score".to_string(), "Tier".to_string()];
    for tag in SourceTag::all() {
        header.push(tag.as_str().to_string());
    }
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.subject.clone(),
            record.score().to_string(),
            record.tier(&config.tiers).as_str().to_string(),
        ];
        for tag in SourceTag::all() {
            row.push(record.count_for(tag).to_string());
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Spam analysis CSV: one row per indicator with joined sample columns.
pub fn write_spam_analysis_csv(path: &Path, indicators: &[SpamIndicator]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Subject",
        "RiskType",
        "Tier",
        "MessageCount",
        "Description",
        "SampleMessageIds",
        "SampleRecipients",
        "SampleSubjects",
    ])?;

    for ind in indicators {
        let row = [
            ind.subject.clone(),
            ind.risk_type.as_str().to_string(),
            ind.tier.as_str().to_string(),
            ind.message_count.to_string(),
            ind.description.clone(),
            ind.sample_message_ids.join("; "),
            ind.sample_recipients.join("; "),
            ind.sample_subjects.join("; "),
        ];
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Message-recall CSV: Critical/High indicators only, one row per sampled
/// message ID, ready to paste into a recall job.
pub fn write_message_recall_csv(path: &Path, indicators: &[SpamIndicator]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Subject", "RiskType", "Tier", "MessageId"])?;

    for row in recall_rows(indicators) {
        writer.write_record([
            row.subject.as_str(),
            row.risk_type,
            row.tier,
            row.message_id.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Risky-IP list: one address per line, for firewall or block-list tooling.
pub fn write_risky_ips(path: &Path, ips: &[String]) -> Result<()> {
    let mut contents = ips.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::extract::Evidence;
    use serde_json::json;

    fn ctx_records(points: &[(&str, i64)]) -> Vec<SubjectRiskRecord> {
        aggregate(
            points
                .iter()
                .map(|(subject, pts)| {
                    Evidence::new(*subject, SourceTag::UnusualSignIn, *pts, "finding", json!({}))
                })
                .collect(),
        )
    }

    #[test]
    fn critical_details_open_high_collapsed() {
        let config = AnalysisConfig::default();
        let records = ctx_records(&[("crit@x.com", 60), ("high@x.com", 35), ("low@x.com", 5)]);
        let ctx = ReportContext {
            records: &records,
            ca_findings: &[],
            indicators: &[],
            contributing_sources: &["Sign-in log"],
            config: &config,
            generated_at: Local::now(),
        };

        let html = render_html(&ctx);
        assert!(html.contains(r#"<details class="critical" open>"#));
        assert!(html.contains(r#"<details class="high">"#));
        // low subjects get no detail section
        assert!(!html.contains("low@x.com &mdash;"));
        // but still appear in the ranked table
        assert!(html.contains("low@x.com"));
    }

    #[test]
    fn empty_subject_renders_placeholder_not_blank() {
        let config = AnalysisConfig::default();
        let records: Vec<SubjectRiskRecord> = Vec::new();
        let ctx = ReportContext {
            records: &records,
            ca_findings: &[],
            indicators: &[],
            contributing_sources: &[],
            config: &config,
            generated_at: Local::now(),
        };
        let html = render_html(&ctx);
        assert!(html.contains("No subjects produced any evidence"));
        assert!(html.contains("Sources analyzed:</strong> None"));
    }

    #[test]
    fn html_escapes_subject_content() {
        let config = AnalysisConfig::default();
        let records = ctx_records(&[("<script>alert(1)</script>", 60)]);
        let ctx = ReportContext {
            records: &records,
            ca_findings: &[],
            indicators: &[],
            contributing_sources: &["Sign-in log"],
            config: &config,
            generated_at: Local::now(),
        };
        let html = render_html(&ctx);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn risk_summary_csv_has_per_tag_columns() {
        let config = AnalysisConfig::default();
        let records = ctx_records(&[("a@x.com", 60)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk_summary.csv");

        write_risk_summary_csv(&path, &records, &config).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Subject,Score,Tier,"));
        assert!(header.contains("UnusualSignIn"));
        assert!(header.contains("ETRSpamFinding"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("a@x.com,60,Critical,1,"));
    }

    #[test]
    fn risky_ip_file_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risky_ips.txt");
        write_risky_ips(&path, &["1.2.3.4".to_string(), "5.6.7.8".to_string()]).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "1.2.3.4\n5.6.7.8\n");

        write_risky_ips(&path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn tier_colors_match_stylesheet() {
        assert_eq!(tier_color(RiskTier::Critical), "#dc2626");
        assert_eq!(tier_color(RiskTier::High), "#ea580c");
        assert_eq!(tier_color(RiskTier::Medium), "#ca8a04");
        assert_eq!(tier_color(RiskTier::Low), "#2563eb");
    }
}
