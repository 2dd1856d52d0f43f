//! Full tenant analysis command.

use crate::aggregate::{aggregate, tier_counts, SubjectRiskRecord};
use crate::cmd::progress::{create_spinner, finish_spinner_success};
use crate::config::{AnalysisConfig, ConfigManager};
use crate::error::{Result, Sift365Error};
use crate::extract;
use crate::extract::conditional_access::CaFinding;
use crate::etr::{self, SpamIndicator};
use crate::geo;
use crate::input::{self, LoadedSources};
use crate::report::{self, ReportContext};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Directory containing the CSV exports
    pub input_dir: PathBuf,

    /// Directory for the report and CSV exports (default: <input>/report)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Path to a sift365.toml overriding the user config
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Skip IP geolocation enrichment (no network access needed)
    #[arg(long)]
    pub skip_geo: bool,
}

pub async fn analyze(args: AnalyzeArgs) -> Result<()> {
    println!("{} tenant exports...", "Analyzing".cyan().bold());

    let manager = ConfigManager::new()?;
    let config = manager.load(args.config.as_deref())?;

    let mut sources = input::load_sources(&args.input_dir)?;
    if !sources.any_present() {
        return Err(Sift365Error::NoData);
    }

    let contributing = sources.contributing_sources();
    println!(
        "{} Sources found: {}",
        "→".cyan(),
        contributing.join(", ").cyan()
    );

    if !args.skip_geo {
        if let Some(sign_ins) = sources.sign_ins.as_mut() {
            let spinner = create_spinner("Resolving sign-in locations...");
            let enriched = geo::enrich_sign_ins(sign_ins, &config.geo).await;
            finish_spinner_success(
                &spinner,
                &format!("Resolved {} sign-in location(s)", enriched),
            );
        }
    }

    let run = run_pipeline(&sources, &config);

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| args.input_dir.join("report"));
    fs::create_dir_all(&output_dir)?;

    let ctx = ReportContext {
        records: &run.records,
        ca_findings: &run.ca_findings,
        indicators: &run.indicators,
        contributing_sources: &contributing,
        config: &config,
        generated_at: Local::now(),
    };

    let html_path = output_dir.join("compromise_report.html");
    fs::write(&html_path, report::render_html(&ctx))?;

    let summary_path = output_dir.join("risk_summary.csv");
    report::write_risk_summary_csv(&summary_path, &run.records, &config)?;

    let mut written = vec![html_path, summary_path];

    if !run.indicators.is_empty() {
        let spam_path = output_dir.join("spam_analysis.csv");
        report::write_spam_analysis_csv(&spam_path, &run.indicators)?;
        written.push(spam_path);

        let recall_path = output_dir.join("message_recall.csv");
        report::write_message_recall_csv(&recall_path, &run.indicators)?;
        written.push(recall_path);
    }

    if !run.risky_ips.is_empty() {
        let ips_path = output_dir.join("risky_ips.txt");
        report::write_risky_ips(&ips_path, &run.risky_ips)?;
        written.push(ips_path);
    }

    print_summary(&run, &config);

    println!("\n{} Outputs:", "→".cyan());
    for path in &written {
        println!("  • {}", path.display());
    }
    println!("\n{} Analysis complete", "✓".green().bold());
    Ok(())
}

/// Result of one analysis pass, shared by the command and integration tests.
pub struct AnalysisRun {
    pub records: Vec<SubjectRiskRecord>,
    pub ca_findings: Vec<CaFinding>,
    pub indicators: Vec<SpamIndicator>,
    pub risky_ips: Vec<String>,
}

/// Pure pipeline: extract, detect, aggregate. No I/O beyond logging.
pub fn run_pipeline(sources: &LoadedSources, config: &AnalysisConfig) -> AnalysisRun {
    let mut evidence = Vec::new();
    let mut risky_ips = Vec::new();

    if let Some(sign_ins) = &sources.sign_ins {
        let findings = extract::signin::extract(sign_ins, config);
        info!(
            evidence = findings.evidence.len(),
            risky_ips = findings.risky_ips.len(),
            "sign-in extraction done"
        );
        evidence.extend(findings.evidence);
        risky_ips = findings.risky_ips;
    }

    if let Some(audit) = &sources.audit {
        evidence.extend(extract::audit::extract(audit, config));
    }

    if let Some(rules) = &sources.inbox_rules {
        evidence.extend(extract::inbox_rules::extract(rules, config));
    }

    if let Some(delegations) = &sources.delegations {
        evidence.extend(extract::delegations::extract(delegations, config));
    }

    if let Some(apps) = &sources.app_registrations {
        evidence.extend(extract::app_registrations::extract(apps, config));
    }

    let ca_findings = sources
        .ca_policies
        .as_deref()
        .map(extract::conditional_access::extract)
        .unwrap_or_default();

    let indicators = sources
        .mail_trace
        .as_deref()
        .map(|trace| etr::detect(trace, &risky_ips, config))
        .unwrap_or_default();
    evidence.extend(etr::to_evidence(&indicators));

    AnalysisRun {
        records: aggregate(evidence),
        ca_findings,
        indicators,
        risky_ips,
    }
}

fn print_summary(run: &AnalysisRun, config: &AnalysisConfig) {
    let counts = tier_counts(&run.records, &config.tiers);

    println!("\n{}", "Risk summary".bold());
    println!("  {} {}", "Critical:".red().bold(), counts.critical);
    println!("  {} {}", "High:".yellow().bold(), counts.high);
    println!("  Medium:   {}", counts.medium);
    println!("  Low:      {}", counts.low);

    let top: Vec<&SubjectRiskRecord> = run.records.iter().take(5).collect();
    if !top.is_empty() {
        println!("\n{}", "Top subjects".bold());
        for record in top {
            let tier = record.tier(&config.tiers);
            println!(
                "  • {} — score {} ({})",
                record.subject.cyan(),
                record.score(),
                tier.as_str()
            );
        }
    }

    if !run.ca_findings.is_empty() {
        println!(
            "\n{} {} Conditional Access finding(s) need review",
            "⚠".yellow().bold(),
            run.ca_findings.len()
        );
    }
}
