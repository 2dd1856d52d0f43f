//! Standalone mail-trace spam analysis command.

use crate::config::ConfigManager;
use crate::error::{Result, Sift365Error};
use crate::etr::{detect, SpamIndicator};
use crate::input;
use crate::report;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct EtrArgs {
    /// Mail-trace CSV file, or a directory containing one
    pub input: PathBuf,

    /// Directory for the CSV exports (default: alongside the input)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// File of known-risky IP addresses, one per line
    #[arg(long)]
    pub risky_ips: Option<PathBuf>,

    /// Path to a sift365.toml overriding the user config
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn analyze_trace(args: EtrArgs) -> Result<()> {
    println!("{} mail trace...", "Analyzing".cyan().bold());

    let manager = ConfigManager::new()?;
    let config = manager.load(args.config.as_deref())?;

    let records = input::load_mail_trace(&args.input)?;
    if records.is_empty() {
        return Err(Sift365Error::NoData);
    }
    println!("{} {} message(s) loaded", "→".cyan(), records.len());

    let risky_ips = match &args.risky_ips {
        Some(path) => fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let indicators = detect(&records, &risky_ips, &config);

    let output_dir = args.output_dir.unwrap_or_else(|| {
        if args.input.is_dir() {
            args.input.clone()
        } else {
            args.input
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
        }
    });
    fs::create_dir_all(&output_dir)?;

    let spam_path = output_dir.join("spam_analysis.csv");
    report::write_spam_analysis_csv(&spam_path, &indicators)?;
    let recall_path = output_dir.join("message_recall.csv");
    report::write_message_recall_csv(&recall_path, &indicators)?;

    print_indicator_summary(&indicators);

    println!("\n{} Outputs:", "→".cyan());
    println!("  • {}", spam_path.display());
    println!("  • {}", recall_path.display());
    println!("\n{} Mail-trace analysis complete", "✓".green().bold());
    Ok(())
}

fn print_indicator_summary(indicators: &[SpamIndicator]) {
    if indicators.is_empty() {
        println!("\n{} No spam patterns detected", "✓".green());
        return;
    }

    println!("\n{} ({})", "Spam indicators".bold(), indicators.len());
    for ind in indicators.iter().take(10) {
        println!(
            "  • [{}] {} — {} ({} messages)",
            ind.tier.as_str().red().bold(),
            ind.subject.cyan(),
            ind.risk_type.as_str(),
            ind.message_count
        );
    }
    if indicators.len() > 10 {
        println!("  … and {} more", indicators.len() - 10);
    }
}
