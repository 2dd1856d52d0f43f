use clap::{Parser, Subcommand};
use colored::Colorize;
use sift365::{cmd, error};

#[derive(Parser, Debug)]
#[command(
    name = "sift365",
    about = "Sift Microsoft 365 tenant log exports for signs of compromise",
    version,
    long_about = "Compromise-assessment CLI for Microsoft 365 tenants\n\n\
                  Ingests CSV exports (sign-ins, audit log, inbox rules, delegations,\n\
                  app registrations, Conditional Access, mail trace), scores each\n\
                  subject from the evidence found, and renders an HTML report."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a directory of tenant CSV exports
    Analyze(cmd::analyze::AnalyzeArgs),

    /// Analyze a mail-trace export for outbound spam patterns
    Etr(cmd::etr::EtrArgs),

    /// Manage the analysis configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write the default config file
    Init(cmd::configure::InitArgs),

    /// Print the effective configuration
    Show(cmd::configure::ShowArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("sift365=debug")
            .init();
    }

    match cli.command {
        Commands::Analyze(args) => cmd::analyze::analyze(args).await?,
        Commands::Etr(args) => cmd::etr::analyze_trace(args).await?,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init(args) => cmd::configure::init(args)?,
            ConfigCommands::Show(args) => cmd::configure::show(args)?,
        },
    }

    Ok(())
}
