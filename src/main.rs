use anyhow::{anyhow, Result};
use clap::Parser;
use pricing_reports::model::PeriodLabel;
use pricing_reports::observability::init_logging;
use pricing_reports::{run_for_period, Mailer, OutboxMailer, ReportConfig, SmtpMailer};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pricing-reports")]
#[command(about = "Builds and emails Attic and Basement reports for salespeople and managers")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sales workbook or CSV (default: $MAIN_FOLDER/Sales_Report_Temp.xlsx)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory for generated workbooks
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Period label, e.g. "Jun, 2025" (default: current month)
    #[arg(long)]
    period: Option<String>,

    /// Write messages as .eml files to this directory instead of sending
    #[arg(long, value_name = "DIR")]
    dry_run: Option<PathBuf>,

    /// Redirect every email to the test recipient (TEST_EMAIL)
    #[arg(long)]
    test_mode: bool,

    /// Process at most N recipients per role
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

fn resolve_config(args: &Args) -> Result<ReportConfig> {
    let mut config = match &args.config {
        Some(path) => ReportConfig::load(path)?,
        None => ReportConfig::default(),
    };
    config.apply_env()?;

    if let Some(input) = &args.input {
        config.input_path = input.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(dir) = &args.dry_run {
        config.dry_run_outbox = Some(dir.clone());
    }
    if args.test_mode {
        config.test_mode = true;
    }
    if args.limit.is_some() {
        config.recipient_limit = args.limit;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(err) => {
            // No usable config yet: record the failure in the default log location.
            if init_logging(ReportConfig::default().log_dir.as_deref()).is_ok() {
                error!("Configuration rejected: {:#}", err);
            }
            return Err(err);
        }
    };
    let log_path = init_logging(config.log_dir.as_deref())?;
    if let Some(path) = log_path {
        info!("Logging to {}", path.display());
    }

    let mailer: Box<dyn Mailer> = match &config.dry_run_outbox {
        Some(dir) => {
            info!("Dry run: writing messages to {}", dir.display());
            Box::new(OutboxMailer::new(dir, config.sender.as_deref())?)
        }
        None => {
            let sender = config
                .sender
                .as_deref()
                .ok_or_else(|| anyhow!("no sender address configured (EMAIL_USER)"))?;
            Box::new(SmtpMailer::new(sender, &config.smtp))
        }
    };

    let period = match &args.period {
        Some(label) => PeriodLabel::new(label.clone()),
        None => PeriodLabel::current(&config.period_format),
    };

    let summary = match run_for_period(&config, mailer.as_ref(), period) {
        Ok(summary) => summary,
        Err(err) => {
            if err.is_fatal() {
                error!("Run aborted: {}", err);
            } else {
                error!("Run stopped after an unexpected error: {}", err);
            }
            return Err(err.into());
        }
    };

    println!("\n=== Report Run ===");
    println!("Run id:      {}", summary.run_id);
    println!("Period:      {}", summary.period);
    println!("Rows:        {} loaded, {} dropped", summary.rows_loaded, summary.rows_dropped);
    println!("Recipients:  {} salespeople, {} managers", summary.salespeople, summary.managers);
    println!(
        "Outcomes:    {} delivered, {} render failures, {} dispatch failures",
        summary.delivered(),
        summary.render_failures(),
        summary.dispatch_failures()
    );

    Ok(())
}
