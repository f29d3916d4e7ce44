mod autostart;
mod config;
mod error;
mod mailer;
mod printer;
mod schedule;
mod service;
mod template;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "printstat";

#[derive(Parser)]
#[command(name = "printstat", version, about = "Mails printer usage statistics on a schedule")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll forever, mailing the report whenever the schedule is due
    Run,
    /// Run a single polling cycle now
    Check {
        /// Send the report even if it is not due (the schedule is left unchanged)
        #[arg(long)]
        force: bool,
    },
    /// Show the persisted schedule
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Register printstat to start at login
    Autostart,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run().await,
        Commands::Check { force } => check(force).await,
        Commands::Status { json } => status(json),
        Commands::Autostart => {
            if autostart::ensure_registered(APP_NAME) {
                println!("Registered for autostart.");
            } else {
                println!("Autostart registration failed, see log.");
            }
            Ok(())
        }
    }
}

fn reporter(cfg: &config::AppConfig) -> service::Reporter<mailer::Mailer> {
    let store = schedule::store::open(&cfg.schedule_file);
    service::Reporter::new(cfg, mailer::Mailer::new(cfg.smtp.clone()), store)
}

async fn run() -> Result<()> {
    let cfg = config::AppConfig::load().context("failed to load configuration")?;

    // Best effort; retried on the next start.
    autostart::ensure_registered(APP_NAME);

    reporter(&cfg).run(cfg.poll_interval).await;
    Ok(())
}

async fn check(force: bool) -> Result<()> {
    let cfg = config::AppConfig::load().context("failed to load configuration")?;
    let mut reporter = reporter(&cfg);
    let now = chrono::Local::now();

    if force {
        let stats = reporter
            .send_report(&now)
            .await
            .context("failed to send report")?;
        println!(
            "Report sent: serial number {}, counter {}",
            stats.serial_number, stats.counter
        );
        return Ok(());
    }

    match reporter.run_cycle(&now).await.context("polling cycle failed")? {
        service::CycleOutcome::Sent { next_call } => {
            println!("Report sent. Next send: {next_call}")
        }
        service::CycleOutcome::Idle { next_call } => {
            println!("Report not due. Next send: {next_call}")
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    store: String,
    #[serde(flatten)]
    schedule: schedule::Schedule,
    due_now: bool,
    reachable: bool,
}

fn status(json: bool) -> Result<()> {
    let path = config::load_env();
    let store = schedule::store::open(&path);
    let schedule = schedule::load(store.as_ref()).context("failed to load schedule")?;
    let decision = schedule.evaluate(&chrono::Local::now());

    let report = StatusReport {
        store: store.location(),
        due_now: decision.fire,
        reachable: schedule.is_reachable(),
        schedule,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Store: {}", report.store);
        println!("Send every: {}", report.schedule.granularity);
        println!("Interval: {}", report.schedule.interval);
        println!("Next send: {}", report.schedule.next_call);
        println!("Due now: {}", if report.due_now { "yes" } else { "no" });
        if !report.reachable {
            println!("Warning: next send is out of range and will never match");
        }
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
