use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use gate_core::stats::{newest_first, EnrollmentStats};
use gate_core::{
    registration, AttemptEvent, AuditEntry, AuditLog, EnrollmentStore, IntervalScheduler,
    NewEnrollment, Role, Status, VerificationController, VerificationOutcome,
};
use gate_store_sqlite::SqliteStore;
use tracing_subscriber::EnvFilter;

mod config;
mod extractor;

use config::Config;
use extractor::{JsonDescriptorExtractor, LatestFrameFile};

#[derive(Parser)]
#[command(name = "gate", about = "Face-verified access control for entry points")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person with a descriptor file
    Register {
        /// Unique institutional id
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// student, lecturer or staff
        #[arg(long)]
        role: Role,
        /// active, graduate, suspended, discontinued or visitor
        #[arg(long, default_value = "active")]
        status: Status,
        /// JSON array holding the face descriptor
        #[arg(long)]
        descriptor: PathBuf,
        #[arg(long)]
        email: Option<String>,
        /// Required for visitors
        #[arg(long)]
        purpose: Option<String>,
        /// Visitor expiry, RFC 3339 (e.g. 2026-10-16T18:00:00Z)
        #[arg(long)]
        valid_until: Option<DateTime<Utc>>,
    },
    /// Run one verification attempt against a captured descriptor
    Verify {
        #[arg(long)]
        descriptor: PathBuf,
    },
    /// Verify continuously, re-reading the descriptor file on every tick
    Watch {
        #[arg(long)]
        descriptor: PathBuf,
        /// Overrides GATE_VERIFY_INTERVAL_MS
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },
    /// List enrollments, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove an enrollment
    Remove {
        /// Institutional id to remove
        id: String,
    },
    /// Show recent access log entries
    Logs {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show enrollment counts per role and status
    Stats,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let store = open_store(&config).await?;

    match cli.command {
        Commands::Register {
            id,
            name,
            role,
            status,
            descriptor,
            email,
            purpose,
            valid_until,
        } => {
            let mut input = NewEnrollment::new(id, name, role).with_status(status);
            if let Some(values) = read_descriptor(&descriptor).await? {
                input = input.with_descriptor(values);
            }
            if let Some(purpose) = purpose {
                input = input.with_visit(purpose, valid_until);
            }
            if let Some(email) = email {
                input = input.with_email(email);
            }
            let enrollment =
                registration::register(&store, &store, input, config.descriptor_dim, Utc::now())
                    .await
                    .context("registration failed")?;
            println!(
                "Registered {} ({}, {}, {})",
                enrollment.name, enrollment.id_number, enrollment.role, enrollment.status
            );
        }
        Commands::Verify { descriptor } => {
            let controller = VerificationController::new(
                JsonDescriptorExtractor,
                store.clone(),
                store,
                config.controller(),
            );
            let Some(event) = controller.verify(descriptor).await else {
                anyhow::bail!("verification already in progress");
            };
            let outcome = event.context("verification failed")?;
            print_outcome(&outcome);
            if !outcome.granted() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Watch {
            descriptor,
            interval_ms,
        } => {
            let mut controller_config = config.controller();
            if let Some(ms) = interval_ms {
                controller_config.interval = std::time::Duration::from_millis(ms);
            }
            let interval = controller_config.interval;
            let controller = VerificationController::new(
                JsonDescriptorExtractor,
                store.clone(),
                store,
                controller_config,
            );
            let (handle, mut events) = controller.start_continuous(
                LatestFrameFile::new(descriptor),
                IntervalScheduler::new(interval),
            );

            println!("Watching (every {interval:?}); Ctrl-C to stop");
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::signal::ctrl_c() => break,
                };
                match event {
                    Some(event) => report(event),
                    None => break,
                }
            }

            // An attempt already in flight still reports once.
            handle.stop().await;
            while let Some(event) = events.recv().await {
                report(event);
            }
        }
        Commands::List { json } => {
            let mut population = store.list_all().await.context("listing enrollments")?;
            newest_first(&mut population);
            if json {
                println!("{}", serde_json::to_string_pretty(&population)?);
            } else if population.is_empty() {
                println!("No enrollments");
            } else {
                for e in &population {
                    let expiry = e
                        .valid_until
                        .map(|t| format!(" until {}", t.to_rfc3339()))
                        .unwrap_or_default();
                    println!(
                        "{:<16} {:<28} {:<9} {:<13} {}{expiry}",
                        e.id_number,
                        e.name,
                        e.role,
                        e.status,
                        e.registered_at.format("%Y-%m-%d %H:%M"),
                    );
                }
            }
        }
        Commands::Remove { id } => {
            registration::remove(&store, &id)
                .await
                .with_context(|| format!("removing {id}"))?;
            println!("Removed {id}");
        }
        Commands::Logs { limit, json } => {
            let entries = store.recent(limit).await.context("reading access log")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    print_entry(entry);
                }
            }
        }
        Commands::Stats => {
            let population = store.list_all().await.context("listing enrollments")?;
            let stats = EnrollmentStats::from_population(&population);
            println!("Total:        {}", stats.total);
            println!("Students:     {}", stats.students);
            println!("Lecturers:    {}", stats.lecturers);
            println!("Staff:        {}", stats.staff);
            println!("Active:       {}", stats.active);
            println!("Graduates:    {}", stats.graduates);
            println!("Suspended:    {}", stats.suspended);
            println!("Discontinued: {}", stats.discontinued);
            println!("Visitors:     {}", stats.visitors);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))
}

async fn read_descriptor(path: &Path) -> Result<Option<Vec<f32>>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let descriptor = extractor::parse_descriptor(&bytes)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(descriptor.map(|d| d.values().to_vec()))
}

fn report(event: AttemptEvent) {
    match event {
        Ok(outcome) => print_outcome(&outcome),
        Err(err) => eprintln!("attempt failed: {err}"),
    }
}

fn print_outcome(outcome: &VerificationOutcome) {
    let verdict = if outcome.granted() { "GRANTED" } else { "DENIED" };
    match &outcome.enrollment {
        Some(e) => println!(
            "{verdict} [{}] {} ({}, {}, {}) confidence {:.1}%",
            outcome.reason,
            e.name,
            e.id_number,
            e.role,
            e.status,
            outcome.confidence.unwrap_or_default(),
        ),
        None => println!("{verdict} [{}]", outcome.reason),
    }
}

fn print_entry(entry: &AuditEntry) {
    let role = entry.role.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
    let confidence = entry
        .confidence
        .map(|c| format!("{c:.1}%"))
        .unwrap_or_else(|| "-".into());
    println!(
        "{}  {:<14} {:<16} {:<24} {:<9} {confidence}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.action,
        entry.user_id,
        entry.name,
        role,
    );
}
