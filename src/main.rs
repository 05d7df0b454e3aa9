use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod calendar;
mod config;
mod db;
mod error;
mod fingerprint;
mod models;
mod ratelimit;
mod report;
mod service;

use crate::aggregate::GroupKey;
use crate::config::Config;
use crate::error::AttendanceError;
use crate::models::AttendanceKind;
use crate::ratelimit::StateStore;
use crate::service::SummaryFilter;

#[derive(Parser)]
#[command(name = "tutoring-attendance")]
#[command(about = "Attendance registration and reporting for the tutoring program", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import historical check-ins from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Register a student's check-in for a session
    Register {
        #[arg(long)]
        student: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "in_person")]
        kind: String,
        #[arg(long)]
        question: Option<String>,
    },
    /// Show who attended (and who did not) on a date
    Day {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        tutor: Option<String>,
    },
    /// Pivot check-ins into grouped counts
    Summary {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long)]
        tutor: Option<String>,
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        weekday: Option<String>,
        #[arg(long, value_delimiter = ',', default_value = "tutor")]
        group_by: Vec<String>,
    },
    /// Expected-vs-actual attendance for a weekday across one month
    Expected {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        weekday: String,
        #[arg(long)]
        tutor: Option<String>,
    },
    /// Generate a markdown report for one month
    Report {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        weekday: Option<String>,
        #[arg(long)]
        tutor: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show this device's registration quota status
    Limits,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let app_config = Config::load();
    let store = StateStore::new(&app_config.state_dir);

    // The limiter commands work without a database; everything else
    // needs the pool.
    if let Commands::Limits = cli.command {
        let today = Utc::now().date_naive();
        for (name, status) in service::limiter_status(&app_config, &store, today) {
            println!(
                "{name}: can_register={} remaining={} ({})",
                status.can_register, status.remaining, status.message
            );
        }
        return Ok(());
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let (inserted, skipped) = db::import_csv(&pool, &csv).await?;
            println!(
                "Inserted {inserted} check-ins from {} ({skipped} duplicates skipped).",
                csv.display()
            );
        }
        Commands::Register {
            student,
            date,
            kind,
            question,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let kind = AttendanceKind::parse(&kind)?;
            let student_id = db::find_student_by_email(&pool, &student)
                .await?
                .with_context(|| format!("no student with email {student}"))?;

            match service::register_attendance(
                &pool, &app_config, &store, student_id, date, kind, question,
            )
            .await
            {
                Ok(record) => println!(
                    "Registered {} for {student} on {} ({}).",
                    record.id,
                    record.date,
                    record.kind.as_str()
                ),
                Err(AttendanceError::Duplicate { date, .. }) => {
                    println!("{student} is already registered for {date}.");
                }
                Err(AttendanceError::RateLimited { message, .. }) => {
                    println!("Registration denied: {message}");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Day { date, tutor } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let split = service::attendance_for_date(&pool, date, tutor.as_deref()).await?;
            println!("Attendance for {}:", split.date);
            for row in &split.attended {
                println!(
                    "- {} ({}, {})",
                    row.student_name,
                    row.kind.as_str(),
                    row.tutor_name
                );
            }
            if split.attended.is_empty() {
                println!("- nobody checked in");
            }
            println!("Not attended:");
            for entry in &split.not_attended {
                println!("- {} ({})", entry.student_name, entry.tutor_name);
            }
            if split.not_attended.is_empty() {
                println!("- nobody missing");
            }
        }
        Commands::Summary {
            from,
            to,
            tutor,
            module,
            weekday,
            group_by,
        } => {
            let weekday = weekday
                .as_deref()
                .map(calendar::parse_weekday)
                .transpose()?;
            let keys = group_by
                .iter()
                .map(|key| GroupKey::parse(key))
                .collect::<Result<Vec<_>, _>>()?;
            let filter = SummaryFilter {
                start: from,
                end: to,
                tutor_email: tutor,
                module,
                weekday,
            };
            let summary = service::attendance_summary(&pool, &filter, &keys).await?;
            if summary.is_empty() {
                println!("No check-ins match this filter.");
            } else {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Commands::Expected {
            year,
            month,
            weekday,
            tutor,
        } => {
            let weekday = calendar::parse_weekday(&weekday)?;
            let result =
                service::expected_attendance(&pool, year, month, weekday, tutor.as_deref())
                    .await?;
            if result.is_empty() {
                println!("No active students for this scope.");
            }
            for entry in result {
                println!(
                    "- {}: attended {} of {} ({} absences)",
                    entry.student_name, entry.attended, entry.expected, entry.absences
                );
            }
        }
        Commands::Report {
            year,
            month,
            weekday,
            tutor,
            out,
        } => {
            let (first, last) = calendar::month_bounds(year, month)?;
            let rows =
                db::query_by_date_range_and_tutor(&pool, first, last, tutor.as_deref()).await?;
            let expected = match weekday {
                Some(name) => {
                    let weekday = calendar::parse_weekday(&name)?;
                    service::expected_attendance(&pool, year, month, weekday, tutor.as_deref())
                        .await?
                }
                None => Vec::new(),
            };
            let report = report::build_report(tutor.as_deref(), first, last, &rows, &expected);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Limits => unreachable!("handled before pool setup"),
    }

    Ok(())
}
