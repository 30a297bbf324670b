use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod analytics;
mod auth;
mod daily;
mod db;
mod error;
mod models;
mod notifications;
mod report;
mod risk;
mod store;

use crate::models::CurrentUser;

#[derive(Parser)]
#[command(name = "attendance-analytics")]
#[command(about = "Attendance rollups and teacher analytics", long_about = None)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    #[arg(long, env = "ATTENDANCE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Upper bound on daily entries a single rollup may unwind
    #[arg(
        long,
        env = "ATTENDANCE_MAX_AGGREGATION_ROWS",
        default_value_t = analytics::DEFAULT_MAX_AGGREGATION_ROWS
    )]
    max_aggregation_rows: usize,

    #[command(subcommand)]
    command: Commands,
}

/// Identity of the caller, as resolved by the session layer.
#[derive(Args, Clone)]
struct Identity {
    #[arg(long, env = "ATTENDANCE_USER_ID")]
    user_id: String,

    #[arg(long, env = "ATTENDANCE_ROLE", default_value = auth::TEACHER_ROLE)]
    role: String,
}

impl Identity {
    fn current_user(&self) -> CurrentUser {
        CurrentUser {
            id: self.user_id.clone(),
            role: self.role.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Record one day of attendance for a subject
    Record {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        class: String,
        #[arg(long)]
        teacher: Option<String>,
        #[arg(long)]
        date: String,
        #[arg(long)]
        present: i64,
        #[arg(long)]
        absent: i64,
        #[arg(long, default_value_t = 0)]
        late: i64,
    },
    /// Print the stored daily summary of a subject
    Daily {
        #[arg(long)]
        subject: String,
    },
    /// Student leaderboard for one subject
    Leaderboard {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        subject: String,
    },
    /// Per-day attendance between two dates
    Trend {
        #[command(flatten)]
        identity: Identity,
        /// Subject id, or "all" for every owned subject
        #[arg(long, default_value = auth::ALL_SUBJECTS)]
        subject: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Monthly rollup of owned subjects
    Monthly {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Owned subjects below the risk threshold
    Risk {
        #[command(flatten)]
        identity: Identity,
    },
    /// Five best-attended owned subjects
    Top {
        #[command(flatten)]
        identity: Identity,
    },
    /// Cross-subject dashboard for the caller
    Global {
        #[command(flatten)]
        identity: Identity,
    },
    /// Export a subject roster as CSV
    Export {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        subject: String,
        /// Date used in the file name, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Generate a markdown report of the caller's subjects
    Report {
        #[command(flatten)]
        identity: Identity,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Notify the caller about at-risk subjects
    Alert {
        #[command(flatten)]
        identity: Identity,
    },
    /// Manage in-app notifications
    Notifications {
        #[command(flatten)]
        identity: Identity,
        #[command(subcommand)]
        action: NotificationAction,
    },
}

#[derive(Subcommand)]
enum NotificationAction {
    /// Send a notification to the caller
    Create {
        #[arg(long)]
        message: String,
        #[arg(long, value_enum, default_value_t = notifications::NotificationKind::Info)]
        kind: notifications::NotificationKind,
    },
    List {
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = notifications::DEFAULT_PAGE_SIZE)]
        limit: u64,
        #[arg(long)]
        unread_only: bool,
    },
    UnreadCount,
    MarkRead {
        #[arg(long)]
        id: String,
    },
    MarkAllRead,
    Delete {
        #[arg(long)]
        id: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("attendance_analytics=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = db::PgStore::new(pool.clone());
    let max_rows = cli.max_aggregation_rows;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted for teacher {}.", db::SEED_TEACHER_ID);
        }
        Commands::Record {
            subject,
            class,
            teacher,
            date,
            present,
            absent,
            late,
        } => {
            let subject_id = auth::parse_id(&subject, "subject id")?;
            let class_id = auth::parse_id(&class, "class id")?;
            let teacher_id = teacher
                .as_deref()
                .map(|raw| auth::parse_id(raw, "teacher id"))
                .transpose()?;
            let stat = daily::save_daily_summary(
                &store, subject_id, class_id, teacher_id, &date, present, absent, late,
            )
            .await?;
            print_json(&stat)?;
        }
        Commands::Daily { subject } => {
            let subject_id = auth::parse_id(&subject, "subject id")?;
            match daily::read_daily_summary(&store, subject_id).await? {
                Some(summary) => {
                    println!(
                        "Subject {} (class {}, teacher {}), created {}, updated {}",
                        summary.subject_id,
                        summary.class_id,
                        summary
                            .teacher_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "none".to_string()),
                        summary.created_at,
                        summary.updated_at
                    );
                    for (date, stat) in summary.sorted_days() {
                        println!(
                            "{date}: {} present, {} absent, {} late ({:.2}%)",
                            stat.present, stat.absent, stat.late, stat.percentage
                        );
                    }
                }
                None => println!("No daily summary for this subject."),
            }
        }
        Commands::Leaderboard { identity, subject } => {
            let board =
                analytics::subject_leaderboard(&store, &identity.current_user(), &subject).await?;
            print_json(&board)?;
        }
        Commands::Trend {
            identity,
            subject,
            from,
            to,
        } => {
            let trend = analytics::attendance_trend(
                &store,
                &identity.current_user(),
                &subject,
                &from,
                &to,
                max_rows,
            )
            .await?;
            print_json(&trend)?;
        }
        Commands::Monthly { identity, subject } => {
            let rows = analytics::monthly_summary(
                &store,
                &identity.current_user(),
                subject.as_deref(),
                max_rows,
            )
            .await?;
            print_json(&rows)?;
        }
        Commands::Risk { identity } => {
            let rows = analytics::class_risk(&store, &identity.current_user(), max_rows).await?;
            print_json(&rows)?;
        }
        Commands::Top { identity } => {
            let rows = analytics::top_performing(&store, &identity.current_user(), max_rows).await?;
            print_json(&rows)?;
        }
        Commands::Global { identity } => {
            let stats = analytics::global_stats(&store, &identity.current_user(), max_rows).await?;
            print_json(&stats)?;
        }
        Commands::Export {
            identity,
            subject,
            date,
            out_dir,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let export =
                report::export_subject_csv(&store, &identity.current_user(), &subject, date)
                    .await?;
            let path = out_dir.join(&export.filename);
            std::fs::write(&path, export.contents)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Export written to {}.", path.display());
        }
        Commands::Report { identity, out } => {
            let user = identity.current_user();
            let stats = analytics::global_stats(&store, &user, max_rows).await?;
            let at_risk = analytics::risk_list(stats.top_subjects.clone());
            let monthly = analytics::monthly_summary(&store, &user, None, max_rows).await?;
            let report = report::build_report(
                &user.id,
                Utc::now().date_naive(),
                &stats,
                &at_risk,
                &monthly,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Alert { identity } => {
            let created = notifications::alert_at_risk_subjects(
                &store,
                &store,
                &identity.current_user(),
                max_rows,
            )
            .await?;
            println!("Created {} at-risk notifications.", created.len());
        }
        Commands::Notifications { identity, action } => {
            let user = identity.current_user();
            match action {
                NotificationAction::Create { message, kind } => {
                    let user_id = auth::parse_id(&user.id, "user id")?;
                    let created = notifications::create_notification(
                        &store,
                        user_id,
                        &message,
                        kind,
                        serde_json::json!({}),
                    )
                    .await?;
                    print_json(&created)?;
                }
                NotificationAction::List {
                    skip,
                    limit,
                    unread_only,
                } => {
                    let page =
                        notifications::list_notifications(&store, &user, skip, limit, unread_only)
                            .await?;
                    print_json(&page)?;
                }
                NotificationAction::UnreadCount => {
                    let count = notifications::unread_count(&store, &user).await?;
                    println!("{count}");
                }
                NotificationAction::MarkRead { id } => {
                    notifications::mark_as_read(&store, &user, &id).await?;
                    println!("Notification marked as read.");
                }
                NotificationAction::MarkAllRead => {
                    let updated = notifications::mark_all_as_read(&store, &user).await?;
                    println!("Marked {updated} notifications as read.");
                }
                NotificationAction::Delete { id } => {
                    notifications::delete_notification(&store, &user, &id).await?;
                    println!("Notification deleted.");
                }
            }
        }
    }

    Ok(())
}
