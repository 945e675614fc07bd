use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::{
    config::TrackerConfig,
    db::{Database, StoredEntry},
    settings::SettingsStore,
    simulate::{run_simulation, SimulationOptions},
    store::{ClioSync, EntryStore, LocalEntryStore, PlatformSync},
    submission::SubmissionPipeline,
    summary::{OpenAiSummarizer, Summarizer, TemplateSummarizer},
    tracker::{EventSink, LogSink, TrackerEvent},
    utils::logging::init_logging,
};

const DB_FILE: &str = "entries.db";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Parser)]
#[command(name = "billsync", about = "Billable time from email drafting sessions")]
struct Cli {
    /// Where the entry database and settings live
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved entries, newest first
    Entries {
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show one entry as JSON
    Show { id: String },

    /// Delete one entry
    Delete { id: String },

    /// Totals for one day
    Stats {
        /// Calendar day (UTC), YYYY-MM-DD; defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show or change settings
    Config {
        /// Billing platform access token
        #[arg(long)]
        token: Option<String>,

        #[arg(long, conflicts_with = "token")]
        clear_token: bool,

        /// Hourly rate used for revenue and platform prices
        #[arg(long)]
        rate: Option<f64>,

        #[arg(long)]
        currency: Option<String>,
    },

    /// Drive a scripted compose session and print the events
    Simulate {
        /// Divides every delay in the script
        #[arg(long, default_value_t = 10)]
        speedup: u32,

        /// Send events to the log instead of printing JSON lines
        #[arg(long)]
        log_events: bool,
    },
}

/// Writes each event as one JSON line on stdout; ticks are skipped.
struct PrintSink;

impl EventSink for PrintSink {
    fn emit(&self, event: TrackerEvent) {
        if matches!(event, TrackerEvent::Tick { .. }) {
            return;
        }
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("unprintable event {}: {err}", event.name()),
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("billsync"))
        .context("no platform data directory; pass --data-dir")
}

pub async fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE))?);

    match cli.command {
        Commands::Entries { limit } => {
            let db = Database::new(data_dir.join(DB_FILE))?;
            let entries = db.list_entries(limit).await?;
            if entries.is_empty() {
                println!("No entries yet.");
            }
            for entry in entries {
                print_entry_line(&entry);
            }
        }
        Commands::Show { id } => {
            let db = Database::new(data_dir.join(DB_FILE))?;
            match db.get_entry(&id).await? {
                Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                None => bail!("no entry with id {id}"),
            }
        }
        Commands::Delete { id } => {
            let db = Database::new(data_dir.join(DB_FILE))?;
            if !db.delete_entry(&id).await? {
                bail!("no entry with id {id}");
            }
            println!("Deleted {id}");
        }
        Commands::Stats { date } => {
            let db = Database::new(data_dir.join(DB_FILE))?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let billing = settings.billing();
            let daily = db.daily_stats(date, billing.hourly_rate).await?;
            let summary = db.summary_stats(date).await?;
            println!("{date}");
            println!("  emails logged   {}", daily.emails_logged);
            println!("  time tracked    {:.2} h", daily.time_tracked);
            println!("  revenue         {:.2} {}", daily.revenue, billing.currency);
            println!("  unique clients  {}", daily.unique_clients);
            println!("  all entries     {}", summary.total_entries);
        }
        Commands::Config {
            token,
            clear_token,
            rate,
            currency,
        } => {
            if token.is_some() || clear_token {
                settings.set_access_token(token)?;
            }
            if rate.is_some() || currency.is_some() {
                let mut billing = settings.billing();
                if let Some(rate) = rate {
                    billing.hourly_rate = rate;
                }
                if let Some(currency) = currency {
                    billing.currency = currency;
                }
                settings.update_billing(billing)?;
            }
            let mut shown = settings.snapshot();
            if shown.access_token.is_some() {
                shown.access_token = Some("********".into());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        Commands::Simulate { speedup, log_events } => {
            let config = TrackerConfig::default();
            let snapshot = settings.snapshot();
            let summarizer: Arc<dyn Summarizer> =
                match OpenAiSummarizer::from_env(snapshot.summarizer_base_url.clone()) {
                    Some(openai) => Arc::new(openai),
                    None => Arc::new(TemplateSummarizer),
                };
            let platform: Arc<dyn PlatformSync> = Arc::new(ClioSync::new(
                snapshot.platform_base_url.clone(),
                snapshot.billing.clone(),
            ));
            let store: Arc<dyn EntryStore> = Arc::new(LocalEntryStore::new(
                Database::new(data_dir.join(DB_FILE))?,
                Some(platform),
            ));
            let pipeline = SubmissionPipeline::new(summarizer, store, settings.clone(), &config)?;
            let options = SimulationOptions {
                speedup,
                ..Default::default()
            };
            let sink: Arc<dyn EventSink> = if log_events {
                Arc::new(LogSink)
            } else {
                Arc::new(PrintSink)
            };
            let report = run_simulation(&options, &config, Arc::new(pipeline), sink).await?;
            eprintln!(
                "simulation finished: {} steps, {} tracker(s) left",
                report.steps_run, report.trackers_left
            );
        }
    }

    Ok(())
}

fn print_entry_line(entry: &StoredEntry) {
    println!(
        "{}  {}  {:>5.2} h  {:<20}  {}{}",
        entry.id,
        entry.created_at.format("%Y-%m-%d %H:%M"),
        entry.hours,
        entry.client,
        entry.summary,
        if entry.platform_synced { "  [synced]" } else { "" }
    );
}
