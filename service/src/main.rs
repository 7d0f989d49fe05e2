use std::sync::Arc;

use abi::{Config, Provider, ProviderKind};
use anyhow::Context;
use booking::PgStore;
use booking_service::{BookingService, CreateBooking};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "booking")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML config
    #[arg(short, long, global = true, default_value = "~/.config/booking.yml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Register or rename a provider
    Provider {
        id: String,
        #[arg(value_enum)]
        kind: Kind,
        #[arg(short, long, default_value = "")]
        name: String,
    },
    /// Check one date, optionally for a time range
    Check {
        provider: String,
        date: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Print the availability grid of a month
    Monthly {
        provider: String,
        year: i32,
        month: u32,
    },
    /// Create a booking
    Create {
        provider: String,
        date: String,
        start: String,
        end: String,
        #[arg(short, long)]
        requester: String,
        #[arg(long)]
        event_type: Option<String>,
        #[arg(long)]
        venue: Option<String>,
        #[arg(long)]
        guests: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Manually block a date
    Block {
        provider: String,
        date: String,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Remove a manual block
    Unblock { provider: String, date: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Kind {
    Dj,
    Photobooth,
}

impl From<Kind> for ProviderKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Dj => ProviderKind::Dj,
            Kind::Photobooth => ProviderKind::Photobooth,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if args.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let path = shellexpand::tilde(&args.config).to_string();
    let config = Config::load(&path).with_context(|| format!("loading config from {path}"))?;
    let store = Arc::new(PgStore::connect(&config.db).await?);

    match args.command {
        Command::Migrate => {
            store.migrate().await?;
            tracing::info!("migrations applied");
        }
        Command::Provider { id, kind, name } => {
            let provider = Provider::new(id, kind.into(), name);
            store.upsert_provider(&provider).await?;
            print(&provider)?;
        }
        Command::Check {
            provider,
            date,
            start,
            end,
        } => {
            let service = BookingService::with_store(store, &config);
            let result = service
                .check(&provider, &date, start.as_deref(), end.as_deref())
                .await?;
            print(&result)?;
        }
        Command::Monthly {
            provider,
            year,
            month,
        } => {
            let service = BookingService::with_store(store, &config);
            print(&service.monthly(&provider, year, month).await?)?;
        }
        Command::Create {
            provider,
            date,
            start,
            end,
            requester,
            event_type,
            venue,
            guests,
            notes,
        } => {
            let service = BookingService::with_store(store, &config);
            let input = CreateBooking {
                provider_id: provider,
                date,
                start: Some(start),
                end: Some(end),
                event: abi::EventDetails {
                    event_type,
                    venue,
                    guest_count: guests,
                    notes,
                },
            };
            let (confirmation, delivered) = service.create_and_notify(&requester, input).await?;
            if let Err(e) = delivered {
                tracing::warn!(booking_id = %confirmation.booking_id, error = %e, "notification not delivered");
            }
            print(&confirmation)?;
        }
        Command::Block {
            provider,
            date,
            reason,
        } => {
            let service = BookingService::with_store(store, &config);
            service.block(&provider, &date, reason).await?;
            tracing::info!(%provider, %date, "date blocked");
        }
        Command::Unblock { provider, date } => {
            let service = BookingService::with_store(store, &config);
            let removed = service.unblock(&provider, &date).await?;
            tracing::info!(%provider, %date, removed, "date unblocked");
        }
    }
    Ok(())
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
