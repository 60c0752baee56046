//! Command-line front end.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::DataService;

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory for bar files and symbol metadata
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory containing providers.toml
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download historical bars into the data directory
    Download {
        /// Provider name (e.g. "exchange", "capitalcom")
        #[arg(long)]
        provider: String,

        /// Symbol in the provider's notation (e.g. "BINANCE:BTC/USDT")
        #[arg(long)]
        symbol: String,

        /// Canonical timeframe: minutes ("1", "60", "240") or "1D", "1W", "1M"
        #[arg(long, default_value = "1D")]
        timeframe: String,

        /// Start of the range, date or ISO8601 datetime
        #[arg(long)]
        from: String,

        /// End of the range, defaults to now
        #[arg(long)]
        to: Option<String>,
    },

    /// List symbols available from a provider
    Symbols {
        #[arg(long)]
        provider: String,

        /// Provider-specific listing scope (e.g. a venue name)
        #[arg(long, default_value = "")]
        spec: String,
    },

    /// Show symbol metadata, refreshing the on-disk cache when asked
    Syminfo {
        #[arg(long)]
        provider: String,

        #[arg(long)]
        symbol: String,

        #[arg(long, default_value = "1D")]
        timeframe: String,

        /// Recompute from the source even when a cached copy exists
        #[arg(long)]
        force: bool,
    },

    /// List known plugins
    Plugins {
        /// Include plugins that failed discovery or loading
        #[arg(long)]
        show_errors: bool,
    },
}

/// Accepts a bare date or a full ISO8601 datetime.
fn parse_datetime(text: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = text.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    let date: NaiveDate = text
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid date or datetime: {text}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date: {text}"))?;
    Ok(midnight.and_utc())
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut service = DataService::new(&cli.data_dir, cli.config_dir.as_deref());

    match cli.command {
        Commands::Download {
            provider,
            symbol,
            timeframe,
            from,
            to,
        } => {
            let time_from = parse_datetime(&from)?;
            let time_to = to.as_deref().map(parse_datetime).transpose()?;
            let (path, report) = service
                .download(&provider, &symbol, &timeframe, time_from, time_to, |at| {
                    eprintln!("... {at}");
                })
                .await?;
            if let Some(resumed) = report.resumed_from {
                eprintln!("resumed from existing data at {resumed}");
            }
            eprintln!("appended {} bars", report.appended);
            println!("{}", path.display());
        }

        Commands::Symbols { provider, spec } => {
            for symbol in service.list_symbols(&provider, &spec).await? {
                println!("{symbol}");
            }
        }

        Commands::Syminfo {
            provider,
            symbol,
            timeframe,
            force,
        } => {
            let metadata = service
                .symbol_info(&provider, &symbol, &timeframe, force)
                .await?;
            print!("{}", toml::to_string_pretty(&metadata)?);
        }

        Commands::Plugins { show_errors } => {
            for plugin in service.plugins() {
                match &plugin.error {
                    None => {
                        let state = if plugin.loaded { "loaded" } else { "available" };
                        println!(
                            "{:<12} {:<10} {:<8} {:<9} {}",
                            plugin.name, plugin.kind, plugin.version, state, plugin.description
                        );
                    }
                    Some(error) if show_errors => {
                        println!("{:<12} {:<10} ERROR: {}", plugin.name, plugin.kind, error);
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_accepts_date_and_iso() {
        assert_eq!(
            parse_datetime("2024-01-02").unwrap(),
            "2024-01-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            parse_datetime("2024-01-02T09:30:00Z").unwrap(),
            "2024-01-02T09:30:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(parse_datetime("yesterday").is_err());
    }
}
