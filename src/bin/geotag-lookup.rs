use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use geotag::config::Config;
use geotag::geo::{GeoDatabase, GeoResolver};

#[derive(Parser)]
#[command(name = "geotag-lookup")]
#[command(about = "Resolve client addresses the way the geotag layer does", long_about = None)]
struct Cli {
    /// Addresses to resolve (IP literals; anything else resolves to unknown)
    #[arg(required = true)]
    addresses: Vec<String>,

    /// GeoIP database path (defaults to GEOIP_DB_PATH or GeoLite2-Country.mmdb)
    #[arg(long)]
    db: Option<String>,

    /// Location overrides file (defaults to GEOIP_OVERRIDES_FILE)
    #[arg(long)]
    overrides: Option<String>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(path) = cli.overrides {
        config.location_overrides = Config::load_overrides(&path)?;
    }

    let database = GeoDatabase::open_or_disable(&config.database_path);
    let resolver = GeoResolver::from_config(&config, database);

    for address in &cli.addresses {
        let resolution = resolver.resolve(address);
        let line = json!({
            "address": address,
            "source": resolution.source,
            "record": &*resolution.record,
        });

        if cli.pretty {
            println!("{}", serde_json::to_string_pretty(&line)?);
        } else {
            println!("{}", line);
        }
    }

    Ok(())
}
