use anyhow::{bail, Context, Result};
use kv_translations::config::Config;
use kv_translations::{
    BackendOptions, CompareOp, KeyValueBackend, Locale, LocaleSelection, PgStorage, ShapeRegistry,
};
use tracing::info;

const USAGE: &str = "usage:
  kv-translations schema
  kv-translations find <owner_table> <owner_type> <attribute> <value> [locale...]";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kv_translations=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env()?;

    match args.first().map(String::as_str) {
        Some("schema") => schema(&config).await,
        Some("find") => find(&config, &args[1..]).await,
        _ => {
            eprintln!("{}", USAGE);
            bail!("missing or unknown command")
        }
    }
}

async fn connect(config: &Config) -> Result<PgStorage> {
    let url = config.require_database_url()?;
    PgStorage::connect(url)
        .await
        .context("Failed to connect to database")
}

/// Create the translation tables for every registered shape.
async fn schema(config: &Config) -> Result<()> {
    let storage = connect(config).await?;
    let shapes = ShapeRegistry::default();
    storage.ensure_schema(&shapes).await?;
    info!("Schema ready ({} shape tables)", shapes.len());
    Ok(())
}

/// Print the ids of owners whose translated attribute equals a value,
/// reading through the given locales in fallback order.
async fn find(config: &Config, args: &[String]) -> Result<()> {
    let [owner_table, owner_type, attribute, value, locales @ ..] = args else {
        eprintln!("{}", USAGE);
        bail!("find needs <owner_table> <owner_type> <attribute> <value>");
    };

    let locales: Vec<Locale> = if locales.is_empty() {
        vec![config.default_locale.clone()]
    } else {
        locales.iter().map(|l| Locale::new(l.as_str())).collect()
    };

    let mut backend = KeyValueBackend::new(owner_type.as_str(), owner_table.as_str())
        .with_default_options(config.default_options()?)
        .with_cascade_retry(config.cascade_retry());
    backend.declare_translated([attribute], &BackendOptions::new())?;
    let association = backend.group_for(attribute)?.association.clone();

    let predicate = backend.build_locale_predicate(
        &association,
        attribute,
        LocaleSelection::Fallbacks(locales),
        CompareOp::Eq,
        value.as_str(),
    )?;
    let query = backend.query().filter(predicate);
    info!("{}", query.to_sql().sql());

    let storage = connect(config).await?;
    let ids = backend.find_owners(&query, &storage).await?;
    info!("Found {} matching {}", ids.len(), owner_type);
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}
