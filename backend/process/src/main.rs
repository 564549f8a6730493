use clap::Parser;
use process::models::Source;
use server::database::RedisStore;
use tracing_subscriber::{EnvFilter, fmt};

/// Imports a JSON product catalog into the storefront database.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path or http(s) URL of a JSON array of products
    source: String,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Validate the catalog without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let source = Source::parse(&args.source);

    let store = if args.dry_run {
        None
    } else {
        Some(RedisStore::connect(&args.redis_url).await?)
    };

    let summary = process::run(
        &source,
        store.as_ref().map(|store| store as &dyn server::store::Store),
    )
    .await?;

    println!("Imported: {}", summary.imported);
    println!("Skipped: {}", summary.skipped);

    Ok(())
}
