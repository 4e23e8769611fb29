//! # Row Cache CLI
//!
//! Binary entry point: resolves employee records through the Redis cache,
//! falling back to ScyllaDB on a miss.

mod config;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, LogFormat};
use rowcache_domain::{FieldMap, Record, RecordSchema};
use rowcache_persistence::{
    CacheAside, CacheStore, MemoryCacheStore, MemoryRecordSource, ReadStrategy, RecordSource,
    RedisCacheStore, Resolution, ScyllaClient, ScyllaRecordSource,
};

#[derive(Parser, Debug)]
#[command(name = "rowcache")]
#[command(version, about = "Cache-aside lookups of employee records")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that Redis and ScyllaDB both answer
    Probe,

    /// Resolve a record through the cache
    Get {
        /// Employee number
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// Re-read the source and overwrite the cached entry
        #[arg(long)]
        refresh: bool,

        /// Read the source without touching the cache
        #[arg(long, conflicts_with = "refresh")]
        source_only: bool,
    },

    /// Drop a record's cache entry
    Evict {
        /// Employee number
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// Walk through a miss followed by a hit using in-memory stores
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    let args = Args::parse();
    tracing::info!(version = rowcache_persistence::VERSION, "Starting rowcache");

    match args.command {
        Command::Demo => demo().await,
        command => {
            let resolver = connect(&config).await?;
            run(&resolver, command).await
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output only
    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn connect(config: &Config) -> Result<CacheAside<RedisCacheStore, ScyllaRecordSource>> {
    tracing::info!(
        hosts = ?config.scylla.hosts,
        keyspace = %config.scylla.keyspace,
        "Connecting to ScyllaDB"
    );
    let scylla = ScyllaClient::new(config.scylla.clone())
        .await
        .context("ScyllaDB connection failed")?;
    tracing::info!("ScyllaDB connected");

    tracing::info!(url = %config.redis.url, ttl = ?config.redis.entry_ttl, "Connecting to Redis");
    let cache = RedisCacheStore::new(config.redis.clone())
        .await
        .context("Redis connection failed")?;
    tracing::info!("Redis connected");

    Ok(CacheAside::new(
        Arc::new(cache),
        Arc::new(ScyllaRecordSource::new(Arc::new(scylla))),
    ))
}

async fn run<C, S>(resolver: &CacheAside<C, S>, command: Command) -> Result<()>
where
    C: CacheStore + ?Sized,
    S: RecordSource + ?Sized,
{
    let schema = RecordSchema::employee();
    let readiness = resolver.health_probe().check_ready().await;

    match command {
        Command::Probe => {
            println!("{}", serde_json::to_string_pretty(&readiness)?);
            readiness.ensure()?;
        }
        Command::Get {
            id,
            refresh,
            source_only,
        } => {
            readiness.ensure()?;
            let strategy = if refresh {
                ReadStrategy::Refresh
            } else if source_only {
                ReadStrategy::SourceOnly
            } else {
                ReadStrategy::CacheAside
            };

            let mut resolver = resolver.clone();
            resolver.set_strategy(strategy);
            let resolution = resolver.resolve(&schema, id).await?;
            print_resolution(&schema, id, &resolution)?;
        }
        Command::Evict { id } => {
            readiness.ensure()?;
            let removed = resolver.evict(&schema, id).await?;
            println!(
                "{}",
                json!({ "key": schema.cache_key(id)?.to_string(), "removed": removed })
            );
        }
        Command::Demo => demo().await?,
    }

    Ok(())
}

fn print_resolution(
    schema: &RecordSchema,
    id: i64,
    resolution: &Resolution<FieldMap>,
) -> Result<()> {
    let key = schema.cache_key(id)?.to_string();
    let body = match resolution {
        Resolution::NotFound => json!({ "key": key, "found": false }),
        Resolution::Cached(fields) | Resolution::Loaded(fields) => {
            // sorted for stable output
            let fields: BTreeMap<&String, &String> = fields.iter().collect();
            json!({
                "key": key,
                "found": true,
                "served_from": if resolution.is_hit() { "cache" } else { "source" },
                "fields": fields,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn demo() -> Result<()> {
    let schema = RecordSchema::employee();

    let source = MemoryRecordSource::new();
    let hired = NaiveDate::from_ymd_opt(2018, 8, 5).context("invalid demo date")?;
    source
        .insert(
            schema.namespace(),
            1,
            Record::new()
                .with("empno", 1_i64)
                .with("fname", "Virag")
                .with("lname", "Tripathi")
                .with("job", "PFE")
                .with("mgr", 19_i64)
                .with("hiredate", hired)
                .with("sal", 90101.34)
                .with("comm", 1235.13)
                .with("dept", 96_i64),
        )
        .await;

    let cache = MemoryCacheStore::new();
    let resolver = CacheAside::new(Arc::new(cache.clone()), Arc::new(source.clone()));
    resolver.health_probe().check_ready().await.ensure()?;

    for id in [1, 1, 999] {
        let resolution = resolver.resolve(&schema, id).await?;
        print_resolution(&schema, id, &resolution)?;
    }

    tracing::info!(
        source_queries = source.queries(),
        cache_writes = cache.writes(),
        "Demo complete"
    );
    Ok(())
}
