use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meridian_cache::api::GameClient;
use meridian_cache::cache::{age_display, CacheResult, Category, SqliteStorage};
use meridian_cache::config::Config;
use meridian_cache::CacheServices;

#[derive(Parser, Debug)]
#[command(name = "meridian-cache")]
#[command(about = "Inspect and maintain the Dusk Meridian client cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/meridian-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List every cache key with its age and freshness
  Status,
  /// Row counts per table
  Stats,
  /// Force the next read of a key to refetch
  Invalidate { key: String },
  /// Remove all cached data
  Clear,
  /// Drop metadata whose TTL has run out
  ClearExpired,
  /// Remove one category's data and metadata
  ClearCategory { category: String },
  /// Fetch every codex category into the cache
  Warm,
}

/// Log to a daily file under the data directory; RUST_LOG controls the level.
fn init_tracing() -> Result<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let log_dir = Config::data_dir()?.join("logs");
  let appender = tracing_appender::rolling::daily(log_dir, "meridian-cache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(fmt::layer().with_writer(io::stderr).compact())
    .with(filter)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing()?;

  let config = Config::load(args.config.as_deref())?;
  let services = CacheServices::open(&config)?;

  match args.command {
    Command::Status => print_status(&services)?,
    Command::Stats => print_stats(&services)?,
    Command::Invalidate { key } => {
      if services.codex.force_refresh(&key)? {
        println!("Invalidated {}", key);
      } else {
        println!("No cache entry for {}", key);
      }
    }
    Command::Clear => {
      services.codex.clear_all_cache()?;
      println!("Cache cleared");
    }
    Command::ClearExpired => {
      let removed = services.codex.clear_expired_cache()?;
      println!("Removed {} expired entries", removed);
    }
    Command::ClearCategory { category } => {
      let category: Category = category.parse()?;
      services.codex.clear_category(category)?;
      println!("Cleared {}", category);
    }
    Command::Warm => {
      let client = GameClient::new(&config.api)?;
      warm(&services, &client).await?;
    }
  }

  Ok(())
}

fn print_status(services: &CacheServices<SqliteStorage>) -> Result<()> {
  let entries = services.codex.cache_status()?;
  if entries.is_empty() {
    println!("Cache is empty");
    return Ok(());
  }

  println!(
    "{:<32} {:<12} {:<12} {:<10} {}",
    "KEY", "CATEGORY", "CLASS", "FRESH", "FETCHED"
  );
  for entry in entries {
    println!(
      "{:<32} {:<12} {:<12} {:<10} {}",
      entry.metadata.key,
      entry.metadata.category,
      entry.class.label(),
      if entry.fresh { "yes" } else { "expired" },
      entry.age_display()
    );
  }
  Ok(())
}

fn print_stats(services: &CacheServices<SqliteStorage>) -> Result<()> {
  let stats = services.codex.cache_stats()?;
  let now = chrono::Utc::now().timestamp_millis();

  for (table, rows) in &stats.rows_by_table {
    println!("{:<24} {:>8}", table.name(), rows);
  }
  println!("{:<24} {:>8}", "total", stats.total_rows);

  if let (Some(oldest), Some(newest)) = (stats.oldest_fetch, stats.newest_fetch) {
    println!(
      "Oldest fetch {}, newest fetch {}",
      age_display(now - oldest),
      age_display(now - newest)
    );
  }
  Ok(())
}

fn report<T>(name: &str, result: Result<CacheResult<Vec<T>>>) -> bool {
  match result {
    Ok(result) => {
      println!("{:<20} {:>6} rows ({:?})", name, result.data.len(), result.source);
      true
    }
    Err(e) => {
      println!("{:<20} failed: {}", name, e);
      false
    }
  }
}

async fn warm(services: &CacheServices<SqliteStorage>, client: &GameClient) -> Result<()> {
  let codex = &services.codex;

  let (classes, skills, spells, professions, technologies, continents) = futures::join!(
    codex.character_classes(|| client.character_classes()),
    codex.skills(|| client.skills()),
    codex.spells(|| client.spells()),
    codex.professions(|| client.professions()),
    codex.technologies(|| client.technologies()),
    codex.continents(|| client.continents()),
  );
  let (regions, settlements, factions, resources, stats) = futures::join!(
    codex.regions(None, || client.regions(None)),
    codex.settlements(None, None, || client.settlements(None, None)),
    codex.factions(|| client.factions()),
    codex.resources(|| client.resources()),
    codex.world_statistics(|| client.world_statistics()),
  );

  let results = [
    report("character classes", classes),
    report("skills", skills),
    report("spells", spells),
    report("professions", professions),
    report("technologies", technologies),
    report("continents", continents),
    report("regions", regions),
    report("settlements", settlements),
    report("factions", factions),
    report("resources", resources),
    report("world statistics", stats.map(|r| r.map(|s| vec![s]))),
  ];

  warm_outcome(&results)
}

/// Fail the command if any category could not be fetched.
fn warm_outcome(results: &[bool]) -> Result<()> {
  let failed = results.iter().filter(|ok| !**ok).count();
  info!(failed, "Cache warm finished");
  if failed > 0 {
    return Err(eyre!("{} of {} categories could not be fetched", failed, results.len()));
  }
  Ok(())
}
