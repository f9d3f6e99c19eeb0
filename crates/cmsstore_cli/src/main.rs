//! `cmsstore` maintenance CLI.
//!
//! # Responsibility
//! - Run store maintenance jobs against one database file.
//! - Merge CLI flags over the JSON config file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cmsstore_core::db::migrations::{current_user_version, latest_version};
use cmsstore_core::model::node::CONTENT_RECYCLE_BIN_ID;
use cmsstore_core::repo::DefaultXmlSerializer;
use cmsstore_core::{
    init_logging, open_db, CacheRegistry, ContentService, EventDispatcher, StoreConfig,
};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// User id recorded in audit entries written by maintenance jobs.
const SYSTEM_USER_ID: i64 = -1;

#[derive(Parser, Debug)]
#[command(name = "cmsstore", about = "Content store maintenance", version)]
struct Cli {
    #[arg(long, env = "CMSSTORE_DB", value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a JSON configuration file",
        global = true
    )]
    config: Option<PathBuf>,

    #[arg(long, env = "CMSSTORE_LOG_LEVEL", value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[arg(long, env = "CMSSTORE_LOG_DIR", value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Permanently delete everything in the content recycle bin.
    EmptyRecycleBin,
    /// Regenerate published content projections.
    RebuildXml(RebuildArgs),
    /// Delete old non-current document versions.
    PruneVersions(PruneArgs),
    /// Print schema and content counts.
    Info,
}

#[derive(Args, Debug)]
struct RebuildArgs {
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    #[arg(long = "content-type", value_name = "ID", value_delimiter = ',')]
    content_types: Vec<i64>,
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Epoch milliseconds; older versions are removed.
    #[arg(long, value_name = "EPOCH_MS")]
    before: i64,

    #[arg(long = "id", value_name = "ID", value_delimiter = ',')]
    ids: Vec<i64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    init_logging(&config.logging).map_err(anyhow::Error::msg)?;

    let db_path = cli
        .db
        .clone()
        .context("a database file is required (--db or CMSSTORE_DB)")?;
    let conn = open_db(&db_path)
        .with_context(|| format!("failed to open database {:?}", db_path))?;
    let caches = CacheRegistry::new(config.cache.capacity);
    let service = ContentService::try_new(&conn, &caches, Arc::new(EventDispatcher::new()))?;

    match cli.command {
        Command::EmptyRecycleBin => {
            let deleted = service.empty_recycle_bin(SYSTEM_USER_ID)?;
            println!("deleted {deleted} nodes from recycle bin {CONTENT_RECYCLE_BIN_ID}");
        }
        Command::RebuildXml(args) => {
            let batch_size = args.batch_size.unwrap_or(config.rebuild.batch_size);
            anyhow::ensure!(batch_size > 0, "batch size must be greater than zero");
            let report = service.rebuild_xml(&DefaultXmlSerializer, batch_size, &args.content_types)?;
            println!(
                "processed={} written={} failed={}",
                report.processed,
                report.written,
                report.failed.len()
            );
            for node_id in report.failed {
                println!("failed node_id={node_id}");
            }
        }
        Command::PruneVersions(args) => {
            let removed = service.prune_versions(&args.ids, args.before)?;
            println!("removed {removed} versions");
        }
        Command::Info => {
            let documents: i64 = conn.query_row(
                "SELECT COUNT(*) FROM content;",
                [],
                |row| row.get(0),
            )?;
            println!("cmsstore version={}", cmsstore_core::core_version());
            println!(
                "schema user_version={} latest={}",
                current_user_version(&conn)?,
                latest_version()
            );
            println!("documents={documents}");
        }
    }

    info!("event=cli_command module=cli status=ok");
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match cli.config.as_ref() {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("failed to load config file {:?}", path))?,
        None => StoreConfig::default(),
    };
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }
    if let Some(dir) = cli.log_dir.clone() {
        config.logging.log_dir = Some(dir);
    }
    config.validate()?;
    Ok(config)
}
