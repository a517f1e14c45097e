//! chainlog: operator CLI for the tamper-evident audit log.
//!
//! Usage:
//!   chainlog --config chainlog.toml record --actor alice --action create --resource-type vm --resource-id 101
//!   chainlog --config chainlog.toml list --resource-type vm
//!   chainlog --config chainlog.toml verify --watch 60
//!   chainlog --config chainlog.toml export --format csv > audit.csv
//!   chainlog demo
//!
//! Without `--config` every command runs against a fresh in-memory store.

mod commands;
mod demo;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chainlog_config::ChainlogConfig;
use chainlog_contracts::{
    entry::{ActionType, Actor},
    error::ChainlogResult,
    query::{AuditFilter, ExportFormat},
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// chainlog: append-only, SHA-256 hash-chained audit log.
#[derive(Parser)]
#[command(
    name = "chainlog",
    about = "Record, query and verify a tamper-evident audit log",
    long_about = "Operates a chainlog audit log: record privileged actions, page through\n\
                  and export them, and prove the hash chain has not been altered."
)]
struct Cli {
    /// TOML configuration file. Defaults to an in-memory store.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one entry to the chain.
    Record(RecordArgs),
    /// List entries, filtered and paginated.
    List(ListArgs),
    /// Print the distinct action and resource types present in the log.
    Types,
    /// Verify chain integrity. Exit code 0 intact, 2 compromised, 3 unverifiable.
    Verify(VerifyArgs),
    /// Export entries as JSON or CSV.
    Export(ExportArgs),
    /// Run the end-to-end scenario and a tampering demonstration in memory.
    Demo,
}

#[derive(Args)]
struct RecordArgs {
    /// Acting principal. Omit for a system action.
    #[arg(long)]
    actor: Option<String>,
    #[arg(long)]
    action: ActionType,
    #[arg(long)]
    resource_type: String,
    #[arg(long)]
    resource_id: Option<String>,
    #[arg(long)]
    resource_name: Option<String>,
    /// JSON object recorded verbatim in the entry.
    #[arg(long)]
    details: Option<String>,
    #[arg(long)]
    ip_address: Option<String>,
    #[arg(long)]
    rollbackable: bool,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    action: Option<ActionType>,
    #[arg(long)]
    resource_type: Option<String>,
    #[arg(long)]
    resource_id: Option<String>,
    /// Principal id, or SYSTEM.
    #[arg(long)]
    actor: Option<String>,
    /// Inclusive lower bound, RFC 3339.
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    /// Inclusive upper bound, RFC 3339.
    #[arg(long)]
    until: Option<DateTime<Utc>>,
}

impl FilterArgs {
    fn to_filter(&self) -> AuditFilter {
        AuditFilter {
            action_type: self.action,
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            actor: self.actor.as_deref().map(parse_actor),
            start_date: self.since,
            end_date: self.until,
        }
    }
}

#[derive(Args)]
struct ListArgs {
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long, default_value_t = 1)]
    page: u64,
    /// 0 selects the configured default.
    #[arg(long, default_value_t = 0)]
    page_size: u64,
    /// Print the page as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long)]
    start: Option<u64>,
    #[arg(long)]
    end: Option<u64>,
    /// Re-verify every SECS seconds until the chain is no longer intact.
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,
    /// Print the full verification result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long, default_value_t = ExportFormat::Json)]
    format: ExportFormat,
    #[command(flatten)]
    filter: FilterArgs,
    /// Write to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// `SYSTEM` (any case) is the system actor; anything else a principal id.
fn parse_actor(s: &str) -> Actor {
    if s.eq_ignore_ascii_case("system") {
        Actor::System
    } else {
        Actor::principal(s)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Set RUST_LOG=debug for per-entry output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("chainlog error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ChainlogResult<ExitCode> {
    if let Command::Demo = cli.command {
        demo::run()?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = match &cli.config {
        Some(path) => ChainlogConfig::from_file(path)?,
        None => ChainlogConfig::default(),
    };
    let services = config.assemble(chainlog_core::RollbackRegistry::new())?;

    match cli.command {
        Command::Record(args) => commands::record(&services, args).map(|()| ExitCode::SUCCESS),
        Command::List(args) => commands::list(&services, args).map(|()| ExitCode::SUCCESS),
        Command::Types => commands::types(&services).map(|()| ExitCode::SUCCESS),
        Command::Verify(args) => commands::verify(&services, args),
        Command::Export(args) => commands::export(&services, args).map(|()| ExitCode::SUCCESS),
        Command::Demo => Ok(ExitCode::SUCCESS),
    }
}
