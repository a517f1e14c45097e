//! Subcommand implementations.

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use chainlog_config::AuditServices;
use chainlog_contracts::{
    entry::{Actor, AuditEntry},
    error::{ChainlogError, ChainlogResult},
    event::AuditEvent,
    value::DetailValue,
    verify::{Checkpoint, SequenceRange, VerificationResult},
};
use chainlog_verify::ChainStatus;

use crate::{parse_actor, ExportArgs, ListArgs, RecordArgs, VerifyArgs};

pub fn record(services: &AuditServices, args: RecordArgs) -> ChainlogResult<()> {
    let actor = args.actor.as_deref().map_or(Actor::System, parse_actor);
    let details = match args.details.as_deref() {
        Some(raw) => parse_details(raw)?,
        None => DetailValue::empty_map(),
    };

    let mut event = AuditEvent::new(actor, args.action, args.resource_type)
        .details(details)
        .rollbackable(args.rollbackable);
    event.resource_id = args.resource_id;
    event.resource_name = args.resource_name;
    event.ip_address = args.ip_address;

    let entry = services.engine.record(event)?;
    println!("{}", to_json(&entry)?);
    Ok(())
}

pub fn list(services: &AuditServices, args: ListArgs) -> ChainlogResult<()> {
    let page = services
        .query
        .list(&args.filter.to_filter(), args.page, args.page_size)?;

    if args.json {
        println!("{}", to_json(&page)?);
        return Ok(());
    }

    for entry in &page.items {
        print_row(entry);
    }
    println!(
        "-- page {} of {} ({} matching entries)",
        page.page,
        page.page_count().max(1),
        page.total
    );
    Ok(())
}

pub fn types(services: &AuditServices) -> ChainlogResult<()> {
    let actions: Vec<String> = services
        .query
        .get_action_types()?
        .iter()
        .map(|a| a.to_string())
        .collect();
    println!("action types:   {}", actions.join(", "));
    println!("resource types: {}", services.query.get_resource_types()?.join(", "));
    Ok(())
}

pub fn export(services: &AuditServices, args: ExportArgs) -> ChainlogResult<()> {
    let bytes = services.query.export(args.format, &args.filter.to_filter())?;
    match &args.output {
        Some(path) => std::fs::write(path, &bytes).map_err(|e| ChainlogError::PersistenceFailure {
            reason: format!("failed to write export to '{}': {e}", path.display()),
        }),
        None => std::io::stdout()
            .write_all(&bytes)
            .map_err(|e| ChainlogError::PersistenceFailure {
                reason: format!("failed to write export: {e}"),
            }),
    }
}

/// Verify once, or keep verifying every `--watch` seconds.
///
/// A watch run resumes from the last clean checkpoint, so each pass only
/// re-hashes what was appended since, and stops at the first pass that is
/// not intact.
pub fn verify(services: &AuditServices, args: VerifyArgs) -> ChainlogResult<ExitCode> {
    let range = match (args.start, args.end) {
        (None, None) => None,
        (start, end) => Some(SequenceRange {
            start: start.unwrap_or(1),
            end,
        }),
    };

    let mut checkpoint: Option<Checkpoint> = None;
    loop {
        let outcome = match (&checkpoint, args.watch) {
            (Some(anchor), Some(_)) if range.is_none() => {
                services.verifier.verify_from(anchor, None)
            }
            _ => services.verifier.verify(range),
        };
        let status = ChainStatus::from_outcome(&outcome);

        match &outcome {
            Ok(result) => {
                report(result, args.json)?;
                if let Some(anchor) = &result.checkpoint {
                    checkpoint = Some(anchor.clone());
                }
            }
            Err(e) => eprintln!("verification could not complete: {e}"),
        }
        println!("status: {status}");

        match (status, args.watch) {
            (ChainStatus::Intact, Some(secs)) => std::thread::sleep(Duration::from_secs(secs)),
            (status, _) => return Ok(exit_code(status)),
        }
    }
}

fn exit_code(status: ChainStatus) -> ExitCode {
    match status {
        ChainStatus::Intact => ExitCode::SUCCESS,
        ChainStatus::Compromised => ExitCode::from(2),
        ChainStatus::Unverifiable => ExitCode::from(3),
    }
}

pub fn report(result: &VerificationResult, json: bool) -> ChainlogResult<()> {
    if json {
        println!("{}", to_json(result)?);
        return Ok(());
    }

    println!(
        "{} [{} ms, at {}]",
        result.summary(),
        result.duration_ms,
        result.verification_time.to_rfc3339()
    );
    for issue in &result.errors {
        println!(
            "  #{:<6} {:<14} {}",
            issue.sequence,
            issue.kind.to_string(),
            issue.message
        );
    }
    Ok(())
}

pub fn print_row(entry: &AuditEntry) {
    println!(
        "#{:<6} {}  {:<12} {:<10} {}/{}  {}{}",
        entry.sequence,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        entry.action_type.to_string(),
        entry.actor.to_string(),
        entry.resource_type,
        entry.resource_id.as_deref().unwrap_or("-"),
        entry.entry_hash.get(..12).unwrap_or(entry.entry_hash.as_str()),
        if entry.rollback_executed {
            "  (rolled back)"
        } else {
            ""
        }
    );
}

fn parse_details(raw: &str) -> ChainlogResult<DetailValue> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ChainlogError::EncodingFailure {
            reason: format!("--details is not valid JSON: {e}"),
        })?;
    DetailValue::try_from(value)
}

fn to_json<T: serde::Serialize>(value: &T) -> ChainlogResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| ChainlogError::EncodingFailure {
        reason: format!("failed to render JSON: {e}"),
    })
}
