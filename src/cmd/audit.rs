//! Ledger inspection: `agentflow audit`.

use agentflow::config::Config;
use agentflow::ledger::sink::list_sessions;
use agentflow::ledger::{ExecutionRecord, Ledger, SessionFile};
use agentflow::util::{render_output, truncate};
use anyhow::{Context, Result, bail};

use super::super::AuditCommands;

pub async fn cmd_audit(config: &Config, command: &AuditCommands) -> Result<()> {
    let sessions = list_sessions(&config.ledger_dir)?;

    match command {
        AuditCommands::List => {
            if sessions.is_empty() {
                println!("No sessions recorded in {}", config.ledger_dir.display());
                return Ok(());
            }
            println!("Sessions in {}:", config.ledger_dir.display());
            for session in &sessions {
                let modified = session
                    .modified
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("  {}  {}", session.session_id, modified);
            }
        }
        AuditCommands::Show {
            session,
            step,
            last,
        } => {
            let file = find_session(&sessions, session)?;
            let ledger = load(file).await?;
            let mut records = match step {
                Some(pattern) => ledger.filter_by_step(&file.session_id, pattern),
                None => ledger.query(&file.session_id),
            };
            if let Some(n) = last {
                let skip = records.len().saturating_sub(*n);
                records.drain(..skip);
            }

            println!("Session {}", file.session_id);
            println!();
            for record in &records {
                print_record(record);
            }
        }
        AuditCommands::Summary { session } => {
            let file = find_session(&sessions, session)?;
            let ledger = load(file).await?;
            let summary = ledger.summary(&file.session_id);

            println!("Session {}", file.session_id);
            println!("  records:   {}", summary.total);
            println!("  steps:     {}", summary.steps);
            println!("  succeeded: {}", summary.succeeded);
            println!("  failed:    {}", summary.failed);
            println!("  retries:   {}", summary.retries());
        }
        AuditCommands::Export { session, output } => {
            let file = find_session(&sessions, session)?;
            let ledger = load(file).await?;
            let count = ledger.export_json(&file.session_id, output)?;
            println!("Exported {} records to {}", count, output.display());
        }
    }
    Ok(())
}

/// Resolve a full session id or a unique prefix of one.
fn find_session<'a>(sessions: &'a [SessionFile], query: &str) -> Result<&'a SessionFile> {
    let matches: Vec<&SessionFile> = sessions
        .iter()
        .filter(|s| s.session_id.to_string().starts_with(query))
        .collect();
    match matches.as_slice() {
        [single] => Ok(single),
        [] => bail!("No session matching '{}'", query),
        _ => bail!("Session prefix '{}' is ambiguous ({} matches)", query, matches.len()),
    }
}

async fn load(file: &SessionFile) -> Result<Ledger> {
    let ledger = Ledger::new();
    ledger
        .import_jsonl(&file.path)
        .await
        .with_context(|| format!("Failed to read session ledger {}", file.path.display()))?;
    Ok(ledger)
}

fn print_record(record: &ExecutionRecord) {
    println!(
        "  {} #{} {} [{}] {} ms",
        record.step_id,
        record.attempt,
        record.status,
        record.input.kind,
        record.duration_ms()
    );
    if let Some(output) = &record.output {
        println!("      -> {}", truncate(&render_output(output).replace('\n', " "), 100));
    }
    if let Some(error) = &record.error {
        println!("      !! {}: {}", error.kind, error.message);
    }
}
