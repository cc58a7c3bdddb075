use crate::infra::{collections_policy_set, ConsoleListener, FilenameExtractor};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use payables_engine::config::AppConfig;
use payables_engine::decisions::{EvaluationStep, Policy, PolicyEngine, PolicyOutcome, Record};
use payables_engine::error::AppError;
use payables_engine::ingestion::{IngestionItem, JobKind, JobOrchestrator};
use payables_engine::notifications::NotificationBus;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// JSON file holding one policy or an ordered array of policies
    #[arg(long)]
    pub(crate) policy: PathBuf,
    /// JSON file holding the record to evaluate
    #[arg(long)]
    pub(crate) record: PathBuf,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PolicyFile {
    Single(Policy),
    Ordered(Vec<Policy>),
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        policy,
        record,
        today,
    } = args;

    let policies: PolicyFile = serde_json::from_str(&std::fs::read_to_string(policy)?)?;
    let record: Record = serde_json::from_str(&std::fs::read_to_string(record)?)?;
    let engine = PolicyEngine::new(today.unwrap_or_else(|| Local::now().date_naive()));

    println!("Evaluating as of {}", engine.today());
    match policies {
        PolicyFile::Single(policy) => {
            let outcome = engine.apply(&policy, &record)?;
            render_outcome(&outcome);
        }
        PolicyFile::Ordered(policies) => {
            let decision = engine.decide(&policies, &record)?;
            for outcome in &decision.outcomes {
                render_outcome(outcome);
            }
            match decision.action_type {
                Some(action) => println!("Action: {action}"),
                None => println!("Action: none (no policy matched)"),
            }
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let engine = PolicyEngine::new(today);
    let policies = collections_policy_set(config.decisions.due_soon_days);

    println!("Collections decision demo (as of {today})");
    println!(
        "Playbook: {} policies, reminders within {} days",
        policies.len(),
        config.decisions.due_soon_days
    );

    for (label, record) in sample_records(today) {
        println!("\n{label}");
        let decision = engine.decide(&policies, &record)?;
        for outcome in &decision.outcomes {
            render_outcome(outcome);
        }
        match decision.action_type {
            Some(action) => println!("  => {action}"),
            None => println!("  => no automated action"),
        }
    }

    println!("\nIngestion demo");
    let bus = Arc::new(NotificationBus::new());
    let console = Arc::new(ConsoleListener);
    bus.subscribe(&console);
    let orchestrator = JobOrchestrator::new(bus);

    let items = vec![
        IngestionItem::new("inv-2044.pdf", b"%PDF-1.7 invoice".to_vec()),
        IngestionItem::new("po-7781.pdf", b"%PDF-1.4 purchase order".to_vec()),
        IngestionItem::new("stmt-september.png", b"\x89PNG statement".to_vec()),
        IngestionItem::new("aging-report.xlsx", b"PK spreadsheet".to_vec()),
        IngestionItem::new("receipt-0042.jpg", Vec::new()),
    ];
    let job = orchestrator.ingest(JobKind::Upload, &items, &FilenameExtractor)?;

    println!(
        "- {} finished {}: {} succeeded, {} failed",
        job.id,
        job.status,
        job.succeeded_count(),
        job.failed_count()
    );
    for result in &job.summary {
        println!(
            "  - {} [{:?}] {}",
            result.filename, result.status, result.message
        );
    }

    Ok(())
}

fn sample_records(today: NaiveDate) -> Vec<(&'static str, Record)> {
    vec![
        (
            "Harbor Freight Lines: disputed fuel surcharge",
            Record::new()
                .with_field("customer.name", "Harbor Freight Lines")
                .with_field("customer.segment", "Enterprise")
                .with_field("invoice.status", "overdue")
                .with_field("invoice.memo", "Q3 fuel surcharge, DISPUTED by AP")
                .with_field("invoice.balance", 4820.0)
                .with_field("invoice.due_date", today - Duration::days(12)),
        ),
        (
            "Maple Street Bakery: invoice due shortly",
            Record::new()
                .with_field("customer.name", "Maple Street Bakery")
                .with_field("customer.segment", "SMB")
                .with_field("invoice.status", "open")
                .with_field("invoice.memo", "net 30")
                .with_field("invoice.balance", 310.25)
                .with_field("invoice.due_date", today + Duration::days(3)),
        ),
        (
            "Northwind Logistics: paid in full",
            Record::new()
                .with_field("customer.name", "Northwind Logistics")
                .with_field("customer.segment", "Enterprise")
                .with_field("invoice.status", "paid")
                .with_field("invoice.balance", 0.0),
        ),
    ]
}

fn render_outcome(outcome: &PolicyOutcome) {
    let verdict = if outcome.matched { "MATCH" } else { "no match" };
    println!("  {} -> {}", outcome.policy_id, verdict);
    if outcome.trace.is_empty() {
        println!("    (policy has no conditions)");
    }
    for step in &outcome.trace {
        println!("    {}", render_step(step));
    }
}

fn render_step(step: &EvaluationStep) -> String {
    format!("[{}] {}: {}", step.status.label(), step.step, step.message)
}
