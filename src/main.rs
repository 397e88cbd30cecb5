use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use uuid::Uuid;

use message_runner::engine::ExpectationEngine;
use message_runner::limits::ExecutionLimits;
use message_runner::protocol::{CaseResult, CaseStatus, ExecutionReport, Suite, TestCase};
use message_runner::telemetry::{self, TelemetryConfig};
use message_runner::{loader, validation, Context};

#[derive(Parser)]
#[command(name = "message-runner")]
#[command(about = "Validates and extracts values from XML messages using dynamic expressions", long_about = None)]
struct Cli {
    /// Enables debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Executes a test suite
    Execute {
        /// Path to the suite file
        #[arg(short, long)]
        file: PathBuf,

        /// Path to the output report file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Checks a suite without executing it
    Check {
        /// Path to the suite file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env();
    if cli.verbose {
        telemetry_config = telemetry_config.verbose();
    }
    if let Err(e) = telemetry::init_telemetry(telemetry_config) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }

    let result = match &cli.command {
        Commands::Execute { file, output } => execute_suite(file, output.as_deref()),
        Commands::Check { file } => check_suite(file),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            process::exit(2);
        }
    }
}

/// Loads and statically validates a suite.
fn load_and_validate(file: &Path, limits: &ExecutionLimits) -> Result<Suite> {
    let suite = loader::load_suite_from_file(file)?;
    info!(suite = %suite.meta.name, cases = suite.cases.len(), "📋 Suite loaded");

    if let Err(errors) = validation::validate_suite(&suite, limits) {
        for err in &errors {
            warn!("{}", err);
            eprintln!("   ❌ {}", err);
        }
        bail!("Suite {:?} has {} validation error(s)", file, errors.len());
    }
    Ok(suite)
}

fn check_suite(file: &Path) -> Result<bool> {
    load_and_validate(file, &ExecutionLimits::from_env())?;
    println!("✅ Suite is valid");
    Ok(true)
}

fn execute_suite(file: &Path, output: Option<&Path>) -> Result<bool> {
    let limits = ExecutionLimits::from_env();
    let suite = load_and_validate(file, &limits)?;

    let report = run_suite(&suite, limits)?;
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
            info!(path = ?path, "📄 Report saved");
        }
        None => println!("{}", json),
    }

    Ok(report.status == CaseStatus::Passed)
}

/// Runs every case in order over one shared context, so variables
/// extracted by a case are visible to the cases after it.
fn run_suite(suite: &Suite, limits: ExecutionLimits) -> Result<ExecutionReport> {
    let start_time = Utc::now();

    let registry = suite
        .config
        .build_registry()
        .context("Failed to build function libraries")?;
    let mut context = Context::new(Arc::new(registry)).with_limits(limits);
    context.extend_json(&suite.config.variables);

    info!(suite = %suite.meta.id, "▶️  Starting execution");
    let cases: Vec<CaseResult> = suite
        .cases
        .iter()
        .map(|case| run_case(case, &mut context))
        .collect();

    let all_passed = cases.iter().all(|c| c.status == CaseStatus::Passed);
    let end_time = Utc::now();
    info!(passed = all_passed, "🏁 Execution finished");

    Ok(ExecutionReport {
        execution_id: Uuid::new_v4().to_string(),
        suite_id: suite.meta.id.clone(),
        status: if all_passed { CaseStatus::Passed } else { CaseStatus::Failed },
        start_time: start_time.to_rfc3339(),
        end_time: end_time.to_rfc3339(),
        cases,
        variables: context
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })
}

#[tracing::instrument(name = "case", skip(case, context), fields(case_id = %case.id))]
fn run_case(case: &TestCase, context: &mut Context) -> CaseResult {
    let started = Instant::now();
    let message = case.message.to_message();
    let outcome = ExpectationEngine::new(&message).run_detailed(&case.expectations, context);
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome.failure {
        None => {
            info!(duration_ms, "✅ Case passed");
            CaseResult {
                case_id: case.id.clone(),
                status: CaseStatus::Passed,
                duration_ms,
                entries: outcome.entries,
                error: None,
                error_code: None,
            }
        }
        Some(failure) => {
            warn!(duration_ms, error = %failure, "❌ Case failed");
            CaseResult {
                case_id: case.id.clone(),
                status: CaseStatus::Failed,
                duration_ms,
                entries: outcome.entries,
                error: Some(failure.to_string()),
                error_code: Some(failure.code().formatted()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SUITE: &str = r#"{
        "spec_version": "0.1",
        "meta": { "id": "variable-support", "name": "Variable support" },
        "config": {
            "variables": { "text": "text", "letter": "B" },
            "function_libraries": [
                { "name": "functionLib", "prefix": "lib", "functions": { "concat": "concat" } }
            ]
        },
        "cases": [
            {
                "id": "extract",
                "message": {
                    "payload": "<root><element attributeA='attribute-value'><sub-elementA>text-value</sub-elementA><sub-elementB>text-value</sub-elementB></element></root>",
                    "headers": { "operation": "sayHello", "header-valueA": "A" }
                },
                "validate_body": { "//root/element/sub-elementA": "lib:concat(${text}, '-value')" },
                "extract_header": { "header-valueA": "${captured}" },
                "extract_body": { "citrus:concat('//root/element/sub-element', ${letter})": "${fromBody}" }
            },
            {
                "id": "reuse",
                "message": { "headers": { "echo": "A" } },
                "validate_header": { "echo": "${captured}" }
            }
        ]
    }"#;

    fn load(raw: &str) -> Suite {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", raw).unwrap();
        loader::load_suite_from_file(file.path()).unwrap()
    }

    #[test]
    fn test_run_suite_shares_context_between_cases() {
        let suite = load(SUITE);
        let report = run_suite(&suite, ExecutionLimits::default()).unwrap();

        assert_eq!(report.status, CaseStatus::Passed);
        assert_eq!(report.cases.len(), 2);
        assert_eq!(report.variables.get("captured").map(String::as_str), Some("A"));
        assert_eq!(report.variables.get("fromBody").map(String::as_str), Some("text-value"));
    }

    #[test]
    fn test_failed_case_is_reported_and_others_still_run() {
        let raw = SUITE.replace(r#""echo": "A""#, r#""echo": "Z""#);
        let suite = load(&raw);
        let report = run_suite(&suite, ExecutionLimits::default()).unwrap();

        assert_eq!(report.status, CaseStatus::Failed);
        assert_eq!(report.cases[0].status, CaseStatus::Passed);

        let failed = &report.cases[1];
        assert_eq!(failed.status, CaseStatus::Failed);
        assert_eq!(failed.error_code.as_deref(), Some("E3001"));
        assert!(failed.error.as_deref().unwrap().contains("validate-header"));
    }

    #[test]
    fn test_execute_writes_report() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SUITE).unwrap();
        let output = NamedTempFile::new().unwrap();

        let passed = execute_suite(file.path(), Some(output.path())).unwrap();
        assert!(passed);

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.path()).unwrap()).unwrap();
        assert_eq!(report["status"], "passed");
        assert_eq!(report["suite_id"], "variable-support");
        assert!(chrono::DateTime::parse_from_rfc3339(report["start_time"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_check_rejects_invalid_suite() {
        let raw = SUITE.replace("lib:concat(", "other:concat(");
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", raw).unwrap();

        assert!(check_suite(file.path()).is_err());
    }
}
