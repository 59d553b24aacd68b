// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley doctor` command implementation.
//!
//! Runs diagnostic checks against every backend the context pipeline
//! depends on and prints one line per check.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use colored::Colorize;
use parley_config::model::ParleyConfig;
use parley_core::types::HealthStatus;
use parley_core::ParleyError;

use crate::services;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name,
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `parley doctor` command.
pub async fn run_doctor(
    config: &ParleyConfig,
    config_path: Option<&PathBuf>,
    plain: bool,
) -> Result<(), ParleyError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(config_path),
        check_database(&config.storage.database_path).await,
        check_vector_store(config).await,
        check_llm_key(config),
    ];

    println!();
    println!("  parley doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in &results {
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{}", render(result, use_color));
    }
    println!();
    match issues {
        0 => println!("  All checks passed."),
        1 => println!("  1 issue found."),
        n => println!("  {n} issues found."),
    }
    println!();

    Ok(())
}

fn render(result: &CheckResult, use_color: bool) -> String {
    let ms = result.duration.as_millis();
    if !use_color {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        return format!("    {tag} {:<14} {} ({ms}ms)", result.name, result.message);
    }
    let (symbol, message) = match result.status {
        CheckStatus::Pass => ("✓".green(), result.message.normal()),
        CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
        CheckStatus::Fail => ("✗".red(), result.message.red()),
    };
    format!("    {symbol} {:<14} {message} ({ms}ms)", result.name)
}

fn check_config(path: Option<&PathBuf>) -> CheckResult {
    let start = Instant::now();
    let loaded = match path {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    match loaded {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// The profile database exists, opens, and has been migrated.
async fn check_database(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !std::path::Path::new(db_path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => return CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start),
    };
    let count = conn
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
        })
        .await;
    match count {
        Ok(n) => CheckResult::new("Database", CheckStatus::Pass, format!("{n} document(s)"), start),
        Err(e) => CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not migrated yet: {e}"),
            start,
        ),
    }
}

async fn check_vector_store(config: &ParleyConfig) -> CheckResult {
    let start = Instant::now();
    let store = match services::vector_store(config) {
        Ok(store) => store,
        Err(e) => return CheckResult::new("Vector store", CheckStatus::Fail, e.to_string(), start),
    };
    let backend = &config.vector.backend;
    match tokio::time::timeout(Duration::from_secs(5), store.health_check()).await {
        Ok(Ok(HealthStatus::Healthy)) => CheckResult::new(
            "Vector store",
            CheckStatus::Pass,
            format!("{backend} healthy"),
            start,
        ),
        Ok(Ok(HealthStatus::Degraded(reason))) => CheckResult::new(
            "Vector store",
            CheckStatus::Warn,
            format!("{backend} degraded: {reason}"),
            start,
        ),
        Ok(Ok(HealthStatus::Unhealthy(reason))) => CheckResult::new(
            "Vector store",
            CheckStatus::Fail,
            format!("{backend} unhealthy: {reason}"),
            start,
        ),
        Ok(Err(e)) => CheckResult::new("Vector store", CheckStatus::Fail, e.to_string(), start),
        Err(_) => CheckResult::new("Vector store", CheckStatus::Fail, "timeout (5s)", start),
    }
}

/// Only presence is checked; a missing key disables extraction and summaries.
fn check_llm_key(config: &ParleyConfig) -> CheckResult {
    let start = Instant::now();
    let configured = config.anthropic.api_key.as_deref().is_some_and(|k| !k.is_empty());
    let from_env = std::env::var("ANTHROPIC_API_KEY").is_ok_and(|k| !k.is_empty());
    match (configured, from_env) {
        (true, _) => CheckResult::new("LLM API key", CheckStatus::Pass, "set in config", start),
        (false, true) => CheckResult::new("LLM API key", CheckStatus::Pass, "set via ANTHROPIC_API_KEY", start),
        (false, false) => CheckResult::new(
            "LLM API key",
            CheckStatus::Warn,
            "missing: fact extraction and summaries will be skipped",
            start,
        ),
    }
}
