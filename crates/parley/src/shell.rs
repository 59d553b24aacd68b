// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley shell` command implementation.
//!
//! A REPL that runs each line through `build_context` and prints what the
//! pipeline inferred: funnel stage, intent, facts, and the prompt block.
//! With an LLM configured, a reply is generated from that context so the
//! conversation can continue. `/end` finalizes the session and starts a new
//! one.

use std::sync::Arc;

use colored::Colorize;
use parley_config::model::ParleyConfig;
use parley_context::{ContextBundle, ContextManager, ContextRequest, ContextServices};
use parley_core::types::{ChatMessage, ProviderMessage, ProviderRequest, Role};
use parley_core::{ParleyError, ProviderAdapter};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use crate::services;

pub struct ShellOptions {
    pub tenant_id: String,
    pub bot_id: String,
    pub visitor_id: Option<String>,
    pub ephemeral: bool,
}

struct Session {
    id: String,
    transcript: Vec<ChatMessage>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transcript: Vec::new(),
        }
    }
}

/// Runs the `parley shell` interactive REPL.
pub async fn run_shell(config: ParleyConfig, options: ShellOptions) -> Result<(), ParleyError> {
    let services: ContextServices = services::connect(&config, options.ephemeral).await?;
    let provider = services.provider.clone();
    let manager = ContextManager::new(services, &config);

    let mut rl = DefaultEditor::new()
        .map_err(|e| ParleyError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "parley shell".bold().green());
    println!(
        "Type {} to finalize the session, {} to exit.\n",
        "/end".yellow(),
        "/quit".yellow()
    );
    if provider.is_none() {
        println!("{}", "no LLM configured: context only, no replies".dimmed());
    }

    let mut session = Session::new();
    let prompt = format!("{}> ", config.agent.name.green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                match trimmed {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/end" => {
                        end_session(&manager, &options, &session).await;
                        session = Session::new();
                        continue;
                    }
                    _ => {}
                }
                let _ = rl.add_history_entry(&line);

                let mut request = ContextRequest::new(
                    trimmed,
                    &session.id,
                    &options.bot_id,
                    &options.tenant_id,
                )
                .with_history(&session.transcript);
                if let Some(visitor) = options.visitor_id.as_deref() {
                    request = request.with_visitor(visitor);
                }
                let bundle = manager.build_context(request).await;
                print_bundle(&bundle);
                session.transcript.push(ChatMessage::user(trimmed));

                if let Some(provider) = &provider {
                    match reply(provider, &config, &bundle).await {
                        Ok(text) => {
                            println!("{} {text}\n", "bot:".cyan().bold());
                            session.transcript.push(ChatMessage::assistant(text));
                        }
                        Err(e) => eprintln!("{}: {e}", "error".red()),
                    }
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    if !session.transcript.is_empty() {
        end_session(&manager, &options, &session).await;
    }
    Ok(())
}

fn print_bundle(bundle: &ContextBundle) {
    let mut header = format!(
        "stage {} ({:.2})",
        bundle.stage.to_string().bold(),
        bundle.memory.stage_confidence
    );
    if let Some(intent) = bundle.intent {
        header.push_str(&format!("  intent {}", intent.to_string().bold()));
    }
    if let Some(secondary) = bundle.secondary_intent {
        header.push_str(&format!(" / {secondary}"));
    }
    if let Some(predicted) = bundle.predicted_intent {
        header.push_str(&format!("  next {predicted}"));
    }
    header.push_str(&format!("  {}ms", bundle.build_time_ms));
    if bundle.degraded {
        header.push_str(&format!("  {}", "degraded".red()));
    }
    println!("{header}");

    for (key, fact) in &bundle.memory.facts {
        println!(
            "  {} {key} = {} ({:.2}, {})",
            "fact".blue(),
            fact.value,
            fact.confidence,
            fact.category
        );
    }
    if !bundle.prompt_context.is_empty() {
        println!("{}", bundle.prompt_context.dimmed());
    }
    println!("{} {}\n", "guidance:".yellow(), bundle.stage_guidance);
}

/// Generates the bot's reply from the built context.
async fn reply(
    provider: &Arc<dyn ProviderAdapter>,
    config: &ParleyConfig,
    bundle: &ContextBundle,
) -> Result<String, ParleyError> {
    let mut system = format!(
        "You are a helpful sales and support assistant.\n\nGuidance for this stage: {}",
        bundle.stage_guidance
    );
    if !bundle.prompt_context.is_empty() {
        system.push_str("\n\n");
        system.push_str(&bundle.prompt_context);
    }

    let messages = bundle
        .recent_messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| ProviderMessage {
            role: m.role.to_string(),
            content: m.content.clone(),
        })
        .collect();
    let request = ProviderRequest {
        model: String::new(),
        system_prompt: Some(system),
        messages,
        max_tokens: config.anthropic.max_tokens,
        temperature: None,
        json_mode: false,
    };
    debug!(messages = request.messages.len(), "generating shell reply");
    Ok(provider.complete(request).await?.content)
}

async fn end_session(manager: &ContextManager, options: &ShellOptions, session: &Session) {
    match manager
        .finalize_session(
            &session.id,
            &options.bot_id,
            &options.tenant_id,
            &session.transcript,
            None,
        )
        .await
    {
        Ok(report) => {
            println!("{}", "session finalized".green());
            if !report.summary.is_empty() {
                println!("  summary: {}", report.summary.short_summary);
                println!("  outcome: {}", report.summary.outcome);
            }
            if let Some(id) = report.vector_id {
                println!("  {}", format!("indexed as {id}").dimmed());
            }
            println!();
        }
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "failed to finalize session");
            eprintln!("{}: {e}", "error".red());
        }
    }
}
