//! # Waterfall Console Demo
//!
//! Chats through a small onboarding waterfall on the terminal. Each line
//! typed on stdin is one turn; the dialog stack and memory are persisted in
//! process between turns.
//!
//! ## Run This Example
//!
//! ```bash
//! cargo run -p parley-demos --bin waterfall_console -- --expire-after 300
//! PARLEY_BOT__NAME=Pip cargo run -p parley-demos --bin waterfall_console
//! ```
//!
//! Type `cancel` to end the conversation, `quit` to exit.

use anyhow::Result;
use clap::Parser;
use parley::prelude::*;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "waterfall_console")]
#[command(about = "Talk to a waterfall dialog from the terminal", long_about = None)]
struct Cli {
    /// Settings file exposed as the `settings` memory scope
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Environment prefix for settings overrides
    #[arg(long, default_value = "PARLEY")]
    env_prefix: String,

    /// Restart the conversation after this many idle seconds
    #[arg(long)]
    expire_after: Option<u64>,

    /// Log filter, e.g. `info` or `parley_dialogs=debug`
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    log: String,
}

fn onboarding() -> Result<WaterfallDialog> {
    let dialog = WaterfallDialog::new(
        "onboarding",
        vec![
            WaterfallStep::named("askName", |step| {
                Box::pin(async move {
                    let bot: String = step.state().get_value("settings.bot.name", "Parley".to_string())?;
                    step.context_mut()
                        .send_activity(format!("Hi, I'm {bot}. What's your name?"));
                    Ok(DialogTurnResult::end_of_turn())
                })
            }),
            WaterfallStep::named("askColor", |step| {
                Box::pin(async move {
                    let name = step.result().cloned().unwrap_or(Value::Null);
                    step.state().set_value("user.profile.name", &name)?;
                    step.context_mut()
                        .send_activity("Nice to meet you. Favourite colour?");
                    Ok(DialogTurnResult::end_of_turn())
                })
            }),
            WaterfallStep::named("summary", |step| {
                Box::pin(async move {
                    let color = step.result().cloned().unwrap_or(Value::Null);
                    step.state().set_value("user.profile.color", &color)?;
                    step.state()
                        .set_value("conversation.completed", &json!(true))?;

                    let profile: Value = step.state().get_value("user.profile", Value::Null)?;
                    step.context_mut().send_activity(format!(
                        "Got it: {} likes {}.",
                        profile["name"].as_str().unwrap_or("someone"),
                        profile["color"].as_str().unwrap_or("nothing")
                    ));
                    step.end_dialog(Some(profile)).await
                })
            }),
        ],
    )?;
    Ok(dialog)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log))
        .init();

    let settings = Arc::new(Settings::load(
        cli.settings.as_deref(),
        Some(cli.env_prefix.as_str()),
    )?);

    let storage = Arc::new(InMemoryStorage::new());
    let mut manager = DialogManager::new(
        onboarding()?,
        Arc::new(BotState::conversation(storage.clone())),
    )?
    .with_user_state(Arc::new(BotState::user(storage.clone())))
    .with_settings(settings)
    .with_telemetry(Arc::new(TracingTelemetryClient));
    if let Some(seconds) = cli.expire_after {
        manager = manager.with_expire_after(Duration::from_secs(seconds));
    }

    println!("Say something to start (cancel / quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.eq_ignore_ascii_case("quit") {
            break;
        }

        let mut activity = Activity::message(text);
        if text.eq_ignore_ascii_case("cancel") {
            activity.activity_type = ActivityType::EndOfConversation;
        }

        let result = manager.on_turn(TurnContext::new(activity)).await?;
        for reply in result.turn.responses() {
            println!("bot> {}", reply.text.as_deref().unwrap_or_default());
        }
        for failure in &result.failures {
            eprintln!("warning: {failure}");
        }
        info!(status = ?result.turn_result.status, documents = storage.len(), "Turn complete");

        if result.turn_result.status == DialogTurnStatus::Cancelled {
            println!("bot> Okay, starting over next time.");
        }
    }

    Ok(())
}
