//! Journal commands: new, history, show, record, watch

use chrono::NaiveDate;
use colored::Colorize;
use prettytable::{format, Table};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::App;
use crate::config::BackendKind;
use crate::device::{AudioOutput, CommandAudioOutput, CommandMicrophone, SilentOutput};
use crate::error::Result;
use crate::journal::{
    group_by_day, Journal, LiveConversation, MergeOutcome, PipelineDeps, PipelineState,
    RecordingPipeline,
};
use crate::models::{Conversation, Message};
use crate::providers::create_providers;
use crate::storage::ConversationFilter;

/// Handle `journal new`
pub async fn handle_new(app: &App, name: Option<String>) -> Result<()> {
    let journal = Journal::new(app.store.clone(), None, &app.config.journal);
    let owner = app.session.user_id()?;
    match journal.conversations.create(name.as_deref(), Some(owner)).await {
        Ok(conversation) => {
            println!(
                "{} {} ({})",
                "Created".green(),
                conversation.name.bold(),
                conversation.id.to_string().cyan()
            );
            Ok(())
        }
        Err(e) => Err(app.report(e, "Failed to create conversation")),
    }
}

/// Handle `journal history`
pub async fn handle_history(
    app: &App,
    date: Option<NaiveDate>,
    search: Option<String>,
    json: bool,
) -> Result<()> {
    let journal = Journal::new(app.store.clone(), None, &app.config.journal);
    let mut filter = ConversationFilter::owned_by(app.session.user_id()?);
    if let Some(day) = date {
        filter = filter.on_day(day);
    }
    if let Some(search) = search {
        filter = filter.matching(search);
    }

    let conversations = journal.conversations.list(&filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!("{}", "No conversations found.".yellow());
        return Ok(());
    }

    for (day, items) in group_by_day(conversations) {
        println!("\n{}", day.format("%A, %B %-d, %Y").to_string().bold());
        print_conversations(&items);
    }
    println!();
    println!("Use {} to read one.", "journal show <ID>".cyan());
    Ok(())
}

fn print_conversations(conversations: &[Conversation]) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Preview".bold(),
        "Time".bold()
    ]);

    for conversation in conversations {
        let preview = conversation.preview.as_deref().unwrap_or("-");
        table.add_row(prettytable::row![
            conversation.id.to_string().cyan(),
            truncate(&conversation.name, 40),
            truncate(preview, 50),
            conversation.last_activity.format("%H:%M").to_string()
        ]);
    }
    table.printstd();
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Handle `journal show`
pub async fn handle_show(app: &App, id: Uuid, page: usize, all: bool) -> Result<()> {
    let journal = Journal::new(app.store.clone(), None, &app.config.journal);
    let conversation = match journal.conversations.get(id).await {
        Ok(conversation) => conversation,
        Err(e) => return Err(app.report(e, "Failed to load conversation")),
    };

    let messages = if all {
        journal.messages.list_all(id).await?
    } else {
        journal.messages.list(id, page).await?
    };

    println!("{}", conversation.name.bold());
    if messages.is_empty() {
        println!("{}", "No messages.".yellow());
        return Ok(());
    }
    for message in &messages {
        print_message(app, message);
    }
    if !all && messages.len() == journal.messages.page_size() {
        println!(
            "\nOlder messages: {}",
            format!("journal show {} --page {}", id, page + 1).cyan()
        );
    }
    Ok(())
}

fn print_message(app: &App, message: &Message) {
    let speaker = if message.sender_id == app.config.journal.assistant_sender_id {
        app.config.journal.assistant_label.as_str().magenta()
    } else {
        "You".blue()
    };
    println!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        speaker.bold(),
        message.content
    );
}

/// Handle `journal record`
///
/// Without `--file` the configured recorder runs until Enter is pressed.
pub async fn handle_record(
    app: &App,
    conversation: Option<Uuid>,
    file: Option<PathBuf>,
    silent: bool,
) -> Result<()> {
    let providers = create_providers(&app.config)?;
    let journal = Journal::new(
        app.store.clone(),
        Some(providers.chat.clone()),
        &app.config.journal,
    );

    let output: Arc<dyn AudioOutput> = if silent {
        Arc::new(SilentOutput::default())
    } else {
        Arc::new(CommandAudioOutput::new(&app.config.device))
    };

    let deps = PipelineDeps {
        conversations: journal.conversations.clone(),
        messages: journal.messages.clone(),
        transcriber: providers.transcriber,
        chat: providers.chat,
        speech: if silent { None } else { providers.speech },
        output,
        microphone: Box::new(CommandMicrophone::new(app.config.device.clone(), true)),
        alerts: app.alerts.clone(),
        session: app.session.clone(),
    };
    let mut pipeline = RecordingPipeline::new(deps, app.config.journal.clone());
    if let Some(id) = conversation {
        match journal.conversations.get(id).await {
            Ok(existing) => pipeline = pipeline.with_conversation(existing),
            Err(e) => return Err(app.report(e, "Failed to load conversation")),
        }
    }

    let mut states = pipeline.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            if let Some(label) = state_label(state) {
                eprintln!("{}", label.dimmed());
            }
        }
    });

    let exchange = match file {
        Some(path) => pipeline.submit_clip(&path).await,
        None => {
            if !pipeline.start_recording().await {
                progress.abort();
                return Ok(());
            }
            super::prompt_line("Press Enter to stop recording... ").await?;
            pipeline.stop_recording().await
        }
    };
    progress.abort();

    if let Some(exchange) = exchange {
        print_message(app, &exchange.user_message);
        if let Some(reply) = &exchange.reply {
            print_message(app, reply);
        }
        if let Some(conversation) = pipeline.conversation() {
            println!("conversation: {}", conversation.id.to_string().cyan());
        }
    }
    Ok(())
}

fn state_label(state: PipelineState) -> Option<&'static str> {
    match state {
        PipelineState::Idle => None,
        PipelineState::Recording => Some("Recording..."),
        PipelineState::Transcribing => Some("Transcribing..."),
        PipelineState::MessagePersisted => Some("Saved your entry."),
        PipelineState::AwaitingAiResponse => Some("Waiting for a reply..."),
        PipelineState::ResponsePersisted => Some("Saved the reply."),
    }
}

/// How often `watch` rereads a local database for other writers' messages
const LOCAL_WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Handle `journal watch`: print the conversation and follow new messages
///
/// The local notification channel only spans this process, so against the
/// local backend the newest page is also reread periodically.
pub async fn handle_watch(app: &App, id: Uuid) -> Result<()> {
    let journal = Journal::new(app.store.clone(), None, &app.config.journal);
    if let Err(e) = journal.conversations.get(id).await {
        return Err(app.report(e, "Failed to load conversation"));
    }

    let mut live = LiveConversation::open(
        id,
        journal.messages.clone(),
        app.feed.as_ref(),
        app.config.journal.dedupe_realtime,
    )
    .await?;
    for entry in live.messages() {
        print_message(app, &entry.value);
    }
    eprintln!("{}", "Watching for new messages, Ctrl-C to stop.".dimmed());

    let polling = app.config.backend.kind == BackendKind::Local;
    let mut refresh = tokio::time::interval(LOCAL_WATCH_INTERVAL);
    refresh.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = refresh.tick(), if polling => match live.refresh().await {
                Ok(added) => {
                    let shown = live.messages();
                    for entry in &shown[shown.len() - added.len()..] {
                        print_message(app, &entry.value);
                    }
                }
                Err(e) => tracing::warn!("Failed to refresh conversation {}: {}", id, e),
            },
            outcome = live.next_change() => match outcome {
                Some(MergeOutcome::Appended(_)) => {
                    if let Some(entry) = live.messages().last() {
                        print_message(app, &entry.value);
                    }
                }
                Some(_) => {}
                None => {
                    tracing::warn!("Realtime subscription ended");
                    break;
                }
            }
        }
    }
    live.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_state_labels() {
        assert!(state_label(PipelineState::Idle).is_none());
        assert_eq!(
            state_label(PipelineState::Transcribing),
            Some("Transcribing...")
        );
    }
}
