//! Group chat commands

use colored::Colorize;
use prettytable::{format, Table};
use uuid::Uuid;

use super::App;
use crate::alert::Alert;
use crate::cli::GroupCommand;
use crate::error::Result;
use crate::groups::{GroupService, InviteOutcome, NamedMessage};
use crate::models::ChatMessage;

/// Handle `journal group ...`
pub async fn handle_group(app: &App, command: GroupCommand) -> Result<()> {
    let groups = GroupService::new(app.store.clone(), app.session.clone());

    match command {
        GroupCommand::Create { name } => match groups.create_group(&name).await {
            Ok(chat) => {
                println!(
                    "{} {} ({})",
                    "Created group".green(),
                    chat.name.bold(),
                    chat.id.to_string().cyan()
                );
                Ok(())
            }
            Err(e) => Err(app.report(e, "Failed to create group")),
        },
        GroupCommand::Invite { chat, email } => match groups.invite(chat, &email).await {
            Ok(InviteOutcome::Added(_)) => {
                app.alerts
                    .alert(Alert::success(format!("{} was added to the group", email.trim())));
                Ok(())
            }
            Ok(InviteOutcome::AlreadyMember) => {
                app.alerts.alert(Alert::info("User already in the group"));
                Ok(())
            }
            Err(e) => Err(app.report(e, "Failed to invite user")),
        },
        GroupCommand::Members { chat } => {
            let members = groups.members(chat).await?;
            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row!["Name".bold(), "Email".bold(), "Joined".bold()]);
            for entry in members {
                table.add_row(prettytable::row![
                    entry.name,
                    entry.email.unwrap_or_else(|| "-".to_string()),
                    entry.member.joined_at.format("%Y-%m-%d %H:%M").to_string()
                ]);
            }
            table.printstd();
            Ok(())
        }
        GroupCommand::List => {
            let summaries = groups.list_groups().await?;
            if summaries.is_empty() {
                println!("{}", "You are not in any groups.".yellow());
                return Ok(());
            }
            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row!["ID".bold(), "Name".bold(), "Latest".bold()]);
            for summary in summaries {
                table.add_row(prettytable::row![
                    summary.chat.id.to_string().cyan(),
                    summary.chat.name,
                    summary.preview
                ]);
            }
            table.printstd();
            Ok(())
        }
        GroupCommand::Send { chat, text } => match groups.send(chat, &text).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                tracing::debug!("Ignored empty group message");
                Ok(())
            }
            Err(e) => Err(app.report(e, "Failed to send message")),
        },
        GroupCommand::Messages { chat, follow } => {
            for message in groups.messages(chat).await? {
                print_line(&message);
            }
            if follow {
                follow_group(app, &groups, chat).await?;
            }
            Ok(())
        }
    }
}

async fn follow_group(app: &App, groups: &GroupService, chat: Uuid) -> Result<()> {
    let mut subscription = groups.subscribe(chat, app.feed.as_ref()).await?;
    eprintln!("{}", "Following new messages, Ctrl-C to stop.".dimmed());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = subscription.next() => {
                let Some(change) = change else { break };
                match serde_json::from_value::<ChatMessage>(change.record) {
                    Ok(message) => print_line(&groups.name_message(message).await?),
                    Err(e) => tracing::warn!("Ignoring unreadable group message: {}", e),
                }
            }
        }
    }
    subscription.unsubscribe().await;
    Ok(())
}

fn print_line(message: &NamedMessage) {
    println!(
        "[{}] {}: {}",
        message.message.created_at.format("%m-%d %H:%M"),
        message.sender.bold(),
        message.message.text
    );
}
