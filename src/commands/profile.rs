//! Profile commands

use colored::Colorize;

use super::App;
use crate::cli::ProfileCommand;
use crate::error::Result;
use crate::profile::ProfileService;

/// Handle `journal profile ...`
pub async fn handle_profile(app: &App, command: ProfileCommand) -> Result<()> {
    let profile = ProfileService::new(app.store.clone(), app.session.clone());
    match command {
        ProfileCommand::Show => {
            let user = profile.current().await?;
            println!("{}: {}", "Name".bold(), user.name_or_unknown());
            println!("{}: {}", "Email".bold(), user.email);
            println!("{}: {}", "ID".bold(), user.id.to_string().cyan());
            Ok(())
        }
        ProfileCommand::SetName { name } => match profile.update_display_name(&name).await {
            Ok(user) => {
                println!("{} {}", "Display name set to".green(), user.name_or_unknown());
                Ok(())
            }
            Err(e) => Err(app.report(e, "Failed to update profile")),
        },
    }
}
