//! Account commands

use colored::Colorize;

use super::{prompt_line, App};
use crate::alert::Alert;
use crate::cli::AuthCommand;
use crate::error::{JournalError, Result};
use crate::models::is_valid_email;

/// Handle `journal auth ...`
pub async fn handle_auth(app: &App, command: AuthCommand) -> Result<()> {
    match command {
        AuthCommand::Login { email, password } => login(app, &email, password).await,
        AuthCommand::TokenLogin { provider, token } => token_login(app, &provider, &token).await,
        AuthCommand::Signup {
            email,
            name,
            password,
        } => signup(app, &email, &name, password).await,
        AuthCommand::Logout => {
            app.session.sign_out().await?;
            println!("{}", "Signed out.".green());
            Ok(())
        }
        AuthCommand::Whoami => whoami(app),
        AuthCommand::Reset { email } => reset(app, &email).await,
    }
}

async fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => prompt_line("Password: ").await,
    }
}

async fn login(app: &App, email: &str, password: Option<String>) -> Result<()> {
    require_hosted(app)?;
    let password = password_or_prompt(password).await?;
    match app
        .session
        .sign_in_with_password(email.trim(), &password, app.store.as_ref())
        .await
    {
        Ok(user) => {
            println!(
                "{} {}",
                "Signed in as".green(),
                user.email.as_str().cyan()
            );
            Ok(())
        }
        Err(e) => Err(app.report(e, "Failed to sign in")),
    }
}

async fn token_login(app: &App, provider: &str, token: &str) -> Result<()> {
    require_hosted(app)?;
    match app
        .session
        .sign_in_with_id_token(provider, token, app.store.as_ref())
        .await
    {
        Ok(user) => {
            println!(
                "{} {}",
                "Signed in as".green(),
                user.email.as_str().cyan()
            );
            Ok(())
        }
        Err(e) => Err(app.report(e, "Failed to sign in")),
    }
}

async fn signup(app: &App, email: &str, name: &str, password: Option<String>) -> Result<()> {
    require_hosted(app)?;
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(app.report(
            JournalError::Validation("Enter a valid email".to_string()).into(),
            "Failed to sign up",
        ));
    }
    let password = password_or_prompt(password).await?;
    match app.session.sign_up(email, &password, name.trim()).await {
        Ok(_) => {
            app.alerts.alert(Alert::success(
                "Check your email to confirm your account, then sign in.",
            ));
            Ok(())
        }
        Err(e) => Err(app.report(e, "Failed to sign up")),
    }
}

fn whoami(app: &App) -> Result<()> {
    match app.session.current_user() {
        Some(user) => {
            println!("{} <{}>", user.name_or_unknown().bold(), user.email);
            println!("id: {}", user.id.to_string().cyan());
            if let Some(session) = app.session.session() {
                if let Some(expires_at) = session.expires_at {
                    println!("session expires: {}", expires_at.format("%Y-%m-%d %H:%M"));
                }
            }
        }
        None => println!("{}", "Not signed in.".yellow()),
    }
    Ok(())
}

async fn reset(app: &App, email: &str) -> Result<()> {
    let auth = require_hosted(app)?;
    match auth.reset_password_for_email(email.trim()).await {
        Ok(()) => {
            app.alerts
                .alert(Alert::success("Password reset email sent."));
            Ok(())
        }
        Err(e) => Err(app.report(e, "Failed to send reset email")),
    }
}

fn require_hosted(app: &App) -> Result<&crate::auth::AuthClient> {
    app.session.auth_client().ok_or_else(|| {
        JournalError::Config("Accounts are only available with the supabase backend".to_string())
            .into()
    })
}
