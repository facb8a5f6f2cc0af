//! Command-line interface definition for the journal
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for recording, browsing history, group chats and
//! account management.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::BackendKind;

/// Voice journal
///
/// Record a spoken entry, get it transcribed and answered, and browse the
/// conversations you have had.
#[derive(Parser, Debug, Clone)]
#[command(name = "journal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "JOURNAL_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Data backend (local, supabase)
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// SQLite database path for the local backend
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in, sign up and manage the session
    Auth {
        /// Auth subcommand
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Start a new conversation
    New {
        /// Conversation name (defaults to the configured name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List conversations grouped by day
    History {
        /// Only conversations active on this day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Case-insensitive search in titles and previews
        #[arg(short, long)]
        search: Option<String>,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show messages of a conversation
    Show {
        /// Conversation id
        id: Uuid,

        /// History page, 0 is the newest
        #[arg(short, long, default_value_t = 0)]
        page: usize,

        /// Show every message instead of one page
        #[arg(short, long)]
        all: bool,
    },

    /// Record an entry and get a spoken reply
    Record {
        /// Continue this conversation instead of starting a new one
        #[arg(long)]
        conversation: Option<Uuid>,

        /// Use a prerecorded audio file instead of the microphone
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Do not play or speak the reply
        #[arg(long)]
        silent: bool,
    },

    /// Follow a conversation live
    Watch {
        /// Conversation id
        id: Uuid,
    },

    /// Group chats
    Group {
        /// Group subcommand
        #[command(subcommand)]
        command: GroupCommand,
    },

    /// Show or edit your profile
    Profile {
        /// Profile subcommand
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

/// Auth subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Password (prompted when omitted)
        #[arg(short, long, env = "JOURNAL_PASSWORD")]
        password: Option<String>,
    },

    /// Sign in with an identity token from a federated provider
    TokenLogin {
        /// Identity provider (e.g. `apple`, `google`)
        #[arg(long, default_value = "apple")]
        provider: String,

        /// Identity token issued by the provider
        #[arg(long, env = "JOURNAL_ID_TOKEN")]
        token: String,
    },

    /// Create an account
    Signup {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Full name shown to other users
        #[arg(short, long)]
        name: String,

        /// Password (prompted when omitted)
        #[arg(short, long, env = "JOURNAL_PASSWORD")]
        password: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Send a password reset email
    Reset {
        /// Account email
        #[arg(short, long)]
        email: String,
    },
}

/// Group chat subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum GroupCommand {
    /// Create a group
    Create {
        /// Group name
        name: String,
    },

    /// Invite a registered user by email
    Invite {
        /// Group id
        chat: Uuid,

        /// Email of the user to invite
        email: String,
    },

    /// List the members of a group
    Members {
        /// Group id
        chat: Uuid,
    },

    /// List your groups
    List,

    /// Post a message
    Send {
        /// Group id
        chat: Uuid,

        /// Message text
        text: String,
    },

    /// Show the messages of a group
    Messages {
        /// Group id
        chat: Uuid,

        /// Keep following new messages
        #[arg(short, long)]
        follow: bool,
    },
}

/// Profile subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ProfileCommand {
    /// Show your profile
    Show,

    /// Change your display name
    SetName {
        /// New display name
        name: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_history_with_filters() {
        let cli = Cli::try_parse_from([
            "journal",
            "history",
            "--date",
            "2025-03-14",
            "--search",
            "work",
        ])
        .unwrap();
        match cli.command {
            Commands::History { date, search, json } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 14));
                assert_eq!(search.as_deref(), Some("work"));
                assert!(!json);
            }
            _ => panic!("Expected History command"),
        }
    }

    #[test]
    fn test_cli_parse_backend_override() {
        let cli = Cli::try_parse_from(["journal", "--backend", "local", "-v", "new"]).unwrap();
        assert_eq!(cli.backend, Some(BackendKind::Local));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::New { name: None }));
    }

    #[test]
    fn test_cli_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["journal", "--backend", "cloud", "new"]).is_err());
    }

    #[test]
    fn test_cli_parse_record_from_file() {
        let cli =
            Cli::try_parse_from(["journal", "record", "--file", "entry.m4a", "--silent"]).unwrap();
        match cli.command {
            Commands::Record {
                conversation,
                file,
                silent,
            } => {
                assert!(conversation.is_none());
                assert_eq!(file, Some(PathBuf::from("entry.m4a")));
                assert!(silent);
            }
            _ => panic!("Expected Record command"),
        }
    }

    #[test]
    fn test_cli_parse_token_login_defaults_provider() {
        let cli =
            Cli::try_parse_from(["journal", "auth", "token-login", "--token", "eyJ"]).unwrap();
        match cli.command {
            Commands::Auth {
                command: AuthCommand::TokenLogin { provider, token },
            } => {
                assert_eq!(provider, "apple");
                assert_eq!(token, "eyJ");
            }
            _ => panic!("Expected token-login command"),
        }
    }

    #[test]
    fn test_cli_parse_show_requires_uuid() {
        assert!(Cli::try_parse_from(["journal", "show", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["journal", "show", &id, "--page", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::Show { page: 2, all: false, .. }));
    }

    #[test]
    fn test_cli_parse_group_invite() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "journal",
            "group",
            "invite",
            &id.to_string(),
            "friend@example.com",
        ])
        .unwrap();
        match cli.command {
            Commands::Group {
                command: GroupCommand::Invite { chat, email },
            } => {
                assert_eq!(chat, id);
                assert_eq!(email, "friend@example.com");
            }
            _ => panic!("Expected group invite"),
        }
    }

    #[test]
    fn test_cli_parse_profile_set_name() {
        let cli = Cli::try_parse_from(["journal", "profile", "set-name", "Ada"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Profile {
                command: ProfileCommand::SetName { .. }
            }
        ));
    }

    #[test]
    fn test_cli_parse_auth_login() {
        let cli = Cli::try_parse_from([
            "journal", "auth", "login", "-e", "me@example.com", "-p", "secret",
        ])
        .unwrap();
        match cli.command {
            Commands::Auth {
                command: AuthCommand::Login { email, password },
            } => {
                assert_eq!(email, "me@example.com");
                assert_eq!(password.as_deref(), Some("secret"));
            }
            _ => panic!("Expected auth login"),
        }
    }
}
