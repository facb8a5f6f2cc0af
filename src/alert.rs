//! User-facing alerts
//!
//! Flows never panic or bubble raw errors to the user; they convert
//! failures into an [`Alert`] and hand it to an [`AlertSink`]. The CLI
//! prints alerts, library users can collect them.

use crate::error::JournalError;
use colored::Colorize;
use std::sync::Mutex;

/// Severity of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Informational (e.g. "User already in the group")
    Info,
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
}

/// A non-blocking, user-visible notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Severity
    pub level: AlertLevel,
    /// Short title ("Error", "Info", ...)
    pub title: String,
    /// Human readable message
    pub message: String,
}

impl Alert {
    /// Create an error alert
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Error,
            title: "Error".to_string(),
            message: message.into(),
        }
    }

    /// Create an informational alert
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            title: "Info".to_string(),
            message: message.into(),
        }
    }

    /// Create a success alert
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Success,
            title: "Success".to_string(),
            message: message.into(),
        }
    }

    /// Build an alert for a failed flow
    ///
    /// Validation, permission and not-found errors already carry a message
    /// meant for the user; everything else is reported with `fallback`.
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::alert::Alert;
    /// use voice_journal::error::JournalError;
    ///
    /// let err: anyhow::Error = JournalError::Validation("Enter a valid email".into()).into();
    /// assert_eq!(Alert::from_error(&err, "Failed").message, "Enter a valid email");
    ///
    /// let err = anyhow::anyhow!("connection reset");
    /// assert_eq!(Alert::from_error(&err, "Failed to save message").message, "Failed to save message");
    /// ```
    pub fn from_error(error: &anyhow::Error, fallback: &str) -> Self {
        match error.downcast_ref::<JournalError>() {
            Some(JournalError::Validation(msg)) => Self::error(msg.clone()),
            Some(JournalError::PermissionDenied(msg)) => Self::error(msg.clone()),
            Some(JournalError::NotFound(msg)) => Self::error(msg.clone()),
            Some(JournalError::Auth(msg)) => Self::error(msg.clone()),
            _ => Self::error(fallback),
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Destination for user-facing alerts
pub trait AlertSink: Send + Sync {
    /// Deliver an alert; must not block
    fn alert(&self, alert: Alert);
}

/// Logs alerts through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Error => tracing::error!(title = %alert.title, "{}", alert.message),
            _ => tracing::info!(title = %alert.title, "{}", alert.message),
        }
    }
}

/// Prints alerts to stderr for the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAlertSink;

impl AlertSink for ConsoleAlertSink {
    fn alert(&self, alert: Alert) {
        let line = alert.to_string();
        match alert.level {
            AlertLevel::Error => eprintln!("{}", line.red()),
            AlertLevel::Info => eprintln!("{}", line.yellow()),
            AlertLevel::Success => eprintln!("{}", line.green()),
        }
    }
}

/// Keeps every alert in memory
///
/// Useful for embedding the library in another front end, and in tests.
#[derive(Debug, Default)]
pub struct CollectingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingAlertSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the alerts received so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Messages of the alerts received so far
    pub fn messages(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.message).collect()
    }
}

impl AlertSink for CollectingAlertSink {
    fn alert(&self, alert: Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}
