//! Identifier generation
//!
//! Every client-generated identifier (conversations, messages, group chats,
//! memberships) comes from here so ids are uniformly random v4 UUIDs. The
//! same goes for client-side timestamps, which are cut to the microsecond
//! precision both backends store.

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// Generate a new random identifier
///
/// # Examples
///
/// ```
/// use voice_journal::ids::new_id;
///
/// let a = new_id();
/// let b = new_id();
/// assert_ne!(a, b);
/// assert_eq!(a.get_version_num(), 4);
/// ```
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Current time at the precision rows are stored with
///
/// A value built from this reads back unchanged from either backend.
///
/// # Examples
///
/// ```
/// use chrono::Timelike;
/// use voice_journal::ids::now;
///
/// assert_eq!(now().nanosecond() % 1_000, 0);
/// ```
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Parse an identifier supplied by a user or a remote row
///
/// # Errors
///
/// Returns `JournalError::Validation` when the text is not a UUID.
pub fn parse_id(text: &str) -> crate::error::Result<Uuid> {
    Uuid::parse_str(text.trim()).map_err(|_| {
        crate::error::JournalError::Validation(format!("Invalid identifier: {}", text)).into()
    })
}
