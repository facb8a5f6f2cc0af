use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::models::Conversation;

/// Constraints for listing conversations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationFilter {
    /// Only conversations owned by this user
    pub owner: Option<Uuid>,
    /// Only conversations whose last activity falls on this UTC day
    pub day: Option<NaiveDate>,
    /// Case-insensitive substring of the title or preview
    pub search: Option<String>,
}

impl ConversationFilter {
    /// Filter by owner
    pub fn owned_by(owner: Uuid) -> Self {
        Self {
            owner: Some(owner),
            ..Default::default()
        }
    }

    /// Restrict to one calendar day
    pub fn on_day(mut self, day: NaiveDate) -> Self {
        self.day = Some(day);
        self
    }

    /// Restrict to a search term
    pub fn matching(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Half-open UTC range `[start, end)` covering `day`
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use voice_journal::storage::ConversationFilter;
    ///
    /// let day = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
    /// let (start, end) = ConversationFilter::default().on_day(day).day_bounds().unwrap();
    /// assert_eq!((end - start).num_hours(), 24);
    /// ```
    pub fn day_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let day = self.day?;
        let start = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?);
        let end = start + chrono::Duration::days(1);
        Some((start, end))
    }

    /// Whether a conversation satisfies every constraint
    ///
    /// Stores push owner and day down to the backend; this check is the
    /// client-side pass that also handles the search term.
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if let Some(owner) = self.owner {
            if conversation.owner_id != Some(owner) {
                return false;
            }
        }

        if let Some((start, end)) = self.day_bounds() {
            if conversation.last_activity < start || conversation.last_activity >= end {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                conversation.name.to_lowercase().contains(&term)
                    || conversation
                        .preview
                        .as_deref()
                        .map(|p| p.to_lowercase().contains(&term))
                        .unwrap_or(false)
            }
            _ => true,
        }
    }
}

/// A newest-first window over a message log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageWindow {
    /// Maximum number of messages
    pub limit: usize,
    /// Number of newest messages to skip
    pub offset: usize,
}

impl MessageWindow {
    /// Window for history page `page` (0 = newest)
    pub fn page(page: usize, page_size: usize) -> Self {
        Self {
            limit: page_size,
            offset: page.saturating_mul(page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(name: &str, preview: Option<&str>) -> Conversation {
        let mut conv = Conversation::new(name, None);
        conv.preview = preview.map(str::to_string);
        conv
    }

    #[test]
    fn test_search_matches_title_or_preview() {
        let filter = ConversationFilter::default().matching("WORK");
        assert!(filter.matches(&conversation("Work stress", None)));
        assert!(filter.matches(&conversation("Evening", Some("a long day at work"))));
        assert!(!filter.matches(&conversation("Evening", Some("gratitude"))));
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let filter = ConversationFilter::default().matching("   ");
        assert!(filter.matches(&conversation("Anything", None)));
    }

    #[test]
    fn test_owner_filter() {
        let owner = Uuid::new_v4();
        let mut conv = conversation("Mine", None);
        let filter = ConversationFilter::owned_by(owner);
        assert!(!filter.matches(&conv));
        conv.owner_id = Some(owner);
        assert!(filter.matches(&conv));
    }

    #[test]
    fn test_day_filter_is_half_open() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let filter = ConversationFilter::default().on_day(day);
        let (start, end) = filter.day_bounds().unwrap();

        let mut conv = conversation("x", None);
        conv.last_activity = start;
        assert!(filter.matches(&conv));
        conv.last_activity = end;
        assert!(!filter.matches(&conv));
    }

    #[test]
    fn test_message_window_pages_backwards() {
        assert_eq!(MessageWindow::page(0, 20), MessageWindow { limit: 20, offset: 0 });
        assert_eq!(MessageWindow::page(2, 20), MessageWindow { limit: 20, offset: 40 });
    }
}
