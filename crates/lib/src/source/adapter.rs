//! Source adapter trait and the typed records it returns.

use async_trait::async_trait;

/// Opaque handle to one rendered chat entry. Stable for the entry's lifetime on the page,
/// and present even when the entry's own fields are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(pub u64);

/// One visible chat entry as read from the page. Fields the page did not expose are `None`;
/// `timestamp` is `None` when the exposed value was not an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: RecordKey,
    pub id: Option<String>,
    pub sender: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<i64>,
    /// Whether the entry already carries the processed marker.
    pub processed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// A required page surface (chat list, identity, input box, submit control) could not be found.
    #[error("page surface unavailable: {0}")]
    Unavailable(String),
}

/// Access to the chat page: snapshot reads, processed markers, identities and reply submission.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Current visible entries in page order (oldest first).
    async fn list_visible_messages(&self) -> Result<Vec<RawRecord>, AdapterError>;

    /// Attach the processed marker to the given entries. Keys no longer on the page are ignored.
    async fn mark_processed(&self, keys: &[RecordKey]) -> Result<(), AdapterError>;

    /// Name of the account the bot is running as.
    async fn operator_identity(&self) -> Option<String>;

    /// Name of the room owner.
    async fn owner_identity(&self) -> Option<String>;

    /// Put reply text into the input box without sending it.
    async fn stage_reply_text(&self, text: &str) -> Result<(), AdapterError>;

    /// Trigger the submit control for the staged text.
    async fn submit_staged_reply(&self) -> Result<(), AdapterError>;
}
