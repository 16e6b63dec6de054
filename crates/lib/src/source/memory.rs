//! In-process chat page: holds entries, processed markers, an input box and submitted replies.
//!
//! Submitting a reply echoes it back into the page as a message from the operator with a
//! millisecond timestamp, the way the live page renders the bot's own replies.

use crate::source::adapter::{AdapterError, RawRecord, RecordKey, SourceAdapter};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Entry fields as the page exposes them (all optional, timestamp as text).
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub id: Option<String>,
    pub sender: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone)]
struct Entry {
    key: RecordKey,
    fields: RawEntry,
    processed: bool,
}

#[derive(Debug)]
struct PageState {
    entries: Vec<Entry>,
    next_key: u64,
    visible_limit: Option<usize>,
    operator: Option<String>,
    owner: Option<String>,
    input_attached: bool,
    staged: Option<String>,
    submitted: Vec<String>,
}

impl PageState {
    fn append(&mut self, fields: RawEntry) -> RecordKey {
        let key = RecordKey(self.next_key);
        self.next_key += 1;
        self.entries.push(Entry {
            key,
            fields,
            processed: false,
        });
        if let Some(limit) = self.visible_limit {
            if self.entries.len() > limit {
                let overflow = self.entries.len() - limit;
                self.entries.drain(..overflow);
            }
        }
        key
    }
}

/// Simulated chat page implementing [`SourceAdapter`].
pub struct MemoryPage {
    state: Mutex<PageState>,
    reply_tx: Option<mpsc::UnboundedSender<String>>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl MemoryPage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PageState {
                entries: Vec::new(),
                next_key: 0,
                visible_limit: None,
                operator: None,
                owner: None,
                input_attached: true,
                staged: None,
                submitted: Vec::new(),
            }),
            reply_tx: None,
        }
    }

    /// Set both identities up front.
    pub fn with_identities(mut self, operator: impl Into<String>, owner: impl Into<String>) -> Self {
        let s = self.state.get_mut();
        s.operator = Some(operator.into());
        s.owner = Some(owner.into());
        self
    }

    /// Keep at most `limit` entries visible; older ones are dropped as new ones arrive.
    pub fn with_visible_limit(mut self, limit: usize) -> Self {
        self.state.get_mut().visible_limit = Some(limit.max(1));
        self
    }

    /// Forward every submitted reply to `tx` as well as recording it.
    pub fn with_reply_listener(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.reply_tx = Some(tx);
        self
    }

    pub async fn set_operator(&self, operator: Option<String>) {
        self.state.lock().await.operator = operator;
    }

    pub async fn set_owner(&self, owner: Option<String>) {
        self.state.lock().await.owner = owner;
    }

    /// Detach or reattach the input box. While detached, staging a reply fails.
    pub async fn set_input_attached(&self, attached: bool) {
        self.state.lock().await.input_attached = attached;
    }

    /// Append a well-formed message with a seconds-scale timestamp. Returns the message id.
    pub async fn push_at(
        &self,
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> String {
        let id = new_message_id();
        self.push_raw(RawEntry {
            id: Some(id.clone()),
            sender: Some(sender.into()),
            content: Some(content.into()),
            timestamp: Some(timestamp.to_string()),
        })
        .await;
        id
    }

    /// Append a message stamped with the current time in seconds. Returns the message id.
    pub async fn push(&self, sender: impl Into<String>, content: impl Into<String>) -> String {
        self.push_at(sender, content, chrono::Utc::now().timestamp()).await
    }

    /// Append an entry exactly as given (fields may be missing).
    pub async fn push_raw(&self, entry: RawEntry) -> RecordKey {
        self.state.lock().await.append(entry)
    }

    /// Remove the entry with the given message id, as when the host deletes a message.
    pub async fn remove(&self, id: &str) -> bool {
        let mut s = self.state.lock().await;
        let before = s.entries.len();
        s.entries.retain(|e| e.fields.id.as_deref() != Some(id));
        s.entries.len() != before
    }

    /// Replies submitted so far, oldest first.
    pub async fn submitted(&self) -> Vec<String> {
        self.state.lock().await.submitted.clone()
    }

    /// Text currently sitting in the input box.
    pub async fn staged(&self) -> Option<String> {
        self.state.lock().await.staged.clone()
    }

    pub async fn visible_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[async_trait]
impl SourceAdapter for MemoryPage {
    async fn list_visible_messages(&self) -> Result<Vec<RawRecord>, AdapterError> {
        let s = self.state.lock().await;
        Ok(s.entries
            .iter()
            .map(|e| RawRecord {
                key: e.key,
                id: e.fields.id.clone(),
                sender: e.fields.sender.clone(),
                content: e.fields.content.clone(),
                timestamp: e
                    .fields
                    .timestamp
                    .as_deref()
                    .and_then(|t| t.trim().parse::<i64>().ok()),
                processed: e.processed,
            })
            .collect())
    }

    async fn mark_processed(&self, keys: &[RecordKey]) -> Result<(), AdapterError> {
        let mut s = self.state.lock().await;
        for e in s.entries.iter_mut() {
            if keys.contains(&e.key) {
                e.processed = true;
            }
        }
        Ok(())
    }

    async fn operator_identity(&self) -> Option<String> {
        self.state.lock().await.operator.clone()
    }

    async fn owner_identity(&self) -> Option<String> {
        self.state.lock().await.owner.clone()
    }

    async fn stage_reply_text(&self, text: &str) -> Result<(), AdapterError> {
        let mut s = self.state.lock().await;
        if !s.input_attached {
            return Err(AdapterError::Unavailable("chat input box".to_string()));
        }
        s.staged = Some(text.to_string());
        Ok(())
    }

    async fn submit_staged_reply(&self) -> Result<(), AdapterError> {
        let mut s = self.state.lock().await;
        if !s.input_attached {
            return Err(AdapterError::Unavailable("chat submit button".to_string()));
        }
        let Some(text) = s.staged.take() else {
            return Err(AdapterError::Unavailable("chat input box is empty".to_string()));
        };
        let echo = RawEntry {
            id: Some(new_message_id()),
            sender: s.operator.clone(),
            content: Some(text.clone()),
            timestamp: Some(chrono::Utc::now().timestamp_millis().to_string()),
        };
        s.append(echo);
        s.submitted.push(text.clone());
        drop(s);
        if let Some(tx) = &self.reply_tx {
            let _ = tx.send(text);
        }
        Ok(())
    }
}
