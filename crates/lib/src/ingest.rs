//! Ingestion: turn page snapshots into the messages that are new since the last tick.
//!
//! Two strategies are supported:
//! - mark-and-skip: every examined entry gets the page's processed marker; marked entries are skipped.
//! - cursor: remember the id of the last delivered entry and take everything after it.
//!
//! Both strategies also consult a bounded log of delivered ids so that no id is ever
//! delivered twice, including when the page reflows or drops the cursor entry.

use crate::message::{normalize_timestamp, Message};
use crate::source::{RawRecord, RecordKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

const DELIVERED_LOG_CAPACITY: usize = 4096;

/// How new entries are told apart from seen ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IngestionStrategy {
    /// Attach a processed marker to each entry on the page and skip marked entries.
    #[default]
    MarkAndSkip,
    /// Track the id of the last delivered entry; entries after it are new.
    Cursor,
}

/// Result of one ingestion pass.
#[derive(Debug, Default)]
pub struct Ingested {
    /// New messages in page order.
    pub messages: Vec<Message>,
    /// Entries the caller must mark as processed on the page (mark-and-skip only).
    pub to_mark: Vec<RecordKey>,
}

/// Fixed-capacity set of delivered ids; the oldest id is forgotten first.
#[derive(Debug)]
struct DeliveredLog {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl DeliveredLog {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

/// Build a message from a complete record; `None` if any required field is missing.
fn to_message(record: &RawRecord) -> Option<Message> {
    Some(Message {
        id: record.id.clone()?,
        sender: record.sender.clone()?,
        content: record.content.clone()?,
        timestamp: normalize_timestamp(record.timestamp?),
    })
}

fn log_malformed(record: &RawRecord, level: log::Level) {
    log::log!(
        level,
        "ingest: skipping unparsable chat entry {:?} (id={:?} sender={:?} content={:?} timestamp={:?})",
        record.key,
        record.id,
        record.sender,
        record.content,
        record.timestamp
    );
}

/// Per-bot ingestion state.
#[derive(Debug)]
pub struct Ingestor {
    strategy: IngestionStrategy,
    /// Cursor strategy only. `None` until primed; `Some("")` when primed on an empty page.
    cursor: Option<String>,
    delivered: DeliveredLog,
    verbose: bool,
}

impl Ingestor {
    pub fn new(strategy: IngestionStrategy) -> Self {
        Self {
            strategy,
            cursor: None,
            delivered: DeliveredLog::new(DELIVERED_LOG_CAPACITY),
            verbose: false,
        }
    }

    /// Report skipped entries at info level instead of debug.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn malformed_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    pub fn strategy(&self) -> IngestionStrategy {
        self.strategy
    }

    /// Last delivered id under the cursor strategy.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Initialization pass: everything currently on the page counts as history and is never emitted.
    /// Returns the entries to mark as processed.
    pub fn prime(&mut self, snapshot: &[RawRecord]) -> Vec<RecordKey> {
        let mut to_mark = Vec::new();
        let mut last_id = None;
        for record in snapshot {
            if let Some(id) = &record.id {
                self.delivered.insert(id);
            }
            if to_message(record).is_some() {
                last_id = record.id.clone();
            }
            if self.strategy == IngestionStrategy::MarkAndSkip && !record.processed {
                to_mark.push(record.key);
            }
        }
        if self.strategy == IngestionStrategy::Cursor {
            self.cursor = Some(last_id.unwrap_or_default());
        }
        log::debug!(
            "ingest: primed {:?} over {} existing entries",
            self.strategy,
            snapshot.len()
        );
        to_mark
    }

    /// Extract the messages that are new in `snapshot`.
    pub fn ingest(&mut self, snapshot: &[RawRecord]) -> Ingested {
        match self.strategy {
            IngestionStrategy::MarkAndSkip => self.ingest_marked(snapshot),
            IngestionStrategy::Cursor => {
                if self.cursor.is_none() {
                    self.prime(snapshot);
                    return Ingested::default();
                }
                self.ingest_after_cursor(snapshot)
            }
        }
    }

    fn ingest_marked(&mut self, snapshot: &[RawRecord]) -> Ingested {
        let mut out = Ingested::default();
        for record in snapshot.iter().filter(|r| !r.processed) {
            out.to_mark.push(record.key);
            match to_message(record) {
                Some(message) => {
                    if self.delivered.insert(&message.id) {
                        out.messages.push(message);
                    }
                }
                None => log_malformed(record, self.malformed_level()),
            }
        }
        out
    }

    fn ingest_after_cursor(&mut self, snapshot: &[RawRecord]) -> Ingested {
        let cursor = self.cursor.clone().unwrap_or_default();
        let mut buffer: Vec<Message> = Vec::new();
        for record in snapshot {
            let Some(message) = to_message(record) else {
                log_malformed(record, self.malformed_level());
                continue;
            };
            if message.id == cursor {
                // Everything before the cursor entry was delivered on an earlier tick.
                buffer.clear();
                continue;
            }
            buffer.push(message);
        }
        if let Some(last) = buffer.last() {
            self.cursor = Some(last.id.clone());
        }
        let messages = buffer
            .into_iter()
            .filter(|m| self.delivered.insert(&m.id))
            .collect();
        Ingested {
            messages,
            to_mark: Vec::new(),
        }
    }
}
