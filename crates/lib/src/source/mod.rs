//! Chat page sources.
//!
//! The `SourceAdapter` trait is the only way the bot reads the chat page and writes
//! replies into it. `MemoryPage` is an in-process page used by the console runner and tests.

mod adapter;
mod memory;

pub use adapter::{AdapterError, RawRecord, RecordKey, SourceAdapter};
pub use memory::{MemoryPage, RawEntry};
