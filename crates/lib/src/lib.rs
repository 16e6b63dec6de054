//! Danmu core library: chat ingestion, command routing, throttled replies and the
//! bundled queue application, shared by the CLI and any page adapter.

pub mod apps;
pub mod bot;
pub mod config;
pub mod ingest;
pub mod message;
pub mod routing;
pub mod source;
pub mod throttle;

pub use bot::{launch, Bot, BotError};
