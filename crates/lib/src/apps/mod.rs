//! Applications shipped with the bot.

mod queue;

pub use queue::{position_to_string, QueueApp, BEING_SERVED, NOBODY_WAITING};
