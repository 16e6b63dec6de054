//! Outgoing reply throttle.
//!
//! Replies are truncated to the input box limit, rate limited (excess replies are dropped,
//! never queued), staged into the input box and submitted after a settle delay.

use crate::routing::ResponseSink;
use crate::source::SourceAdapter;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Throttle settings (see `BotConfig` for the configured defaults).
#[derive(Debug, Clone)]
pub struct ThrottleOptions {
    /// Minimum time between two accepted replies.
    pub min_reply_interval: Duration,
    /// Delay between staging the text and pressing submit.
    pub reply_delay: Duration,
    /// Maximum reply length in characters.
    pub max_reply_length: usize,
    pub verbose: bool,
}

/// Handle to a staged reply whose submission is scheduled.
#[derive(Debug)]
pub struct PendingReply {
    handle: JoinHandle<()>,
}

impl PendingReply {
    /// Cancel the submission if it has not fired yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait until the reply has been submitted (or the attempt failed or was cancelled).
    pub async fn wait(self) {
        let _ = self.handle.await;
    }
}

pub struct Throttle {
    adapter: Arc<dyn SourceAdapter>,
    options: ThrottleOptions,
    last_sent: Arc<Mutex<Option<Instant>>>,
}

/// Give back the rate-limit window taken by a reply that never reached the page.
/// Only restores when no newer reply has been accepted since.
fn release_window(last_sent: &Mutex<Option<Instant>>, taken: Instant, prev: Option<Instant>) {
    let mut last = last_sent.lock().unwrap_or_else(PoisonError::into_inner);
    if *last == Some(taken) {
        *last = prev;
    }
}

/// First `max` characters of `text`.
pub fn truncate_reply(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

impl Throttle {
    pub fn new(adapter: Arc<dyn SourceAdapter>, options: ThrottleOptions) -> Self {
        Self {
            adapter,
            options,
            last_sent: Arc::new(Mutex::new(None)),
        }
    }

    /// Accept a reply for sending. Returns `None` when it was dropped by the rate limit
    /// (or no runtime is available to schedule it). A reply the page refuses does not
    /// count against the rate limit.
    pub fn submit(&self, text: &str) -> Option<PendingReply> {
        let text = truncate_reply(text, self.options.max_reply_length);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                log::error!("throttle: no async runtime, reply dropped: {}", text);
                return None;
            }
        };

        let (taken, prev) = {
            let mut last = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.options.min_reply_interval {
                    if self.options.verbose {
                        log::info!("throttle: reply unsent due to rate limit: {}", text);
                    }
                    return None;
                }
            }
            (now, last.replace(now))
        };

        let last_sent = Arc::clone(&self.last_sent);
        let adapter = Arc::clone(&self.adapter);
        let delay = self.options.reply_delay;
        let verbose = self.options.verbose;
        let handle = runtime.spawn(async move {
            if let Err(e) = adapter.stage_reply_text(&text).await {
                log::error!("throttle: unable to stage reply: {}", e);
                release_window(&last_sent, taken, prev);
                return;
            }
            tokio::time::sleep(delay).await;
            if verbose {
                log::info!("throttle: sending reply: {}", text);
            }
            if let Err(e) = adapter.submit_staged_reply().await {
                log::error!("throttle: unable to submit reply: {}", e);
                release_window(&last_sent, taken, prev);
            }
        });
        Some(PendingReply { handle })
    }
}

impl ResponseSink for Throttle {
    fn send(&self, text: &str) {
        let _ = self.submit(text);
    }
}
