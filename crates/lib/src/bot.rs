//! Bot lifecycle: start/stop, the periodic tick and application registration.
//!
//! One tokio task drives the ticks, so ticks never overlap. Replies scheduled by the
//! throttle run as their own tasks and may fire during a later tick or after `stop`.

use crate::apps::QueueApp;
use crate::config::BotConfig;
use crate::ingest::Ingestor;
use crate::message::{Identities, Message, RequestContext};
use crate::routing::{Application, Dispatcher};
use crate::source::{AdapterError, SourceAdapter};
use crate::throttle::Throttle;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("bot is not running")]
    NotRunning,
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BotInner {
    adapter: Arc<dyn SourceAdapter>,
    config: BotConfig,
    ingestor: Mutex<Ingestor>,
    dispatcher: Mutex<Dispatcher>,
    throttle: Throttle,
    identities: RwLock<Option<Identities>>,
    /// Held for a whole tick so a manual `Bot::tick` never interleaves with the scheduled one.
    tick_gate: tokio::sync::Mutex<()>,
}

impl BotInner {
    fn identities(&self) -> Option<Identities> {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn resolve_identities(&self) -> Result<Identities, AdapterError> {
        let operator = self.adapter.operator_identity().await;
        let owner = self.adapter.owner_identity().await;
        match (operator, owner) {
            (Some(operator), Some(owner)) => Ok(Identities { operator, owner }),
            _ => Err(AdapterError::Unavailable(
                "unable to find operator/owner identity".to_string(),
            )),
        }
    }

    /// Mark everything already on the page as seen without dispatching it.
    async fn prime(&self) -> Result<(), AdapterError> {
        let snapshot = self.adapter.list_visible_messages().await?;
        let to_mark = lock(&self.ingestor).prime(&snapshot);
        if !to_mark.is_empty() {
            self.adapter.mark_processed(&to_mark).await?;
        }
        Ok(())
    }

    async fn tick(&self) {
        let _gate = self.tick_gate.lock().await;
        let Some(identities) = self.identities() else {
            log::debug!("bot: tick skipped, identities not resolved");
            return;
        };
        let snapshot = match self.adapter.list_visible_messages().await {
            Ok(s) => s,
            Err(e) => {
                log::error!("bot: unable to read chat history: {}", e);
                return;
            }
        };
        let ingested = lock(&self.ingestor).ingest(&snapshot);
        if !ingested.to_mark.is_empty() {
            // Unmarked entries are re-examined next tick; the delivered-id log keeps them from replaying.
            if let Err(e) = self.adapter.mark_processed(&ingested.to_mark).await {
                log::error!("bot: unable to mark chat entries processed: {}", e);
            }
        }
        if ingested.messages.is_empty() {
            return;
        }
        if self.config.verbose {
            log::info!("bot: new messages: {:?}", ingested.messages);
        }
        let mut dispatcher = lock(&self.dispatcher);
        for message in ingested.messages {
            let req = RequestContext::new(&identities, message);
            dispatcher.dispatch(&req, &self.throttle);
        }
    }
}

/// A chat bot bound to one page.
pub struct Bot {
    inner: Arc<BotInner>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Bot {
    /// Compose a stopped bot with no applications. `config.autorun` is honored by [`launch`].
    pub fn new(adapter: Arc<dyn SourceAdapter>, config: BotConfig) -> Self {
        let throttle = Throttle::new(Arc::clone(&adapter), config.throttle_options());
        let ingestor = Ingestor::new(config.ingestion).with_verbose(config.verbose);
        Self {
            inner: Arc::new(BotInner {
                adapter,
                config,
                ingestor: Mutex::new(ingestor),
                dispatcher: Mutex::new(Dispatcher::new()),
                throttle,
                identities: RwLock::new(None),
                tick_gate: tokio::sync::Mutex::new(()),
            }),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    /// Register an application after those already registered. Returns false if its name is taken.
    pub fn register(&self, app: impl Application + 'static) -> bool {
        lock(&self.inner.dispatcher).register(Box::new(app))
    }

    /// Registered application names in priority order.
    pub fn applications(&self) -> Vec<String> {
        lock(&self.inner.dispatcher).names()
    }

    /// Identities resolved by the last successful `start`.
    pub fn identities(&self) -> Option<Identities> {
        self.inner.identities()
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Resolve identities, treat the current page as history, and start ticking.
    pub async fn start(&self) -> Result<(), BotError> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            log::error!("bot: already running");
            return Err(BotError::AlreadyRunning);
        }

        let identities = match self.inner.resolve_identities().await {
            Ok(ids) => ids,
            Err(e) => {
                log::error!("bot: {}", e);
                return Err(e.into());
            }
        };
        if identities.operator == identities.owner {
            log::warn!("bot: running on the room owner's account; use a separate account for the bot");
        }
        if let Err(e) = self.inner.prime().await {
            log::error!("bot: unable to read chat history: {}", e);
            return Err(e.into());
        }
        *self
            .inner
            .identities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(identities);

        let inner = Arc::clone(&self.inner);
        let period = inner.config.tick_interval();
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                inner.tick().await;
            }
        }));
        log::info!(
            "bot: now running (version {}, tick {:?})",
            env!("CARGO_PKG_VERSION"),
            period
        );
        Ok(())
    }

    /// Stop ticking. Replies already scheduled may still be submitted.
    pub async fn stop(&self) -> Result<(), BotError> {
        let mut task = self.task.lock().await;
        match task.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                log::info!("bot: stopped");
                Ok(())
            }
            _ => {
                log::error!("bot: not running");
                Err(BotError::NotRunning)
            }
        }
    }

    /// Run one ingestion and dispatch pass now.
    pub async fn tick(&self) {
        self.inner.tick().await;
    }

    /// Dispatch a synthetic message as if it had appeared on the page; the page itself is not read.
    /// `sender` defaults to the operator. Returns the name of the application that handled it.
    pub async fn inject(&self, content: &str, sender: Option<&str>) -> Result<Option<String>, BotError> {
        let identities = match self.inner.identities() {
            Some(ids) => ids,
            None => self.inner.resolve_identities().await?,
        };
        let message = Message {
            id: format!("inject-{}", uuid::Uuid::new_v4().simple()),
            sender: sender.unwrap_or(identities.operator.as_str()).to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let req = RequestContext::new(&identities, message);
        let handled = lock(&self.inner.dispatcher).dispatch(&req, &self.inner.throttle);
        Ok(handled)
    }
}

/// Build a bot with the queue application registered, starting it when `config.autorun` is set.
/// A failed autorun start is logged and the stopped bot is returned so the caller can retry.
pub async fn launch(adapter: Arc<dyn SourceAdapter>, config: BotConfig) -> Bot {
    let autorun = config.autorun;
    let bot = Bot::new(adapter, config);
    bot.register(QueueApp::new());
    if autorun {
        if let Err(e) = bot.start().await {
            log::error!("bot: autorun failed: {}", e);
        }
    }
    bot
}
