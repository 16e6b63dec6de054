//! End-to-end scenarios: a bot driving a `MemoryPage` through ticks, the queue app and the throttle.

use danmu::apps::{QueueApp, NOBODY_WAITING};
use danmu::config::BotConfig;
use danmu::ingest::IngestionStrategy;
use danmu::message::{Message, RequestContext};
use danmu::routing::{Application, Pattern, ResponseSink};
use danmu::source::{MemoryPage, RawEntry};
use danmu::Bot;
use regex::Regex;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn manual_config() -> BotConfig {
    BotConfig {
        // Long period: the tests drive ticks by hand.
        tick_interval_ms: 60_000,
        min_reply_interval_ms: 0,
        reply_delay_ms: 5,
        autorun: false,
        ..BotConfig::default()
    }
}

fn page() -> Arc<MemoryPage> {
    Arc::new(MemoryPage::new().with_identities("bot", "host"))
}

async fn replies_after_settle(page: &MemoryPage) -> Vec<String> {
    tokio::time::sleep(Duration::from_millis(60)).await;
    page.submitted().await
}

/// Records every message it sees and never claims it.
struct Recorder {
    pattern: Pattern,
    seen: Arc<Mutex<Vec<Message>>>,
}

impl Recorder {
    fn new(seen: &Arc<Mutex<Vec<Message>>>) -> Self {
        Self {
            pattern: Pattern::Matcher(Regex::new(".*").unwrap()),
            seen: Arc::clone(seen),
        }
    }
}

impl Application for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn handle(&mut self, req: &RequestContext, _res: &dyn ResponseSink) -> anyhow::Result<bool> {
        self.seen.lock().unwrap().push(req.message.clone());
        Ok(false)
    }
}

#[tokio::test]
async fn new_enqueue_is_normalized_and_answered() {
    let page = page();
    let bot = Bot::new(page.clone(), manual_config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    bot.register(Recorder::new(&seen));
    bot.register(QueueApp::new());
    bot.start().await.unwrap();

    page.push_raw(RawEntry {
        id: Some("m1".to_string()),
        sender: Some("alice".to_string()),
        content: Some("排队".to_string()),
        timestamp: Some("1700000000".to_string()),
    })
    .await;
    bot.tick().await;

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, "m1");
        assert_eq!(seen[0].timestamp, 1_700_000_000_000);
    }
    let replies = replies_after_settle(&page).await;
    assert_eq!(replies, vec!["排上队辣!位置:1".to_string()]);
    bot.stop().await.unwrap();
}

#[tokio::test]
async fn history_before_start_is_never_dispatched() {
    let page = page();
    page.push("alice", "排队").await;
    page.push("bob", "排队").await;
    let bot = Bot::new(page.clone(), manual_config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    bot.register(Recorder::new(&seen));
    bot.start().await.unwrap();

    bot.tick().await;
    bot.tick().await;
    assert!(seen.lock().unwrap().is_empty());

    page.push("carol", "hello").await;
    bot.tick().await;
    bot.tick().await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].sender, "carol");
}

#[tokio::test]
async fn operator_advance_on_empty_queue() {
    let page = page();
    let bot = Bot::new(page.clone(), manual_config());
    bot.register(QueueApp::new());
    bot.start().await.unwrap();

    page.push("bot", "下一位").await;
    bot.tick().await;
    assert_eq!(replies_after_settle(&page).await, vec![NOBODY_WAITING.to_string()]);
}

#[tokio::test]
async fn audience_advance_gets_no_reply() {
    let page = page();
    let bot = Bot::new(page.clone(), manual_config());
    bot.register(QueueApp::new());
    bot.start().await.unwrap();

    page.push("alice", "下一位").await;
    bot.tick().await;
    assert!(replies_after_settle(&page).await.is_empty());
}

#[tokio::test]
async fn replies_within_interval_are_dropped() {
    let page = page();
    let config = BotConfig {
        min_reply_interval_ms: 10_000,
        ..manual_config()
    };
    let bot = Bot::new(page.clone(), config);
    bot.register(QueueApp::new());
    bot.start().await.unwrap();

    page.push("alice", "排队").await;
    page.push("bob", "排队").await;
    bot.tick().await;
    assert_eq!(
        replies_after_settle(&page).await,
        vec!["排上队辣!位置:1".to_string()]
    );
}

#[tokio::test]
async fn echoed_replies_are_ingested_but_not_commands() {
    let page = page();
    let bot = Bot::new(page.clone(), manual_config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    bot.register(Recorder::new(&seen));
    bot.register(QueueApp::new());
    bot.start().await.unwrap();

    page.push("alice", "排队帮助").await;
    bot.tick().await;
    assert_eq!(replies_after_settle(&page).await.len(), 1);

    bot.tick().await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].sender, "bot");
    // Submitted replies carry millisecond timestamps already.
    assert!(seen[1].timestamp >= 100_000_000_000);
}

#[tokio::test]
async fn cursor_strategy_survives_scrolled_off_entries() {
    let page = Arc::new(
        MemoryPage::new()
            .with_identities("bot", "host")
            .with_visible_limit(3),
    );
    page.push("x", "old-1").await;
    page.push("y", "old-2").await;
    let config = BotConfig {
        ingestion: IngestionStrategy::Cursor,
        ..manual_config()
    };
    let bot = Bot::new(page.clone(), config);
    let seen = Arc::new(Mutex::new(Vec::new()));
    bot.register(Recorder::new(&seen));
    bot.start().await.unwrap();

    for i in 0..5 {
        page.push("alice", format!("msg-{}", i)).await;
    }
    bot.tick().await;
    bot.tick().await;
    page.push("alice", "msg-5").await;
    bot.tick().await;

    let contents: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(contents, vec!["msg-2", "msg-3", "msg-4", "msg-5"]);
}

#[tokio::test]
async fn scheduled_ticks_run_until_stopped() {
    let page = page();
    let config = BotConfig {
        tick_interval_ms: 10,
        ..manual_config()
    };
    let bot = Bot::new(page.clone(), config);
    bot.register(QueueApp::new());
    bot.start().await.unwrap();

    page.push("alice", "排队").await;
    let mut replies = Vec::new();
    for _ in 0..100 {
        replies = page.submitted().await;
        if !replies.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(replies, vec!["排上队辣!位置:1".to_string()]);

    bot.stop().await.unwrap();
    page.push("bob", "排队").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(page.submitted().await.len(), 1);
}

#[tokio::test]
async fn detached_page_keeps_bot_alive() {
    let page = page();
    let bot = Bot::new(page.clone(), manual_config());
    bot.register(QueueApp::new());
    bot.start().await.unwrap();

    page.set_input_attached(false).await;
    page.push("alice", "排队").await;
    bot.tick().await;
    assert!(replies_after_settle(&page).await.is_empty());

    page.set_input_attached(true).await;
    page.push("alice", "我的位置").await;
    bot.tick().await;
    assert_eq!(
        replies_after_settle(&page).await,
        vec!["你的位置:1".to_string()]
    );
}
