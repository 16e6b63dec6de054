//! Command routing: applications, activation patterns and the dispatcher.
//!
//! Applications are tried in registration order. An application whose pattern matches is
//! invoked; if it reports the message as handled, no later application sees that message.

use crate::message::RequestContext;
use regex::Regex;

/// Where an application writes its replies.
pub trait ResponseSink {
    fn send(&self, text: &str);
}

/// Activation condition for an application.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Trimmed content equals this string.
    Exact(String),
    /// Trimmed content equals one of these strings.
    OneOf(Vec<String>),
    /// Regex tested against the untrimmed content.
    Matcher(Regex),
}

impl Pattern {
    pub fn one_of<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::OneOf(items.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, content: &str) -> bool {
        match self {
            Pattern::Exact(s) => content.trim() == s,
            Pattern::OneOf(items) => {
                let trimmed = content.trim();
                items.iter().any(|s| s == trimmed)
            }
            Pattern::Matcher(re) => re.is_match(content),
        }
    }
}

/// A command handler plugged into the dispatcher.
pub trait Application: Send {
    /// Unique name within a dispatcher; used in logs.
    fn name(&self) -> &str;

    fn pattern(&self) -> &Pattern;

    /// Handle a message whose content matched `pattern`. `Ok(true)` means fully handled.
    fn handle(&mut self, req: &RequestContext, res: &dyn ResponseSink) -> anyhow::Result<bool>;
}

/// Ordered list of applications.
#[derive(Default)]
pub struct Dispatcher {
    apps: Vec<Box<dyn Application>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { apps: Vec::new() }
    }

    /// Append an application. Returns false (and keeps the existing one) if the name is taken.
    pub fn register(&mut self, app: Box<dyn Application>) -> bool {
        if self.apps.iter().any(|a| a.name() == app.name()) {
            log::warn!("routing: app \"{}\" already registered, ignoring", app.name());
            return false;
        }
        log::debug!("routing: registered app \"{}\"", app.name());
        self.apps.push(app);
        true
    }

    /// Registered application names in priority order.
    pub fn names(&self) -> Vec<String> {
        self.apps.iter().map(|a| a.name().to_string()).collect()
    }

    /// Route one message. Returns the name of the application that handled it, if any.
    pub fn dispatch(&mut self, req: &RequestContext, res: &dyn ResponseSink) -> Option<String> {
        for app in self.apps.iter_mut() {
            if !app.pattern().matches(&req.message.content) {
                continue;
            }
            match app.handle(req, res) {
                Ok(true) => return Some(app.name().to_string()),
                Ok(false) => {}
                Err(e) => {
                    log::error!("routing: app \"{}\" encountered an error: {:#}", app.name(), e);
                }
            }
        }
        log::debug!(
            "routing: message {} from {} left unhandled",
            req.message.id,
            req.message.sender
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use std::cell::RefCell;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        sent: RefCell<Vec<String>>,
    }

    impl ResponseSink for RecordingSink {
        fn send(&self, text: &str) {
            self.sent.borrow_mut().push(text.to_string());
        }
    }

    enum Outcome {
        Handled,
        Pass,
        Fail,
    }

    struct Probe {
        name: String,
        pattern: Pattern,
        outcome: Outcome,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn boxed(
            name: &str,
            pattern: Pattern,
            outcome: Outcome,
            calls: &Arc<Mutex<Vec<String>>>,
        ) -> Box<dyn Application> {
            Box::new(Self {
                name: name.to_string(),
                pattern,
                outcome,
                calls: Arc::clone(calls),
            })
        }
    }

    impl Application for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn pattern(&self) -> &Pattern {
            &self.pattern
        }

        fn handle(&mut self, _req: &RequestContext, res: &dyn ResponseSink) -> anyhow::Result<bool> {
            self.calls.lock().unwrap().push(self.name.clone());
            match self.outcome {
                Outcome::Handled => {
                    res.send(&self.name);
                    Ok(true)
                }
                Outcome::Pass => Ok(false),
                Outcome::Fail => anyhow::bail!("boom"),
            }
        }
    }

    fn req(content: &str) -> RequestContext {
        RequestContext {
            operator: "bot".to_string(),
            owner: "host".to_string(),
            message: Message {
                id: "m1".to_string(),
                sender: "alice".to_string(),
                content: content.to_string(),
                timestamp: 0,
            },
        }
    }

    #[test]
    fn patterns() {
        assert!(Pattern::Exact("ping".into()).matches("  ping "));
        assert!(!Pattern::Exact("ping".into()).matches("Ping"));
        assert!(Pattern::one_of(["a", "b"]).matches("b"));
        assert!(!Pattern::one_of(["a", "b"]).matches("c"));
        let re = Pattern::Matcher(Regex::new(r"^#\d+$").unwrap());
        assert!(re.matches("#42"));
        assert!(!re.matches(" #42"));
    }

    #[test]
    fn first_handled_app_short_circuits() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        d.register(Probe::boxed("a", Pattern::Exact("x".into()), Outcome::Handled, &calls));
        d.register(Probe::boxed("b", Pattern::Exact("x".into()), Outcome::Handled, &calls));
        let sink = RecordingSink::default();

        assert_eq!(d.dispatch(&req("x"), &sink), Some("a".to_string()));
        assert_eq!(*calls.lock().unwrap(), vec!["a".to_string()]);
        assert_eq!(*sink.sent.borrow(), vec!["a".to_string()]);
    }

    #[test]
    fn unhandled_and_failing_apps_fall_through_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        d.register(Probe::boxed("pass", Pattern::Exact("x".into()), Outcome::Pass, &calls));
        d.register(Probe::boxed("fail", Pattern::Exact("x".into()), Outcome::Fail, &calls));
        d.register(Probe::boxed("other", Pattern::Exact("y".into()), Outcome::Handled, &calls));
        d.register(Probe::boxed("last", Pattern::Exact("x".into()), Outcome::Handled, &calls));
        let sink = RecordingSink::default();

        assert_eq!(d.dispatch(&req("x"), &sink), Some("last".to_string()));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["pass".to_string(), "fail".to_string(), "last".to_string()]
        );
    }

    #[test]
    fn no_match_is_silently_unhandled() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        d.register(Probe::boxed("a", Pattern::Exact("x".into()), Outcome::Handled, &calls));
        let sink = RecordingSink::default();
        assert_eq!(d.dispatch(&req("nope"), &sink), None);
        assert!(calls.lock().unwrap().is_empty());
        assert!(sink.sent.borrow().is_empty());
    }

    #[test]
    fn register_is_idempotent_by_name() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        assert!(d.register(Probe::boxed("a", Pattern::Exact("x".into()), Outcome::Pass, &calls)));
        assert!(!d.register(Probe::boxed("a", Pattern::Exact("y".into()), Outcome::Pass, &calls)));
        assert!(d.register(Probe::boxed("b", Pattern::Exact("y".into()), Outcome::Pass, &calls)));
        assert_eq!(d.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
