//! Turn-taking queue: viewers line up, the owner (or the bot account) calls the next one.
//!
//! The participant currently being served sits in a reserved slot ahead of the waiting
//! line and is reported as position 0; people in line are numbered from 1.

use crate::message::{RequestContext, Role};
use crate::routing::{Application, Pattern, ResponseSink};
use std::collections::VecDeque;

const CMD_HELP: &str = "排队帮助";
const CMD_PEEK: &str = "当前";
const CMD_COUNT: &str = "排队人数";
const CMD_ENQUEUE: &str = "排队";
const CMD_DEQUEUE: &str = "取消排队";
const CMD_POSITION: &str = "我的位置";
const CMD_ADVANCE: &str = "下一位";
const CMD_ADVANCE_ALT: &str = "下一个";
const CMD_OPEN: &str = "开始排队";
const CMD_CLOSE: &str = "停止排队";

pub const NOBODY_WAITING: &str = "都嘟完辣!";
pub const BEING_SERVED: &str = "正在被嘟";
const HELP_PRIVILEGED: &str = "主播指令:下一位,开始排队,停止排队";
const HELP_AUDIENCE: &str = "观众指令:排队,取消排队,我的位置";
const NOT_IN_QUEUE: &str = "你不在队列中!";
const GATE_CLOSED: &str = "排队已关闭!";

/// Render a queue position; 0 means "being served" and is never shown as a digit.
pub fn position_to_string(position: usize) -> String {
    if position == 0 {
        BEING_SERVED.to_string()
    } else {
        position.to_string()
    }
}

pub struct QueueApp {
    name: String,
    pattern: Pattern,
    serving: Option<String>,
    waiting: VecDeque<String>,
    accepting: bool,
}

impl Default for QueueApp {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueApp {
    pub fn new() -> Self {
        Self {
            name: "queue".to_string(),
            pattern: Pattern::one_of([
                CMD_HELP,
                CMD_PEEK,
                CMD_COUNT,
                CMD_ENQUEUE,
                CMD_DEQUEUE,
                CMD_POSITION,
                CMD_ADVANCE,
                CMD_ADVANCE_ALT,
                CMD_OPEN,
                CMD_CLOSE,
            ]),
            serving: None,
            waiting: VecDeque::new(),
            accepting: true,
        }
    }

    /// Participants in line, not counting the one being served.
    pub fn waiting(&self) -> Vec<String> {
        self.waiting.iter().cloned().collect()
    }

    pub fn serving(&self) -> Option<&str> {
        self.serving.as_deref()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// 0 when being served, 1-based place in line otherwise.
    pub fn position_of(&self, sender: &str) -> Option<usize> {
        if self.serving.as_deref() == Some(sender) {
            return Some(0);
        }
        self.waiting.iter().position(|s| s == sender).map(|i| i + 1)
    }

    fn help(&self, role: Role, res: &dyn ResponseSink) -> bool {
        if role.is_privileged() {
            res.send(HELP_PRIVILEGED);
        } else {
            res.send(HELP_AUDIENCE);
        }
        true
    }

    fn peek(&self, res: &dyn ResponseSink) -> bool {
        match self.serving.as_ref().or_else(|| self.waiting.front()) {
            Some(current) => res.send(&format!("当前:{}", current)),
            None => res.send(NOBODY_WAITING),
        }
        true
    }

    fn count(&self, res: &dyn ResponseSink) -> bool {
        if self.waiting.is_empty() {
            res.send(NOBODY_WAITING);
        } else {
            res.send(&format!("排队人数:{}", self.waiting.len()));
        }
        true
    }

    fn enqueue(&mut self, sender: &str, res: &dyn ResponseSink) -> bool {
        if !self.accepting {
            res.send(GATE_CLOSED);
            return true;
        }
        match self.position_of(sender) {
            Some(p) => res.send(&format!("你已在队列中!位置:{}", position_to_string(p))),
            None => {
                self.waiting.push_back(sender.to_string());
                res.send(&format!(
                    "排上队辣!位置:{}",
                    position_to_string(self.waiting.len())
                ));
            }
        }
        true
    }

    fn dequeue(&mut self, sender: &str, res: &dyn ResponseSink) -> bool {
        if self.serving.as_deref() == Some(sender) {
            self.serving = None;
            res.send("取消排队成功!");
        } else if let Some(i) = self.waiting.iter().position(|s| s == sender) {
            self.waiting.remove(i);
            res.send("取消排队成功!");
        } else {
            res.send(NOT_IN_QUEUE);
        }
        true
    }

    fn position(&self, sender: &str, res: &dyn ResponseSink) -> bool {
        match self.position_of(sender) {
            Some(p) => res.send(&format!("你的位置:{}", position_to_string(p))),
            None => res.send(NOT_IN_QUEUE),
        }
        true
    }

    fn advance(&mut self, res: &dyn ResponseSink) -> bool {
        self.serving = self.waiting.pop_front();
        match &self.serving {
            Some(next) => res.send(&format!("下一个:{}", next)),
            None => res.send(NOBODY_WAITING),
        }
        true
    }

    fn set_accepting(&mut self, accepting: bool, res: &dyn ResponseSink) -> bool {
        self.accepting = accepting;
        res.send(if accepting { "排队已开始!" } else { "排队已停止!" });
        true
    }
}

impl Application for QueueApp {
    fn name(&self) -> &str {
        &self.name
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn handle(&mut self, req: &RequestContext, res: &dyn ResponseSink) -> anyhow::Result<bool> {
        let role = req.role();
        let sender = req.message.sender.as_str();
        let command = req.message.content.trim();

        let handled = match (command, role.is_privileged()) {
            (CMD_HELP, _) => self.help(role, res),
            (CMD_PEEK, _) => self.peek(res),
            (CMD_COUNT, _) => self.count(res),
            (CMD_ADVANCE | CMD_ADVANCE_ALT, true) => self.advance(res),
            (CMD_OPEN, true) => self.set_accepting(true, res),
            (CMD_CLOSE, true) => self.set_accepting(false, res),
            (CMD_ENQUEUE, false) => self.enqueue(sender, res),
            (CMD_DEQUEUE, false) => self.dequeue(sender, res),
            (CMD_POSITION, false) => self.position(sender, res),
            _ => {
                log::debug!(
                    "queue: unhandled request {:?} from {} ({:?})",
                    command,
                    sender,
                    role
                );
                false
            }
        };
        Ok(handled)
    }
}
