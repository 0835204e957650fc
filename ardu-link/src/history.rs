use std::collections::{VecDeque, vec_deque};

use ardu_mavlink::Message;

/// The last few messages a subscriber received, oldest first.
///
/// Clearing it does not touch the decoder; use
/// [`SerialManager::clear_parser`](crate::serial_manager::SerialManager::clear_parser) for that.
pub struct MessageHistory {
    limit: usize,
    filter: Option<Vec<String>>,
    messages: VecDeque<Message>,
}

impl MessageHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            filter: None,
            messages: VecDeque::with_capacity(limit.min(1024)),
        }
    }

    /// Only keep messages with one of these names (`HEARTBEAT`, `GPS_RAW_INT`, ...).
    /// An empty list keeps everything.
    pub fn with_filter<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.filter = if names.is_empty() {
            None
        } else {
            Some(names.iter().map(|n| n.as_ref().to_ascii_uppercase()).collect())
        };
        self
    }

    pub fn accepts(&self, msg: &Message) -> bool {
        match &self.filter {
            Some(names) => names.iter().any(|n| n == msg.name()),
            None => true,
        }
    }

    /// Returns whether `msg` was kept.
    pub fn push(&mut self, msg: Message) -> bool {
        if self.limit == 0 || !self.accepts(&msg) {
            return false;
        }
        while self.messages.len() >= self.limit {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
        true
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
