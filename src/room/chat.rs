//! In-room chat state: bounded message log, reactions, typing flags.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::protocol::{ChatMessageRecord, MessageId, ReactionAction, UserId};

/// Append-only message ring with a hard cap; oldest messages are trimmed.
#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: VecDeque<ChatMessageRecord>,
    cap: usize,
}

impl ChatLog {
    pub fn new(cap: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
        }
    }

    pub fn from_messages(messages: Vec<ChatMessageRecord>, cap: usize) -> Self {
        let mut log = Self::new(cap);
        for message in messages {
            log.push(message);
        }
        log
    }

    pub fn push(&mut self, message: ChatMessageRecord) {
        self.messages.push_back(message);
        while self.messages.len() > self.cap {
            self.messages.pop_front();
        }
    }

    pub fn append(
        &mut self,
        user_id: UserId,
        display_name: String,
        content: String,
        now: DateTime<Utc>,
    ) -> ChatMessageRecord {
        let message = ChatMessageRecord {
            message_id: uuid::Uuid::new_v4(),
            user_id,
            display_name,
            content,
            sent_at: now,
            reactions: Default::default(),
        };
        self.push(message.clone());
        message
    }

    /// Apply a reaction mutation; returns the new count, None when the
    /// message is unknown (trimmed or never existed).
    pub fn react(
        &mut self,
        message_id: MessageId,
        emoji: &str,
        action: ReactionAction,
    ) -> Option<u32> {
        let message = self.messages.iter_mut().find(|m| m.message_id == message_id)?;
        let count = match action {
            ReactionAction::Add => {
                let entry = message.reactions.entry(emoji.to_string()).or_insert(0);
                *entry += 1;
                *entry
            }
            ReactionAction::Remove => {
                match message.reactions.get_mut(emoji) {
                    Some(entry) if *entry > 1 => {
                        *entry -= 1;
                        *entry
                    }
                    Some(_) => {
                        message.reactions.remove(emoji);
                        0
                    }
                    None => 0,
                }
            }
        };
        Some(count)
    }

    pub fn backlog(&self) -> Vec<ChatMessageRecord> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Per-user typing flags. Each flag is backed by a typing-expiry alarm so a
/// vanished client cannot stay "typing" forever.
#[derive(Debug, Clone, Default)]
pub struct TypingState {
    typing: Vec<UserId>,
}

impl TypingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the set changed.
    pub fn start(&mut self, user_id: UserId) -> bool {
        if self.typing.contains(&user_id) {
            return false;
        }
        self.typing.push(user_id);
        true
    }

    /// Returns true when the set changed.
    pub fn stop(&mut self, user_id: UserId) -> bool {
        let before = self.typing.len();
        self.typing.retain(|&u| u != user_id);
        self.typing.len() != before
    }

    pub fn current(&self) -> Vec<UserId> {
        self.typing.clone()
    }
}
