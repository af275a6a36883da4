//! Per-user sliding-window command budgets.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use crate::config::RateLimitConfig;
use crate::protocol::UserId;

/// Which budget a command draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Chat, quick chat, reactions, typing
    Chat,
    /// Everything else except PING
    Command,
}

/// Sliding-window limiter over recent command timestamps per user.
#[derive(Debug)]
pub struct CommandRateLimiter {
    config: RateLimitConfig,
    history: HashMap<(UserId, bool), VecDeque<DateTime<Utc>>>,
}

impl CommandRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    /// Record an attempt; returns false when the budget is exhausted.
    pub fn check(&mut self, user_id: UserId, class: CommandClass, now: DateTime<Utc>) -> bool {
        let is_chat = class == CommandClass::Chat;
        let budget = if is_chat {
            self.config.chat_per_window
        } else {
            self.config.commands_per_window
        };
        let window = chrono::Duration::seconds(self.config.window_secs as i64);

        let entries = self.history.entry((user_id, is_chat)).or_default();
        while entries.front().is_some_and(|&t| now - t >= window) {
            entries.pop_front();
        }
        if entries.len() as u32 >= budget {
            return false;
        }
        entries.push_back(now);
        true
    }

    /// Drop a user's history when their last socket goes away.
    pub fn forget(&mut self, user_id: UserId) {
        self.history.retain(|(u, _), _| *u != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn limiter(commands: u32, chat: u32) -> CommandRateLimiter {
        CommandRateLimiter::new(RateLimitConfig {
            commands_per_window: commands,
            chat_per_window: chat,
            window_secs: 10,
        })
    }

    #[test]
    fn budget_is_enforced_within_window() {
        let mut limiter = limiter(2, 10);
        let user = Uuid::new_v4();
        let now = Utc::now();

        assert!(limiter.check(user, CommandClass::Command, now));
        assert!(limiter.check(user, CommandClass::Command, now));
        assert!(!limiter.check(user, CommandClass::Command, now));
    }

    #[test]
    fn budget_refills_as_window_slides() {
        let mut limiter = limiter(1, 10);
        let user = Uuid::new_v4();
        let now = Utc::now();

        assert!(limiter.check(user, CommandClass::Command, now));
        assert!(!limiter.check(user, CommandClass::Command, now + chrono::Duration::seconds(5)));
        assert!(limiter.check(user, CommandClass::Command, now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn chat_and_command_budgets_are_independent() {
        let mut limiter = limiter(1, 1);
        let user = Uuid::new_v4();
        let now = Utc::now();

        assert!(limiter.check(user, CommandClass::Command, now));
        assert!(limiter.check(user, CommandClass::Chat, now));
        assert!(!limiter.check(user, CommandClass::Command, now));
        assert!(!limiter.check(user, CommandClass::Chat, now));
    }

    #[test]
    fn forget_clears_history() {
        let mut limiter = limiter(1, 1);
        let user = Uuid::new_v4();
        let now = Utc::now();
        assert!(limiter.check(user, CommandClass::Command, now));
        limiter.forget(user);
        assert!(limiter.check(user, CommandClass::Command, now));
    }
}
