use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

pub const CHAT_MESSAGES_PER_MINUTE_DEFAULT: u32 = 240;
pub const TYPING_EVENTS_PER_MINUTE_DEFAULT: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayLimits {
    pub chat_messages_per_minute: u32,
    pub typing_events_per_minute: u32,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            chat_messages_per_minute: CHAT_MESSAGES_PER_MINUTE_DEFAULT,
            typing_events_per_minute: TYPING_EVENTS_PER_MINUTE_DEFAULT,
        }
    }
}

/// Per-user limiters, shared by every connection of the same user.
pub struct UserRateLimits {
    chat: DefaultKeyedRateLimiter<String>,
    typing: DefaultKeyedRateLimiter<String>,
}

impl UserRateLimits {
    pub fn new(limits: GatewayLimits) -> Self {
        Self {
            chat: RateLimiter::keyed(per_minute(limits.chat_messages_per_minute)),
            typing: RateLimiter::keyed(per_minute(limits.typing_events_per_minute)),
        }
    }

    pub fn allow_chat(&self, user_id: &str) -> bool {
        self.chat.check_key(&user_id.to_string()).is_ok()
    }

    pub fn allow_typing(&self, user_id: &str) -> bool {
        self.typing.check_key(&user_id.to_string()).is_ok()
    }

    /// Drop limiter state for users that have been quiet for a while.
    pub fn prune(&self) {
        self.chat.retain_recent();
        self.typing.retain_recent();
        self.chat.shrink_to_fit();
        self.typing.shrink_to_fit();
    }
}

fn per_minute(limit: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_above_quota_is_refused() {
        let limits = UserRateLimits::new(GatewayLimits {
            chat_messages_per_minute: 3,
            typing_events_per_minute: 1,
        });
        assert!((0..3).all(|_| limits.allow_chat("alice")));
        assert!(!limits.allow_chat("alice"));
        assert!(limits.allow_chat("bob"));

        assert!(limits.allow_typing("alice"));
        assert!(!limits.allow_typing("alice"));
    }

    #[test]
    fn zero_limit_falls_back_to_one() {
        let limits = UserRateLimits::new(GatewayLimits {
            chat_messages_per_minute: 0,
            typing_events_per_minute: 0,
        });
        assert!(limits.allow_chat("alice"));
        assert!(!limits.allow_chat("alice"));
    }
}
