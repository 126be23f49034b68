use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::limiter::ChannelRateLimiter;
use crate::store::ChatMessage;

/// 全站公共聊天室
pub const GLOBAL_ROOM: &str = "global-chat";

/// 单条消息最大字符数
pub const MAX_MESSAGE_LEN: usize = 1000;

/// 客户端发来的消息
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub message: String,
}

/// 推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
    ChatHistory {
        messages: Vec<ChatMessage>,
    },
    NewMessage(ChatMessage),
    RateLimit {
        message: String,
        #[serde(rename = "retryAfter")]
        retry_after: u64,
    },
    Error {
        message: String,
    },
}

/// 一条入站消息的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// 广播给所有连接
    Broadcast(ChatMessage),
    /// 只回复给发送方
    Reply(ChatEvent),
}

fn reply_error(message: impl Into<String>) -> Inbound {
    Inbound::Reply(ChatEvent::Error {
        message: message.into(),
    })
}

/// 校验并限流一条入站消息，校验失败的消息不消耗令牌
pub fn handle_incoming<C: Clock>(
    limiter: &ChannelRateLimiter<C>,
    user_id: &str,
    connection_id: &str,
    raw: &str,
) -> Inbound {
    let incoming: IncomingMessage = match serde_json::from_str(raw) {
        Ok(incoming) => incoming,
        Err(_) => return reply_error("Invalid message format"),
    };

    let text = incoming.message.trim();
    if text.is_empty() {
        return reply_error("Message cannot be empty");
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        return reply_error(format!(
            "Message too long (max {} characters)",
            MAX_MESSAGE_LEN
        ));
    }

    let admission = limiter.admit(user_id, connection_id);
    if !admission.allowed {
        let config = limiter.limiter().config();
        return Inbound::Reply(ChatEvent::RateLimit {
            message: config.message().to_string(),
            retry_after: admission
                .retry_after_secs
                .unwrap_or_else(|| config.retry_after_secs()),
        });
    }

    Inbound::Broadcast(ChatMessage {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        message: text.to_string(),
        room_id: GLOBAL_ROOM.to_string(),
        timestamp: Utc::now().timestamp_millis(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::MockClock;
    use crate::limiter::{RateLimitConfig, RateLimiter};

    fn channel(max: u32, clock: MockClock) -> ChannelRateLimiter<MockClock> {
        let config = RateLimitConfig::new(max, Duration::from_secs(10), "slow down").unwrap();
        ChannelRateLimiter::from_limiter(Arc::new(RateLimiter::with_clock(config, clock)))
    }

    #[test]
    fn valid_message_is_trimmed_and_broadcast() {
        let limiter = channel(5, MockClock::new());
        match handle_incoming(&limiter, "u1", "c1", r#"{"message":"  hello  "}"#) {
            Inbound::Broadcast(msg) => {
                assert_eq!(msg.message, "hello");
                assert_eq!(msg.user_id, "u1");
                assert_eq!(msg.room_id, GLOBAL_ROOM);
            }
            other => panic!("expected broadcast, got {:?}", other),
        }
    }

    #[test]
    fn invalid_messages_do_not_spend_tokens() {
        let limiter = channel(1, MockClock::new());
        for raw in ["not json", r#"{"message":"   "}"#] {
            assert!(matches!(
                handle_incoming(&limiter, "u1", "c1", raw),
                Inbound::Reply(ChatEvent::Error { .. })
            ));
        }
        let long = format!(r#"{{"message":"{}"}}"#, "a".repeat(MAX_MESSAGE_LEN + 1));
        assert!(matches!(
            handle_incoming(&limiter, "u1", "c1", &long),
            Inbound::Reply(ChatEvent::Error { .. })
        ));

        assert!(matches!(
            handle_incoming(&limiter, "u1", "c1", r#"{"message":"hi"}"#),
            Inbound::Broadcast(_)
        ));
    }

    #[test]
    fn flood_gets_rate_limit_reply_until_refill() {
        let clock = MockClock::new();
        let limiter = channel(2, clock.clone());
        let raw = r#"{"message":"spam"}"#;

        assert!(matches!(handle_incoming(&limiter, "u1", "c1", raw), Inbound::Broadcast(_)));
        assert!(matches!(handle_incoming(&limiter, "u1", "c1", raw), Inbound::Broadcast(_)));
        assert_eq!(
            handle_incoming(&limiter, "u1", "c1", raw),
            Inbound::Reply(ChatEvent::RateLimit {
                message: "slow down".into(),
                retry_after: 10,
            })
        );

        clock.advance(Duration::from_secs(5));
        assert!(matches!(handle_incoming(&limiter, "u1", "c1", raw), Inbound::Broadcast(_)));
    }

    #[test]
    fn rate_limit_event_uses_wire_names() {
        let event = ChatEvent::RateLimit {
            message: "wait".into(),
            retry_after: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "rate-limit");
        assert_eq!(json["retryAfter"], 10);
    }

    #[test]
    fn history_event_is_tagged() {
        let event = ChatEvent::ChatHistory { messages: vec![] };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chat-history");
        assert!(json["messages"].as_array().unwrap().is_empty());
    }
}
