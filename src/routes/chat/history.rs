use crate::cache::ResponseCache;
use crate::cache::keys::{CHAT_HISTORY_LIMIT, CHAT_HISTORY_TTL, chat_history_key};
use crate::error::AppError;
use crate::routes::cached;
use crate::store::{ChatMessage, StudyStore};

/// 进入房间时回放的最近消息，缓存未命中时从存储加载
pub async fn recent_history(
    cache: &ResponseCache,
    store: &dyn StudyStore,
    room_id: &str,
) -> Result<Vec<ChatMessage>, AppError> {
    let (messages, _) = cached(cache, &chat_history_key(room_id), CHAT_HISTORY_TTL, || {
        store.recent_chat_messages(room_id, CHAT_HISTORY_LIMIT as i64)
    })
    .await?;
    Ok(messages)
}

/// 把新消息追加到已缓存的房间记录，只保留最近的若干条
///
/// 缓存中没有该房间记录时不做处理，下次进入房间时会从存储重新加载
pub fn remember(cache: &ResponseCache, message: &ChatMessage) {
    cache.update::<Vec<ChatMessage>, _>(&chat_history_key(&message.room_id), |history| {
        history.push(message.clone());
        let overflow = history.len().saturating_sub(CHAT_HISTORY_LIMIT);
        history.drain(..overflow);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn message(n: i64) -> ChatMessage {
        ChatMessage {
            id: format!("m{}", n),
            user_id: "u1".into(),
            message: format!("hello {}", n),
            room_id: "global-chat".into(),
            timestamp: n,
        }
    }

    #[tokio::test]
    async fn history_falls_back_to_store_then_stays_cached() {
        let cache = ResponseCache::new();
        let store = MemoryStore::new();
        for n in 0..60 {
            store.save_chat_message(&message(n)).await.unwrap();
        }

        let history = recent_history(&cache, &store, "global-chat").await.unwrap();
        assert_eq!(history.len(), CHAT_HISTORY_LIMIT);
        assert_eq!(history.first().unwrap().id, "m10");
        assert_eq!(history.last().unwrap().id, "m59");
        assert!(cache.stats().keys.contains(&chat_history_key("global-chat")));
    }

    #[tokio::test]
    async fn remembered_messages_are_capped() {
        let cache = ResponseCache::new();
        let store = MemoryStore::new();
        recent_history(&cache, &store, "global-chat").await.unwrap();

        for n in 0..(CHAT_HISTORY_LIMIT as i64 + 5) {
            remember(&cache, &message(n));
        }

        let history = recent_history(&cache, &store, "global-chat").await.unwrap();
        assert_eq!(history.len(), CHAT_HISTORY_LIMIT);
        assert_eq!(history.first().unwrap().id, "m5");
    }

    #[test]
    fn remember_without_loaded_history_is_a_no_op() {
        let cache = ResponseCache::new();
        remember(&cache, &message(1));
        assert_eq!(cache.stats().size, 0);
    }
}
