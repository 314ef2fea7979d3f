// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rolling conversation context per (session, contact).
//!
//! Gives the reply chain continuity across debounce flushes: bounded to the
//! last N exchanges and dropped wholesale once a conversation goes quiet for
//! longer than the TTL.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use zapline_core::types::Exchange;

struct CachedConversation {
    exchanges: VecDeque<Exchange>,
    last_touched: Instant,
}

pub struct ConversationCache {
    entries: Mutex<HashMap<(String, String), CachedConversation>>,
    window: usize,
    ttl: Duration,
}

impl ConversationCache {
    pub fn new(window: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
            ttl,
        }
    }

    /// Recent exchanges for the conversation, oldest first. An expired
    /// conversation reads as empty and is evicted.
    pub async fn history(&self, session_id: &str, contact: &str) -> Vec<Exchange> {
        let key = (session_id.to_string(), contact.to_string());
        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(cached) if cached.last_touched.elapsed() <= self.ttl => {
                cached.exchanges.iter().cloned().collect()
            }
            Some(_) => {
                entries.remove(&key);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Appends a completed exchange, trimming to the configured window.
    pub async fn push(&self, session_id: &str, contact: &str, exchange: Exchange) {
        let key = (session_id.to_string(), contact.to_string());
        let mut entries = self.entries.lock().await;
        let cached = entries.entry(key).or_insert_with(|| CachedConversation {
            exchanges: VecDeque::new(),
            last_touched: Instant::now(),
        });
        cached.exchanges.push_back(exchange);
        while cached.exchanges.len() > self.window {
            cached.exchanges.pop_front();
        }
        cached.last_touched = Instant::now();
    }

    /// Drops every conversation belonging to a session. Called on
    /// disconnect so context never leaks across reconnects of other tenants.
    pub async fn clear_session(&self, session_id: &str) {
        let mut entries = self.entries.lock().await;
        entries.retain(|(sid, _), _| sid != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(user: &str, assistant: &str) -> Exchange {
        Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn history_returns_exchanges_in_order() {
        let cache = ConversationCache::new(6, Duration::from_secs(1800));
        cache.push("s1", "c1", exchange("oi", "olá!")).await;
        cache.push("s1", "c1", exchange("tudo bem?", "tudo ótimo!")).await;

        let history = cache.history("s1", "c1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user, "oi");
        assert_eq!(history[1].user, "tudo bem?");
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_bounded() {
        let cache = ConversationCache::new(2, Duration::from_secs(1800));
        for i in 0..5 {
            cache
                .push("s1", "c1", exchange(&format!("msg {i}"), "ok"))
                .await;
        }
        let history = cache.history("s1", "c1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user, "msg 3");
        assert_eq!(history[1].user, "msg 4");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_conversations_read_empty() {
        let cache = ConversationCache::new(6, Duration::from_secs(60));
        cache.push("s1", "c1", exchange("oi", "olá!")).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.history("s1", "c1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn conversations_are_isolated_per_contact() {
        let cache = ConversationCache::new(6, Duration::from_secs(1800));
        cache.push("s1", "c1", exchange("oi", "olá!")).await;
        assert!(cache.history("s1", "c2").await.is_empty());
        assert!(cache.history("s2", "c1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_session_drops_only_that_session() {
        let cache = ConversationCache::new(6, Duration::from_secs(1800));
        cache.push("s1", "c1", exchange("oi", "olá!")).await;
        cache.push("s2", "c1", exchange("hey", "hi!")).await;

        cache.clear_session("s1").await;
        assert!(cache.history("s1", "c1").await.is_empty());
        assert_eq!(cache.history("s2", "c1").await.len(), 1);
    }
}
