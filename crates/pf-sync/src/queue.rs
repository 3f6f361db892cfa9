use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Items queued for work matching are bare entity UUIDs (a prompt round, a
/// phraseset, a backronym set).
pub type QueueItem = uuid::Uuid;

/// Queue of prompt rounds awaiting a copier.
pub const PROMPT_QUEUE: &str = "queue:qf:prompt_rounds";
/// Queue of phrasesets open for voting.
pub const PHRASESET_QUEUE: &str = "queue:qf:voting_phrasesets";
/// Queue of IR sets accepting entries.
pub const IR_ENTRY_QUEUE: &str = "queue:ir:entry_sets";
/// Queue of IR sets in their voting window.
pub const IR_VOTING_QUEUE: &str = "queue:ir:voting_sets";

/// Named multi-producer / multi-consumer FIFO queues.
///
/// `remove` gives take-if-present semantics; re-pushing an item moves it to
/// the back, so producers dedupe with `remove` + `push`.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn push(&self, name: &str, item: QueueItem);
    async fn peek(&self, name: &str) -> Option<QueueItem>;
    async fn pop(&self, name: &str) -> Option<QueueItem>;
    async fn remove(&self, name: &str, item: QueueItem) -> bool;
    async fn len(&self, name: &str) -> usize;
}

/// In-process queue service backed by per-name deques.
#[derive(Default)]
pub struct MemoryQueues {
    queues: Mutex<HashMap<String, VecDeque<QueueItem>>>,
}

impl MemoryQueues {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueService for MemoryQueues {
    async fn push(&self, name: &str, item: QueueItem) {
        self.queues
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .push_back(item);
    }
    async fn peek(&self, name: &str) -> Option<QueueItem> {
        self.queues
            .lock()
            .await
            .get(name)
            .and_then(|q| q.front().copied())
    }
    async fn pop(&self, name: &str) -> Option<QueueItem> {
        self.queues
            .lock()
            .await
            .get_mut(name)
            .and_then(|q| q.pop_front())
    }
    async fn remove(&self, name: &str, item: QueueItem) -> bool {
        let mut queues = self.queues.lock().await;
        match queues.get_mut(name) {
            Some(q) => match q.iter().position(|i| *i == item) {
                Some(idx) => {
                    q.remove(idx);
                    true
                }
                None => false,
            },
            None => false,
        }
    }
    async fn len(&self, name: &str) -> usize {
        self.queues.lock().await.get(name).map_or(0, |q| q.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_ordering() {
        let queues = MemoryQueues::new();
        let (a, b, c) = (
            uuid::Uuid::now_v7(),
            uuid::Uuid::now_v7(),
            uuid::Uuid::now_v7(),
        );
        queues.push(PROMPT_QUEUE, a).await;
        queues.push(PROMPT_QUEUE, b).await;
        queues.push(PROMPT_QUEUE, c).await;
        assert_eq!(queues.peek(PROMPT_QUEUE).await, Some(a));
        assert_eq!(queues.pop(PROMPT_QUEUE).await, Some(a));
        assert_eq!(queues.pop(PROMPT_QUEUE).await, Some(b));
        assert_eq!(queues.len(PROMPT_QUEUE).await, 1);
    }

    #[tokio::test]
    async fn remove_is_take_if_present() {
        let queues = MemoryQueues::new();
        let (a, b) = (uuid::Uuid::now_v7(), uuid::Uuid::now_v7());
        queues.push(IR_ENTRY_QUEUE, a).await;
        queues.push(IR_ENTRY_QUEUE, b).await;
        assert!(queues.remove(IR_ENTRY_QUEUE, a).await);
        assert!(!queues.remove(IR_ENTRY_QUEUE, a).await);
        assert_eq!(queues.pop(IR_ENTRY_QUEUE).await, Some(b));
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let queues = MemoryQueues::new();
        let a = uuid::Uuid::now_v7();
        queues.push(PROMPT_QUEUE, a).await;
        assert_eq!(queues.len(PHRASESET_QUEUE).await, 0);
        assert_eq!(queues.pop(PHRASESET_QUEUE).await, None);
    }
}
