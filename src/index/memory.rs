use super::EventIndex;
use crate::errors::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Process-local priority index.
///
/// Clones share state, so concurrent pipeline stages (or several dispatcher
/// replicas in a test) observe a single queue and race on the same claims.
#[derive(Clone, Default)]
pub struct MemoryIndex {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    ready: HashMap<String, i64>,
    work: VecDeque<String>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members currently in the ready queue.
    pub fn ready_len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Number of members currently in the worker queue.
    pub fn work_len(&self) -> usize {
        self.inner.lock().work.len()
    }
}

#[async_trait]
impl EventIndex for MemoryIndex {
    async fn add_ready(&self, event_id: &str, fire_at: i64) -> Result<()> {
        self.inner.lock().ready.insert(event_id.to_string(), fire_at);
        Ok(())
    }

    async fn due_ready(&self, cutoff: i64) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let mut due: Vec<(i64, String)> = inner
            .ready
            .iter()
            .filter(|(_, score)| **score <= cutoff)
            .map(|(member, score)| (*score, member.clone()))
            .collect();
        due.sort();
        Ok(due.into_iter().map(|(_, member)| member).collect())
    }

    async fn remove_ready(&self, event_id: &str) -> Result<u64> {
        Ok(u64::from(self.inner.lock().ready.remove(event_id).is_some()))
    }

    async fn ready_score(&self, event_id: &str) -> Result<Option<i64>> {
        Ok(self.inner.lock().ready.get(event_id).copied())
    }

    async fn push_work(&self, event_id: &str) -> Result<()> {
        self.inner.lock().work.push_front(event_id.to_string());
        Ok(())
    }

    async fn pop_work(&self) -> Result<Option<String>> {
        Ok(self.inner.lock().work.pop_back())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn due_ready_orders_by_score() {
        let index = MemoryIndex::new();
        index.add_ready("late", 300).await.unwrap();
        index.add_ready("early", 100).await.unwrap();
        index.add_ready("mid", 200).await.unwrap();
        index.add_ready("future", 900).await.unwrap();

        let due = index.due_ready(300).await.unwrap();
        assert_eq!(due, vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn remove_ready_reports_claim_count() {
        let index = MemoryIndex::new();
        index.add_ready("ev", 10).await.unwrap();

        assert_eq!(index.remove_ready("ev").await.unwrap(), 1);
        assert_eq!(index.remove_ready("ev").await.unwrap(), 0);
        assert_eq!(index.remove_ready("never-added").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn re_adding_refreshes_score() {
        let index = MemoryIndex::new();
        index.add_ready("ev", 500).await.unwrap();
        index.add_ready("ev", 100).await.unwrap();

        assert_eq!(index.ready_len(), 1);
        assert_eq!(index.ready_score("ev").await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn work_queue_is_fifo() {
        let index = MemoryIndex::new();
        index.push_work("first").await.unwrap();
        index.push_work("second").await.unwrap();
        index.push_work("third").await.unwrap();

        assert_eq!(index.pop_work().await.unwrap().as_deref(), Some("first"));
        assert_eq!(index.pop_work().await.unwrap().as_deref(), Some("second"));
        assert_eq!(index.pop_work().await.unwrap().as_deref(), Some("third"));
        assert_eq!(index.pop_work().await.unwrap(), None);
    }
}
