//! Completion Event Bus
//!
//! Notifies registered listeners whenever a task reaches a terminal
//! outcome. Listeners are explicit entries in a table: they can be counted
//! and removed, so a poller that gives up does not leave a subscription
//! behind.
//!
//! # Features
//! - Callback listeners (`on_task_completed` / `remove_listener`)
//! - One-shot waiters with a bounded wait, unregistered on drop
//! - Any number of concurrent listeners

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::graph::CompletedTask;

/// Identifier returned when registering a listener
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&CompletedTask) + Send + Sync>;

/// In-process publish/subscribe for task completions
#[derive(Default)]
pub struct CompletionBus {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl CompletionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked once per task completion
    pub fn on_task_completed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CompletedTask) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver a completion to every listener registered at call time
    pub fn notify(&self, task: &CompletedTask) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        tracing::trace!(task_id = %task.id, listeners = listeners.len(), "Publishing completion");
        for listener in listeners {
            listener(task);
        }
    }

    /// Register a one-shot waiter for the next completion.
    ///
    /// Registration happens immediately, so a caller can check shared state
    /// and subscribe under the same lock without missing a wake-up.
    pub fn register_waiter(self: &Arc<Self>) -> CompletionWaiter {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let id = self.on_task_completed(move |task| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(task.clone());
            }
        });
        CompletionWaiter {
            bus: Arc::clone(self),
            id,
            rx,
        }
    }

    /// Wait for the next completion, at most `timeout`
    pub async fn wait_next(self: &Arc<Self>, timeout: Duration) -> Option<CompletedTask> {
        self.register_waiter().wait(timeout).await
    }
}

/// A registered one-shot listener; unregisters itself when dropped
pub struct CompletionWaiter {
    bus: Arc<CompletionBus>,
    id: ListenerId,
    rx: oneshot::Receiver<CompletedTask>,
}

impl CompletionWaiter {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the completion, at most `timeout`
    pub async fn wait(self, timeout: Duration) -> Option<CompletedTask> {
        self.wait_until(Instant::now() + timeout).await
    }

    /// Wait for the completion until `deadline`
    pub async fn wait_until(mut self, deadline: Instant) -> Option<CompletedTask> {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(task)) => Some(task),
            _ => None,
        }
    }
}

impl Drop for CompletionWaiter {
    fn drop(&mut self) {
        self.bus.remove_listener(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskOutcome;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn completed(id: &str) -> CompletedTask {
        CompletedTask {
            id: id.to_string(),
            agent: "weather".to_string(),
            outcome: TaskOutcome::succeeded(json!("Sunny")),
        }
    }

    #[test]
    fn test_register_notify_remove() {
        let bus = CompletionBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let id = bus.on_task_completed(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.listener_count(), 1);

        bus.notify(&completed("a"));
        bus.notify(&completed("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.notify(&completed("c"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_multiple_listeners_all_receive() {
        let bus = CompletionBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let seen = seen.clone();
            bus.on_task_completed(move |task| seen.lock().push(format!("{name}:{}", task.id)));
        }

        bus.notify(&completed("t1"));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&"first:t1".to_string()));
        assert!(seen.contains(&"second:t1".to_string()));
    }

    #[tokio::test]
    async fn test_waiter_receives_next_completion() {
        let bus = Arc::new(CompletionBus::new());
        let waiter = bus.register_waiter();
        assert_eq!(bus.listener_count(), 1);

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.notify(&completed("t1"));
        });

        let task = waiter.wait(Duration::from_secs(5)).await;
        assert_eq!(task.map(|t| t.id), Some("t1".to_string()));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_waiter_timeout_unregisters() {
        let bus = Arc::new(CompletionBus::new());

        let task = bus.wait_next(Duration::from_millis(30)).await;

        assert!(task.is_none());
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_before_wait_is_kept() {
        let bus = Arc::new(CompletionBus::new());
        let waiter = bus.register_waiter();

        bus.notify(&completed("early"));

        let task = waiter.wait(Duration::from_millis(10)).await;
        assert_eq!(task.map(|t| t.id), Some("early".to_string()));
    }
}
