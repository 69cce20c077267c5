use super::KeyValueStore;
use crate::dispatch::Notifier;
use crate::types::Category;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Background checkpointing of rule categories.
///
/// Each category has its own worker, so writes to one category are serialized
/// while the two categories stay independent. A worker always saves the most
/// recently submitted value: values submitted while a save is in flight
/// collapse into a single follow-up save of the latest one, and an older value
/// is never written after a newer one.
pub struct PersistWriter {
    blocked: watch::Sender<Option<String>>,
    daily_block_times: watch::Sender<Option<String>>,
    workers: Vec<JoinHandle<()>>,
}

impl PersistWriter {
    /// Start both workers. Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>, notifier: Arc<dyn Notifier>) -> Self {
        let (blocked, blocked_rx) = watch::channel(None);
        let (daily_block_times, daily_rx) = watch::channel(None);

        let workers = vec![
            tokio::spawn(run_worker(
                Category::Blocked,
                blocked_rx,
                store.clone(),
                notifier.clone(),
            )),
            tokio::spawn(run_worker(
                Category::DailyBlockTimes,
                daily_rx,
                store,
                notifier,
            )),
        ];

        Self {
            blocked,
            daily_block_times,
            workers,
        }
    }

    /// Queue `value` as the next content of `category`. Never blocks.
    pub fn submit(&self, category: Category, value: String) {
        let sender = match category {
            Category::Blocked => &self.blocked,
            Category::DailyBlockTimes => &self.daily_block_times,
        };
        sender.send_replace(Some(value));
    }

    /// Write any pending values and stop the workers
    pub async fn shutdown(self) {
        let Self {
            blocked,
            daily_block_times,
            workers,
        } = self;
        drop(blocked);
        drop(daily_block_times);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Persistence worker failed: {}", e);
            }
        }
    }
}

async fn run_worker(
    category: Category,
    mut rx: watch::Receiver<Option<String>>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
) {
    // `changed` still reports a value that was sent before the sender closed.
    while rx.changed().await.is_ok() {
        let Some(value) = rx.borrow_and_update().clone() else {
            continue;
        };

        let store = store.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(category, &value)).await;

        match saved {
            Ok(Ok(())) => debug!("Saved {}", category),
            Ok(Err(e)) => {
                warn!("Failed to save {}: {}", category, e);
                let message = format!("Your {} rules could not be saved: {}", category, e);
                if let Err(e) = notifier.notify("Storage error", &message).await {
                    warn!("Failed to show storage warning: {}", e);
                }
            }
            Err(e) => error!("Save task for {} panicked: {}", category, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::error::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, title: &str, message: &str) -> Result<()> {
            self.shown.lock().push((title.to_string(), message.to_string()));
            Ok(())
        }
    }

    /// Records every saved value and sleeps on the first save.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryStore,
        history: Mutex<Vec<String>>,
    }

    impl KeyValueStore for SlowStore {
        fn save(&self, category: Category, value: &str) -> Result<()> {
            let first = {
                let mut history = self.history.lock();
                history.push(value.to_string());
                history.len() == 1
            };
            if first {
                std::thread::sleep(Duration::from_millis(50));
            }
            self.inner.save(category, value)
        }

        fn load(&self, key: &str) -> Result<Option<String>> {
            self.inner.load(key)
        }
    }

    #[tokio::test]
    async fn test_rapid_writes_end_with_latest_value() {
        let store = Arc::new(SlowStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let writer = PersistWriter::spawn(store.clone(), notifier);

        writer.submit(Category::Blocked, "a.com".into());
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.submit(Category::Blocked, "a.com b.com".into());
        writer.submit(Category::Blocked, "a.com b.com c.com".into());
        writer.shutdown().await;

        assert_eq!(store.inner.get("blocked").as_deref(), Some("a.com b.com c.com"));
        let history = store.history.lock();
        assert_eq!(history.last().map(String::as_str), Some("a.com b.com c.com"));
        assert!(!history.contains(&"a.com b.com".to_string()));
    }

    #[tokio::test]
    async fn test_categories_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let writer = PersistWriter::spawn(store.clone(), Arc::new(RecordingNotifier::default()));

        writer.submit(Category::Blocked, "a.com".into());
        writer.submit(Category::DailyBlockTimes, "b.com 9-17".into());
        writer.shutdown().await;

        assert_eq!(store.get("blocked").as_deref(), Some("a.com"));
        assert_eq!(store.get("dailyBlockTimes").as_deref(), Some("b.com 9-17"));
    }

    #[tokio::test]
    async fn test_failed_save_shows_warning() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_saves(true);
        let notifier = Arc::new(RecordingNotifier::default());
        let writer = PersistWriter::spawn(store.clone(), notifier.clone());

        writer.submit(Category::DailyBlockTimes, "b.com 9-17".into());
        writer.shutdown().await;

        assert_eq!(store.get("dailyBlockTimes"), None);
        let shown = notifier.shown.lock();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, "Storage error");
        assert!(shown[0].1.contains("dailyBlockTimes"));
    }
}
