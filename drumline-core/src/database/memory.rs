use super::KeyValueStore;
use crate::error::{DrumlineError, Result};
use crate::types::Category;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-local store. Saves can be made to fail to exercise storage errors.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.values.lock().insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    fn save(&self, category: Category, value: &str) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DrumlineError::Storage(format!(
                "quota exceeded while saving {}",
                category
            )));
        }
        self.values
            .lock()
            .insert(category.key().to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }
}
