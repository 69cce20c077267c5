mod evaluator;

use crate::codec;
use crate::database::KeyValueStore;
use crate::error::{DrumlineError, Result};
use crate::types::{Category, Hostname, Rule, Window};
use chrono::NaiveTime;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use evaluator::WindowEvaluator;

/// In-memory block rules keyed by hostname.
///
/// Holds no I/O; whoever mutates it is responsible for persisting the touched
/// category afterwards.
#[derive(Default)]
pub struct RuleStore {
    rules: BTreeMap<Hostname, Rule>,
    evaluator: WindowEvaluator,
}

impl RuleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from the two decoded persisted categories
    pub fn from_persisted(
        blocked: Vec<Hostname>,
        daily: Vec<(Hostname, Vec<Window>)>,
    ) -> Self {
        let mut store = Self::new();
        for hostname in blocked {
            store.set_indefinite_block(hostname);
        }
        for (hostname, windows) in daily {
            store.set_windows(hostname, windows);
        }
        store
    }

    /// Load both categories from durable storage, failing on the first bad one.
    ///
    /// A missing key means no rules of that category.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let (rules, errors) = Self::load_each(store);
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(rules),
        }
    }

    /// Load each category on its own. A category that cannot be read or
    /// decoded starts empty and its storage error is returned with the store.
    pub fn load_each(store: &dyn KeyValueStore) -> (Self, Vec<DrumlineError>) {
        let mut errors = Vec::new();
        let blocked = read_category(store, Category::Blocked, codec::decode_blocked, &mut errors);
        let daily = read_category(
            store,
            Category::DailyBlockTimes,
            codec::decode_daily_block_times,
            &mut errors,
        );
        (Self::from_persisted(blocked, daily), errors)
    }

    /// Encode one category for storage
    pub fn encode(&self, category: Category) -> String {
        match category {
            Category::Blocked => codec::encode_blocked(self),
            Category::DailyBlockTimes => codec::encode_daily_block_times(self),
        }
    }

    /// Synchronously write one category to storage
    pub fn checkpoint(&self, store: &dyn KeyValueStore, category: Category) -> Result<()> {
        store.save(category, &self.encode(category))
    }

    pub fn get(&self, hostname: &Hostname) -> Option<&Rule> {
        self.rules.get(hostname)
    }

    /// Rules in hostname order
    pub fn iter(&self) -> impl Iterator<Item = (&Hostname, &Rule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Block a hostname at all times, creating its rule if needed
    pub fn set_indefinite_block(&mut self, hostname: Hostname) {
        debug!("Indefinite block set for {}", hostname);
        self.rules.entry(hostname).or_default().indefinite_block = Some(true);
    }

    /// Replace a hostname's daily windows, creating its rule if needed.
    ///
    /// An empty list clears the field instead of storing an empty schedule.
    pub fn set_windows(&mut self, hostname: Hostname, windows: Vec<Window>) {
        if windows.is_empty() {
            if let Some(rule) = self.rules.get_mut(&hostname) {
                rule.windows = None;
                if rule.is_empty() {
                    self.rules.remove(&hostname);
                }
            }
            return;
        }
        debug!("Daily windows set for {}", hostname);
        self.rules.entry(hostname).or_default().windows = Some(windows);
    }

    /// Remove the indefinite block, deleting the rule if nothing else is set
    pub fn clear_indefinite_block(&mut self, hostname: &Hostname) -> Result<()> {
        self.clear_field(hostname, |rule| rule.indefinite_block = None)
    }

    /// Remove the daily windows, deleting the rule if nothing else is set
    pub fn clear_windows(&mut self, hostname: &Hostname) -> Result<()> {
        self.clear_field(hostname, |rule| rule.windows = None)
    }

    fn clear_field(&mut self, hostname: &Hostname, clear: impl FnOnce(&mut Rule)) -> Result<()> {
        let rule = self
            .rules
            .get_mut(hostname)
            .ok_or_else(|| DrumlineError::Precondition(hostname.to_string()))?;

        clear(rule);
        if rule.is_empty() {
            self.rules.remove(hostname);
            debug!("Rule for {} removed", hostname);
        }
        Ok(())
    }

    /// Whether the hostname is blocked at `now`
    pub fn is_blocked_now(&self, hostname: &Hostname, now: NaiveTime) -> bool {
        match self.rules.get(hostname) {
            Some(rule) if rule.is_indefinitely_blocked() => true,
            Some(rule) => self.evaluator.is_blocked(rule.windows(), now),
            None => false,
        }
    }
}

/// Read and decode one category; on failure record the error and yield nothing.
fn read_category<T>(
    store: &dyn KeyValueStore,
    category: Category,
    decode: fn(&str) -> Result<Vec<T>>,
    errors: &mut Vec<DrumlineError>,
) -> Vec<T> {
    let loaded = store
        .load(category.key())
        .map_err(|e| DrumlineError::Storage(format!("could not read {}: {}", category, e)))
        .and_then(|value| match value {
            Some(value) => decode(&value),
            None => Ok(Vec::new()),
        });

    loaded.unwrap_or_else(|e| {
        warn!("Starting without {} rules: {}", category, e);
        errors.push(e);
        Vec::new()
    })
}

impl PartialEq for RuleStore {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.rules.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn host(s: &str) -> Hostname {
        Hostname::parse(s).unwrap()
    }

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_missing_rule_is_not_blocked() {
        let rules = RuleStore::new();
        assert!(rules.get(&host("example.com")).is_none());
        assert!(!rules.is_blocked_now(&host("example.com"), at(12, 0)));
    }

    #[test]
    fn test_indefinite_block_wins_over_windows() {
        let mut rules = RuleStore::new();
        rules.set_windows(host("example.com"), vec![Window::hours(9, 10)]);
        rules.set_indefinite_block(host("example.com"));

        for hour in 0..24 {
            assert!(rules.is_blocked_now(&host("example.com"), at(hour, 30)));
        }
    }

    #[test]
    fn test_block_indefinitely_is_idempotent() {
        let mut once = RuleStore::new();
        once.set_indefinite_block(host("example.com"));

        let mut twice = RuleStore::new();
        twice.set_indefinite_block(host("example.com"));
        twice.set_indefinite_block(host("example.com"));

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_clearing_last_field_removes_rule() {
        let mut rules = RuleStore::new();
        rules.set_indefinite_block(host("example.com"));
        rules.set_windows(host("example.com"), vec![Window::hours(9, 17)]);

        rules.clear_indefinite_block(&host("example.com")).unwrap();
        let rule = rules.get(&host("example.com")).unwrap();
        assert_eq!(rule.indefinite_block, None);
        assert_eq!(rule.windows(), &[Window::hours(9, 17)]);

        rules.clear_windows(&host("example.com")).unwrap();
        assert!(rules.get(&host("example.com")).is_none());
        assert!(rules.is_empty());
    }

    #[test]
    fn test_clear_without_rule_is_precondition_error() {
        let mut rules = RuleStore::new();
        assert!(matches!(
            rules.clear_indefinite_block(&host("example.com")),
            Err(DrumlineError::Precondition(_))
        ));
        assert!(matches!(
            rules.clear_windows(&host("example.com")),
            Err(DrumlineError::Precondition(_))
        ));
    }

    #[test]
    fn test_empty_window_list_clears_field() {
        let mut rules = RuleStore::new();
        rules.set_windows(host("example.com"), vec![Window::hours(9, 17)]);
        rules.set_windows(host("example.com"), Vec::new());
        assert!(rules.is_empty());

        rules.set_windows(host("other.com"), Vec::new());
        assert!(rules.is_empty());

        rules.set_indefinite_block(host("example.com"));
        rules.set_windows(host("example.com"), vec![Window::hours(9, 17)]);
        rules.set_windows(host("example.com"), Vec::new());
        let rule = rules.get(&host("example.com")).unwrap();
        assert!(rule.is_indefinitely_blocked());
        assert!(rule.windows().is_empty());
    }

    #[test]
    fn test_bad_category_does_not_hide_the_other() {
        let store = MemoryStore::new()
            .with_value("blocked", "example.com")
            .with_value("dailyBlockTimes", "news.example.org 9-17,");

        let (rules, errors) = RuleStore::load_each(&store);
        assert!(rules.get(&host("example.com")).unwrap().is_indefinitely_blocked());
        assert!(rules.get(&host("news.example.org")).is_none());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], DrumlineError::Storage(_)));

        assert!(matches!(RuleStore::load(&store), Err(DrumlineError::Storage(_))));
    }

    #[test]
    fn test_load_and_checkpoint() {
        let store = MemoryStore::new();
        assert!(RuleStore::load(&store).unwrap().is_empty());

        let mut rules = RuleStore::new();
        rules.set_indefinite_block(host("example.com"));
        rules.set_windows(host("news.example.org"), vec![Window::hours(9, 17)]);
        rules.checkpoint(&store, Category::Blocked).unwrap();
        rules.checkpoint(&store, Category::DailyBlockTimes).unwrap();

        assert_eq!(store.get("blocked").as_deref(), Some("example.com"));
        assert_eq!(RuleStore::load(&store).unwrap(), rules);
    }
}
