//! The authority: sole owner and mutator of the rule store.

use crate::codec;
use crate::database::KeyValueStore;
use crate::dispatch::Effect;
use crate::error::{DrumlineError, Result};
use crate::protocol::{AuthorityRequest, Envelope, PanelMessage, QueryResponse};
use crate::rule_engine::RuleStore;
use crate::types::{Category, Hostname};
use chrono::NaiveTime;
use tracing::{debug, info};

/// What a handler decided: an optional reply for the caller and the side
/// effects to run.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub response: Option<QueryResponse>,
    pub effects: Vec<Effect>,
}

impl Outcome {
    fn respond(response: QueryResponse) -> Self {
        Self {
            response: Some(response),
            effects: Vec::new(),
        }
    }
}

pub struct AuthorityService {
    rules: RuleStore,
    active: Option<Hostname>,
}

impl AuthorityService {
    pub fn new(rules: RuleStore) -> Self {
        Self {
            rules,
            active: None,
        }
    }

    /// Rebuild the rule store from durable storage. Called once at start-up.
    ///
    /// Never fails: a category that cannot be restored starts empty and its
    /// storage error is handed back for reporting.
    pub fn load(store: &dyn KeyValueStore) -> (Self, Vec<DrumlineError>) {
        let (rules, errors) = RuleStore::load_each(store);
        info!("Loaded {} block rules", rules.len());
        (Self::new(rules), errors)
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn active_hostname(&self) -> Option<&Hostname> {
        self.active.as_ref()
    }

    /// The active document changed. `None` when it has no hostname.
    ///
    /// A blocked hostname gets exactly one page-block directive, followed by a
    /// push telling the panel the new state.
    pub fn on_navigation(&mut self, hostname: Option<Hostname>, now: NaiveTime) -> Vec<Effect> {
        self.active = hostname;
        let Some(hostname) = &self.active else {
            debug!("Active document has no hostname");
            return Vec::new();
        };

        let mut effects = Vec::new();
        let push = if self.rules.is_blocked_now(hostname, now) {
            info!("Blocking {}", hostname);
            effects.push(Effect::Deliver(Envelope::block_current_domain()));
            let daily_block_times = self
                .rules
                .get(hostname)
                .map(|rule| rule.windows())
                .filter(|windows| !windows.is_empty())
                .map(codec::format_window_spec);
            PanelMessage::HostnameIsBlocked { daily_block_times }
        } else {
            PanelMessage::HostnameIsNotBlocked
        };
        effects.push(Effect::Deliver(Envelope::Panel(push)));
        effects
    }

    /// Handle a message from the bus. Messages for other destinations are ignored.
    pub fn handle(&mut self, envelope: Envelope, now: NaiveTime) -> Result<Outcome> {
        let request = match envelope {
            Envelope::Authority(request) => request,
            other => {
                debug!("Ignoring message for {}", other.destination());
                return Ok(Outcome::default());
            }
        };

        let hostname = self
            .active
            .clone()
            .ok_or_else(|| DrumlineError::Protocol("Current hostname is undefined".into()))?;

        match request {
            AuthorityRequest::IsHostnameBlocked => Ok(Outcome::respond(self.query(&hostname, now))),
            AuthorityRequest::BlockCurrentHostnameIndefinitely => {
                self.rules.set_indefinite_block(hostname.clone());
                info!("Blocked {} indefinitely", hostname);
                Ok(self.after_mutation(&hostname, Category::Blocked, now))
            }
            AuthorityRequest::BlockCurrentHostnameAtDailyTimes { times } => {
                let windows = codec::parse_window_spec(&times)?;
                self.rules.set_windows(hostname.clone(), windows);
                info!("Blocked {} daily at {}", hostname, times);
                Ok(self.after_mutation(&hostname, Category::DailyBlockTimes, now))
            }
            AuthorityRequest::UnblockCurrentHostname => {
                self.rules.clear_indefinite_block(&hostname)?;
                info!("Removed indefinite block of {}", hostname);
                Ok(self.after_mutation(&hostname, Category::Blocked, now))
            }
            AuthorityRequest::DeleteCurrentHostnameDailyBlockRule => {
                self.rules.clear_windows(&hostname)?;
                info!("Removed daily block of {}", hostname);
                Ok(self.after_mutation(&hostname, Category::DailyBlockTimes, now))
            }
        }
    }

    /// Current block state of a hostname
    pub fn query(&self, hostname: &Hostname, now: NaiveTime) -> QueryResponse {
        QueryResponse {
            answer: self.rules.is_blocked_now(hostname, now).into(),
            rule: self.rules.get(hostname).cloned(),
        }
    }

    fn after_mutation(&self, hostname: &Hostname, category: Category, now: NaiveTime) -> Outcome {
        let mut effects = Vec::new();
        if self.rules.is_blocked_now(hostname, now) {
            effects.push(Effect::Deliver(Envelope::block_current_domain()));
        }
        effects.push(Effect::Persist {
            category,
            value: self.rules.encode(category),
        });
        Outcome {
            response: None,
            effects,
        }
    }
}
