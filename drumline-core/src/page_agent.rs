//! Per-document enforcement.

use crate::codec;
use crate::database::KeyValueStore;
use crate::error::Result;
use crate::protocol::{DirectiveId, Envelope, PageDirective};
use crate::types::{Category, Hostname};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Text shown in place of a blocked page
pub const BLOCK_NOTICE: &str = "You blocked this domain with Drumline.";

/// Replaces the document's content. Provided by the host page.
#[async_trait]
pub trait DocumentBlocker: Send + Sync {
    async fn replace_document(&self, notice: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    Blocked,
    /// Same id as the previous directive; dropped without running
    Duplicate,
}

/// Runs page directives, dropping an immediate repeat of the last one.
///
/// Only the most recent id is remembered, so a duplicate that arrives after a
/// different directive runs again.
pub struct PageAgent<B> {
    blocker: B,
    last_id: Option<DirectiveId>,
}

impl<B: DocumentBlocker> PageAgent<B> {
    pub fn new(blocker: B) -> Self {
        Self {
            blocker,
            last_id: None,
        }
    }

    pub fn last_id(&self) -> Option<&DirectiveId> {
        self.last_id.as_ref()
    }

    pub async fn handle(&mut self, directive: PageDirective) -> Result<AgentOutcome> {
        if self.last_id.as_ref() == Some(directive.id()) {
            debug!("Ignoring duplicate request {}", directive.id());
            return Ok(AgentOutcome::Duplicate);
        }
        self.last_id = Some(directive.id().clone());

        match directive {
            PageDirective::BlockCurrentDomain { .. } => {
                self.block().await?;
                Ok(AgentOutcome::Blocked)
            }
        }
    }

    /// Handle a bus message; `None` when it is addressed to someone else.
    pub async fn handle_envelope(&mut self, envelope: Envelope) -> Result<Option<AgentOutcome>> {
        match envelope {
            Envelope::PageAgent(directive) => self.handle(directive).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Block on document load if the hostname is under an indefinite block.
    pub async fn check_on_load(
        &mut self,
        hostname: &Hostname,
        store: &dyn KeyValueStore,
    ) -> Result<bool> {
        let blocked = match store.load(Category::Blocked.key())? {
            Some(value) => codec::decode_blocked(&value)?,
            None => Vec::new(),
        };
        if !blocked.contains(hostname) {
            return Ok(false);
        }

        info!("{} is blocked", hostname);
        self.block().await?;
        Ok(true)
    }

    async fn block(&self) -> Result<()> {
        self.blocker.replace_document(BLOCK_NOTICE).await.map_err(|e| {
            warn!("Failed to block page: {}", e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::error::DrumlineError;
    use crate::protocol::PanelMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingBlocker {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentBlocker for CountingBlocker {
        async fn replace_document(&self, notice: &str) -> Result<()> {
            assert_eq!(notice, BLOCK_NOTICE);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenBlocker;

    #[async_trait]
    impl DocumentBlocker for BrokenBlocker {
        async fn replace_document(&self, _notice: &str) -> Result<()> {
            Err(DrumlineError::Protocol("document has no body".into()))
        }
    }

    fn directive(id: &DirectiveId) -> PageDirective {
        PageDirective::BlockCurrentDomain { id: id.clone() }
    }

    #[tokio::test]
    async fn test_immediate_repeat_runs_once() {
        let blocker = CountingBlocker::default();
        let mut agent = PageAgent::new(blocker.clone());
        let x = DirectiveId::new();

        assert_eq!(agent.handle(directive(&x)).await.unwrap(), AgentOutcome::Blocked);
        assert_eq!(agent.handle(directive(&x)).await.unwrap(), AgentOutcome::Duplicate);
        assert_eq!(blocker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeat_after_other_id_runs_again() {
        let blocker = CountingBlocker::default();
        let mut agent = PageAgent::new(blocker.clone());
        let x = DirectiveId::new();
        let y = DirectiveId::new();

        agent.handle(directive(&x)).await.unwrap();
        agent.handle(directive(&y)).await.unwrap();
        assert_eq!(agent.handle(directive(&x)).await.unwrap(), AgentOutcome::Blocked);

        assert_eq!(blocker.calls.load(Ordering::SeqCst), 3);
        assert_eq!(agent.last_id(), Some(&x));
    }

    #[tokio::test]
    async fn test_other_destinations_are_ignored() {
        let blocker = CountingBlocker::default();
        let mut agent = PageAgent::new(blocker.clone());

        let outcome = agent
            .handle_envelope(Envelope::Panel(PanelMessage::HostnameIsNotBlocked))
            .await
            .unwrap();
        assert_eq!(outcome, None);

        let outcome = agent
            .handle_envelope(Envelope::block_current_domain())
            .await
            .unwrap();
        assert_eq!(outcome, Some(AgentOutcome::Blocked));
    }

    #[tokio::test]
    async fn test_check_on_load() {
        let store = MemoryStore::new().with_value("blocked", "example.com news.example.org");
        let blocker = CountingBlocker::default();
        let mut agent = PageAgent::new(blocker.clone());

        let hit = agent
            .check_on_load(&Hostname::parse("news.example.org").unwrap(), &store)
            .await
            .unwrap();
        let miss = agent
            .check_on_load(&Hostname::parse("example.net").unwrap(), &store)
            .await
            .unwrap();

        assert!(hit);
        assert!(!miss);
        assert_eq!(blocker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocker_failure_is_reported() {
        let mut agent = PageAgent::new(BrokenBlocker);
        let result = agent.handle(directive(&DirectiveId::new())).await;
        assert!(result.is_err());
    }
}
