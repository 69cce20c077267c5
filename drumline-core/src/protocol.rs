//! Messages exchanged between the authority, the panel and page agents.
//!
//! Every message is an envelope `{destination, category, ...payload}`. The
//! destination names are the ones the browser side already uses:
//! `background` (authority), `popup` (panel) and `content` (page agent).

use crate::error::{DrumlineError, Result};
use crate::types::Rule;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "destination")]
pub enum Envelope {
    #[serde(rename = "background")]
    Authority(AuthorityRequest),
    #[serde(rename = "popup")]
    Panel(PanelMessage),
    #[serde(rename = "content")]
    PageAgent(PageDirective),
}

impl Envelope {
    /// Parse an envelope. Unknown destinations and categories are protocol errors.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(invalid_message)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(invalid_message)
    }

    /// A page-block directive with a fresh id
    pub fn block_current_domain() -> Self {
        Envelope::PageAgent(PageDirective::BlockCurrentDomain {
            id: DirectiveId::new(),
        })
    }

    pub fn destination(&self) -> Destination {
        match self {
            Envelope::Authority(_) => Destination::Authority,
            Envelope::Panel(_) => Destination::Panel,
            Envelope::PageAgent(_) => Destination::PageAgent,
        }
    }
}

fn invalid_message(e: serde_json::Error) -> DrumlineError {
    DrumlineError::Protocol(format!("invalid message: {}", e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Authority,
    Panel,
    PageAgent,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Authority => write!(f, "background"),
            Destination::Panel => write!(f, "popup"),
            Destination::PageAgent => write!(f, "content"),
        }
    }
}

/// Panel → authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum AuthorityRequest {
    /// The only request with a response ([`QueryResponse`])
    IsHostnameBlocked,
    BlockCurrentHostnameIndefinitely,
    BlockCurrentHostnameAtDailyTimes { times: String },
    UnblockCurrentHostname,
    DeleteCurrentHostnameDailyBlockRule,
}

/// Authority → panel pushes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum PanelMessage {
    HostnameIsBlocked {
        #[serde(
            rename = "dailyBlockTimes",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        daily_block_times: Option<String>,
    },
    HostnameIsNotBlocked,
}

/// Authority or panel → page agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum PageDirective {
    BlockCurrentDomain { id: DirectiveId },
}

impl PageDirective {
    pub fn id(&self) -> &DirectiveId {
        match self {
            PageDirective::BlockCurrentDomain { id } => id,
        }
    }
}

/// Per-send identifier of a page directive.
///
/// Freshly generated for every send; the host may still redeliver the same
/// message, which is what page agents guard against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectiveId(pub Uuid);

impl DirectiveId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DirectiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DirectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    Yes,
    No,
}

impl From<bool> for Answer {
    fn from(blocked: bool) -> Self {
        if blocked {
            Answer::Yes
        } else {
            Answer::No
        }
    }
}

/// Response to [`AuthorityRequest::IsHostnameBlocked`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: Answer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
}
