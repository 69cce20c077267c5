//! View model of the control panel.
//!
//! Holds what the panel shows and turns clicks into envelopes for the
//! authority. Rendering belongs to the host.

use crate::codec;
use crate::error::{DrumlineError, Result};
use crate::protocol::{Answer, AuthorityRequest, Envelope, PanelMessage, QueryResponse};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonMode {
    Block,
    Unblock,
    RemoveDailyBlock,
}

impl ButtonMode {
    pub fn label(self) -> &'static str {
        match self {
            ButtonMode::Block => "Block",
            ButtonMode::Unblock => "Unblock",
            ButtonMode::RemoveDailyBlock => "Remove daily block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockMode {
    #[default]
    Indefinite,
    DailyTimes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    button: ButtonMode,
    mode: BlockMode,
    daily_times: String,
    reload_hint_visible: bool,
}

impl Default for Panel {
    fn default() -> Self {
        Self {
            button: ButtonMode::Block,
            mode: BlockMode::default(),
            daily_times: String::new(),
            reload_hint_visible: false,
        }
    }
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn button(&self) -> ButtonMode {
        self.button
    }

    pub fn mode(&self) -> BlockMode {
        self.mode
    }

    pub fn daily_times(&self) -> &str {
        &self.daily_times
    }

    pub fn reload_hint_visible(&self) -> bool {
        self.reload_hint_visible
    }

    /// Sent once when the panel opens
    pub fn initial_query(&self) -> Envelope {
        Envelope::Authority(AuthorityRequest::IsHostnameBlocked)
    }

    pub fn apply_query_response(&mut self, response: Option<QueryResponse>) -> Result<()> {
        let response = response.ok_or_else(|| {
            DrumlineError::Protocol("No response to isHostnameBlocked".into())
        })?;

        let windows = response
            .rule
            .as_ref()
            .map(|rule| rule.windows())
            .unwrap_or_default();
        if !windows.is_empty() {
            self.daily_times = codec::format_window_spec(windows);
            self.mode = BlockMode::DailyTimes;
        }

        self.button = match response.answer {
            Answer::Yes if !windows.is_empty() => ButtonMode::RemoveDailyBlock,
            Answer::Yes => ButtonMode::Unblock,
            Answer::No => ButtonMode::Block,
        };
        Ok(())
    }

    pub fn on_push(&mut self, message: PanelMessage) {
        match message {
            PanelMessage::HostnameIsBlocked { daily_block_times } => {
                if let Some(times) = daily_block_times {
                    self.daily_times = times;
                }
                self.button = ButtonMode::Unblock;
            }
            PanelMessage::HostnameIsNotBlocked => self.button = ButtonMode::Block,
        }
    }

    pub fn select_mode(&mut self, mode: BlockMode) {
        self.mode = mode;
    }

    pub fn set_daily_times(&mut self, times: impl Into<String>) {
        self.daily_times = times.into();
    }

    /// The request to send for a click on the main button, switching the
    /// button to its next mode.
    ///
    /// Daily times are checked here first; an invalid entry changes nothing.
    pub fn click_block_button(&mut self) -> Result<Envelope> {
        let (request, next) = match self.button {
            ButtonMode::Block => match self.mode {
                BlockMode::Indefinite => (
                    AuthorityRequest::BlockCurrentHostnameIndefinitely,
                    ButtonMode::Unblock,
                ),
                BlockMode::DailyTimes => {
                    codec::parse_window_spec(&self.daily_times)?;
                    let times = self.daily_times.replace(' ', "");
                    (
                        AuthorityRequest::BlockCurrentHostnameAtDailyTimes { times },
                        ButtonMode::RemoveDailyBlock,
                    )
                }
            },
            ButtonMode::Unblock => (AuthorityRequest::UnblockCurrentHostname, ButtonMode::Block),
            ButtonMode::RemoveDailyBlock => (
                AuthorityRequest::DeleteCurrentHostnameDailyBlockRule,
                ButtonMode::Block,
            ),
        };

        // The reload hint only follows an unblock.
        match self.button {
            ButtonMode::Block => self.reload_hint_visible = false,
            ButtonMode::Unblock => self.reload_hint_visible = true,
            ButtonMode::RemoveDailyBlock => {}
        }
        self.button = next;

        debug!("Panel sends {:?}", request);
        Ok(Envelope::Authority(request))
    }

    pub fn click_reload(&mut self) {
        self.reload_hint_visible = false;
    }
}
