use crate::codec;
use crate::error::{DrumlineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Host component of a URL, lower-cased. Rule keys are exact matches on this.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hostname(String);

impl Hostname {
    /// Accepts a bare hostname ("Example.com", "example.com:8080/path") or a
    /// full URL and keeps only the host.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DrumlineError::Validation("hostname must not be empty".into()));
        }

        let url = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse(&format!("http://{}", input))
        }
        .map_err(|e| DrumlineError::Validation(format!("invalid hostname {:?}: {}", input, e)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DrumlineError::Validation(format!("{:?} has no hostname", input)))?
            .to_lowercase();

        // Space and `$` are the separators of the persisted layout.
        if host.chars().any(|c| c.is_whitespace() || c == '$') {
            return Err(DrumlineError::Validation(format!(
                "hostname {:?} contains a reserved character",
                host
            )));
        }

        Ok(Self(host))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Hostname {
    type Err = DrumlineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Hostname {
    type Error = DrumlineError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Hostname> for String {
    fn from(value: Hostname) -> Self {
        value.0
    }
}

/// A recurring daily block interval, e.g. `9-17:30`.
///
/// Hours are in `0..=24`, minutes in `0..=59`. An omitted minute is stored as 0,
/// so `9` and `9:00` are the same window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Window {
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
}

impl Window {
    pub fn new(start_hour: u8, start_minute: u8, end_hour: u8, end_minute: u8) -> Self {
        Self {
            start_hour,
            start_minute,
            end_hour,
            end_minute,
        }
    }

    /// Whole-hour window, `start-end`.
    pub fn hours(start_hour: u8, end_hour: u8) -> Self {
        Self::new(start_hour, 0, end_hour, 0)
    }
}

fn write_time(f: &mut fmt::Formatter<'_>, hour: u8, minute: u8) -> fmt::Result {
    if minute == 0 {
        write!(f, "{}", hour)
    } else {
        write!(f, "{}:{:02}", hour, minute)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_time(f, self.start_hour, self.start_minute)?;
        f.write_str("-")?;
        write_time(f, self.end_hour, self.end_minute)
    }
}

impl FromStr for Window {
    type Err = DrumlineError;

    fn from_str(s: &str) -> Result<Self> {
        codec::parse_range(s, 0)
    }
}

impl TryFrom<String> for Window {
    type Error = DrumlineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Window> for String {
    fn from(value: Window) -> Self {
        value.to_string()
    }
}

/// Daily allowance, written as `H:MM` (e.g. `0:15` for fifteen minutes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeLimit {
    minutes: u32,
}

impl TimeLimit {
    pub fn from_minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }
}

impl fmt::Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

impl FromStr for TimeLimit {
    type Err = DrumlineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DrumlineError::Validation(format!("invalid daily time limit {:?}", s));
        let (hours, minutes) = s.split_once(':').ok_or_else(invalid)?;
        let hours: u32 = hours.parse().map_err(|_| invalid())?;
        let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
        if minutes > 59 {
            return Err(invalid());
        }
        let total = hours
            .checked_mul(60)
            .and_then(|m| m.checked_add(minutes))
            .ok_or_else(invalid)?;
        Ok(Self::from_minutes(total))
    }
}

impl TryFrom<String> for TimeLimit {
    type Error = DrumlineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeLimit> for String {
    fn from(value: TimeLimit) -> Self {
        value.to_string()
    }
}

/// Block rule for a single hostname.
///
/// A rule with every field empty is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Blocked all day, every day.
    #[serde(rename = "blocked", default, skip_serializing_if = "Option::is_none")]
    pub indefinite_block: Option<bool>,

    #[serde(rename = "dailyBlockTimes", default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<Vec<Window>>,

    // Not evaluated yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_time_limit: Option<TimeLimit>,
}

impl Rule {
    pub fn is_empty(&self) -> bool {
        self.indefinite_block.is_none()
            && self.windows.is_none()
            && self.tracked.is_none()
            && self.daily_time_limit.is_none()
    }

    pub fn is_indefinitely_blocked(&self) -> bool {
        self.indefinite_block == Some(true)
    }

    pub fn windows(&self) -> &[Window] {
        self.windows.as_deref().unwrap_or_default()
    }
}

/// The two independently persisted slices of the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Blocked,
    DailyBlockTimes,
}

impl Category {
    pub fn all() -> [Category; 2] {
        [Category::Blocked, Category::DailyBlockTimes]
    }

    /// Storage key of the category.
    pub fn key(self) -> &'static str {
        match self {
            Category::Blocked => "blocked",
            Category::DailyBlockTimes => "dailyBlockTimes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
