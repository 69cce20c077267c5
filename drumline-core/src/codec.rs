//! Text formats for block rules.
//!
//! Two persisted categories, each a single string value:
//!
//! - `blocked`: space-separated hostnames under an indefinite block,
//!   e.g. `example.com news.example.org`.
//! - `dailyBlockTimes`: `$`-joined `<hostname> <times>` entries, where `times`
//!   is a comma-joined list of `<start>-<end>` ranges and each side is `H` or
//!   `H:MM`, e.g. `example.com 9-17$news.example.org 0-8:30,22-24`.
//!
//! The layout carries no version marker and must stay byte-compatible with
//! data written by earlier releases.

use crate::error::{DrumlineError, Result};
use crate::rule_engine::RuleStore;
use crate::types::{Category, Hostname, Window};

const HOSTNAME_SEPARATOR: char = ' ';
const ENTRY_SEPARATOR: char = '$';
const RANGE_SEPARATOR: char = ',';

/// Encode the hostnames under an indefinite block.
pub fn encode_blocked(rules: &RuleStore) -> String {
    rules
        .iter()
        .filter(|(_, rule)| rule.is_indefinitely_blocked())
        .map(|(hostname, _)| hostname.as_str())
        .collect::<Vec<_>>()
        .join(&HOSTNAME_SEPARATOR.to_string())
}

/// Decode the `blocked` value. Any malformed hostname is a storage error.
pub fn decode_blocked(value: &str) -> Result<Vec<Hostname>> {
    value
        .split(HOSTNAME_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(Hostname::parse)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| corrupt(Category::Blocked, e))
}

/// Encode every hostname's daily windows.
pub fn encode_daily_block_times(rules: &RuleStore) -> String {
    rules
        .iter()
        .filter(|(_, rule)| !rule.windows().is_empty())
        .map(|(hostname, rule)| format!("{} {}", hostname, format_window_spec(rule.windows())))
        .collect::<Vec<_>>()
        .join(&ENTRY_SEPARATOR.to_string())
}

/// Decode the `dailyBlockTimes` value. Stored ranges are not checked for
/// ordering; any syntax or range problem is a storage error.
pub fn decode_daily_block_times(value: &str) -> Result<Vec<(Hostname, Vec<Window>)>> {
    value
        .split(ENTRY_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (hostname, times) = entry.split_once(HOSTNAME_SEPARATOR).ok_or_else(|| {
                DrumlineError::Storage(format!("malformed dailyBlockTimes entry {:?}", entry))
            })?;
            let windows = times
                .split(RANGE_SEPARATOR)
                .enumerate()
                .map(|(i, range)| parse_range(range, i))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| corrupt(Category::DailyBlockTimes, e))?;
            let hostname =
                Hostname::parse(hostname).map_err(|e| corrupt(Category::DailyBlockTimes, e))?;
            Ok((hostname, windows))
        })
        .collect()
}

fn corrupt(category: Category, err: DrumlineError) -> DrumlineError {
    match err {
        DrumlineError::Validation(message) => {
            DrumlineError::Storage(format!("stored {} value is malformed: {}", category, message))
        }
        other => other,
    }
}

/// Comma-joined window list, e.g. `0-14:30,22-24`.
pub fn format_window_spec(windows: &[Window]) -> String {
    windows
        .iter()
        .map(Window::to_string)
        .collect::<Vec<_>>()
        .join(&RANGE_SEPARATOR.to_string())
}

/// Parse daily block times typed by the user.
///
/// Spaces are ignored. Besides the syntax and range checks applied to stored
/// data, each range must start strictly before it ends.
pub fn parse_window_spec(spec: &str) -> Result<Vec<Window>> {
    let spec: String = spec.chars().filter(|c| *c != ' ').collect();

    spec.split(RANGE_SEPARATOR)
        .enumerate()
        .map(|(i, range)| {
            let window = parse_range(range, i)?;
            let starts_before_end = window.start_hour < window.end_hour
                || (window.start_hour == window.end_hour
                    && window.start_minute < window.end_minute);
            if !starts_before_end {
                return Err(DrumlineError::Validation(
                    "Each time range's start must be less than its end".into(),
                ));
            }
            Ok(window)
        })
        .collect()
}

/// Parse one `<start>-<end>` range. `index` is only used in error messages.
pub(crate) fn parse_range(range: &str, index: usize) -> Result<Window> {
    let (start, end) = match range.split('-').collect::<Vec<_>>().as_slice() {
        [start, end] => (*start, *end),
        _ => {
            return Err(DrumlineError::Validation(
                "Any time entered must be in ranges".into(),
            ))
        }
    };

    let (start_hour, start_minute) = parse_time(start, "Start", index)?;
    let (end_hour, end_minute) = parse_time(end, "End", index)?;
    Ok(Window::new(start_hour, start_minute, end_hour, end_minute))
}

fn parse_time(time: &str, name: &str, index: usize) -> Result<(u8, u8)> {
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() > 2 {
        return Err(DrumlineError::Validation(format!(
            "{} time in time range with index {} must have zero or one colon",
            name, index
        )));
    }

    let hour = parse_hand(parts[0], name, Hand::Hour, index)?;
    let minute = match parts.get(1) {
        Some(minute) => parse_hand(minute, name, Hand::Minute, index)?,
        None => 0,
    };
    Ok((hour, minute))
}

#[derive(Clone, Copy)]
enum Hand {
    Hour,
    Minute,
}

impl Hand {
    fn label(self) -> &'static str {
        match self {
            Hand::Hour => "hour",
            Hand::Minute => "minute",
        }
    }

    fn max(self) -> u32 {
        match self {
            Hand::Hour => 24,
            Hand::Minute => 59,
        }
    }
}

fn parse_hand(value: &str, name: &str, hand: Hand, index: usize) -> Result<u8> {
    let problem = if value.is_empty() {
        "not be empty".to_string()
    } else if !value.chars().all(|c| c.is_ascii_digit()) {
        "be an integer".to_string()
    } else {
        // All digits: only overflow can fail, and that is out of range anyway.
        match value.parse::<u32>() {
            Ok(n) if n <= hand.max() => return Ok(n as u8),
            _ => format!("not be greater than {}", hand.max()),
        }
    };

    Err(DrumlineError::Validation(format!(
        "{} time's {} in time range with index {} must {}",
        name,
        hand.label(),
        index,
        problem
    )))
}
