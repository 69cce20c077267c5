use crate::types::Window;
use chrono::{NaiveTime, Timelike};

/// Evaluates daily block windows against a wall-clock time
pub struct WindowEvaluator {}

impl WindowEvaluator {
    pub fn new() -> Self {
        Self {}
    }

    /// Whether `now` falls inside any of the windows (OR logic)
    pub fn is_blocked(&self, windows: &[Window], now: NaiveTime) -> bool {
        windows.iter().any(|w| self.matches(w, now))
    }

    /// Match a single window.
    ///
    /// The four conditions are applied literally. When `end_hour < start_hour`
    /// nothing wraps past midnight: `22-6` only matches during hour 22, through
    /// the start-hour condition.
    pub fn matches(&self, window: &Window, now: NaiveTime) -> bool {
        let hour = now.hour();
        let minute = now.minute();
        let (start_hour, start_minute) = (u32::from(window.start_hour), u32::from(window.start_minute));
        let (end_hour, end_minute) = (u32::from(window.end_hour), u32::from(window.end_minute));

        (start_hour < hour && hour < end_hour)
            || (start_hour == end_hour
                && end_hour == hour
                && start_minute <= minute
                && minute < end_minute)
            || (hour == start_hour && minute >= start_minute)
            || (hour == end_hour && minute < end_minute)
    }
}

impl Default for WindowEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn blocked(windows: &[Window], hour: u32, minute: u32) -> bool {
        WindowEvaluator::new().is_blocked(windows, at(hour, minute))
    }

    #[test]
    fn test_business_hours() {
        let windows = [Window::hours(9, 17)];

        assert!(blocked(&windows, 9, 0));
        assert!(blocked(&windows, 12, 30));
        assert!(blocked(&windows, 16, 59));
        assert!(!blocked(&windows, 17, 0));
        assert!(!blocked(&windows, 8, 59));
    }

    #[test]
    fn test_minute_boundaries() {
        let windows = [Window::new(8, 30, 9, 15)];

        assert!(!blocked(&windows, 8, 29));
        assert!(blocked(&windows, 8, 30));
        assert!(blocked(&windows, 9, 14));
        assert!(!blocked(&windows, 9, 15));
    }

    #[test]
    fn test_same_hour_window() {
        let windows = [Window::new(13, 10, 13, 40)];

        assert!(blocked(&windows, 13, 10));
        assert!(blocked(&windows, 13, 39));
        // Start-hour and end-hour conditions each cover part of the hour outside
        // the minute range, so together they match all of hour 13.
        assert!(blocked(&windows, 13, 0));
        assert!(blocked(&windows, 13, 59));
        assert!(!blocked(&windows, 12, 59));
        assert!(!blocked(&windows, 14, 0));
    }

    #[test]
    fn test_end_of_day_window() {
        let windows = [Window::hours(22, 24)];

        assert!(blocked(&windows, 22, 0));
        assert!(blocked(&windows, 23, 59));
        assert!(!blocked(&windows, 0, 0));
        assert!(!blocked(&windows, 21, 59));
    }

    #[test]
    fn test_end_hour_before_start_hour_is_not_wrapped() {
        let windows = [Window::hours(22, 6)];

        assert!(blocked(&windows, 22, 0));
        assert!(blocked(&windows, 22, 59));
        assert!(!blocked(&windows, 23, 0));
        assert!(!blocked(&windows, 0, 0));
        assert!(!blocked(&windows, 5, 59));
        assert!(!blocked(&windows, 6, 0));
        assert!(!blocked(&windows, 21, 59));
    }

    #[test]
    fn test_any_window_matches() {
        let windows = [Window::new(0, 0, 8, 30), Window::hours(22, 24)];

        assert!(blocked(&windows, 7, 0));
        assert!(blocked(&windows, 23, 0));
        assert!(!blocked(&windows, 12, 0));
    }

    #[test]
    fn test_no_windows() {
        assert!(!blocked(&[], 12, 0));
    }
}
