//! Optional rule conditions: a local time window and a platform allow-list.
//!
//! Conditions fail open. A malformed time window or timezone never blocks a
//! rule from firing; it is logged and treated as satisfied.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Conditions gating a rule. Evaluated time window first, then platforms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default)]
    pub time_window: Option<TimeWindow>,

    /// Platforms the rule may fire on. Empty means every platform.
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl RuleConditions {
    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true when the rule may fire at `now` on `platform`.
    ///
    /// The platform check is skipped when the caller supplied no platform.
    pub fn allows(&self, now: DateTime<Utc>, platform: Option<&str>) -> bool {
        if let Some(window) = &self.time_window {
            match window.contains(now) {
                Some(false) => return false,
                Some(true) => {}
                None => {
                    tracing::debug!(
                        start = %window.start,
                        end = %window.end,
                        timezone = ?window.timezone,
                        "Malformed time window, treating as open"
                    );
                }
            }
        }

        match platform {
            Some(platform) if !self.platforms.is_empty() => self
                .platforms
                .iter()
                .any(|p| p.trim().eq_ignore_ascii_case(platform.trim())),
            _ => true,
        }
    }
}

/// Daily window in local time, `HH:MM` bounds, end exclusive.
///
/// A window whose start is after its end wraps midnight; equal bounds cover
/// the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,

    /// An IANA zone name such as `Europe/Berlin`, `UTC`, or a fixed offset
    /// such as `+03:00` / `UTC+3`. Missing means UTC.
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Where a window's local clock comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl WindowZone {
    fn local_time(self, now: DateTime<Utc>) -> NaiveTime {
        match self {
            WindowZone::Named(tz) => now.with_timezone(&tz).time(),
            WindowZone::Fixed(offset) => now.with_timezone(&offset).time(),
        }
    }
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            timezone: None,
        }
    }

    pub fn in_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// `Some(inside)` for a well-formed window, `None` when malformed.
    pub fn contains(&self, now: DateTime<Utc>) -> Option<bool> {
        let start = parse_clock(&self.start)?;
        let end = parse_clock(&self.end)?;
        let local = parse_timezone(self.timezone.as_deref())?.local_time(now);

        let inside = if start == end {
            true
        } else if start < end {
            local >= start && local < end
        } else {
            local >= start || local < end
        };
        Some(inside)
    }
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Resolves a timezone label. IANA names follow daylight saving.
pub fn parse_timezone(label: Option<&str>) -> Option<WindowZone> {
    let label = match label.map(str::trim) {
        None | Some("") => return FixedOffset::east_opt(0).map(WindowZone::Fixed),
        Some(label) => label,
    };

    if let Ok(tz) = label.parse::<Tz>() {
        return Some(WindowZone::Named(tz));
    }

    let upper = label.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    if rest.is_empty() || rest == "Z" {
        return FixedOffset::east_opt(0).map(WindowZone::Fixed);
    }

    parse_offset(rest).map(WindowZone::Fixed)
}

fn parse_offset(value: &str) -> Option<FixedOffset> {
    let (sign, digits) = match value.chars().next()? {
        '+' => (1, &value[1..]),
        '-' => (-1, &value[1..]),
        _ => return None,
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if digits.len() == 4 && digits.is_ascii() => (digits[..2].parse().ok()?, digits[2..].parse().ok()?),
        None => (digits.parse().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
