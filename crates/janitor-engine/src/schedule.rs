//! Working-hours window
//!
//! Work only happens on allowed weekdays strictly between the start and end
//! times, evaluated in the configured UTC offset.

use crate::error::ConfigError;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use janitor_common::defaults::default_true;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Day-of-week and time-of-day window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// When false, every moment is a working moment
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_allowed_days")]
    pub allowed_days_of_week: Vec<Weekday>,
    #[serde(default = "default_start_time", with = "hh_mm")]
    pub start_time: NaiveTime,
    #[serde(default = "default_end_time", with = "hh_mm")]
    pub end_time: NaiveTime,
    /// `UTC` or a fixed offset such as `-08:00`
    #[serde(default = "default_zone")]
    pub zone: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_days_of_week: default_allowed_days(),
            start_time: default_start_time(),
            end_time: default_end_time(),
            zone: default_zone(),
        }
    }
}

fn default_allowed_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

fn default_end_time() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default()
}

fn default_zone() -> String {
    "UTC".to_string()
}

impl Schedule {
    /// An always-open schedule
    pub fn always() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_zone(&self.zone)?;
        if self.start_time > self.end_time {
            return Err(ConfigError::InvalidScheduleWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }

    pub fn time_to_work(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }

        let offset = match parse_zone(&self.zone) {
            Ok(offset) => offset,
            Err(e) => {
                warn!(zone = %self.zone, error = %e, "Unusable schedule zone, not working");
                return false;
            }
        };

        let local = now.with_timezone(&offset);
        let time = local.time();
        self.allowed_days_of_week.contains(&local.weekday())
            && time > self.start_time
            && time < self.end_time
    }
}

/// Parse `UTC`, `Z`, `+HH:MM`, `-HH:MM` or `UTC+HH:MM`
pub fn parse_zone(zone: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidZone(zone.to_string());
    let trimmed = zone.trim();
    let rest = trimmed
        .strip_prefix("UTC")
        .or_else(|| trimmed.strip_prefix("utc"))
        .unwrap_or(trimmed);

    if rest.is_empty() || rest == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, digits) = if let Some(digits) = rest.strip_prefix('+') {
        (1, digits)
    } else if let Some(digits) = rest.strip_prefix('-') {
        (-1, digits)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = digits.split_once(':').unwrap_or((digits, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTimeOfDay(s.to_string()))
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_time_of_day(&s).map_err(serde::de::Error::custom)
    }
}
