//! Minute-aligned scheduling.
//!
//! The first announcement after activation is immediate; the repeating ones
//! fire on the next wall-clock instant whose seconds field is zero and every
//! 60 seconds after that. Fires are driven by the monotonic tokio clock from a
//! single computed deadline, so timer latency does not accumulate.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub const ANNOUNCE_PERIOD: Duration = Duration::from_secs(60);

/// Local UTC offsets with a seconds component (pre-1970 LMT zones) can move
/// the seconds field by one correction step at most.
const MAX_CORRECTIONS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("unknown time zone: {0}")]
    UnknownZone(String),

    #[error("date arithmetic out of range")]
    OutOfRange,

    #[error("no zero-second instant found after {0}")]
    NoBoundary(String),
}

/// The smallest instant strictly after `now` whose local seconds field (in
/// `now`'s time zone) is zero.
pub fn next_minute_boundary<Tz2: TimeZone>(now: &DateTime<Tz2>) -> Result<DateTime<Tz2>, CalendarError> {
    let whole_second = now
        .clone()
        .checked_sub_signed(TimeDelta::nanoseconds(i64::from(now.nanosecond())))
        .ok_or(CalendarError::OutOfRange)?;

    let to_next = 60 - i64::from(whole_second.second());
    let mut candidate = whole_second
        .checked_add_signed(TimeDelta::seconds(to_next))
        .ok_or(CalendarError::OutOfRange)?;

    for _ in 0..MAX_CORRECTIONS {
        let second = i64::from(candidate.second());
        if second == 0 {
            return Ok(candidate);
        }

        // The offset changed under us; step to the zero second on whichever
        // side is still strictly after `now`.
        let back = candidate
            .clone()
            .checked_sub_signed(TimeDelta::seconds(second))
            .ok_or(CalendarError::OutOfRange)?;
        candidate = if back > *now {
            back
        } else {
            candidate
                .checked_add_signed(TimeDelta::seconds(60 - second))
                .ok_or(CalendarError::OutOfRange)?
        };
    }

    Err(CalendarError::NoBoundary(format!("{now:?}")))
}

/// How the short time of day is spoken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TimeFormat {
    #[default]
    #[serde(rename = "12h")]
    TwelveHour,
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl TimeFormat {
    fn pattern(self) -> &'static str {
        match self {
            Self::TwelveHour => "%-I:%M %p",
            Self::TwentyFourHour => "%H:%M",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Local,
    Named(Tz),
}

/// Time zone aware view of wall-clock instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    zone: Zone,
    format: TimeFormat,
}

impl Calendar {
    pub fn new(zone: Zone, format: TimeFormat) -> Self {
        Self { zone, format }
    }

    /// Build from an optional IANA zone name; `None` means the system zone.
    pub fn from_zone_name(name: Option<&str>, format: TimeFormat) -> Result<Self, CalendarError> {
        let zone = match name {
            None => Zone::Local,
            Some(name) => Zone::Named(
                name.parse::<Tz>()
                    .map_err(|_| CalendarError::UnknownZone(name.to_string()))?,
            ),
        };
        Ok(Self::new(zone, format))
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Next zero-second instant after `at` in this calendar's zone.
    pub fn next_minute_after(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>, CalendarError> {
        match self.zone {
            Zone::Local => {
                next_minute_boundary(&at.with_timezone(&chrono::Local)).map(|t| t.with_timezone(&Utc))
            }
            Zone::Named(tz) => next_minute_boundary(&at.with_timezone(&tz)).map(|t| t.with_timezone(&Utc)),
        }
    }

    /// Short time of day, e.g. "3:00 PM" or "15:00".
    pub fn short_time(&self, at: DateTime<Utc>) -> String {
        let pattern = self.format.pattern();
        match self.zone {
            Zone::Local => at.with_timezone(&chrono::Local).format(pattern).to_string(),
            Zone::Named(tz) => at.with_timezone(&tz).format(pattern).to_string(),
        }
    }
}

/// Owns the single repeating announcement trigger.
///
/// Each start bumps a generation number that is stamped on every tick, so a
/// tick already queued when the schedule was cancelled can be recognised as
/// stale and dropped.
pub struct MinuteTicker {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Default for MinuteTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl MinuteTicker {
    pub fn new() -> Self {
        Self {
            generation: 0,
            task: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.task.is_some() && generation == self.generation
    }

    /// Start repeating ticks: the first at `first_fire`, then every
    /// `ANNOUNCE_PERIOD`. Cancels any existing schedule first.
    pub fn start<T, F>(&mut self, first_fire: Instant, tx: mpsc::WeakSender<T>, make_tick: F) -> u64
    where
        T: Send + 'static,
        F: Fn(u64) -> T + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(first_fire, ANNOUNCE_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(sender) = tx.upgrade() else {
                    debug!("Ticker receiver gone, stopping");
                    break;
                };
                if sender.send(make_tick(generation)).await.is_err() {
                    break;
                }
            }
        });

        self.task = Some(handle);
        generation
    }

    /// Cancel the schedule. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

impl Drop for MinuteTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}
