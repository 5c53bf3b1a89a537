use crate::config::env_or;
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

const DEFAULT_INTERVAL_DAYS: u32 = 10;
const DEFAULT_HOUR: u32 = 9;
// Brasília time.
const DEFAULT_UTC_OFFSET_HOURS: i32 = -3;

/// Recurrence of the full review, equivalent to the cron expression `0 0 H */N * *`:
/// fires at hour `H` local time on days 1, 1+N, 1+2N, ... of every month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewSchedule {
    interval_days: u32,
    hour: u32,
    offset: FixedOffset,
}

impl ReviewSchedule {
    pub fn new(interval_days: u32, hour: u32, utc_offset_hours: i32) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (1..=31).contains(&interval_days),
            "review interval must be 1..=31 days (got {interval_days})"
        );
        anyhow::ensure!(hour < 24, "review hour must be 0..=23 (got {hour})");
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .with_context(|| format!("invalid UTC offset: {utc_offset_hours}h"))?;
        Ok(Self {
            interval_days,
            hour,
            offset,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(
            env_or("REVIEW_INTERVAL_DAYS", DEFAULT_INTERVAL_DAYS),
            env_or("REVIEW_HOUR", DEFAULT_HOUR),
            env_or("REVIEW_UTC_OFFSET_HOURS", DEFAULT_UTC_OFFSET_HOURS),
        )
    }

    /// First fire instant strictly after `now`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let fire_time = NaiveTime::from_hms_opt(self.hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let mut date = now.with_timezone(&self.offset).date_naive();

        // A matching day exists within every 31-day window, since day 1 always matches.
        loop {
            if (date.day() - 1) % self.interval_days == 0 {
                let local = date.and_time(fire_time);
                if let Some(at) = self.offset.from_local_datetime(&local).single() {
                    let at = at.with_timezone(&Utc);
                    if at > now {
                        return at;
                    }
                }
            }
            date += Duration::days(1);
        }
    }
}
