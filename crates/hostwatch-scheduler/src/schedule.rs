use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};

use crate::error::{Result, SchedulerError};

/// Fire time used to park a paused job. Nothing compares greater.
pub const PAUSED_UNTIL: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// Recurrence period of a daily job.
pub const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Compute the first fire time of a daily `hour:minute` job, relative to `now`.
///
/// Returns today's `hour:minute` in `now`'s timezone if it is still ahead,
/// otherwise tomorrow's. If a DST gap swallows the wall-clock time on the
/// candidate day, the next day that has it is used.
pub fn next_daily_run<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Tz>> {
    let at = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        SchedulerError::InvalidSchedule(format!(
            "{hour:02}:{minute:02} is not a valid time of day"
        ))
    })?;

    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return Ok(candidate);
            }
        }
        date = date.succ_opt().ok_or_else(|| {
            SchedulerError::InvalidSchedule("calendar overflow computing daily run".to_string())
        })?;
    }

    Err(SchedulerError::InvalidSchedule(format!(
        "no local occurrence of {hour:02}:{minute:02} in the next days"
    )))
}

/// `from + interval`, saturating at [`PAUSED_UNTIL`] for absurd intervals.
pub fn advance(from: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(interval)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(PAUSED_UNTIL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn daily_before_target_fires_today() {
        let next = next_daily_run(&utc(1, 30, 0), 3, 0).unwrap();
        assert_eq!(next, utc(3, 0, 0));
    }

    #[test]
    fn daily_after_target_fires_tomorrow() {
        let next = next_daily_run(&utc(4, 0, 0), 3, 0).unwrap();
        assert_eq!(next, utc(3, 0, 0) + TimeDelta::days(1));
    }

    #[test]
    fn daily_exactly_at_target_fires_tomorrow() {
        let next = next_daily_run(&utc(3, 0, 0), 3, 0).unwrap();
        assert_eq!(next, utc(3, 0, 0) + TimeDelta::days(1));
    }

    #[test]
    fn daily_respects_timezone_of_now() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // 23:00 UTC is 01:00 the next day at +02:00, so 00:30 local has passed.
        let now = utc(23, 0, 0).with_timezone(&tz);
        let next = next_daily_run(&now, 0, 30).unwrap();
        assert_eq!((next.hour(), next.minute()), (0, 30));
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
    }

    #[test]
    fn daily_rejects_out_of_range_time() {
        assert!(matches!(
            next_daily_run(&utc(0, 0, 0), 24, 0),
            Err(SchedulerError::InvalidSchedule(_))
        ));
        assert!(matches!(
            next_daily_run(&utc(0, 0, 0), 12, 60),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn advance_adds_interval() {
        let from = utc(10, 0, 0);
        assert_eq!(advance(from, Duration::from_secs(90)), utc(10, 1, 30));
    }

    #[test]
    fn advance_saturates() {
        assert_eq!(advance(utc(10, 0, 0), Duration::MAX), PAUSED_UNTIL);
    }
}
