//! When the daemon fires the coordinator's jobs.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::time::{Duration, Instant};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Work through the pending queue.
    RecognitionDrain,
    ArchiveCheck,
}

/// `HH:MM`, 24-hour clock.
pub fn parse_scheduled_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("Invalid scheduled time {value:?}, expected HH:MM"))
}

/// Tracks which jobs are due. The drain runs once per calendar day at or after
/// its scheduled time; a daemon started late that day still gets the day's run.
/// The archive check runs on the first poll and then every interval.
pub struct ScheduleManager {
    daily_at: NaiveTime,
    last_daily: Option<NaiveDate>,
    archive_every: Duration,
    last_archive: Option<Instant>,
}

impl ScheduleManager {
    pub fn new(daily_at: NaiveTime, archive_every: Duration) -> Self {
        Self {
            daily_at,
            last_daily: None,
            archive_every,
            last_archive: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let daily_at = parse_scheduled_time(&config.recognition.scheduled_time)?;
        let minutes = config.schedule.archive_interval_minutes.max(1);
        let archive_every = Duration::from_secs(minutes * 60);
        Ok(Self::new(daily_at, archive_every))
    }

    /// Jobs due at `now` (local wall clock) / `instant` (monotonic). Each job
    /// is reported once per due period.
    pub fn due(&mut self, now: NaiveDateTime, instant: Instant) -> Vec<Job> {
        let mut jobs = Vec::new();

        let today = now.date();
        if now.time() >= self.daily_at && self.last_daily != Some(today) {
            self.last_daily = Some(today);
            jobs.push(Job::RecognitionDrain);
        }

        let archive_due = match self.last_archive {
            None => true,
            Some(last) => instant.duration_since(last) >= self.archive_every,
        };
        if archive_due {
            self.last_archive = Some(instant);
            jobs.push(Job::ArchiveCheck);
        }

        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_parse_scheduled_time() {
        assert_eq!(
            parse_scheduled_time("04:00").unwrap(),
            NaiveTime::from_hms_opt(4, 0, 0).unwrap()
        );
        assert!(parse_scheduled_time("4am").is_err());
        assert!(parse_scheduled_time("25:00").is_err());
    }

    #[test]
    fn test_daily_job_once_per_day() {
        let start = Instant::now();
        let mut schedule = ScheduleManager::new(
            NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            Duration::from_secs(3600),
        );

        assert!(!schedule.due(at("2024-05-01", "03:59"), start).contains(&Job::RecognitionDrain));
        assert!(schedule.due(at("2024-05-01", "04:00"), start).contains(&Job::RecognitionDrain));
        assert!(!schedule.due(at("2024-05-01", "12:00"), start).contains(&Job::RecognitionDrain));
        assert!(!schedule.due(at("2024-05-02", "01:00"), start).contains(&Job::RecognitionDrain));
        assert!(schedule.due(at("2024-05-02", "06:30"), start).contains(&Job::RecognitionDrain));
    }

    #[test]
    fn test_archive_interval() {
        let start = Instant::now();
        let mut schedule = ScheduleManager::new(
            NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            Duration::from_secs(60),
        );
        let early = at("2024-05-01", "03:00");

        assert_eq!(schedule.due(early, start), vec![Job::ArchiveCheck]);
        assert!(schedule.due(early, start + Duration::from_secs(30)).is_empty());
        assert_eq!(
            schedule.due(early, start + Duration::from_secs(60)),
            vec![Job::ArchiveCheck]
        );
    }
}
