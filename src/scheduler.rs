//! Periodic trigger for automatic updates.
//!
//! The scheduler is polled at a fixed cadence: every 15 minutes when the
//! configured interval is a whole number of days, otherwise once per
//! interval. Whole-day schedules fire only when the wall clock has just
//! crossed the preferred time of day and at least `interval - 1h` passed
//! since the last update, so the trigger does not drift later each day.
//!
//! All times are local wall-clock times.

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crate::config::ScheduleConfig;
use crate::indexing::RunCoordinator;
use crate::logging::error_chain;

const MINUTES_PER_DAY: u64 = 24 * 60;
const WHOLE_DAY_POLL: Duration = Duration::from_secs(15 * 60);

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Failed to read schedule state {}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write schedule state {}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Schedule state {} is corrupted", .path.display())]
    Corrupted {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleState {
    last_update: Option<NaiveDateTime>,
}

#[derive(Debug)]
pub struct Scheduler {
    interval_minutes: u64,
    preferred_time: Option<NaiveTime>,
    state_path: Option<PathBuf>,
    last_update: Option<NaiveDateTime>,
    last_tick: NaiveDateTime,
}

impl Scheduler {
    pub fn new(config: &ScheduleConfig, now: NaiveDateTime) -> Self {
        let preferred_time = config.preferred_time_of_day();
        if preferred_time.is_none() && config.interval_minutes % MINUTES_PER_DAY == 0 {
            tracing::warn!(
                target: "scheduler",
                "[scheduler] invalid preferred_time '{}', falling back to plain interval",
                config.preferred_time
            );
        }

        Self {
            interval_minutes: config.interval_minutes.max(1),
            preferred_time,
            state_path: None,
            last_update: None,
            last_tick: now,
        }
    }

    /// Persist `last_update` at `path`, loading the previous value if present.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Result<Self, ScheduleError> {
        let path = path.into();
        self.last_update = load_state(&path)?.last_update;
        self.state_path = Some(path);
        Ok(self)
    }

    pub fn last_update(&self) -> Option<NaiveDateTime> {
        self.last_update
    }

    /// Interval is a whole number of days and a preferred time is set.
    pub fn is_day_aligned(&self) -> bool {
        self.interval_minutes % MINUTES_PER_DAY == 0 && self.preferred_time.is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        if self.is_day_aligned() {
            WHOLE_DAY_POLL
        } else {
            Duration::from_secs(self.interval_minutes.saturating_mul(60))
        }
    }

    /// Whether a tick at `now` should start an update.
    pub fn should_trigger(&self, now: NaiveDateTime) -> bool {
        let interval = minutes(self.interval_minutes);

        match self.preferred_time {
            Some(preferred) if self.is_day_aligned() => {
                let mut candidate = now.date().and_time(preferred);
                if candidate > now {
                    candidate -= TimeDelta::days(1);
                }
                let crossed = self.last_tick < candidate;
                crossed && self.elapsed_at_least(now, interval - TimeDelta::hours(1))
            }
            _ => self.elapsed_at_least(now, interval),
        }
    }

    fn elapsed_at_least(&self, now: NaiveDateTime, min: TimeDelta) -> bool {
        self.last_update.is_none_or(|last| now - last >= min)
    }

    /// Start an update if one is due. Returns whether a run was started.
    ///
    /// Does nothing while a run is active. `last_update` is recorded before
    /// the run starts.
    pub fn tick(&mut self, now: NaiveDateTime, coordinator: &RunCoordinator) -> bool {
        if coordinator.is_running() {
            crate::debug_event!("scheduler", "tick skipped", "run in progress");
            return false;
        }

        let due = self.should_trigger(now);
        self.last_tick = now;
        if !due {
            return false;
        }

        self.last_update = Some(now);
        if let Err(e) = self.persist() {
            tracing::warn!(target: "scheduler", "[scheduler] {}", error_chain(&e));
        }

        let started = coordinator.start_update();
        crate::log_event!("scheduler", "update triggered", "started: {started}");
        started
    }

    fn persist(&self) -> Result<(), ScheduleError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let write_err = |source| ScheduleError::Write {
            path: path.clone(),
            source,
        };

        let state = ScheduleState {
            last_update: self.last_update,
        };
        let json =
            serde_json::to_vec_pretty(&state).map_err(|e| write_err(std::io::Error::other(e)))?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    /// Run the timer on its own thread until `shutdown` receives a message
    /// or is disconnected.
    pub fn spawn(
        mut self,
        coordinator: RunCoordinator,
        shutdown: Receiver<()>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || {
                let poll = self.poll_interval();
                crate::log_event!("scheduler", "started", "polling every {poll:?}");

                loop {
                    match shutdown.recv_timeout(poll) {
                        Err(RecvTimeoutError::Timeout) => {
                            self.tick(Local::now().naive_local(), &coordinator);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                crate::log_event!("scheduler", "stopped");
            })
    }
}

fn minutes(count: u64) -> TimeDelta {
    i64::try_from(count)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .unwrap_or(TimeDelta::MAX)
}

fn load_state(path: &Path) -> Result<ScheduleState, ScheduleError> {
    if !path.exists() {
        return Ok(ScheduleState::default());
    }
    let json = fs::read_to_string(path).map_err(|source| ScheduleError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if json.trim().is_empty() {
        return Ok(ScheduleState::default());
    }
    serde_json::from_str(&json).map_err(|source| ScheduleError::Corrupted {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn daily() -> ScheduleConfig {
        ScheduleConfig {
            enabled: true,
            interval_minutes: 24 * 60,
            preferred_time: "03:00".to_string(),
        }
    }

    fn every(minutes: u64) -> ScheduleConfig {
        ScheduleConfig {
            enabled: true,
            interval_minutes: minutes,
            preferred_time: "03:00".to_string(),
        }
    }

    #[test]
    fn test_poll_interval() {
        let now = at(1, 0, 0);
        assert_eq!(Scheduler::new(&daily(), now).poll_interval(), WHOLE_DAY_POLL);
        assert_eq!(
            Scheduler::new(&every(2 * 24 * 60), now).poll_interval(),
            WHOLE_DAY_POLL
        );
        assert_eq!(
            Scheduler::new(&every(90), now).poll_interval(),
            Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn test_daily_fires_when_preferred_time_is_crossed() {
        let mut scheduler = Scheduler::new(&daily(), at(1, 2, 40));

        assert!(!scheduler.should_trigger(at(1, 2, 55)));
        scheduler.last_tick = at(1, 2, 55);
        assert!(scheduler.should_trigger(at(1, 3, 10)));

        // Crossing already consumed by the previous tick.
        scheduler.last_tick = at(1, 3, 10);
        assert!(!scheduler.should_trigger(at(1, 3, 25)));
    }

    #[test]
    fn test_daily_respects_safety_margin() {
        let mut scheduler = Scheduler::new(&daily(), at(2, 2, 55));

        // Last run 22h ago: less than interval - 1h.
        scheduler.last_update = Some(at(1, 5, 10));
        assert!(!scheduler.should_trigger(at(2, 3, 10)));

        // Last run drifted to 03:10 yesterday; 23h50m since then is enough.
        scheduler.last_update = Some(at(1, 3, 20));
        assert!(scheduler.should_trigger(at(2, 3, 10)));
    }

    #[test]
    fn test_crossing_over_midnight() {
        let config = ScheduleConfig {
            preferred_time: "00:00".to_string(),
            ..daily()
        };
        let scheduler = Scheduler::new(&config, at(1, 23, 50));
        assert!(scheduler.should_trigger(at(2, 0, 5)));
    }

    #[test]
    fn test_plain_interval_uses_elapsed_time() {
        let mut scheduler = Scheduler::new(&every(60), at(1, 8, 0));
        assert!(scheduler.should_trigger(at(1, 8, 0)));

        scheduler.last_update = Some(at(1, 8, 0));
        assert!(!scheduler.should_trigger(at(1, 8, 59)));
        assert!(scheduler.should_trigger(at(1, 9, 0)));
    }

    #[test]
    fn test_invalid_preferred_time_falls_back_to_interval() {
        let config = ScheduleConfig {
            preferred_time: "late".to_string(),
            ..daily()
        };
        let mut scheduler = Scheduler::new(&config, at(1, 0, 0));
        assert!(!scheduler.is_day_aligned());
        scheduler.last_update = Some(at(1, 0, 0));
        assert!(scheduler.should_trigger(at(2, 0, 0)));
    }

    #[test]
    fn test_state_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/schedule.json");

        let mut scheduler = Scheduler::new(&every(60), at(1, 0, 0))
            .with_state_file(&path)
            .unwrap();
        assert_eq!(scheduler.last_update(), None);
        scheduler.last_update = Some(at(1, 7, 30));
        scheduler.persist().unwrap();

        let reloaded = Scheduler::new(&every(60), at(1, 8, 0))
            .with_state_file(&path)
            .unwrap();
        assert_eq!(reloaded.last_update(), Some(at(1, 7, 30)));
    }

    #[test]
    fn test_corrupted_state_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("schedule.json");
        fs::write(&path, "{not json").unwrap();

        let err = Scheduler::new(&every(60), at(1, 0, 0))
            .with_state_file(&path)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Corrupted { .. }));
        assert_eq!(err.to_string(), format!("Schedule state {} is corrupted", path.display()));
    }
}
