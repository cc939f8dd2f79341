//! Daily scheduling
//!
//! Computes wall-clock fire times in the local timezone and runs the two
//! daily jobs (ask, remind) against the round orchestrator. In test mode the
//! ask job fires at the start of every minute and the reminder is not
//! scheduled.
//!
//! Each fire spawns its own task so that a trigger arriving while a round is
//! still open reaches the orchestrator and is rejected there, instead of
//! queueing behind the running round.

use chrono::{
    DateTime, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::round::{RoundOrchestrator, RoundOutcome};

/// A wall-clock time of day, written `HH:MM`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("Invalid time '{}', expected HH:MM", s))?;
        let hour: u32 = h
            .parse()
            .map_err(|_| format!("Invalid hour in '{}'", s))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| format!("Invalid minute in '{}'", s))?;
        Self::new(hour, minute).ok_or_else(|| format!("Time out of range: '{}'", s))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Resolve a naive local datetime, falling back to the reference offset
/// inside a DST gap.
fn resolve_local(naive: NaiveDateTime, reference: &DateTime<Local>) -> DateTime<Local> {
    Local.from_local_datetime(&naive).earliest().unwrap_or_else(|| {
        let offset = reference.offset().local_minus_utc();
        Local.from_utc_datetime(&(naive - ChronoDuration::seconds(i64::from(offset))))
    })
}

/// `at` today if it has not passed yet, otherwise `at` tomorrow
pub fn cutoff_after(now: DateTime<Local>, at: TimeOfDay) -> DateTime<Local> {
    let today = resolve_local(now.date_naive().and_time(at.as_naive()), &now);
    if today >= now {
        today
    } else {
        let tomorrow = now.date_naive() + ChronoDuration::days(1);
        resolve_local(tomorrow.and_time(at.as_naive()), &now)
    }
}

/// When a collection window closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// At a fixed local time of day (today, or tomorrow if already past)
    DailyCutoff(TimeOfDay),
    /// A fixed span after opening
    Fixed(Duration),
}

impl WindowPolicy {
    /// Deadline for a window opened at `now`
    pub fn deadline_from(&self, now: DateTime<Local>) -> DateTime<Local> {
        match self {
            Self::DailyCutoff(at) => cutoff_after(now, *at),
            Self::Fixed(span) => {
                now + ChronoDuration::from_std(*span).unwrap_or_else(|_| ChronoDuration::zero())
            }
        }
    }
}

/// How often a job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a day at a local time
    Daily(TimeOfDay),
    /// At the start of every minute
    EveryMinute,
}

impl Schedule {
    /// First fire time strictly after `now`
    pub fn next_after(&self, now: DateTime<Local>) -> DateTime<Local> {
        match self {
            Self::Daily(at) => {
                let today = resolve_local(now.date_naive().and_time(at.as_naive()), &now);
                if today > now {
                    today
                } else {
                    let tomorrow = now.date_naive() + ChronoDuration::days(1);
                    resolve_local(tomorrow.and_time(at.as_naive()), &now)
                }
            }
            Self::EveryMinute => {
                let truncated = now
                    .with_second(0)
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(now);
                truncated + ChronoDuration::minutes(1)
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily(at) => write!(f, "daily at {}", at),
            Self::EveryMinute => write!(f, "every minute"),
        }
    }
}

/// What a scheduled fire does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Open a new round
    Ask,
    /// Remind the channel while a round is collecting
    Remind,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ask => write!(f, "ask"),
            Self::Remind => write!(f, "remind"),
        }
    }
}

/// Time until `target`, zero if already passed
pub fn until(target: DateTime<Local>, now: DateTime<Local>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Aborts a task when dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn a task and log (instead of propagating) a panic inside it.
///
/// Aborting the returned handle also aborts the spawned task.
pub fn spawn_logged<F>(name: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let inner = tokio::spawn(future);
    let abort_inner = AbortOnDrop(inner.abort_handle());
    tokio::spawn(async move {
        let _abort_inner = abort_inner;
        if let Err(e) = inner.await {
            if e.is_panic() {
                error!(task = name, "Background task panicked: {}", e);
            } else {
                warn!(task = name, "Background task cancelled");
            }
        }
    })
}

/// Runs the ask/remind jobs for the lifetime of the process
pub struct Scheduler {
    jobs: Vec<(Job, Schedule)>,
}

impl Scheduler {
    pub fn new(jobs: Vec<(Job, Schedule)>) -> Self {
        Self { jobs }
    }

    /// Daily ask and reminder at the given times
    pub fn daily(ask: TimeOfDay, remind: TimeOfDay) -> Self {
        Self::new(vec![
            (Job::Ask, Schedule::Daily(ask)),
            (Job::Remind, Schedule::Daily(remind)),
        ])
    }

    /// Ask every minute, no reminder
    pub fn test_mode() -> Self {
        Self::new(vec![(Job::Ask, Schedule::EveryMinute)])
    }

    pub fn jobs(&self) -> &[(Job, Schedule)] {
        &self.jobs
    }

    /// Start one timer loop per job. The returned handles run until aborted.
    pub fn start(self, orchestrator: Arc<RoundOrchestrator>) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|(job, schedule)| {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(run_job(job, schedule, orchestrator))
            })
            .collect()
    }
}

async fn run_job(job: Job, schedule: Schedule, orchestrator: Arc<RoundOrchestrator>) {
    info!(%job, %schedule, "Scheduled job registered");

    loop {
        let now = Local::now();
        let next = schedule.next_after(now);
        debug!(%job, next = %next.format("%Y-%m-%d %H:%M:%S"), "Waiting for next fire");
        tokio::time::sleep(until(next, now)).await;

        let orchestrator = Arc::clone(&orchestrator);
        match job {
            Job::Ask => {
                spawn_logged("ask", async move {
                    match orchestrator.trigger().await {
                        RoundOutcome::Completed(report) => {
                            info!(round_id = %report.round_id, kind = ?report.kind, "Scheduled round completed")
                        }
                        RoundOutcome::Rejected => {
                            info!("Scheduled ask skipped, a round is already running")
                        }
                        RoundOutcome::Abandoned { round_id, reason } => {
                            warn!(%round_id, %reason, "Scheduled round abandoned")
                        }
                    }
                });
            }
            Job::Remind => {
                spawn_logged("remind", async move {
                    if let Err(e) = orchestrator.remind_if_collecting().await {
                        error!("Failed to post reminder: {}", e);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .earliest()
            .expect("valid local time")
    }

    fn at(h: u32, m: u32) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!("16:00".parse::<TimeOfDay>().unwrap(), at(16, 0));
        assert_eq!(" 7:05 ".parse::<TimeOfDay>().unwrap(), at(7, 5));
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
        assert_eq!(at(9, 5).to_string(), "09:05");
    }

    #[test]
    fn test_cutoff_later_today() {
        let now = local(2026, 3, 10, 12, 0, 0);
        let cutoff = cutoff_after(now, at(16, 0));
        assert_eq!(cutoff, local(2026, 3, 10, 16, 0, 0));
    }

    #[test]
    fn test_cutoff_rolls_to_tomorrow_when_past() {
        let now = local(2026, 3, 10, 16, 30, 0);
        let cutoff = cutoff_after(now, at(16, 0));
        assert_eq!(cutoff, local(2026, 3, 11, 16, 0, 0));
    }

    #[test]
    fn test_cutoff_exactly_now_is_today() {
        let now = local(2026, 3, 10, 16, 0, 0);
        assert_eq!(cutoff_after(now, at(16, 0)), now);
    }

    #[test]
    fn test_daily_schedule_is_strictly_after_now() {
        let now = local(2026, 3, 10, 12, 0, 0);
        let next = Schedule::Daily(at(12, 0)).next_after(now);
        assert_eq!(next, local(2026, 3, 11, 12, 0, 0));
    }

    #[test]
    fn test_every_minute_schedule() {
        let now = local(2026, 3, 10, 12, 0, 42);
        let next = Schedule::EveryMinute.next_after(now);
        assert_eq!(next, local(2026, 3, 10, 12, 1, 0));
    }

    #[test]
    fn test_fixed_window_deadline() {
        let now = local(2026, 3, 10, 12, 0, 0);
        let deadline = WindowPolicy::Fixed(Duration::from_secs(10)).deadline_from(now);
        assert_eq!(deadline, local(2026, 3, 10, 12, 0, 10));
    }

    #[test]
    fn test_until_never_negative() {
        let now = local(2026, 3, 10, 12, 0, 0);
        let past = local(2026, 3, 10, 11, 0, 0);
        assert_eq!(until(past, now), Duration::ZERO);
        assert_eq!(until(now + ChronoDuration::seconds(5), now), Duration::from_secs(5));
    }

    #[test]
    fn test_scheduler_layouts() {
        let daily = Scheduler::daily(at(12, 0), at(15, 0));
        assert_eq!(daily.jobs().len(), 2);
        assert_eq!(daily.jobs()[1], (Job::Remind, Schedule::Daily(at(15, 0))));

        let test = Scheduler::test_mode();
        assert_eq!(test.jobs(), &[(Job::Ask, Schedule::EveryMinute)]);
    }

    #[tokio::test]
    async fn test_spawn_logged_survives_panic() {
        let handle = spawn_logged("panicking", async {
            panic!("round exploded");
        });
        // The watcher absorbs the panic and finishes cleanly
        assert!(handle.await.is_ok());

        let after = spawn_logged("healthy", async {});
        assert!(after.await.is_ok());
    }

    #[tokio::test]
    async fn test_abort_cancels_spawned_task() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handle = spawn_logged("gateway", async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!ran.load(Ordering::SeqCst));
    }
}
