/*!
Job Monitor: poll an already-submitted job until it reaches a terminal
status, then build the report.

Polling rules:
  - `JobStatusCode::IN_PROGRESS` is an allow-list; every other known code
    stops the loop on its first observation.
  - A wire value outside the status table stops with `UnknownStatus`.
  - `fetch_status` failures propagate as-is (no retry).
  - With a job timeout set, the loop gives up with `PollTimeout` once the
    time spent waiting between polls would exceed it.

The sleeper is injectable so tests run without wall-clock waits.
*/

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TwistError;
use crate::twist::JobService;
use crate::twist::model::{Job, JobStatus, JobStatusCode, display_time};

/// Terminal observation of a job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: Job,
    pub code: JobStatusCode,
    pub status: JobStatus,
    /// Number of `fetch_status` calls made, including the terminal one.
    pub polls: usize,
}

pub struct JobMonitor<'a, J: JobService + ?Sized> {
    service: &'a J,
    interval: Duration,
    timeout: Option<Duration>,
    sleeper: Box<dyn FnMut(Duration) + 'a>,
}

impl<'a, J: JobService + ?Sized> JobMonitor<'a, J> {
    pub fn new(service: &'a J, interval: Duration) -> Self {
        Self {
            service,
            interval,
            timeout: None,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Block until `job` is terminal. `on_poll(n, code)` runs after every observation.
    pub fn watch(
        &mut self,
        job: &Job,
        mut on_poll: impl FnMut(usize, JobStatusCode),
    ) -> Result<JobOutcome, TwistError> {
        let mut waited = Duration::ZERO;
        let mut polls = 0usize;
        loop {
            let status = self.service.fetch_status(job)?;
            polls += 1;

            let Some(code) = status.code() else {
                return Err(TwistError::UnknownStatus {
                    job: job.id,
                    code: status.raw_code,
                });
            };
            debug!(job = job.id, poll = polls, status = %code, "job status");
            on_poll(polls, code);

            if code.is_terminal() {
                return Ok(JobOutcome {
                    job: job.clone(),
                    code,
                    status,
                    polls,
                });
            }

            if let Some(limit) = self.timeout
                && waited + self.interval > limit
            {
                return Err(TwistError::PollTimeout {
                    job: job.id,
                    waited,
                });
            }
            (self.sleeper)(self.interval);
            waited += self.interval;
        }
    }
}

/// One progress line: `  3 ... ACTIVE(1) Job=9001 Server=web01`.
pub fn progress_line(poll: usize, code: JobStatusCode, job: &Job, server: &str) -> String {
    format!("{poll:3} ... {code} Job={} Server={server}", job.id)
}

/// Rendered terminal report, shared by the human and JSON outputs.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: i64,
    pub status: String,
    pub job_type: String,
    pub description: String,
    pub job_start: String,
    pub job_end: String,
    pub blocked_reason: String,
    pub canceled_reason: String,
    pub schedule: String,
    pub notification: String,
    pub duration_secs: Option<i64>,
}

impl JobReport {
    pub fn new(outcome: &JobOutcome) -> Self {
        let status = &outcome.status;
        let duration_secs = status.duration_secs();
        if let Some(d) = duration_secs
            && d < 0
        {
            warn!(
                job = outcome.job.id,
                duration = d,
                "job ended before it started; check the core's clock"
            );
        }
        Self {
            job: outcome.job.id,
            status: outcome.code.to_string(),
            job_type: status.job_type.clone(),
            description: status.description.clone(),
            job_start: display_time(status.start_time),
            job_end: display_time(status.end_time),
            blocked_reason: status.blocked_reason.clone(),
            canceled_reason: status.canceled_reason.clone(),
            schedule: status.schedule.clone(),
            notification: status.notification.clone(),
            duration_secs,
        }
    }

    /// Label/value pairs in display order.
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Status", self.status.clone()),
            ("Job Type", self.job_type.clone()),
            ("Description", self.description.clone()),
            ("Job Start", self.job_start.clone()),
            ("Job End", self.job_end.clone()),
            ("Reason for Blocked", self.blocked_reason.clone()),
            ("Reason for Canceled", self.canceled_reason.clone()),
            ("Schedule", self.schedule.clone()),
            ("Notification", self.notification.clone()),
            (
                "Duration",
                self.duration_secs
                    .map(|d| format!("{d} seconds"))
                    .unwrap_or_default(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twist::MockJobService;
    use serde_json::json;
    use std::cell::RefCell;

    fn job() -> Job {
        Job {
            id: 9001,
            name: "Run Agent Communication Test".into(),
            job_type: "job".into(),
        }
    }

    fn status(code: &str) -> JobStatus {
        JobStatus::from_json(&json!({
            "status": code,
            "type": "server.comm.test",
            "startDate": "1486000000",
            "endDate": "1486000042",
        }))
    }

    /// Mock that replays `codes` in order.
    fn scripted(codes: &'static [&'static str]) -> MockJobService {
        let mut svc = MockJobService::new();
        let mut next = codes.iter();
        svc.expect_fetch_status()
            .times(codes.len())
            .returning(move |_| Ok(status(next.next().unwrap())));
        svc
    }

    #[test]
    fn every_terminal_code_stops_after_one_poll() {
        for code in JobStatusCode::ALL.into_iter().filter(|c| c.is_terminal()) {
            let mut svc = MockJobService::new();
            let wire = code.ordinal().to_string();
            svc.expect_fetch_status()
                .times(1)
                .returning(move |_| Ok(status(&wire)));
            let sleeps = RefCell::new(0);
            let outcome = JobMonitor::new(&svc, Duration::from_secs(1))
                .with_sleeper(|_| *sleeps.borrow_mut() += 1)
                .watch(&job(), |_, _| {})
                .unwrap();
            assert_eq!(outcome.code, code);
            assert_eq!(outcome.polls, 1);
            assert_eq!(*sleeps.borrow(), 0, "{code} should not sleep");
        }
    }

    #[test]
    fn active_polls_again_after_the_interval() {
        let svc = scripted(&["1", "1", "6"]);
        let slept = RefCell::new(Vec::new());
        let mut seen = Vec::new();
        let outcome = JobMonitor::new(&svc, Duration::from_millis(250))
            .with_sleeper(|d| slept.borrow_mut().push(d))
            .watch(&job(), |n, code| seen.push((n, code)))
            .unwrap();

        assert_eq!(outcome.code, JobStatusCode::Success);
        assert_eq!(outcome.polls, 3);
        assert_eq!(*slept.borrow(), vec![Duration::from_millis(250); 2]);
        assert_eq!(
            seen,
            [
                (1, JobStatusCode::Active),
                (2, JobStatusCode::Active),
                (3, JobStatusCode::Success)
            ]
        );
    }

    #[test]
    fn unrecognized_code_is_an_error_not_a_loop() {
        let svc = scripted(&["42"]);
        let err = JobMonitor::new(&svc, Duration::from_secs(1))
            .with_sleeper(|_| panic!("must not sleep"))
            .watch(&job(), |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            TwistError::UnknownStatus { job: 9001, ref code } if code == "42"
        ));
    }

    #[test]
    fn fetch_failure_propagates_without_retry() {
        let mut svc = MockJobService::new();
        svc.expect_fetch_status()
            .times(1)
            .returning(|_| Err(TwistError::remote("JobService.getJobInfoVO", "timeout")));
        let err = JobMonitor::new(&svc, Duration::from_secs(1))
            .with_sleeper(|_| {})
            .watch(&job(), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, TwistError::RemoteCallFailed { .. }));
    }

    #[test]
    fn job_timeout_bounds_the_wait() {
        let svc = scripted(&["1", "1", "1"]);
        let err = JobMonitor::new(&svc, Duration::from_secs(1))
            .with_timeout(Some(Duration::from_secs(2)))
            .with_sleeper(|_| {})
            .watch(&job(), |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            TwistError::PollTimeout { job: 9001, waited } if waited == Duration::from_secs(2)
        ));
    }

    #[test]
    fn report_lines_and_duration() {
        let outcome = JobOutcome {
            job: job(),
            code: JobStatusCode::Success,
            status: status("6"),
            polls: 1,
        };
        let report = JobReport::new(&outcome);
        assert_eq!(report.duration_secs, Some(42));
        let lines = report.lines();
        assert_eq!(lines[0], ("Status", "SUCCESS(6)".to_string()));
        assert_eq!(lines[3], ("Job Start", "2017-02-02 01:46:40".to_string()));
        assert_eq!(lines[9], ("Duration", "42 seconds".to_string()));

        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["status"], "SUCCESS(6)");
        assert_eq!(v["duration_secs"], 42);
    }

    #[test]
    fn negative_duration_is_reported_as_is() {
        let mut s = status("4");
        std::mem::swap(&mut s.start_time, &mut s.end_time);
        let outcome = JobOutcome {
            job: job(),
            code: JobStatusCode::Failure,
            status: s,
            polls: 1,
        };
        let report = JobReport::new(&outcome);
        assert_eq!(report.duration_secs, Some(-42));
        assert_eq!(report.lines()[9].1, "-42 seconds");
    }

    #[test]
    fn progress_line_shape() {
        assert_eq!(
            progress_line(3, JobStatusCode::Active, &job(), "web01"),
            "  3 ... ACTIVE(1) Job=9001 Server=web01"
        );
    }
}
