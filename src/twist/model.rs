/*!
Value types exchanged with the remote object API.

Responses arrive as `serde_json::Value` trees (see `soap.rs`); the
`from_json` constructors here pick out the handful of fields the
subcommands need. Everything else stays available in the raw tree for
`--dump`.
*/

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::soap::Service;

/* ---- Entity kinds ---- */

/// Category of remote record an entity reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Server,
    Customer,
    Policy,
    Script,
}

impl EntityKind {
    pub fn service(self) -> Service {
        match self {
            EntityKind::Server => Service::Server,
            EntityKind::Customer => Service::Customer,
            EntityKind::Policy => Service::SoftwarePolicy,
            EntityKind::Script => Service::ServerScript,
        }
    }

    /// Pattern-search method on the kind's service.
    pub fn find_method(self) -> &'static str {
        match self {
            EntityKind::Server => "findServerRefs",
            EntityKind::Customer => "findCustomerRefs",
            EntityKind::Policy => "findSoftwarePolicyRefs",
            EntityKind::Script => "findServerScriptRefs",
        }
    }

    /// Fetch-by-id method returning the fully populated value object.
    pub fn vo_method(self) -> &'static str {
        match self {
            EntityKind::Server => "getServerVO",
            EntityKind::Customer => "getCustomerVO",
            EntityKind::Policy => "getSoftwarePolicyVO",
            EntityKind::Script => "getServerScriptVO",
        }
    }

    /// Value-object type name, used as the filter's object type and as
    /// the attribute prefix in filter expressions.
    pub fn vo_type(self) -> &'static str {
        match self {
            EntityKind::Server => "ServerVO",
            EntityKind::Customer => "CustomerVO",
            EntityKind::Policy => "SoftwarePolicyVO",
            EntityKind::Script => "ServerScriptVO",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Server => "server",
            EntityKind::Customer => "customer",
            EntityKind::Policy => "policy",
            EntityKind::Script => "script",
        })
    }
}

/// Search filter passed to the `find*Refs` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub expression: String,
    pub object_type: &'static str,
}

/// Result of resolving a reference: the remote object id plus its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntity {
    pub id: i64,
    pub name: String,
}

impl ResolvedEntity {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Reads an object reference (`{id, name}`) from a response tree.
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = json_i64(value, "id")?;
        Some(Self::new(id, json_str(value, "name")))
    }
}

/* ---- Jobs ---- */

/// Handle returned by a job-producing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub job_type: String,
}

impl Job {
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = json_i64(value, "id").or_else(|| json_i64(value, "idAsLong"))?;
        Some(Self {
            id,
            name: json_str(value, "name"),
            job_type: json_str(value, "secureResourceTypeName"),
        })
    }
}

/// Remote job status codes, in wire ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatusCode {
    Aborted,
    Active,
    Canceled,
    Deleted,
    Failure,
    Pending,
    Success,
    Unknown,
    Warning,
    Tampered,
    Stale,
    Blocked,
    Recurring,
    Expired,
    Zombie,
    Terminating,
    Terminated,
}

impl JobStatusCode {
    /// Every code, indexed by its wire ordinal.
    pub const ALL: [JobStatusCode; 17] = [
        JobStatusCode::Aborted,
        JobStatusCode::Active,
        JobStatusCode::Canceled,
        JobStatusCode::Deleted,
        JobStatusCode::Failure,
        JobStatusCode::Pending,
        JobStatusCode::Success,
        JobStatusCode::Unknown,
        JobStatusCode::Warning,
        JobStatusCode::Tampered,
        JobStatusCode::Stale,
        JobStatusCode::Blocked,
        JobStatusCode::Recurring,
        JobStatusCode::Expired,
        JobStatusCode::Zombie,
        JobStatusCode::Terminating,
        JobStatusCode::Terminated,
    ];

    /// Codes that keep the monitor polling. Anything not listed is terminal.
    pub const IN_PROGRESS: &'static [JobStatusCode] = &[JobStatusCode::Active];

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Maps the raw wire value (decimal ordinal) to a code.
    pub fn from_wire(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().and_then(Self::from_ordinal)
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn is_terminal(self) -> bool {
        !Self::IN_PROGRESS.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatusCode::Aborted => "ABORTED",
            JobStatusCode::Active => "ACTIVE",
            JobStatusCode::Canceled => "CANCELED",
            JobStatusCode::Deleted => "DELETED",
            JobStatusCode::Failure => "FAILURE",
            JobStatusCode::Pending => "PENDING",
            JobStatusCode::Success => "SUCCESS",
            JobStatusCode::Unknown => "UNKNOWN",
            JobStatusCode::Warning => "WARNING",
            JobStatusCode::Tampered => "TAMPERED",
            JobStatusCode::Stale => "STALE",
            JobStatusCode::Blocked => "BLOCKED",
            JobStatusCode::Recurring => "RECURRING",
            JobStatusCode::Expired => "EXPIRED",
            JobStatusCode::Zombie => "ZOMBIE",
            JobStatusCode::Terminating => "TERMINATING",
            JobStatusCode::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for JobStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.ordinal())
    }
}

/// One observation of a job's state (`JobService.getJobInfoVO`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    /// Status exactly as received; see [`JobStatus::code`].
    pub raw_code: String,
    pub job_type: String,
    pub description: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub blocked_reason: String,
    pub canceled_reason: String,
    pub schedule: String,
    pub notification: String,
}

impl JobStatus {
    pub fn from_json(value: &Value) -> Self {
        Self {
            raw_code: json_str(value, "status"),
            job_type: json_str(value, "type"),
            description: json_str(value, "description"),
            start_time: parse_timestamp(&json_str(value, "startDate")),
            end_time: parse_timestamp(&json_str(value, "endDate")),
            blocked_reason: json_str(value, "blockedReason"),
            canceled_reason: json_str(value, "canceledReason"),
            schedule: json_str(value, "schedule"),
            notification: json_str(value, "notification"),
        }
    }

    pub fn code(&self) -> Option<JobStatusCode> {
        JobStatusCode::from_wire(&self.raw_code)
    }

    /// `end - start` in whole seconds; negative when the end precedes the start.
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

/// Tail of a finished script job's output on one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptOutput {
    pub exit_code: String,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn from_json(value: &Value) -> Self {
        Self {
            exit_code: json_str(value, "exitCode"),
            stdout: json_str(value, "tailStdout"),
            stderr: json_str(value, "tailStderr"),
        }
    }
}

/// `%Y-%m-%d %H:%M:%S` (UTC), empty when absent.
pub fn display_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/* ---- JSON helpers ---- */

/// String field of an object; empty when missing or not a scalar.
pub fn json_str(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Integer field of an object, accepting numeric strings.
pub fn json_i64(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Normalizes a possibly-singular response node into a list.
///
/// The codec folds repeated elements into arrays, so a one-element result
/// comes back as a bare object and an empty one as `""` or `null`.
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        // `<return><item>..</item></return>` wrapper
        Value::Object(map) if map.len() == 1 && map.contains_key("item") => as_list(&map["item"]),
        Value::Object(_) => vec![value],
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![other],
    }
}

/// Parses a wire timestamp: epoch seconds, epoch milliseconds or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return if n.abs() > 100_000_000_000 {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        };
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ordinals_match_wire_table() {
        let names: Vec<&str> = JobStatusCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            [
                "ABORTED",
                "ACTIVE",
                "CANCELED",
                "DELETED",
                "FAILURE",
                "PENDING",
                "SUCCESS",
                "UNKNOWN",
                "WARNING",
                "TAMPERED",
                "STALE",
                "BLOCKED",
                "RECURRING",
                "EXPIRED",
                "ZOMBIE",
                "TERMINATING",
                "TERMINATED"
            ]
        );
        for (i, code) in JobStatusCode::ALL.iter().enumerate() {
            assert_eq!(code.ordinal(), i);
            assert_eq!(JobStatusCode::from_ordinal(i as i64), Some(*code));
        }
    }

    #[test]
    fn only_active_keeps_polling() {
        let in_progress: Vec<_> = JobStatusCode::ALL
            .iter()
            .filter(|c| !c.is_terminal())
            .collect();
        assert_eq!(in_progress, [&JobStatusCode::Active]);
    }

    #[test]
    fn unknown_wire_values_have_no_code() {
        assert_eq!(JobStatusCode::from_wire("17"), None);
        assert_eq!(JobStatusCode::from_wire("-1"), None);
        assert_eq!(JobStatusCode::from_wire("RUNNING"), None);
        assert_eq!(JobStatusCode::from_wire(" 6 "), Some(JobStatusCode::Success));
    }

    #[test]
    fn status_display_has_name_and_ordinal() {
        assert_eq!(JobStatusCode::Success.to_string(), "SUCCESS(6)");
    }

    #[test]
    fn timestamps_in_all_wire_forms() {
        let secs = parse_timestamp("1486000000").unwrap();
        let millis = parse_timestamp("1486000000000").unwrap();
        let rfc = parse_timestamp("2017-02-02T01:46:40Z").unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs, rfc);
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(display_time(Some(secs)), "2017-02-02 01:46:40");
        assert_eq!(display_time(None), "");
    }

    #[test]
    fn duration_can_be_negative() {
        let mut status = JobStatus::from_json(&json!({
            "status": "6",
            "startDate": "1000",
            "endDate": "1042"
        }));
        assert_eq!(status.duration_secs(), Some(42));
        status.end_time = parse_timestamp("990");
        assert_eq!(status.duration_secs(), Some(-10));
        status.end_time = None;
        assert_eq!(status.duration_secs(), None);
    }

    #[test]
    fn as_list_normalizes_shapes() {
        let many = json!([{"id":"1"},{"id":"2"}]);
        assert_eq!(as_list(&many).len(), 2);
        let one = json!({"id":"1","name":"web01"});
        assert_eq!(as_list(&one).len(), 1);
        let wrapped = json!({"item":[{"id":"1"},{"id":"2"}]});
        assert_eq!(as_list(&wrapped).len(), 2);
        assert!(as_list(&json!("")).is_empty());
        assert!(as_list(&Value::Null).is_empty());
    }

    #[test]
    fn resolved_entity_from_ref() {
        let r = ResolvedEntity::from_json(&json!({"id":"1234","name":"web01"})).unwrap();
        assert_eq!(r, ResolvedEntity::new(1234, "web01"));
        assert!(ResolvedEntity::from_json(&json!({"name":"no id"})).is_none());
    }

    #[test]
    fn job_from_ref() {
        let job = Job::from_json(&json!({
            "id": "9001",
            "name": "Run Script",
            "secureResourceTypeName": "job"
        }))
        .unwrap();
        assert_eq!(job.id, 9001);
        assert_eq!(job.job_type, "job");
    }
}
