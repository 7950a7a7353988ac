//! Error taxonomy shared by every subcommand.
//!
//! Subcommands return `anyhow::Result<()>`; `main` downcasts to [`TwistError`]
//! to choose the process exit code. Nothing here is retried.

use std::time::Duration;

use thiserror::Error;

use crate::twist::model::{EntityKind, ResolvedEntity};

#[derive(Debug, Error)]
pub enum TwistError {
    #[error("ENV[{variable}] not found or incomplete (expected USER%PASSWORD)")]
    CredentialMissing { variable: String },

    #[error("no endpoint configured (use --endpoint, TWIST_ENDPOINT or the config file)")]
    ConfigMissing,

    #[error("None {role} found !")]
    EmptyResult { role: EntityKind },

    #[error("More than one {role} found: {} !", candidate_list(.candidates))]
    AmbiguousResult {
        role: EntityKind,
        candidates: Vec<ResolvedEntity>,
    },

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("{call} failed: {message}")]
    RemoteCallFailed { call: String, message: String },

    #[error("{call}: malformed response: {message}")]
    MalformedResponse { call: String, message: String },

    #[error("job {job} reported unknown status code '{code}'")]
    UnknownStatus { job: i64, code: String },

    #[error("job {job} still active after {waited:?}")]
    PollTimeout { job: i64, waited: Duration },

    #[error("communication test could not be started: {0}")]
    CommTestFailed(#[source] Box<TwistError>),

    #[error("operation not confirmed; nothing was changed")]
    Declined,
}

impl TwistError {
    pub fn exit_code(&self) -> i32 {
        match self {
            TwistError::EmptyResult { .. } => 3,
            TwistError::CommTestFailed(_) => 4,
            _ => 1,
        }
    }

    pub fn remote(call: impl Into<String>, message: impl Into<String>) -> Self {
        TwistError::RemoteCallFailed {
            call: call.into(),
            message: message.into(),
        }
    }

    pub fn malformed(call: impl Into<String>, message: impl Into<String>) -> Self {
        TwistError::MalformedResponse {
            call: call.into(),
            message: message.into(),
        }
    }
}

/// `101 = web01, 102 = web01-dr`
fn candidate_list(candidates: &[ResolvedEntity]) -> String {
    candidates
        .iter()
        .map(|c| format!("{} = {}", c.id, c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Exit code for an arbitrary error chain (1 unless a [`TwistError`] says otherwise).
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<TwistError>())
        .map(TwistError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_taxonomy() {
        assert_eq!(TwistError::EmptyResult { role: EntityKind::Server }.exit_code(), 3);
        assert_eq!(
            TwistError::AmbiguousResult {
                role: EntityKind::Policy,
                candidates: vec![ResolvedEntity::new(1, "a"), ResolvedEntity::new(2, "b")],
            }
            .exit_code(),
            1
        );
        assert_eq!(
            TwistError::CredentialMissing {
                variable: "CRED_HPSA".into()
            }
            .exit_code(),
            1
        );
        let inner = TwistError::remote("ServerService.runAgentCommTest", "boom");
        assert_eq!(TwistError::CommTestFailed(Box::new(inner)).exit_code(), 4);
    }

    #[test]
    fn exit_code_found_through_context() {
        let err = anyhow::Error::new(TwistError::EmptyResult {
            role: EntityKind::Customer,
        })
        .context("resolving customer");
        assert_eq!(exit_code_for(&err), 3);
        assert_eq!(exit_code_for(&anyhow::anyhow!("plain")), 1);
    }

    #[test]
    fn messages_name_the_role() {
        let e = TwistError::AmbiguousResult {
            role: EntityKind::Server,
            candidates: vec![
                ResolvedEntity::new(101, "web01"),
                ResolvedEntity::new(102, "web01-dr"),
            ],
        };
        assert_eq!(
            e.to_string(),
            "More than one server found: 101 = web01, 102 = web01-dr !"
        );
        let e = TwistError::EmptyResult {
            role: EntityKind::Policy,
        };
        assert_eq!(e.to_string(), "None policy found !");
    }
}
