//! Remote object API binding.
//!
//! parse_endpoint -> Url (base of the `osapi` SOAP services)
//! Session        -> one authenticated connection per process, blocking calls
//! Inventory / JobService traits -> the seams the resolver and monitor use
//! Operations     -> value objects, mutations and job submission
//! Remote         -> everything a subcommand needs (blanket over the three)
//!
use anyhow::{Context, Result, bail};
use url::Url;

pub mod model;
mod session;
pub mod soap;

pub use session::Session;

use crate::error::TwistError;
use model::{EntityKind, Filter, Job, JobStatus, ResolvedEntity, ScriptOutput};
use serde_json::Value;

/// Read-only lookups used by entity resolution.
#[cfg_attr(test, mockall::automock)]
pub trait Inventory {
    /// Pattern search; results come back in the service's order.
    fn find_refs(&self, kind: EntityKind, filter: &Filter)
    -> Result<Vec<ResolvedEntity>, TwistError>;

    /// Direct fetch of one object by numeric id.
    fn get_by_id(&self, kind: EntityKind, id: i64) -> Result<ResolvedEntity, TwistError>;
}

/// Job status polling.
#[cfg_attr(test, mockall::automock)]
pub trait JobService {
    fn fetch_status(&self, job: &Job) -> Result<JobStatus, TwistError>;
}

/// Reads, mutations and job submissions issued by the subcommands once the
/// targets are resolved.
pub trait Operations {
    /// Fully populated value object for `--detail` / `--dump`.
    fn value_object(&self, kind: EntityKind, id: i64) -> Result<Value, TwistError>;

    fn custom_attributes(
        &self,
        server: i64,
        use_scope: bool,
    ) -> Result<Vec<(String, String)>, TwistError>;
    fn custom_attribute(&self, server: i64, key: &str, use_scope: bool) -> Result<String, TwistError>;
    fn set_custom_attribute(&self, server: i64, key: &str, value: &str) -> Result<(), TwistError>;
    fn remove_custom_attribute(&self, server: i64, key: &str) -> Result<(), TwistError>;

    fn decommission(&self, server: i64) -> Result<(), TwistError>;
    fn remove_server(&self, server: i64) -> Result<(), TwistError>;
    fn set_customer(&self, server: i64, customer: i64) -> Result<(), TwistError>;
    fn run_comm_test(&self, servers: &[i64]) -> Result<Job, TwistError>;

    fn attach_policies(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError>;
    fn detach_policies(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError>;
    fn remove_policy_associations(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError>;
    fn start_remediation(&self, policies: &[i64], server: i64) -> Result<Job, TwistError>;

    fn start_script(&self, script: i64, servers: &[i64]) -> Result<Job, TwistError>;
    fn script_output(&self, job: &Job, server: i64) -> Result<ScriptOutput, TwistError>;

    fn searchable_types(&self) -> Result<Vec<String>, TwistError>;
}

/// The full remote surface a subcommand runs against.
pub trait Remote: Inventory + JobService + Operations {}

impl<T: Inventory + JobService + Operations + ?Sized> Remote for T {}

// One mock carrying all three seams, for subcommand-level tests.
#[cfg(test)]
mockall::mock! {
    pub Core {}

    impl Inventory for Core {
        fn find_refs(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<ResolvedEntity>, TwistError>;
        fn get_by_id(&self, kind: EntityKind, id: i64) -> Result<ResolvedEntity, TwistError>;
    }

    impl JobService for Core {
        fn fetch_status(&self, job: &Job) -> Result<JobStatus, TwistError>;
    }

    impl Operations for Core {
        fn value_object(&self, kind: EntityKind, id: i64) -> Result<Value, TwistError>;
        fn custom_attributes(&self, server: i64, use_scope: bool) -> Result<Vec<(String, String)>, TwistError>;
        fn custom_attribute(&self, server: i64, key: &str, use_scope: bool) -> Result<String, TwistError>;
        fn set_custom_attribute(&self, server: i64, key: &str, value: &str) -> Result<(), TwistError>;
        fn remove_custom_attribute(&self, server: i64, key: &str) -> Result<(), TwistError>;
        fn decommission(&self, server: i64) -> Result<(), TwistError>;
        fn remove_server(&self, server: i64) -> Result<(), TwistError>;
        fn set_customer(&self, server: i64, customer: i64) -> Result<(), TwistError>;
        fn run_comm_test(&self, servers: &[i64]) -> Result<Job, TwistError>;
        fn attach_policies(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError>;
        fn detach_policies(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError>;
        fn remove_policy_associations(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError>;
        fn start_remediation(&self, policies: &[i64], server: i64) -> Result<Job, TwistError>;
        fn start_script(&self, script: i64, servers: &[i64]) -> Result<Job, TwistError>;
        fn script_output(&self, job: &Job, server: i64) -> Result<ScriptOutput, TwistError>;
        fn searchable_types(&self) -> Result<Vec<String>, TwistError>;
    }
}

/// Parse a user-supplied endpoint into the base URL of the SOAP services.
///
/// Accepts `https://core.example.com`, `https://core.example.com:1032/`
/// or a URL already ending in `/osapi`. Only http and https are allowed.
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("Endpoint string is empty");
    }

    let mut url =
        Url::parse(trimmed).with_context(|| format!("Failed to parse endpoint '{trimmed}'"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => bail!("Unsupported endpoint scheme '{other}' (expected http or https)"),
    }
    if url.host_str().is_none_or(str::is_empty) {
        bail!("Endpoint '{trimmed}' has no host");
    }

    let mut path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with("/osapi") {
        path.push_str("/osapi");
    }
    path.push('/');
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_osapi_base() {
        let url = parse_endpoint("https://core.example.com").unwrap();
        assert_eq!(url.as_str(), "https://core.example.com/osapi/");
    }

    #[test]
    fn existing_osapi_path_kept() {
        let url = parse_endpoint("https://core.example.com:1032/osapi/").unwrap();
        assert_eq!(url.as_str(), "https://core.example.com:1032/osapi/");
        let url = parse_endpoint(" http://10.0.0.5/osapi ").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.5/osapi/");
    }

    #[test]
    fn service_path_joins_under_base() {
        let base = parse_endpoint("https://core.example.com").unwrap();
        let url = base
            .join(&soap::Service::Server.path())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://core.example.com/osapi/com/opsware/server/ServerService"
        );
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = parse_endpoint("ftp://core.example.com").unwrap_err();
        assert!(err.to_string().contains("Unsupported endpoint scheme"));
    }

    #[test]
    fn empty_endpoint_rejected() {
        let err = parse_endpoint("   ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
