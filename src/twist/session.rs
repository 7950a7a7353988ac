//! Authenticated session against the platform's SOAP services.
//!
//! The HTTP client is async (reqwest); the session owns a Tokio runtime and
//! exposes blocking methods so each call is one synchronous round trip.

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use super::model::{
    EntityKind, Filter, Job, JobStatus, ResolvedEntity, ScriptOutput, as_list, json_str,
};
use super::soap::{self, Arg, Call, Service};
use super::{Inventory, JobService, Operations};
use crate::error::TwistError;
use crate::utils::config::{Credentials, Settings};

pub struct Session {
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
    base: Url,
    credentials: Credentials,
}

impl Session {
    /// Build the session. No request is sent until the first call.
    pub fn open(settings: &Settings, credentials: Credentials) -> Result<Self> {
        let base = settings.endpoint()?.clone();
        let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .user_agent(concat!("twist/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        debug!(endpoint = %base, user = %credentials.user, "session opened");
        Ok(Self {
            runtime,
            http,
            base,
            credentials,
        })
    }

    /// Perform one SOAP call and return its `return` payload.
    pub fn invoke(&self, call: Call) -> Result<Value, TwistError> {
        let label = call.label();
        debug!(call = %label, args = call.args.len(), "soap call");
        self.runtime.block_on(self.invoke_async(&call, &label))
    }

    async fn invoke_async(&self, call: &Call, label: &str) -> Result<Value, TwistError> {
        let url = self
            .base
            .join(&call.service.path())
            .map_err(|e| TwistError::remote(label, e.to_string()))?;

        let response = self
            .http
            .post(url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", call.soap_action())
            .body(soap::envelope(call))
            .send()
            .await
            .map_err(|e| TwistError::remote(label, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TwistError::remote(label, e.to_string()))?;
        trace!(call = %label, %status, bytes = body.len(), "soap response");

        // Faults usually arrive with HTTP 500; prefer the fault text when present.
        match soap::parse_response(label, &body) {
            Ok(value) if status.is_success() => Ok(value),
            Ok(_) => Err(TwistError::remote(label, format!("HTTP {status}"))),
            Err(TwistError::MalformedResponse { .. }) if !status.is_success() => {
                Err(TwistError::remote(label, format!("HTTP {status}")))
            }
            Err(e) => Err(e),
        }
    }

    fn job_from(&self, call: Call) -> Result<Job, TwistError> {
        let label = call.label();
        let value = self.invoke(call)?;
        Job::from_json(&value).ok_or_else(|| TwistError::malformed(label, "no job reference"))
    }

    fn policy_membership(
        &self,
        method: &'static str,
        policies: &[i64],
        servers: &[i64],
    ) -> Result<(), TwistError> {
        self.invoke(
            Call::new(Service::SoftwarePolicy, method)
                .arg("policies", Arg::Refs(policies.to_vec()))
                .arg("attachables", Arg::Refs(servers.to_vec())),
        )
        .map(drop)
    }
}

impl Operations for Session {
    /* ---- Value objects ---- */

    fn value_object(&self, kind: EntityKind, id: i64) -> Result<Value, TwistError> {
        self.invoke(Call::new(kind.service(), kind.vo_method()).arg("self", Arg::Ref(id)))
    }

    /* ---- Custom attributes ---- */

    fn custom_attributes(
        &self,
        server: i64,
        use_scope: bool,
    ) -> Result<Vec<(String, String)>, TwistError> {
        let value = self.invoke(
            Call::new(Service::Server, "getCustAttrs")
                .arg("self", Arg::Ref(server))
                .arg("keys", Arg::Nil)
                .arg("useScope", Arg::Bool(use_scope)),
        )?;
        Ok(as_list(&value)
            .into_iter()
            .map(|entry| (json_str(entry, "key"), json_str(entry, "value")))
            .filter(|(k, _)| !k.is_empty())
            .collect())
    }

    fn custom_attribute(&self, server: i64, key: &str, use_scope: bool) -> Result<String, TwistError> {
        let value = self.invoke(
            Call::new(Service::Server, "getCustAttr")
                .arg("self", Arg::Ref(server))
                .arg("key", Arg::Text(key.to_string()))
                .arg("useScope", Arg::Bool(use_scope)),
        )?;
        Ok(match value {
            Value::String(s) => s,
            _ => String::new(),
        })
    }

    fn set_custom_attribute(&self, server: i64, key: &str, value: &str) -> Result<(), TwistError> {
        self.invoke(
            Call::new(Service::Server, "setCustAttr")
                .arg("self", Arg::Ref(server))
                .arg("key", Arg::Text(key.to_string()))
                .arg("value", Arg::Text(value.to_string())),
        )
        .map(drop)
    }

    fn remove_custom_attribute(&self, server: i64, key: &str) -> Result<(), TwistError> {
        self.invoke(
            Call::new(Service::Server, "removeCustAttr")
                .arg("self", Arg::Ref(server))
                .arg("key", Arg::Text(key.to_string())),
        )
        .map(drop)
    }

    /* ---- Server lifecycle ---- */

    fn decommission(&self, server: i64) -> Result<(), TwistError> {
        self.invoke(Call::new(Service::Server, "decommission").arg("self", Arg::Ref(server)))
            .map(drop)
    }

    fn remove_server(&self, server: i64) -> Result<(), TwistError> {
        self.invoke(Call::new(Service::Server, "remove").arg("self", Arg::Ref(server)))
            .map(drop)
    }

    fn set_customer(&self, server: i64, customer: i64) -> Result<(), TwistError> {
        self.invoke(
            Call::new(Service::Server, "setCustomer")
                .arg("self", Arg::Ref(server))
                .arg("customer", Arg::Ref(customer)),
        )
        .map(drop)
    }

    fn run_comm_test(&self, servers: &[i64]) -> Result<Job, TwistError> {
        self.job_from(
            Call::new(Service::Server, "runAgentCommTest")
                .arg("selves", Arg::Refs(servers.to_vec())),
        )
    }

    /* ---- Software policies ---- */

    fn attach_policies(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError> {
        self.policy_membership("attachToPolicies", policies, servers)
    }

    fn detach_policies(&self, policies: &[i64], servers: &[i64]) -> Result<(), TwistError> {
        self.policy_membership("detachFromPolicies", policies, servers)
    }

    fn remove_policy_associations(
        &self,
        policies: &[i64],
        servers: &[i64],
    ) -> Result<(), TwistError> {
        self.policy_membership("removePolicyAssociations", policies, servers)
    }

    fn start_remediation(&self, policies: &[i64], server: i64) -> Result<Job, TwistError> {
        self.job_from(
            Call::new(Service::SoftwarePolicy, "startRemediateNow")
                .arg("policies", Arg::Refs(policies.to_vec()))
                .arg("attachable", Arg::Ref(server)),
        )
    }

    /* ---- Server scripts ---- */

    fn start_script(&self, script: i64, servers: &[i64]) -> Result<Job, TwistError> {
        self.job_from(
            Call::new(Service::ServerScript, "startServerScript")
                .arg("self", Arg::Ref(script))
                .arg(
                    "args",
                    Arg::Struct(vec![("targets", Arg::Refs(servers.to_vec()))]),
                )
                .arg("userTag", Arg::Text(String::new()))
                .arg("notificationSpec", Arg::Nil)
                .arg("schedule", Arg::Nil),
        )
    }

    fn script_output(&self, job: &Job, server: i64) -> Result<ScriptOutput, TwistError> {
        let value = self.invoke(
            Call::new(Service::ServerScript, "getServerScriptJobOutput")
                .arg("job", Arg::Ref(job.id))
                .arg("server", Arg::Ref(server)),
        )?;
        Ok(ScriptOutput::from_json(&value))
    }

    /* ---- Search ---- */

    fn searchable_types(&self) -> Result<Vec<String>, TwistError> {
        let value = self.invoke(Call::new(Service::Search, "getSearchableTypes"))?;
        Ok(as_list(&value)
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }
}

impl Inventory for Session {
    fn find_refs(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<ResolvedEntity>, TwistError> {
        let call = Call::new(kind.service(), kind.find_method()).arg("filter", Arg::Filter(filter.clone()));
        let label = call.label();
        let value = self.invoke(call)?;
        as_list(&value)
            .into_iter()
            .map(|r| {
                ResolvedEntity::from_json(r)
                    .ok_or_else(|| TwistError::malformed(&label, "reference without id"))
            })
            .collect()
    }

    fn get_by_id(&self, kind: EntityKind, id: i64) -> Result<ResolvedEntity, TwistError> {
        let vo = self.value_object(kind, id)?;
        Ok(ResolvedEntity::new(id, json_str(&vo, "name")))
    }
}

impl JobService for Session {
    fn fetch_status(&self, job: &Job) -> Result<JobStatus, TwistError> {
        let value = self.invoke(Call::new(Service::Job, "getJobInfoVO").arg("self", Arg::Ref(job.id)))?;
        Ok(JobStatus::from_json(&value))
    }
}
