/*!
shared.rs - helpers shared by the subcommands.

Focus:
  - Context: settings + output mode, built once in `main`
  - ServerRefArgs: the mutually exclusive server reference flags
  - listing / detail / dump printing
  - confirmation before destructive calls
  - run_job: job header, progress lines and the terminal report
*/

use std::io::IsTerminal;

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::{Value, json};
use tracing::info;

use crate::cmd::format::{StyleOptions, field, listing, rule};
use crate::error::TwistError;
use crate::monitor::{JobMonitor, JobOutcome, JobReport, progress_line};
use crate::resolve::{EntityReference, Query, Resolver};
use crate::twist::{Inventory, JobService, Operations, Session};
use crate::twist::model::{EntityKind, Job, ResolvedEntity, json_str};
use crate::utils::config::{Credentials, Settings};
#[cfg(test)]
use crate::utils::config::{FileConfig, Overrides};

/* ---- Context ---- */

/// Per-invocation state handed to every subcommand.
#[derive(Debug)]
pub struct Context {
    pub settings: Settings,
    pub json: bool,
    pub quiet: bool,
    pub style: StyleOptions,
}

impl Context {
    /// Credentials first, then the session; no request is sent here.
    pub fn connect(&self) -> Result<Session> {
        let credentials = Credentials::from_env(&self.settings.profile)?;
        Session::open(&self.settings, credentials)
    }

    /// Human-readable chatter is suppressed by `--quiet` and `--json`.
    pub fn chatty(&self) -> bool {
        !self.quiet && !self.json
    }

    /// Print a line in human mode only.
    pub fn say(&self, line: impl AsRef<str>) {
        if self.chatty() {
            println!("{}", line.as_ref());
        }
    }

    /// Ask before a destructive call. `--force` skips the prompt; without a
    /// terminal the answer is no.
    pub fn confirm(&self, prompt: &str, force: bool) -> Result<()> {
        if force {
            return Ok(());
        }
        if !std::io::stdin().is_terminal() {
            anyhow::bail!(TwistError::Declined);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("confirmation prompt failed")?;
        if confirmed {
            Ok(())
        } else {
            Err(TwistError::Declined.into())
        }
    }

    /// Plain-text context with no poll delay, for subcommand tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let overrides = Overrides {
            poll_interval_secs: Some(0),
            ..Default::default()
        };
        Context {
            settings: Settings::resolve(FileConfig::default(), overrides)
                .expect("default settings resolve"),
            json: false,
            quiet: false,
            style: StyleOptions::plain(),
        }
    }

    /// Print the job header, follow the job until it is terminal, print the report.
    pub fn run_job<J: JobService + ?Sized>(
        &self,
        service: &J,
        job: &Job,
        server: &ResolvedEntity,
    ) -> Result<JobOutcome> {
        info!(job = job.id, server = server.id, "monitoring job");
        if self.chatty() {
            println!("{}", field("Job OID", job.id.to_string()));
            println!("{}", field("Job Name", &job.name));
            println!("{}", field("Job Type", &job.job_type));
            println!("{}", rule(None));
        }

        let show_progress = !self.json;
        let outcome = JobMonitor::new(service, self.settings.poll_interval)
            .with_timeout(self.settings.job_timeout)
            .watch(job, |poll, code| {
                if show_progress {
                    println!("{}", progress_line(poll, code, job, &server.name));
                }
            })?;

        info!(job = job.id, polls = outcome.polls, status = %outcome.code, "job finished");
        let report = JobReport::new(&outcome);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", rule(Some("Result")));
            for (label, value) in report.lines() {
                println!("{}", field(label, value));
            }
        }
        Ok(outcome)
    }
}

/* ---- Server reference flags ---- */

/// Server selection. At most one flag may be given.
#[derive(Args, Debug, Clone, Default)]
#[group(id = "server_ref", multiple = false)]
pub struct ServerRefArgs {
    /// Server name pattern (`%` wildcard)
    #[arg(long, value_name = "PATTERN")]
    pub name: Option<String>,

    /// Hostname pattern
    #[arg(long, value_name = "PATTERN")]
    pub host: Option<String>,

    /// Interface or management IP address
    #[arg(long, visible_alias = "ip", value_name = "IP")]
    pub addr: Option<String>,

    /// Free text matched against name, hostname and both IPs; digits only = object id
    #[arg(long, visible_aliases = ["on", "search"], value_name = "TEXT")]
    pub server: Option<String>,

    /// Server object id
    #[arg(long, value_name = "OID")]
    pub oid: Option<i64>,
}

impl ServerRefArgs {
    pub fn reference(&self) -> Result<Option<EntityReference>, TwistError> {
        let kind = EntityKind::Server;
        let reference = if let Some(v) = &self.name {
            EntityReference::new(kind, Query::Name(v.clone()))?
        } else if let Some(v) = &self.host {
            EntityReference::new(kind, Query::Host(v.clone()))?
        } else if let Some(v) = &self.addr {
            EntityReference::new(kind, Query::Address(v.clone()))?
        } else if let Some(v) = &self.server {
            EntityReference::any_or_id(kind, v)?
        } else if let Some(id) = self.oid {
            EntityReference::new(kind, Query::Id(id))?
        } else {
            return Ok(None);
        };
        Ok(Some(reference))
    }

    pub fn require(&self) -> Result<EntityReference, TwistError> {
        self.reference()?.ok_or_else(|| {
            TwistError::InvalidReference(
                "a server reference is required (--name, --host, --addr, --server or --oid)".into(),
            )
        })
    }

    /// The flag as typed, for replayable command lines (`--name "web01"`).
    pub fn replay_flag(&self) -> Option<String> {
        let (flag, value) = if let Some(v) = &self.name {
            ("--name", v.clone())
        } else if let Some(v) = &self.host {
            ("--host", v.clone())
        } else if let Some(v) = &self.addr {
            ("--addr", v.clone())
        } else if let Some(v) = &self.server {
            ("--server", v.clone())
        } else {
            ("--oid", self.oid?.to_string())
        };
        Some(format!("{flag} {}", crate::resolve::quote(&value)))
    }
}

/* ---- Resolution + printing ---- */

/// Resolve a reference and print the candidates (`<kind> <id> = <name>`).
pub fn resolve_and_list<I: Inventory + ?Sized>(
    ctx: &Context,
    inventory: &I,
    reference: &EntityReference,
) -> Result<Vec<ResolvedEntity>> {
    let found = Resolver::new(inventory).resolve(reference)?;
    if ctx.chatty() {
        for entity in &found {
            println!("{}", listing(reference.kind, entity));
        }
    }
    Ok(found)
}

/// Listing output for list-only paths; JSON mode prints an array instead.
pub fn print_listing(ctx: &Context, kind: EntityKind, entities: &[ResolvedEntity]) -> Result<()> {
    if ctx.json {
        let items = json!({ "kind": kind, "count": entities.len(), "items": entities });
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for entity in entities {
            println!("{}", listing(kind, entity));
        }
    }
    Ok(())
}

/// Raw value object (`--dump`), always JSON.
pub fn print_dump(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--detail` block for one server.
fn print_server_detail<O: Operations + ?Sized>(remote: &O, server: &ResolvedEntity) -> Result<()> {
    let vo = remote.value_object(EntityKind::Server, server.id)?;
    println!("{}", field("Object ID", server.id.to_string()));
    println!("{}", field("Management IP", json_str(&vo, "managementIP")));
    println!("{}", field("Name", json_str(&vo, "name")));
    println!("{}", field("OS Version", json_str(&vo, "osVersion")));
    println!("{}", field("Customer", json_str(&vo["customer"], "name")));
    println!();
    Ok(())
}

/// Detail / dump / plain listing for each server, per the output flags.
pub fn show_servers<O: Operations + ?Sized>(
    ctx: &Context,
    remote: &O,
    servers: &[ResolvedEntity],
    detail: bool,
    dump: bool,
) -> Result<()> {
    if dump {
        for server in servers {
            print_dump(&remote.value_object(EntityKind::Server, server.id)?)?;
        }
    } else if detail {
        for server in servers {
            print_server_detail(remote, server)?;
        }
    } else {
        print_listing(ctx, EntityKind::Server, servers)?;
    }
    Ok(())
}
