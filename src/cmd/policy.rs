/*!
`policy.rs`

Implements `twist policy`.

  --list   NAME|OID                  list software policies
  --attach NAME|OID <server ref>     attach, start remediation, follow the job
  --remove NAME|OID <server ref>     detach, remediate, remove the association

Attach and remove act on exactly one policy and one server. Multi-step
operations are not rolled back: a failure part way leaves the core in
whatever state the failed call produced.
*/

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::Value;
use tracing::{info, warn};

use crate::cmd::format::{field, rule};
use crate::cmd::shared::{Context, ServerRefArgs, print_dump, print_listing, resolve_and_list};
use crate::resolve::{EntityReference, Resolver, require_single};
use crate::twist::{Operations, Remote};
use crate::twist::model::{
    EntityKind, ResolvedEntity, display_time, json_str, parse_timestamp,
};

const PARTIAL_FAILURE_NOTE: &str = "\
Attach and remove are multi-step operations and are not rolled back: if a
step fails, the policy association and remediation are left as the failed
call produced them.";

/// CLI arguments for `twist policy`
#[derive(Args, Debug)]
#[command(
    group(clap::ArgGroup::new("action").args(["list", "attach", "remove"]).required(true)),
    after_help = PARTIAL_FAILURE_NOTE
)]
pub struct PolicyArgs {
    /// List software policies matching NAME (or the object id OID)
    #[arg(long, value_name = "NAME|OID")]
    pub list: Option<String>,

    /// Attach the policy to one server and remediate
    #[arg(long, visible_alias = "policy", value_name = "NAME|OID", requires = "server_ref")]
    pub attach: Option<String>,

    /// Detach the policy from one server, remediate and remove the association
    #[arg(long, visible_alias = "del", value_name = "NAME|OID", requires = "server_ref")]
    pub remove: Option<String>,

    #[command(flatten)]
    pub target: ServerRefArgs,

    /// Show a detail block per policy
    #[arg(long)]
    pub detail: bool,

    /// Dump raw policy value objects as JSON
    #[arg(long)]
    pub dump: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

/// Entry point for the policy subcommand.
pub fn execute_policy(ctx: &Context, args: PolicyArgs) -> Result<()> {
    if let Some(raw) = &args.list {
        let reference = EntityReference::name_or_id(EntityKind::Policy, raw)?;
        let session = ctx.connect()?;
        let policies = Resolver::new(&session).resolve(&reference)?;
        return show_policies(ctx, &session, &policies, args.detail, args.dump);
    }

    let (raw, attach) = match (&args.attach, &args.remove) {
        (Some(raw), _) => (raw, true),
        (None, Some(raw)) => (raw, false),
        (None, None) => anyhow::bail!("one of --list, --attach or --remove is required"),
    };
    let policy_ref = EntityReference::name_or_id(EntityKind::Policy, raw)?;
    let server_ref = args.target.require()?;

    let session = ctx.connect()?;
    change_policy(ctx, &session, &policy_ref, &server_ref, attach, args.force)
}

fn change_policy<R: Remote + ?Sized>(
    ctx: &Context,
    session: &R,
    policy_ref: &EntityReference,
    server_ref: &EntityReference,
    attach: bool,
    force: bool,
) -> Result<()> {
    let policies = resolve_and_list(ctx, session, policy_ref)?;
    let policy = require_single(EntityKind::Policy, &policies)?;
    let servers = resolve_and_list(ctx, session, server_ref)?;
    let server = require_single(EntityKind::Server, &servers)?;

    if attach {
        attach_policy(ctx, session, policy, server, force)
    } else {
        remove_policy(ctx, session, policy, server, force)
    }
}

fn attach_policy<R: Remote + ?Sized>(
    ctx: &Context,
    session: &R,
    policy: &ResolvedEntity,
    server: &ResolvedEntity,
    force: bool,
) -> Result<()> {
    ctx.confirm(
        &format!(
            "Attach policy '{}' to server '{}' and remediate now?",
            policy.name, server.name
        ),
        force,
    )?;
    ctx.say("Attaching policy...");
    info!(policy = policy.id, server = server.id, "attaching policy");
    session.attach_policies(&[policy.id], &[server.id])?;
    let job = session
        .start_remediation(&[policy.id], server.id)
        .context("remediation job has not been created")?;
    ctx.run_job(session, &job, server)?;
    Ok(())
}

fn remove_policy<R: Remote + ?Sized>(
    ctx: &Context,
    session: &R,
    policy: &ResolvedEntity,
    server: &ResolvedEntity,
    force: bool,
) -> Result<()> {
    ctx.confirm(
        &format!(
            "Detach policy '{}' from server '{}', remediate and remove the association?",
            policy.name, server.name
        ),
        force,
    )?;
    ctx.say("Detaching policy...");
    info!(policy = policy.id, server = server.id, "detaching policy");

    // The association is removed even when remediation cannot be started.
    let started = session
        .detach_policies(&[policy.id], &[server.id])
        .and_then(|()| session.start_remediation(&[policy.id], server.id));
    match started {
        Ok(job) => {
            ctx.run_job(session, &job, server)?;
        }
        Err(e) => {
            warn!(policy = policy.id, server = server.id, error = %e, "remediation not started");
            eprintln!("#- Job has not been created !");
            eprintln!("#- {e}");
        }
    }

    ctx.say("Removing policy association ...");
    info!(policy = policy.id, server = server.id, "removing policy association");
    session
        .remove_policy_associations(&[policy.id], &[server.id])
        .context("policy association not removed")?;
    ctx.say("Policy association removed.");
    Ok(())
}

fn show_policies<O: Operations + ?Sized>(
    ctx: &Context,
    session: &O,
    policies: &[ResolvedEntity],
    detail: bool,
    dump: bool,
) -> Result<()> {
    if !(detail || dump) {
        return print_listing(ctx, EntityKind::Policy, policies);
    }
    for policy in policies {
        let vo = session.value_object(EntityKind::Policy, policy.id)?;
        if dump || ctx.json {
            print_dump(&vo)?;
        } else {
            for line in policy_detail(&vo) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn policy_detail(vo: &Value) -> Vec<String> {
    let time = |key: &str| display_time(parse_timestamp(&json_str(vo, key)));
    vec![
        field("Policy Name", json_str(vo, "name")),
        field("Locked", json_str(vo, "locked")),
        field("Life Cycle", json_str(vo, "lifecycle")),
        field("Template", json_str(vo, "template")),
        field("Manual Uninstall", json_str(vo, "manualUninstall")),
        field("Policy Type", json_str(vo, "softwarePolicyType")),
        field("Created", time("createdDate")),
        field("Created By", json_str(vo, "createdBy")),
        field("Modified", time("modifiedDate")),
        field("Modified By", json_str(vo, "modifiedBy")),
        field("Description", json_str(vo, "description")),
        rule(None),
    ]
}
