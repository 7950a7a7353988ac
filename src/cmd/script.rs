/*!
`script.rs`

Implements `twist script`.

  --script NAME|OID | --script-name NAME | --script-oid OID
      list matching server scripts (`--detail` / `--dump` for more)
  --execute <server reference>
      run the (single) script on exactly one server, follow the job,
      then print the exit code and the tails of stdout / stderr
*/

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::{Value, json};
use tracing::info;

use crate::cmd::format::{field, rule, wrap_text};
use crate::cmd::shared::{Context, ServerRefArgs, print_dump, print_listing, resolve_and_list};
use crate::resolve::{EntityReference, Query, Resolver, require_single};
use crate::twist::{Operations, Remote};
use crate::twist::model::{
    EntityKind, ResolvedEntity, ScriptOutput, display_time, json_str, parse_timestamp,
};

const WRAP_WIDTH: usize = 80;

/// CLI arguments for `twist script`
#[derive(Args, Debug)]
#[command(group(
    clap::ArgGroup::new("script_ref")
        .args(["script", "script_name", "script_oid"])
        .required(true)
))]
pub struct ScriptArgs {
    /// Script name pattern; digits only = object id
    #[arg(long, value_name = "NAME|OID")]
    pub script: Option<String>,

    /// Script name pattern
    #[arg(long, value_name = "NAME")]
    pub script_name: Option<String>,

    /// Script object id
    #[arg(long, value_name = "OID")]
    pub script_oid: Option<i64>,

    /// Run the script on one server and report its output
    #[arg(long, requires = "server_ref")]
    pub execute: bool,

    #[command(flatten)]
    pub target: ServerRefArgs,

    /// Show a detail block per script
    #[arg(long)]
    pub detail: bool,

    /// Dump raw script value objects as JSON
    #[arg(long)]
    pub dump: bool,
}

impl ScriptArgs {
    fn script_reference(&self) -> Result<EntityReference> {
        let kind = EntityKind::Script;
        let reference = match (&self.script, &self.script_name, self.script_oid) {
            (Some(raw), _, _) => EntityReference::name_or_id(kind, raw)?,
            (None, Some(name), _) => EntityReference::new(kind, Query::Name(name.clone()))?,
            (None, None, Some(id)) => EntityReference::new(kind, Query::Id(id))?,
            (None, None, None) => anyhow::bail!("a script reference is required"),
        };
        Ok(reference)
    }
}

/// Entry point for the script subcommand.
pub fn execute_script(ctx: &Context, args: ScriptArgs) -> Result<()> {
    let script_ref = args.script_reference()?;

    if !args.execute {
        let session = ctx.connect()?;
        let scripts = Resolver::new(&session).resolve(&script_ref)?;
        return show_scripts(ctx, &session, &scripts, args.detail, args.dump);
    }

    let server_ref = args.target.require()?;
    let session = ctx.connect()?;
    run_script(ctx, &session, &script_ref, &server_ref)
}

fn run_script<R: Remote + ?Sized>(
    ctx: &Context,
    session: &R,
    script_ref: &EntityReference,
    server_ref: &EntityReference,
) -> Result<()> {
    let scripts = resolve_and_list(ctx, session, script_ref)?;
    let script = require_single(EntityKind::Script, &scripts)?;
    let servers = resolve_and_list(ctx, session, server_ref)?;
    let server = require_single(EntityKind::Server, &servers)?;

    info!(script = script.id, server = server.id, "starting server script");
    let job = session
        .start_script(script.id, &[server.id])
        .context("script job has not been created")?;
    ctx.run_job(session, &job, server)?;

    let output = session.script_output(&job, server.id)?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&json!({ "output": output }))?);
    } else {
        for line in output_lines(&output) {
            println!("{line}");
        }
    }
    Ok(())
}

fn output_lines(output: &ScriptOutput) -> Vec<String> {
    let mut lines = vec![field("Exit code", &output.exit_code)];
    if !output.stdout.is_empty() {
        lines.push(rule(Some("OUTPUT:")));
        lines.push(output.stdout.trim_end().to_string());
    }
    if !output.stderr.is_empty() {
        lines.push(rule(Some("ERROR:")));
        lines.push(output.stderr.trim_end().to_string());
    }
    lines.push(rule(None));
    lines
}

fn show_scripts<O: Operations + ?Sized>(
    ctx: &Context,
    session: &O,
    scripts: &[ResolvedEntity],
    detail: bool,
    dump: bool,
) -> Result<()> {
    if !(detail || dump) {
        return print_listing(ctx, EntityKind::Script, scripts);
    }
    for script in scripts {
        let vo = session.value_object(EntityKind::Script, script.id)?;
        if dump || ctx.json {
            print_dump(&vo)?;
        } else {
            for line in script_detail(&vo) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn script_detail(vo: &Value) -> Vec<String> {
    let time = |key: &str| display_time(parse_timestamp(&json_str(vo, key)));
    let version = &vo["currentVersion"];
    let mut lines = vec![
        field("Script Name", json_str(vo, "name")),
        field("Code Type", json_str(vo, "codeType")),
        field("Version", json_str(version, "versionLabel")),
        field("Life Cycle", json_str(vo, "lifecycle")),
        field("Server Changing", json_str(version, "serverChanging")),
        field("Run As Superuser", json_str(version, "runAsSuperUser")),
        field("Current", json_str(version, "current")),
        field("Created", time("createdDate")),
        field("Created By", json_str(vo, "createdBy")),
        field("Modified", time("modifiedDate")),
        field("Modified By", json_str(vo, "modifiedBy")),
        field("Log Change", json_str(vo, "logChange")),
        rule(Some("DESCRIPTION:")),
    ];
    lines.extend(wrap_text(&json_str(vo, "description"), WRAP_WIDTH));
    lines.push(rule(Some("USAGE:")));
    lines.extend(wrap_text(&json_str(version, "usage"), WRAP_WIDTH));
    lines.push(rule(None));
    lines
}
