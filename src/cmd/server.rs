/*!
`server.rs`

Implements `twist server`.

Without an action the matching servers are listed (`--detail` / `--dump`
for more). Every action needs exactly one matching server:

  --get KEY          print one custom attribute
  --set KEY VALUE    set, read back, print `#+ Pass.` / `#- Fail.`
  --del KEY          remove one custom attribute
  --backup           print a replayable `twist server ... --set` line per attribute
  --deactivate       decommission (confirmation unless --force)
  --remove           remove the server record (confirmation unless --force)

`--local` (default) reads attributes including inherited scope;
`--no-local` reads only values stored on the server itself.
*/

use std::io::{IsTerminal, Write};

use anyhow::{Result, bail};
use clap::Args;
use serde_json::json;
use tracing::info;

use crate::cmd::format::{Role, color};
use crate::cmd::shared::{Context, ServerRefArgs, resolve_and_list, show_servers};
use crate::resolve::{EntityReference, Resolver, quote, require_single};
use crate::twist::Remote;
use crate::twist::model::EntityKind;

/// CLI arguments for `twist server`
#[derive(Args, Debug)]
pub struct ServerArgs {
    #[command(flatten)]
    pub target: ServerRefArgs,

    /// Show a detail block per server
    #[arg(long)]
    pub detail: bool,

    /// Dump the raw server value object as JSON
    #[arg(long)]
    pub dump: bool,

    /// Print one custom attribute
    #[arg(long, value_name = "KEY", group = "action")]
    pub get: Option<String>,

    /// Set one custom attribute and verify it
    #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"], group = "action")]
    pub set: Option<Vec<String>>,

    /// Remove one custom attribute
    #[arg(long, value_name = "KEY", group = "action")]
    pub del: Option<String>,

    /// Print all custom attributes as replayable commands
    #[arg(long, group = "action")]
    pub backup: bool,

    /// Decommission the server
    #[arg(long, group = "action")]
    pub deactivate: bool,

    /// Remove the server record
    #[arg(long, group = "action")]
    pub remove: bool,

    /// Include inherited custom attributes (default)
    #[arg(long, overrides_with = "no_local")]
    pub local: bool,

    /// Only custom attributes stored on the server itself
    #[arg(long, overrides_with = "local")]
    pub no_local: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Get(String),
    Set(String, String),
    Del(String),
    Backup,
    Deactivate,
    Remove,
}

impl ServerArgs {
    /// `None` means list only.
    fn action(&self) -> Option<Action> {
        let action = if let Some(key) = &self.get {
            Action::Get(key.clone())
        } else if let Some([key, value]) = self.set.as_deref() {
            Action::Set(key.clone(), value.clone())
        } else if let Some(key) = &self.del {
            Action::Del(key.clone())
        } else if self.backup {
            Action::Backup
        } else if self.deactivate {
            Action::Deactivate
        } else if self.remove {
            Action::Remove
        } else {
            return None;
        };
        Some(action)
    }

    fn use_scope(&self) -> bool {
        !self.no_local
    }
}

/// Entry point for the server subcommand.
pub fn execute_server(ctx: &Context, args: ServerArgs) -> Result<()> {
    let reference = args.target.require()?;
    let session = ctx.connect()?;
    run_server(ctx, &session, &reference, &args)
}

fn run_server<R: Remote + ?Sized>(
    ctx: &Context,
    session: &R,
    reference: &EntityReference,
    args: &ServerArgs,
) -> Result<()> {
    let Some(action) = args.action() else {
        let servers = Resolver::new(session).resolve(reference)?;
        return show_servers(ctx, session, &servers, args.detail, args.dump);
    };

    let candidates = resolve_and_list(ctx, session, reference)?;
    let server = require_single(EntityKind::Server, &candidates)?;
    let use_scope = args.use_scope();

    match action {
        Action::Get(key) => {
            let value = session.custom_attribute(server.id, &key, use_scope)?;
            if ctx.json {
                println!("{}", json!({ "server": server, "key": key, "value": value }));
            } else if !ctx.quiet {
                println!("custom '{key}' = '{value}'");
            } else if std::io::stdout().is_terminal() {
                println!("{value}");
            } else {
                let mut out = std::io::stdout().lock();
                out.write_all(value.as_bytes())?;
                out.flush()?;
            }
        }
        Action::Set(key, value) => {
            ctx.say(format!("Setting  '{key}' = '{value}'"));
            info!(server = server.id, key = %key, "setting custom attribute");
            session.set_custom_attribute(server.id, &key, &value)?;
            let check = session.custom_attribute(server.id, &key, use_scope)?;
            ctx.say(format!("Checking '{key}' = '{check}'"));
            let verified = check == value;
            if ctx.json {
                println!("{}", json!({ "server": server, "key": key, "value": check, "verified": verified }));
            } else if verified {
                println!("{}", color(Role::Success, "#+ Pass.", &ctx.style));
            } else {
                println!("{}", color(Role::Error, "#- Fail.", &ctx.style));
            }
            if !verified {
                bail!("custom attribute '{key}' reads back as '{check}'");
            }
        }
        Action::Del(key) => {
            ctx.say(format!("Deleting '{key}'"));
            info!(server = server.id, key = %key, "removing custom attribute");
            session.remove_custom_attribute(server.id, &key)?;
        }
        Action::Backup => {
            let attributes = session.custom_attributes(server.id, use_scope)?;
            if ctx.json {
                let map: serde_json::Map<_, _> = attributes
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                let flag = args.target.replay_flag().unwrap_or_default();
                for (key, value) in attributes {
                    println!("twist server {flag} --set {} {}", quote(&key), quote(&value));
                }
            }
        }
        Action::Deactivate => {
            ctx.confirm(
                &format!("Deactivate server {} ({})?", server.name, server.id),
                args.force,
            )?;
            ctx.say("Deactivating the server.");
            info!(server = server.id, "decommissioning server");
            session.decommission(server.id)?;
        }
        Action::Remove => {
            ctx.confirm(
                &format!("Remove server {} ({}) from the inventory?", server.name, server.id),
                args.force,
            )?;
            ctx.say("Removing the server.");
            info!(server = server.id, "removing server");
            session.remove_server(server.id)?;
        }
    }
    Ok(())
}
