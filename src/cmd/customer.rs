/*!
`customer.rs`

Implements `twist customer`.

  --list NAME|OID              list customers (name, display name or rc name)
  --get  <server reference>    show each matching server's customer
  --set  NAME|OID <server ref> assign the customer to exactly one server

A digits-only NAME is treated as an object id.
*/

use anyhow::Result;
use clap::Args;
use serde_json::{Value, json};
use tracing::info;

use crate::cmd::format::{field, listing, rule};
use crate::cmd::shared::{
    Context, ServerRefArgs, print_dump, print_listing, resolve_and_list, show_servers,
};
use crate::resolve::{EntityReference, Resolver, require_single};
use crate::twist::{Operations, Remote};
use crate::twist::model::{
    EntityKind, ResolvedEntity, as_list, display_time, json_i64, json_str, parse_timestamp,
};

/// CLI arguments for `twist customer`
#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("action").args(["list", "get", "set"]).required(true)))]
pub struct CustomerArgs {
    /// List customers matching NAME (or the object id OID)
    #[arg(long, value_name = "NAME|OID")]
    pub list: Option<String>,

    /// Show the customer of each matching server
    #[arg(long, requires = "server_ref")]
    pub get: bool,

    /// Assign customer NAME|OID to the (single) matching server
    #[arg(long, value_name = "NAME|OID", requires = "server_ref")]
    pub set: Option<String>,

    #[command(flatten)]
    pub target: ServerRefArgs,

    /// Show a detail block per customer / server
    #[arg(long)]
    pub detail: bool,

    /// Dump raw value objects as JSON
    #[arg(long)]
    pub dump: bool,
}

/// Entry point for the customer subcommand.
pub fn execute_customer(ctx: &Context, args: CustomerArgs) -> Result<()> {
    let session = ctx.connect()?;
    run_customer(ctx, &session, &args)
}

fn run_customer<R: Remote + ?Sized>(ctx: &Context, session: &R, args: &CustomerArgs) -> Result<()> {
    if let Some(raw) = &args.list {
        let reference = EntityReference::name_or_id(EntityKind::Customer, raw)?;
        let customers = Resolver::new(session).resolve(&reference)?;
        return show_customers(ctx, session, &customers, args.detail, args.dump);
    }

    let servers_ref = args.target.require()?;

    if let Some(raw) = &args.set {
        let customer_ref = EntityReference::name_or_id(EntityKind::Customer, raw)?;
        let customers = resolve_and_list(ctx, session, &customer_ref)?;
        let customer = require_single(EntityKind::Customer, &customers)?;
        let servers = resolve_and_list(ctx, session, &servers_ref)?;
        let server = require_single(EntityKind::Server, &servers)?;

        ctx.say("Setting the customer ...");
        info!(server = server.id, customer = customer.id, "assigning customer");
        session.set_customer(server.id, customer.id)?;

        let assigned = server_customer(session, server)?;
        if ctx.json {
            println!("{}", json!({ "server": server, "customer": assigned }));
        } else {
            println!("Customer set to {} ({})", assigned.id, assigned.name);
        }
        return Ok(());
    }

    // --get
    let servers = Resolver::new(session).resolve(&servers_ref)?;
    if args.detail || args.dump {
        show_servers(ctx, session, &servers, args.detail, args.dump)?;
    }
    let mut rows = Vec::with_capacity(servers.len());
    for server in &servers {
        let customer = server_customer(session, server)?;
        if !ctx.json {
            if !(args.detail || args.dump) {
                println!("{}", listing(EntityKind::Server, server));
            }
            println!("Found customer {} = {}", customer.id, customer.name);
        }
        rows.push(json!({ "server": server, "customer": customer }));
    }
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(())
}

/// The customer currently assigned to `server`, read from its value object.
fn server_customer<O: Operations + ?Sized>(session: &O, server: &ResolvedEntity) -> Result<ResolvedEntity> {
    let vo = session.value_object(EntityKind::Server, server.id)?;
    let customer = &vo["customer"];
    Ok(ResolvedEntity::new(
        json_i64(customer, "id").unwrap_or_default(),
        json_str(customer, "name"),
    ))
}

fn show_customers<O: Operations + ?Sized>(
    ctx: &Context,
    session: &O,
    customers: &[ResolvedEntity],
    detail: bool,
    dump: bool,
) -> Result<()> {
    if !(detail || dump) {
        return print_listing(ctx, EntityKind::Customer, customers);
    }
    for customer in customers {
        let vo = session.value_object(EntityKind::Customer, customer.id)?;
        if dump || ctx.json {
            print_dump(&vo)?;
        } else {
            for line in customer_detail(customer, &vo) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn customer_detail(customer: &ResolvedEntity, vo: &Value) -> Vec<String> {
    let time = |key: &str| display_time(parse_timestamp(&json_str(vo, key)));
    let mut lines = vec![
        field("Customer Name", &customer.name),
        field("Customer OID", customer.id.to_string()),
        field("Auth Domain", json_str(vo, "authDomain")),
        field("Display Name", json_str(vo, "displayName")),
        field("Business Account", json_str(vo, "businessAcctId")),
        field("Internal", json_str(vo, "internal")),
        field("Status", json_str(vo, "status")),
        field("Created", time("createdDate")),
        field("Created By", json_str(vo, "createdBy")),
        field("Modified", time("modifiedDate")),
        field("Modified By", json_str(vo, "modifiedBy")),
        "Facilities:".to_string(),
    ];
    for facility in as_list(&vo["facilities"]) {
        lines.push(format!(
            "  {} = {}",
            json_str(facility, "id"),
            json_str(facility, "name")
        ));
    }
    lines.push(rule(None));
    lines
}
