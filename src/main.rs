use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod error;
mod monitor;
mod resolve;
mod twist;
mod utils;

use cmd::format::StyleOptions;
use cmd::{ComtestArgs, Context, CustomerArgs, PingArgs, PolicyArgs, ScriptArgs, ServerArgs};
use utils::config::{Overrides, Settings};

/// twist - command-line utilities for the server automation object API
///
/// Command layout (see cmd/{server,customer,policy,script,comtest,ping}.rs):
///   twist server   <server ref> [--detail|--dump|--get K|--set K V|--del K|--backup|--deactivate|--remove]
///   twist customer --list NAME|OID | --get <server ref> | --set NAME|OID <server ref>
///   twist policy   --list NAME|OID | --attach NAME|OID <server ref> | --remove NAME|OID <server ref>
///   twist script   --script NAME|OID [--detail|--dump] [--execute <server ref>]
///   twist comtest  <server ref>
///   twist ping
///
/// Server reference (one of):
///   --name PATTERN | --host PATTERN | --addr IP | --server TEXT | --oid OID
///
/// Global flags / env:
///   -v / -vv          Increase log verbosity (stderr)
///   -q / --quiet      Errors only; raw values for --get
///   --json            Machine-readable output
///   --endpoint URL    Core endpoint (or TWIST_ENDPOINT)
///   --profile NAME    Credential profile (or TWIST_PROFILE); credentials come from CRED_<PROFILE>=user%password
///   --config PATH     YAML config file (default <config dir>/twist/config.yaml)
///
/// Exit codes:
///   0 success, 1 failure, 2 usage error, 3 nothing matched, 4 communication test not started
#[derive(Parser, Debug)]
#[command(
    name = "twist",
    version,
    about = "twist - query and change servers, customers, policies and scripts on the automation core",
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Core endpoint URL (http/https)
    #[arg(long, global = true, env = "TWIST_ENDPOINT", value_name = "URL")]
    endpoint: Option<String>,

    /// Credential profile name
    #[arg(long, global = true, env = "TWIST_PROFILE", value_name = "NAME")]
    profile: Option<String>,

    /// Configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Seconds between job status polls
    #[arg(long, global = true, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Give up following a job after this many seconds (0 = never)
    #[arg(long, global = true, value_name = "SECS")]
    job_timeout: Option<u64>,

    /// Do not verify the core's TLS certificate
    #[arg(long, global = true)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List servers; get, set, back up or delete custom attributes; deactivate or remove a server
    Server(ServerArgs),

    /// List customers; show or set a server's customer
    Customer(CustomerArgs),

    /// List software policies; attach or remove a policy on one server
    Policy(PolicyArgs),

    /// List server scripts; run a script on one server
    Script(ScriptArgs),

    /// Run the agent communication test on one server
    Comtest(ComtestArgs),

    /// Check that the core answers and how fast
    Ping(PingArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("#- {err:#}");
            let code = error::exit_code_for(&err);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let overrides = Overrides {
        endpoint: cli.endpoint,
        profile: cli.profile,
        timeout_secs: cli.timeout,
        poll_interval_secs: cli.poll_interval,
        job_timeout_secs: cli.job_timeout,
        insecure: cli.insecure,
    };
    let settings = Settings::load(cli.config.as_deref(), overrides)?;

    let ctx = Context {
        settings,
        json: cli.json,
        quiet: cli.quiet,
        style: if cli.json {
            StyleOptions::plain()
        } else {
            StyleOptions::detect()
        },
    };

    match cli.command {
        Commands::Server(args) => cmd::execute_server(&ctx, args),
        Commands::Customer(args) => cmd::execute_customer(&ctx, args),
        Commands::Policy(args) => cmd::execute_policy(&ctx, args),
        Commands::Script(args) => cmd::execute_script(&ctx, args),
        Commands::Comtest(args) => cmd::execute_comtest(&ctx, args),
        Commands::Ping(args) => cmd::execute_ping(&ctx, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "twist", "ping", "--json", "-vv", "--endpoint", "https://core.lab",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.endpoint.as_deref(), Some("https://core.lab"));
        assert!(matches!(cli.command, Commands::Ping(_)));
    }
}
