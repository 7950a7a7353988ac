/*!
`comtest.rs`

Implements `twist comtest`: run the agent communication test on exactly one
server and follow the job. A test that cannot be submitted exits with 4.
*/

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::cmd::shared::{Context, ServerRefArgs, resolve_and_list, show_servers};
use crate::error::TwistError;
use crate::resolve::{EntityReference, Resolver, require_single};
use crate::twist::Remote;
use crate::twist::model::EntityKind;

/// CLI arguments for `twist comtest`
#[derive(Args, Debug)]
pub struct ComtestArgs {
    #[command(flatten)]
    pub target: ServerRefArgs,

    /// Show a detail block per matching server before the test
    #[arg(long)]
    pub detail: bool,

    /// Dump each matching server's raw value object as JSON before the test
    #[arg(long)]
    pub dump: bool,
}

/// Entry point for the comtest subcommand.
pub fn execute_comtest(ctx: &Context, args: ComtestArgs) -> Result<()> {
    let reference = args.target.require()?;
    let session = ctx.connect()?;
    run_comtest(ctx, &session, &reference, &args)
}

fn run_comtest<R: Remote + ?Sized>(
    ctx: &Context,
    session: &R,
    reference: &EntityReference,
    args: &ComtestArgs,
) -> Result<()> {
    // Every candidate is shown before the cardinality check.
    let servers = if args.detail || args.dump {
        let servers = Resolver::new(session).resolve(reference)?;
        show_servers(ctx, session, &servers, args.detail, args.dump)?;
        servers
    } else {
        resolve_and_list(ctx, session, reference)?
    };
    let server = require_single(EntityKind::Server, &servers)?;

    info!(server = server.id, "starting communication test");
    let job = session
        .run_comm_test(&[server.id])
        .map_err(|e| TwistError::CommTestFailed(Box::new(e)))?;
    ctx.run_job(session, &job, server)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twist::MockCore;
    use crate::twist::model::{Filter, Job, JobStatus, ResolvedEntity};
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: ComtestArgs,
    }

    #[test]
    fn accepts_each_reference_form() {
        for argv in [
            ["t", "--name", "web01"],
            ["t", "--host", "web01.lab"],
            ["t", "--ip", "10.0.0.1"],
            ["t", "--server", "web01"],
            ["t", "--oid", "4242"],
        ] {
            assert!(TestCli::try_parse_from(argv).is_ok(), "{argv:?}");
        }
    }

    fn run(core: &MockCore, argv: &[&str]) -> Result<()> {
        let mut full = vec!["t"];
        full.extend_from_slice(argv);
        let args = TestCli::try_parse_from(full).unwrap().args;
        let reference = args.target.require().unwrap();
        run_comtest(&Context::for_tests(), core, &reference, &args)
    }

    fn finding(found: Vec<ResolvedEntity>) -> MockCore {
        let mut core = MockCore::new();
        core.expect_find_refs()
            .times(1)
            .returning(move |_, _: &Filter| Ok(found.clone()));
        core
    }

    #[test]
    fn dump_shows_every_candidate_then_refuses() {
        let mut core = finding(vec![
            ResolvedEntity::new(101, "web01"),
            ResolvedEntity::new(102, "web01-dr"),
        ]);
        core.expect_value_object()
            .withf(|kind, _| *kind == EntityKind::Server)
            .times(2)
            .returning(|_, id| Ok(json!({ "name": format!("srv{id}") })));
        core.expect_run_comm_test().never();

        let err = run(&core, &["--server", "web01", "--dump"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TwistError>(),
            Some(TwistError::AmbiguousResult { role: EntityKind::Server, .. })
        ));
    }

    #[test]
    fn no_test_when_nothing_matches() {
        let mut core = finding(Vec::new());
        core.expect_run_comm_test().never();
        let err = run(&core, &["--name", "nosuch"]).unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), 3);
    }

    #[test]
    fn rejected_submission_exits_four() {
        let mut core = finding(vec![ResolvedEntity::new(101, "web01")]);
        core.expect_run_comm_test()
            .times(1)
            .returning(|_| Err(TwistError::remote("ServerService.runAgentCommTest", "agent unreachable")));
        core.expect_fetch_status().never();

        let err = run(&core, &["--name", "web01"]).unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), 4);
    }

    #[test]
    fn follows_the_test_job() {
        let mut core = finding(vec![ResolvedEntity::new(101, "web01")]);
        core.expect_run_comm_test()
            .withf(|servers| servers.to_vec() == [101])
            .times(1)
            .returning(|_| {
                Ok(Job {
                    id: 5001,
                    name: "Communication Test".into(),
                    job_type: "job".into(),
                })
            });
        core.expect_fetch_status()
            .times(1)
            .returning(|_| Ok(JobStatus::from_json(&json!({ "status": "6" }))));

        run(&core, &["--name", "web01"]).unwrap();
    }
}
