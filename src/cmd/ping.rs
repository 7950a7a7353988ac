/*!
`ping.rs`

Implements `twist ping`: authenticate and time one cheap read-only call
(`SearchService.getSearchableTypes`). Prints `Good <seconds>s .`.
*/

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tracing::debug;

use crate::cmd::shared::{Context, print_dump};
use crate::twist::Operations;

/// CLI arguments for `twist ping`
#[derive(Args, Debug)]
pub struct PingArgs {
    /// Print the searchable types returned by the core
    #[arg(long)]
    pub dump: bool,
}

/// Entry point for the ping subcommand.
pub fn execute_ping(ctx: &Context, args: PingArgs) -> Result<()> {
    let session = ctx.connect()?;

    let started = Instant::now();
    let types = session.searchable_types()?;
    let elapsed = started.elapsed();
    debug!(types = types.len(), ?elapsed, "core answered");

    if args.dump {
        print_dump(&json!(types))?;
    }
    if ctx.json {
        println!(
            "{}",
            json!({ "status": "ok", "elapsed_secs": elapsed.as_secs_f64(), "types": types.len() })
        );
    } else {
        println!("{}", good_line(elapsed));
    }
    Ok(())
}

fn good_line(elapsed: Duration) -> String {
    format!("Good {:.6}s .", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn good_line_shape() {
        assert_eq!(good_line(Duration::from_millis(1250)), "Good 1.250000s .");
    }
}
