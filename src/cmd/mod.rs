/*!
Command dispatcher module.

Layout:
  src/cmd/
    mod.rs       (this file: module declarations + re-exports)
    shared.rs    (Context, ServerRefArgs, listing / confirmation / job helpers)
    format.rs    (human output primitives)
    server.rs    (ServerArgs   + execute_server)
    customer.rs  (CustomerArgs + execute_customer)
    policy.rs    (PolicyArgs   + execute_policy)
    script.rs    (ScriptArgs   + execute_script)
    comtest.rs   (ComtestArgs  + execute_comtest)
    ping.rs      (PingArgs     + execute_ping)

Conventions:
  - Each subcommand module exposes one public `execute_*` function taking
    the shared `Context` and returning `anyhow::Result<()>`.
  - Argument structs derive `clap::Args`; server selection is always the
    flattened `ServerRefArgs`.
  - Human output goes to stdout; diagnostics go through `tracing` (stderr).
*/

pub mod comtest;
pub mod customer;
pub mod format;
pub mod ping;
pub mod policy;
pub mod script;
pub mod server;
pub mod shared;

pub use comtest::{ComtestArgs, execute_comtest};
pub use customer::{CustomerArgs, execute_customer};
pub use ping::{PingArgs, execute_ping};
pub use policy::{PolicyArgs, execute_policy};
pub use script::{ScriptArgs, execute_script};
pub use server::{ServerArgs, execute_server};
pub use shared::Context;
