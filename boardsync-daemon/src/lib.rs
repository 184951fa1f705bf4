//! Background reconciliation daemon.
//!
//! The daemon polls the definition store and the backing repository on a
//! fixed interval and serves a small one-command-per-connection JSON
//! protocol over a unix socket so the CLI can query status or trigger a
//! reconciliation on demand. All reconciliations flow through a single job
//! queue, so only one runs at a time.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_pull, request_push, request_status, request_stop, DaemonClient, DaemonCommand,
    DaemonReply, DaemonStatusInfo, PullSummary, PushSummary, ReconcileSummary, RunRecord,
};
pub use runtime::{run, start_blocking, DaemonStatus};
