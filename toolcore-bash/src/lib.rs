//! Process-group isolated shell execution.
//!
//! Every spawned child becomes the leader of its own process group
//! (`setpgid(0, 0)` in `pre_exec`), so a timeout or cancellation collapses to
//! a single `killpg` against `-pgid` rather than chasing descendants one at
//! a time. Foreground commands run to completion under a tiered timeout with
//! a capped, truncating output buffer; background commands detach into a
//! fresh temp directory and return immediately.
//!
//! ## Modules
//!
//! - [`process_group`] - process-group creation, signalling, and graceful kill
//! - [`supervisor`] - foreground/background execution built on top of it

pub mod process_group;
pub mod supervisor;

pub use process_group::{
    DEFAULT_GRACEFUL_TIMEOUT_MS, GracefulTerminationResult, KillSignal, detach_from_tty,
    graceful_kill_process_group, graceful_kill_process_group_default, kill_child_process_group,
    kill_child_process_group_with_signal, kill_process_group, kill_process_group_by_pid,
    kill_process_group_by_pid_with_signal, kill_process_group_with_signal, set_parent_death_signal,
    set_process_group,
};

#[cfg(windows)]
pub use process_group::kill_process;

pub use supervisor::{
    BackgroundHandle, BashRequest, MAX_OUT_BYTES, SKETCH_ENV_VAR, SupervisorError, Timeouts,
    run_background, run_foreground,
};
