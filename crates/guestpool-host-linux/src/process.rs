//! Process table adapter
//!
//! Guest processes are enumerated and killed by owning user via
//! `pgrep`/`pkill`. Both tools exit 1 when no process matches, which is a
//! normal answer here, not a failure.

use guestpool_host_api::{HostError, HostResult, ProcessTable};
use tracing::debug;

use crate::runner::run;

/// Production process table
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn pids_owned_by(&self, user: &str) -> HostResult<Vec<u32>> {
        let out = run("pgrep", &["-u", user]);
        match out.code {
            0 => Ok(parse_pids(&out.stdout_text())),
            1 => Ok(Vec::new()),
            code => Err(HostError::CommandFailed {
                command: "pgrep".into(),
                code,
                detail: out.stderr_text(),
            }),
        }
    }

    fn kill_all_owned_by(&self, user: &str) -> HostResult<()> {
        debug!(user, "pkill -KILL");
        let out = run("pkill", &["-KILL", "-u", user]);
        match out.code {
            0 | 1 => Ok(()),
            code => Err(HostError::CommandFailed {
                command: "pkill".into(),
                code,
                detail: out.stderr_text(),
            }),
        }
    }
}

fn parse_pids(text: &str) -> Vec<u32> {
    text.lines().filter_map(|line| line.trim().parse().ok()).collect()
}
