use std::collections::{HashMap, VecDeque};

use sysinfo::{Pid as SysinfoPid, ProcessStatus, ProcessesToUpdate, System};
use tracing::debug;

use crate::process::errors::ProcessError;

/// Check if a process with the given PID is currently running.
///
/// Zombies (exited but not yet reaped) count as not running.
pub fn is_process_running(pid: u32) -> bool {
    let mut system = System::new();
    let pid_obj = SysinfoPid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid_obj]), true);
    system
        .process(pid_obj)
        .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

/// Collect every descendant of `root`, parents before children.
fn descendants_of(system: &System, root: SysinfoPid) -> Vec<SysinfoPid> {
    let mut children: HashMap<SysinfoPid, Vec<SysinfoPid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut found = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        if let Some(kids) = children.get(&pid) {
            for kid in kids {
                if *kid != root && !found.contains(kid) {
                    found.push(*kid);
                    queue.push_back(*kid);
                }
            }
        }
    }
    found
}

/// Kill a process and every process it spawned.
///
/// The tree is captured before anything is killed, since orphans are
/// re-parented once their parent dies. Returns the number of processes
/// that accepted the kill signal.
pub fn kill_process_tree(pid: u32) -> Result<usize, ProcessError> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let root = SysinfoPid::from_u32(pid);
    let Some(root_process) = system.process(root) else {
        return Err(ProcessError::NotFound { pid });
    };

    let descendants = descendants_of(&system, root);
    let mut killed = usize::from(root_process.kill());

    for child in descendants.iter().rev() {
        if let Some(process) = system.process(*child)
            && process.kill()
        {
            killed += 1;
        }
    }

    debug!(
        event = "core.process.tree_killed",
        pid = pid,
        descendants = descendants.len(),
        killed = killed,
    );

    Ok(killed)
}

/// Kill every process in the group led by `pgid`.
#[cfg(unix)]
pub fn kill_process_group(pgid: u32) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pgid).map_err(|_| ProcessError::SystemError {
        message: format!("process group id {pgid} out of range"),
    })?;

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ProcessError::NotFound { pid: pgid }),
        Err(e) => Err(ProcessError::KillFailed {
            pid: pgid,
            message: e.to_string(),
        }),
    }
}
