use std::{
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{bail, Result};
use sysinfo::{get_current_pid, Pid, Signal, System};
use tracing::{debug, info};

use crate::utils::dir::AppLayout;

/// Pids of the daemons started from `daemon_path`, never the current process.
pub fn running_daemons(daemon_path: &Path) -> Vec<Pid> {
    let system = System::new_all();
    let current_id = get_current_pid().ok();
    system
        .processes()
        .iter()
        .filter(|(pid, _)| Some(**pid) != current_id)
        .filter(|(_, process)| {
            process
                .exe()
                .filter(|v| v.exists())
                .is_some_and(|v| v == daemon_path)
        })
        .map(|(pid, _)| *pid)
        .collect()
}

/// Asks every daemon to terminate and waits for it to exit. A daemon turns SIGTERM into a clean
/// stop, so this includes its final push. Returns how many daemons were stopped.
pub fn stop_daemons(daemon_path: &Path) -> usize {
    let system = System::new_all();
    let mut stopped = 0;
    for pid in running_daemons(daemon_path) {
        let Some(process) = system.process(pid) else {
            continue;
        };
        info!("Stopping daemon {pid}");
        // This will forcefully terminate the process on Windows. Anything better will require a
        // lot more work.
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        process.wait();
        stopped += 1;
    }
    stopped
}

/// Starts the daemon for `layout`. The daemon detaches by itself, so this returns once the
/// detached process exists.
pub fn spawn_daemon(daemon_path: &Path, layout: &AppLayout) -> Result<()> {
    if !daemon_path.exists() {
        bail!("Daemon executable {daemon_path:?} is missing");
    }
    let mut command = Command::new(daemon_path);
    command
        .arg("--dir")
        .arg(layout.root())
        .stdin(Stdio::null())
        .stdout(Stdio::null());

    debug!("Spawning {command:?}");
    let status = command.status()?;
    if !status.success() {
        bail!("Daemon failed to start: {status}");
    }
    Ok(())
}
