//! Process control of the background daemon: find, stop, relaunch. The
//! daemon is its own binary next to the CLI's executable, which is matched
//! against running processes by full path.

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::Result;
use sysinfo::{Pid, Signal, System, get_current_pid};

/// The daemon executable sits next to whichever binary is asking.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("stint-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

fn daemon_executable() -> Result<PathBuf> {
    Ok(to_daemon_path(env::current_exe()?))
}

/// Pids of running daemon processes, own process and children excluded.
pub fn running_daemons(name: &Path) -> Vec<Pid> {
    let system = System::new_all();
    let current_id = get_current_pid().unwrap_or(Pid::from_u32(0));
    let mut found = vec![];
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }
        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            found.push(*pid);
        }
    }
    found
}

pub fn kill_running_daemons(name: &Path) {
    let system = System::new_all();
    for pid in running_daemons(name) {
        let Some(process) = system.process(pid) else {
            continue;
        };
        // This will forcefully terminate the process on Windows. Anything
        // better will require a lot more work.
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        process.wait();
    }
}

/// Replaces any running daemon with a fresh one. The daemon detaches itself,
/// so the spawned process returns right away and is reaped here.
pub fn launch_daemon(dir: Option<&Path>) -> Result<()> {
    let daemon = daemon_executable()?;
    kill_running_daemons(&daemon);
    let mut command = std::process::Command::new(&daemon);
    if let Some(dir) = dir {
        command.arg("--dir").arg(dir);
    }
    println!("Spawning {}", daemon.display());
    let mut child = command.spawn()?;
    child.wait()?;
    Ok(())
}

pub fn stop_daemon() -> Result<()> {
    let daemon = daemon_executable()?;
    let running = running_daemons(&daemon);
    if running.is_empty() {
        println!("The daemon is not running.");
        return Ok(());
    }
    kill_running_daemons(&daemon);
    println!("Stopped {} daemon process(es)", running.len());
    Ok(())
}

pub fn daemon_status() -> Result<()> {
    let daemon = daemon_executable()?;
    let running = running_daemons(&daemon);
    if running.is_empty() {
        println!("The daemon is not running.");
    } else {
        for pid in running {
            println!("Running as pid {pid}");
        }
    }
    Ok(())
}
