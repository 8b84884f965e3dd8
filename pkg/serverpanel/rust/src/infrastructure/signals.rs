// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Signals for processes the panel did not spawn itself (adopted after a
//! panel restart), addressed by pid.

#[cfg(unix)]
mod imp {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use tracing::debug;

    fn send(pid: u32, sig: Signal) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match signal::kill(Pid::from_raw(raw), sig) {
            Ok(()) => true,
            Err(e) => {
                debug!(pid, signal = %sig, error = %e, "signal delivery failed");
                false
            }
        }
    }

    pub fn terminate(pid: u32) -> bool {
        send(pid, Signal::SIGTERM)
    }

    pub fn kill(pid: u32) -> bool {
        send(pid, Signal::SIGKILL)
    }
}

#[cfg(not(unix))]
mod imp {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    fn with_process(pid: u32, f: impl FnOnce(&sysinfo::Process) -> bool) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some_and(f)
    }

    // No graceful signal exists here; terminate and kill both end the process.
    pub fn terminate(pid: u32) -> bool {
        with_process(pid, |p| p.kill())
    }

    pub fn kill(pid: u32) -> bool {
        with_process(pid, |p| p.kill())
    }
}

pub use imp::{kill, terminate};
