use nix::sys::signal::Signal;
use std::fmt;
use std::str::FromStr;

// Operational commands understood by the master and workers. Acting on them is up to whoever
// owns the process; this crate only keeps their default actions from firing.
pub const REOPEN_LOG_SIGNAL: Signal = Signal::SIGUSR1;
pub const EXEC_BINARY_SIGNAL: Signal = Signal::SIGUSR2;
pub const GRACEFUL_SHUTDOWN_SIGNAL: Signal = Signal::SIGQUIT;
pub const RELOAD_SIGNAL: Signal = Signal::SIGHUP;

/// A master must survive a write to a closed pipe.
pub const MASTER_PROC_IGN_SIGNALS: [Signal; 1] = [Signal::SIGPIPE];

/// A worker additionally must not be killed by the operational signals before its event loop is
/// ready to watch them.
pub const WORKER_PROC_IGN_SIGNALS: [Signal; 4] = [
    REOPEN_LOG_SIGNAL,
    EXEC_BINARY_SIGNAL,
    GRACEFUL_SHUTDOWN_SIGNAL,
    Signal::SIGPIPE,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Master,
    Worker,
}

impl Role {
    pub fn ignored_signals(self) -> &'static [Signal] {
        match self {
            Self::Master => &MASTER_PROC_IGN_SIGNALS,
            Self::Worker => &WORKER_PROC_IGN_SIGNALS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Master => "master",
            Self::Worker => "worker",
        })
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Self::Master),
            "worker" => Ok(Self::Worker),
            _ => Err(format!("Unknown role {s}, expected master or worker")),
        }
    }
}

/// Human-readable meaning of an operational signal, if it has one.
pub fn operational_name(signal: Signal) -> Option<&'static str> {
    match signal {
        REOPEN_LOG_SIGNAL => Some("reopen-log"),
        EXEC_BINARY_SIGNAL => Some("exec-binary"),
        GRACEFUL_SHUTDOWN_SIGNAL => Some("graceful-shutdown"),
        RELOAD_SIGNAL => Some("reload"),
        _ => None,
    }
}
