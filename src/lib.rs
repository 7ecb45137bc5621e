//! Signal posture control for the master and worker processes of a multi-process server.
//!
//! A master ignores `SIGPIPE`; a worker also ignores the operational signals (reopen log, exec
//! binary, graceful shutdown) until whoever runs its event loop starts watching them. Critical
//! sections block every signal with [`SignalControl::block_all`] and put the captured mask back
//! with [`SignalControl::set_mask`].

pub mod entry;

#[macro_use]
pub mod log;

#[cfg(unix)]
pub mod posix {
    pub mod controller;
    pub mod entry;
    pub mod mask;
    pub mod roles;
    pub mod system;
}

#[cfg(unix)]
pub use posix::{
    controller::{BlockedSignals, Controller, SavedDispositions, SignalControl},
    mask::{DefaultMask, MaskControl, ProcessDirected, ThreadDirected},
    roles::Role,
};
