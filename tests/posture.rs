use nix::{
    libc,
    sys::{
        resource,
        signal::{self, SigSet, Signal},
        wait::{self, WaitStatus},
    },
    unistd::{self, ForkResult},
};
use rand::Rng;
use sigposture::{
    Controller, MaskControl, ProcessDirected, Role, SignalControl,
    posix::{
        roles::{MASTER_PROC_IGN_SIGNALS, REOPEN_LOG_SIGNAL, WORKER_PROC_IGN_SIGNALS},
        system::{self, Disposition},
    },
};
use std::panic::{self, AssertUnwindSafe};

// Dispositions are process-wide, so anything that changes them runs in a forked child. The child
// reports through its exit code; 101 means it panicked.
fn in_child(f: impl FnOnce() -> i32) -> WaitStatus {
    match unsafe { unistd::fork() }.expect("Failed to fork") {
        ForkResult::Child => {
            let code = panic::catch_unwind(AssertUnwindSafe(|| {
                // SIGQUIT dumps core by default
                resource::setrlimit(resource::Resource::RLIMIT_CORE, 0, 0)
                    .expect("Failed to disable core dumps");
                Controller::new()
                    .unblock_all()
                    .expect("Failed to unblock signals");
                f()
            }))
            .unwrap_or(101);
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => wait::waitpid(child, None).expect("Failed to waitpid"),
    }
}

fn assert_exited(status: WaitStatus) {
    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "child did not exit cleanly: {status:?}"
    );
}

fn assert_killed_by(status: WaitStatus, sig: Signal) {
    assert!(
        matches!(status, WaitStatus::Signaled(_, s, _) if s == sig),
        "child was not killed by {sig}: {status:?}"
    );
}

fn blockable_signals() -> impl Iterator<Item = Signal> {
    Signal::iterator().filter(|&sig| sig != Signal::SIGKILL && sig != Signal::SIGSTOP)
}

fn same_signals(a: &SigSet, b: &SigSet) -> bool {
    blockable_signals().all(|sig| a.contains(sig) == b.contains(sig))
}

#[test]
fn worker_survives_its_signals() {
    assert_exited(in_child(|| {
        Controller::new().set_role_ignore(Role::Worker);
        for &sig in &WORKER_PROC_IGN_SIGNALS {
            signal::raise(sig).expect("Failed to raise");
        }
        0
    }));
}

#[test]
fn unsetting_worker_restores_default_actions() {
    for &sig in &WORKER_PROC_IGN_SIGNALS {
        let status = in_child(|| {
            let controller = Controller::new();
            controller.set_role_ignore(Role::Worker);
            controller.unset_role_ignore(Role::Worker);
            signal::raise(sig).expect("Failed to raise");
            0
        });
        assert_killed_by(status, sig);
    }
}

#[test]
fn master_set_leaves_worker_only_signals_alone() {
    let status = in_child(|| {
        let controller = Controller::new();
        // Start from SIGPIPE at its default, not the Rust runtime's SIG_IGN
        controller.unset_role_ignore(Role::Master);
        controller.set_role_ignore(Role::Master);
        for &sig in &MASTER_PROC_IGN_SIGNALS {
            if system::disposition(sig).unwrap() != Disposition::Ignore {
                return 2;
            }
        }
        for &sig in &WORKER_PROC_IGN_SIGNALS {
            if !MASTER_PROC_IGN_SIGNALS.contains(&sig)
                && system::disposition(sig).unwrap() != Disposition::Default
            {
                return 3;
            }
        }
        signal::raise(Signal::SIGPIPE).expect("Failed to raise");
        signal::raise(REOPEN_LOG_SIGNAL).expect("Failed to raise");
        0
    });
    assert_killed_by(status, REOPEN_LOG_SIGNAL);
}

#[test]
fn write_to_closed_pipe_is_survivable() {
    assert_exited(in_child(|| {
        let controller = Controller::new();
        controller.unset_role_ignore(Role::Worker);
        controller.set_role_ignore(Role::Worker);

        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe { libc::close(fds[0]) };
        let written = unsafe { libc::write(fds[1], b"x".as_ptr().cast(), 1) };
        if written != -1 || nix::errno::Errno::last() != nix::errno::Errno::EPIPE {
            return 2;
        }
        0
    }));
}

#[test]
fn try_variants_succeed_for_valid_sets() {
    assert_exited(in_child(|| {
        let controller = Controller::new();
        controller.try_set_role_ignore(Role::Worker).unwrap();
        controller.try_unset_role_ignore(Role::Worker).unwrap();
        controller.try_set_role_ignore(Role::Master).unwrap();
        0
    }));
}

extern "C" fn reopen_log_handler(_: libc::c_int) {}

#[test]
fn saved_dispositions_are_put_back() {
    assert_exited(in_child(|| {
        let handler = signal::SigAction::new(
            signal::SigHandler::Handler(reopen_log_handler),
            signal::SaFlags::empty(),
            SigSet::empty(),
        );
        unsafe { signal::sigaction(REOPEN_LOG_SIGNAL, &handler) }.unwrap();

        let controller = Controller::new();
        let saved = controller.save_and_set_role_ignore(Role::Worker).unwrap();
        for &sig in &WORKER_PROC_IGN_SIGNALS {
            if system::disposition(sig).unwrap() != Disposition::Ignore {
                return 2;
            }
        }

        saved.restore().unwrap();
        if system::disposition(REOPEN_LOG_SIGNAL).unwrap() != Disposition::Handler {
            return 3;
        }
        // SIGPIPE goes back to the Rust runtime's SIG_IGN, not to SIG_DFL
        if system::disposition(Signal::SIGPIPE).unwrap() != Disposition::Ignore {
            return 4;
        }
        if system::disposition(Signal::SIGQUIT).unwrap() != Disposition::Default {
            return 5;
        }
        0
    }));
}

#[test]
fn process_directed_mask_round_trip() {
    // A forked child is single-threaded, which is what sigprocmask is specified for
    assert_exited(in_child(|| {
        let mut custom = SigSet::empty();
        custom.add(Signal::SIGCHLD);
        custom.add(Signal::SIGUSR1);
        ProcessDirected.set_mask(&custom, None).unwrap();
        if !same_signals(&ProcessDirected.current_mask().unwrap(), &custom) {
            return 2;
        }

        let controller = Controller::with_mask_control(ProcessDirected);
        let mut previous = SigSet::empty();
        previous.add(Signal::SIGTERM);
        controller.block_all(Some(&mut previous)).unwrap();
        if !same_signals(&previous, &custom) {
            return 3;
        }
        let blocked = ProcessDirected.current_mask().unwrap();
        if !blockable_signals().all(|sig| blocked.contains(sig)) {
            return 4;
        }

        controller.set_mask(&previous).unwrap();
        if !same_signals(&ProcessDirected.current_mask().unwrap(), &custom) {
            return 5;
        }
        controller.unblock_all().unwrap();
        if !same_signals(&ProcessDirected.current_mask().unwrap(), &SigSet::empty()) {
            return 6;
        }
        0
    }));
}

#[test]
fn unblocking_delivers_what_was_held_back() {
    let status = in_child(|| {
        let controller = Controller::new();
        controller.block_all(None).unwrap();
        // Pending, not delivered
        signal::raise(Signal::SIGUSR2).expect("Failed to raise");
        controller.unblock_all().unwrap();
        0
    });
    assert_killed_by(status, Signal::SIGUSR2);
}

#[test]
fn set_mask_restores_captured_mask() {
    let controller = Controller::new();
    let mut rng = rand::thread_rng();
    for _ in 0..32 {
        let mut original = SigSet::empty();
        for sig in blockable_signals() {
            if rng.gen_bool(0.5) {
                original.add(sig);
            }
        }
        controller.set_mask(&original).unwrap();

        let mut previous = SigSet::empty();
        controller.block_all(Some(&mut previous)).unwrap();
        assert!(same_signals(&previous, &original));
        let blocked = controller.current_mask().unwrap();
        assert!(blockable_signals().all(|sig| blocked.contains(sig)));

        controller.set_mask(&previous).unwrap();
        assert!(same_signals(&controller.current_mask().unwrap(), &original));
    }
    controller.unblock_all().unwrap();
}

#[test]
fn unblock_all_empties_the_mask() {
    let controller = Controller::new();
    controller.block_all(None).unwrap();
    controller.unblock_all().unwrap();
    assert!(same_signals(
        &controller.current_mask().unwrap(),
        &SigSet::empty()
    ));
}

#[test]
fn guard_restores_thread_mask() {
    let controller = Controller::new();
    let mut custom = SigSet::empty();
    custom.add(Signal::SIGWINCH);
    controller.set_mask(&custom).unwrap();
    {
        let _guard = controller.block_all_scoped().unwrap();
        assert!(controller.current_mask().unwrap().contains(Signal::SIGTERM));
    }
    assert!(same_signals(&controller.current_mask().unwrap(), &custom));
    controller.unblock_all().unwrap();
}

#[cfg(not(feature = "nothreads"))]
#[test]
fn masks_are_per_thread() {
    use std::sync::{Arc, Barrier};

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let controller = Controller::new();
                let blocks = i % 2 == 0;
                let mut previous = SigSet::empty();
                if blocks {
                    controller.block_all(Some(&mut previous)).unwrap();
                }
                barrier.wait();
                let mask = controller.current_mask().unwrap();
                assert_eq!(mask.contains(Signal::SIGTERM), blocks);
                assert_eq!(mask.contains(Signal::SIGUSR1), blocks);
                barrier.wait();
                if blocks {
                    controller.set_mask(&previous).unwrap();
                    assert!(same_signals(&controller.current_mask().unwrap(), &previous));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
