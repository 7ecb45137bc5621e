//! Where a signal mask is installed.
//!
//! A multi-threaded process has one mask per thread and must use `pthread_sigmask`; `sigprocmask`
//! is only specified for single-threaded processes. Both are exposed behind [`MaskControl`] so that
//! callers never branch on the threading model. [`DefaultMask`] is picked by the `nothreads`
//! feature.

use nix::sys::signal::{self, SigSet, SigmaskHow};

pub trait MaskControl {
    /// Replaces the mask with `mask`. If `previous` is given, it receives the mask in effect right
    /// before the call. `previous` is only written when the call succeeds.
    fn set_mask(&self, mask: &SigSet, previous: Option<&mut SigSet>) -> nix::Result<()>;

    /// Reads the mask without changing it.
    fn current_mask(&self) -> nix::Result<SigSet>;
}

/// Masks the calling thread only.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadDirected;

/// Masks the whole process. Only meaningful for single-threaded processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessDirected;

impl MaskControl for ThreadDirected {
    fn set_mask(&self, mask: &SigSet, previous: Option<&mut SigSet>) -> nix::Result<()> {
        with_previous(previous, |oldset| {
            signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(mask), oldset)
        })
    }

    fn current_mask(&self) -> nix::Result<SigSet> {
        let mut mask = SigSet::empty();
        signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, None, Some(&mut mask))?;
        Ok(mask)
    }
}

impl MaskControl for ProcessDirected {
    fn set_mask(&self, mask: &SigSet, previous: Option<&mut SigSet>) -> nix::Result<()> {
        with_previous(previous, |oldset| {
            signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), oldset)
        })
    }

    fn current_mask(&self) -> nix::Result<SigSet> {
        let mut mask = SigSet::empty();
        signal::sigprocmask(SigmaskHow::SIG_BLOCK, None, Some(&mut mask))?;
        Ok(mask)
    }
}

// The OS writes the old mask into a local so that a failed call cannot leave a half-written value
// in the caller's slot
fn with_previous(
    previous: Option<&mut SigSet>,
    call: impl FnOnce(Option<&mut SigSet>) -> nix::Result<()>,
) -> nix::Result<()> {
    match previous {
        Some(slot) => {
            let mut oldset = SigSet::empty();
            call(Some(&mut oldset))?;
            *slot = oldset;
            Ok(())
        }
        None => call(None),
    }
}

#[cfg(not(feature = "nothreads"))]
pub type DefaultMask = ThreadDirected;

#[cfg(feature = "nothreads")]
pub type DefaultMask = ProcessDirected;
