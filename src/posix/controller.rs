//! The only place where this crate changes signal masks and dispositions.
//!
//! Masks are per thread (unless built with `nothreads`) and every mask call replaces the whole
//! mask. Dispositions are process-wide: the role-ignore calls are meant to be made once per
//! process, right after the role is known and before other threads exist.

use crate::{
    log,
    posix::{
        mask::{DefaultMask, MaskControl},
        roles::Role,
    },
};
use anyhow::{Context, Result};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// The five operations a master or worker needs. Implemented by [`Controller`] for real and by
/// test doubles that record calls.
pub trait SignalControl {
    /// Blocks every signal. `previous` receives the mask that was in effect before, and is left
    /// untouched if the call fails.
    fn block_all(&self, previous: Option<&mut SigSet>) -> Result<()>;

    fn unblock_all(&self) -> Result<()>;

    /// Installs `mask` as is, typically one previously captured by `block_all`.
    fn set_mask(&self, mask: &SigSet) -> Result<()>;

    /// Ignores every signal of the role's set. Failures are logged, not reported.
    fn set_role_ignore(&self, role: Role);

    /// Reverts every signal of the role's set to its default action.
    fn unset_role_ignore(&self, role: Role);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Controller<M: MaskControl = DefaultMask> {
    mask: M,
}

impl Controller {
    pub const fn new() -> Self {
        Self {
            mask: DefaultMask {},
        }
    }
}

impl<M: MaskControl> Controller<M> {
    pub fn with_mask_control(mask: M) -> Self {
        Self { mask }
    }

    pub fn current_mask(&self) -> Result<SigSet> {
        self.mask
            .current_mask()
            .context("Failed to read signal mask")
    }

    /// Blocks every signal until the returned guard is dropped or restored.
    pub fn block_all_scoped(&self) -> Result<BlockedSignals<'_, M>> {
        let mut previous = SigSet::empty();
        self.block_all(Some(&mut previous))?;
        Ok(BlockedSignals {
            controller: self,
            previous: Some(previous),
        })
    }

    /// Like [`SignalControl::set_role_ignore`], but reports the first failure. Every signal of the
    /// set is attempted regardless.
    pub fn try_set_role_ignore(&self, role: Role) -> Result<()> {
        log!("Ignoring {role} signals {:?}", role.ignored_signals());
        install_handler(SigHandler::SigIgn, role.ignored_signals())
            .with_context(|| format!("Failed to ignore {role} signals"))
    }

    /// Like [`SignalControl::unset_role_ignore`], but reports the first failure.
    pub fn try_unset_role_ignore(&self, role: Role) -> Result<()> {
        log!("Restoring default action for {role} signals {:?}", role.ignored_signals());
        install_handler(SigHandler::SigDfl, role.ignored_signals())
            .with_context(|| format!("Failed to restore default action for {role} signals"))
    }

    /// Ignores the role's signals and returns what they were set to before. If one of them cannot
    /// be ignored, the ones already changed are put back and nothing is left half-applied.
    pub fn save_and_set_role_ignore(&self, role: Role) -> Result<SavedDispositions> {
        log!("Ignoring {role} signals {:?}", role.ignored_signals());
        let action = role_action(SigHandler::SigIgn);
        let mut saved = SavedDispositions {
            actions: Vec::with_capacity(role.ignored_signals().len()),
        };
        for &sig in role.ignored_signals() {
            // SAFETY: SIG_IGN runs no user code in signal context
            match unsafe { signal::sigaction(sig, &action) } {
                Ok(previous) => saved.actions.push((sig, previous)),
                Err(e) => {
                    if let Err(restore_error) = saved.restore() {
                        log!(impossible, "{restore_error:?}");
                    }
                    return Err(anyhow::Error::new(e)
                        .context(format!("Failed to ignore {sig}"))
                        .context(format!("Failed to ignore {role} signals")));
                }
            }
        }
        Ok(saved)
    }
}

impl<M: MaskControl> SignalControl for Controller<M> {
    fn block_all(&self, previous: Option<&mut SigSet>) -> Result<()> {
        self.mask
            .set_mask(&SigSet::all(), previous)
            .context("Failed to block all signals")
    }

    fn unblock_all(&self) -> Result<()> {
        self.mask
            .set_mask(&SigSet::empty(), None)
            .context("Failed to unblock all signals")
    }

    fn set_mask(&self, mask: &SigSet) -> Result<()> {
        self.mask
            .set_mask(mask, None)
            .context("Failed to set signal mask")
    }

    fn set_role_ignore(&self, role: Role) {
        if let Err(e) = self.try_set_role_ignore(role) {
            log!(warn, "{e:?}");
        }
    }

    fn unset_role_ignore(&self, role: Role) {
        if let Err(e) = self.try_unset_role_ignore(role) {
            log!(warn, "{e:?}");
        }
    }
}

// The handler is either SIG_IGN or SIG_DFL, so no code runs on delivery and neither a handler mask
// nor SA_RESTART has any effect
fn role_action(handler: SigHandler) -> SigAction {
    SigAction::new(handler, SaFlags::empty(), SigSet::empty())
}

fn install_handler(handler: SigHandler, signals: &[Signal]) -> Result<()> {
    let action = role_action(handler);
    install_actions(signals.iter().map(|&sig| (sig, &action)))
}

// Attempts every action and reports the first failure
fn install_actions<'a>(actions: impl IntoIterator<Item = (Signal, &'a SigAction)>) -> Result<()> {
    let mut first_error = None;
    for (sig, action) in actions {
        // SAFETY: the action is either SIG_IGN/SIG_DFL or one this process had installed before
        if let Err(e) = unsafe { signal::sigaction(sig, action) } {
            log!(warn, "Failed to set disposition of {sig}: {e}");
            if first_error.is_none() {
                first_error =
                    Some(anyhow::Error::new(e).context(format!("Failed to set disposition of {sig}")));
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Dispositions replaced by [`Controller::save_and_set_role_ignore`].
#[must_use = "the replaced dispositions are lost unless restored"]
pub struct SavedDispositions {
    actions: Vec<(Signal, SigAction)>,
}

impl SavedDispositions {
    /// Reinstalls the saved dispositions, most recently replaced first.
    pub fn restore(self) -> Result<()> {
        install_actions(self.actions.iter().rev().map(|(sig, action)| (*sig, action)))
            .context("Failed to restore saved dispositions")
    }
}

/// Signals stay blocked on this thread for as long as the guard lives.
#[must_use = "dropping the guard unblocks signals immediately"]
pub struct BlockedSignals<'a, M: MaskControl> {
    controller: &'a Controller<M>,
    previous: Option<SigSet>,
}

impl<M: MaskControl> BlockedSignals<'_, M> {
    /// The mask that will be reinstalled.
    pub fn previous(&self) -> Option<&SigSet> {
        self.previous.as_ref()
    }

    pub fn restore(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.controller.set_mask(&previous),
            None => Ok(()),
        }
    }
}

impl<M: MaskControl> Drop for BlockedSignals<'_, M> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = self.controller.set_mask(&previous) {
                log!(warn, "{e:?}");
            }
        }
    }
}
