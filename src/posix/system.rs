use nix::{libc, sys::signal::Signal};
use std::io::Result;
use std::mem::MaybeUninit;
use std::ptr::null;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Default,
    Ignore,
    Handler,
}

// nix only offers sigaction as a setter, so reading the disposition without touching it goes
// through libc
pub fn disposition(signal: Signal) -> Result<Disposition> {
    let mut old = MaybeUninit::<libc::sigaction>::uninit();
    if unsafe { libc::sigaction(signal as libc::c_int, null(), old.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let old = unsafe { old.assume_init() };
    Ok(match old.sa_sigaction {
        libc::SIG_DFL => Disposition::Default,
        libc::SIG_IGN => Disposition::Ignore,
        _ => Disposition::Handler,
    })
}
