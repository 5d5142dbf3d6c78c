use core::marker::PhantomData;

use crossbeam_utils::Backoff;

use crate::backoff::SpinWait;
use crate::cpu::{CpuId, CpuInfo};
use crate::ipl::{InterruptLevelController, Ipl};
use crate::mutex::{IplMutex, MutexState};
use crate::owner::{AtomicOwner, AtomicOwnerCell};

/// A [test and test-and-set] [spinlock] for multiprocessors, raising the owner's interrupt
/// priority level.
///
/// Waiters spin at their previous level, so interrupts pending on a waiting processor are still
/// serviced. Between checks of the owner slot, waiters call `W`.
///
/// Entering a mutex that the same processor already holds spins forever. Wrap the mutex in
/// [`Diagnostic`](crate::Diagnostic) to detect this.
///
/// [test and test-and-set]: https://en.wikipedia.org/wiki/Test_and_test-and-set
/// [spinlock]: https://en.wikipedia.org/wiki/Spinlock
#[derive(Debug)]
pub struct SpinIplMutex<W = Backoff, O = AtomicOwner> {
    state: MutexState<O>,
    wait: PhantomData<fn() -> W>,
}

impl SpinIplMutex {
    /// Creates an unlocked mutex that raises its owner to `want`.
    #[inline]
    pub const fn new(want: Ipl) -> Self {
        Self::with_ipl(want)
    }

    /// Creates an unlocked mutex that raises its owner to `want`, named `name` in diagnostics.
    #[inline]
    pub const fn named(want: Ipl, name: &'static str) -> Self {
        Self::with_name(want, Some(name))
    }
}

impl<W, O: AtomicOwnerCell> SpinIplMutex<W, O> {
    /// Like [`SpinIplMutex::new`], for any spin-wait and owner slot.
    #[inline]
    pub const fn with_ipl(want: Ipl) -> Self {
        Self::with_name(want, None)
    }

    /// Like [`SpinIplMutex::named`], with an optional name.
    #[inline]
    pub const fn with_name(want: Ipl, name: Option<&'static str>) -> Self {
        Self {
            state: MutexState::new(want, name),
            wait: PhantomData,
        }
    }
}

unsafe impl<W: SpinWait, O: AtomicOwnerCell> IplMutex for SpinIplMutex<W, O> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::with_ipl(Ipl::NONE);

    #[inline]
    fn new(want: Ipl) -> Self {
        Self::with_ipl(want)
    }

    #[inline]
    fn enter<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) {
        let mut wait = W::start();
        while !self.enter_try(cpu) {
            while self.state.owner.owner().is_some() {
                wait.wait();
            }
        }
    }

    #[inline]
    fn enter_try<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) -> bool {
        let s = self.state.raise(cpu);
        match self.state.owner.try_claim(cpu.id()) {
            Ok(()) => {
                self.state.acquired(s);
                true
            }
            Err(_) => {
                self.state.unraise(cpu, s);
                false
            }
        }
    }

    #[inline]
    fn leave<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) {
        self.state.release(cpu);
    }

    #[inline]
    fn owner(&self) -> Option<CpuId> {
        self.state.owner.owner()
    }

    #[inline]
    fn want_ipl(&self) -> Ipl {
        self.state.want_ipl()
    }

    #[inline]
    fn name(&self) -> Option<&'static str> {
        self.state.name()
    }
}
